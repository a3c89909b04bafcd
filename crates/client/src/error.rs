use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{message} ({status})")]
    Api {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Progress channel lost after {attempts} attempts: {last_error}")]
    ConnectionLost { attempts: u32, last_error: String },

    #[error("Event stream error: {0}")]
    EventStream(String),
}

impl ClientError {
    /// Error kind reported by the server, when there is one.
    pub fn api_kind(&self) -> Option<&str> {
        match self {
            Self::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
