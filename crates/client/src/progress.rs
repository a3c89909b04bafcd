use std::time::Duration;

use eventsource_stream::Eventsource;
use events::ProgressEvent;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::{ClientError, Result};

/// How often and how patiently to (re)open the progress channel.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

pub struct ProgressStream {
    base_url: String,
    token: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl ProgressStream {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(base_url, token, reqwest::Client::new(), RetryPolicy::default())
    }

    pub fn with_client(
        base_url: impl Into<String>,
        token: impl Into<String>,
        client: reqwest::Client,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
            policy,
        }
    }

    /// Open the channel, retrying transient failures with backoff.
    ///
    /// The channel is registered server-side once this returns, so an
    /// install requested afterwards reports into it.
    pub async fn connect(&self) -> Result<ProgressReceiver> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.try_connect().await {
                Ok(response) => return Ok(ProgressReceiver::spawn(response)),
                Err(ClientError::Unauthorized(message)) => {
                    return Err(ClientError::Unauthorized(message))
                }
                Err(e) => {
                    tracing::warn!(
                        "Progress channel attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        Err(ClientError::ConnectionLost {
            attempts,
            last_error,
        })
    }

    async fn try_connect(&self) -> Result<reqwest::Response> {
        let url = format!("{}/api/software/install-progress", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized(
                "progress channel rejected the token".to_string(),
            ));
        }

        if !status.is_success() {
            return Err(ClientError::EventStream(format!(
                "Failed to open progress channel: {}",
                status
            )));
        }

        Ok(response)
    }
}

pub struct ProgressReceiver {
    rx: mpsc::Receiver<Result<ProgressEvent>>,
}

impl ProgressReceiver {
    fn spawn(response: reqwest::Response) -> Self {
        let (tx, rx) = mpsc::channel::<Result<ProgressEvent>>(100);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut event_stream = byte_stream.eventsource();
            let mut finished = false;

            while let Some(event_result) = event_stream.next().await {
                match event_result {
                    Ok(event) => {
                        // heartbeats are comments and carry no data
                        if event.data.is_empty() {
                            continue;
                        }

                        match serde_json::from_str::<ProgressEvent>(&event.data) {
                            Ok(parsed) => {
                                finished = parsed.is_terminal();
                                if tx.send(Ok(parsed)).await.is_err() || finished {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "Failed to parse progress event: {} - data: {}",
                                    e,
                                    event.data
                                );
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ClientError::EventStream(e.to_string()))).await;
                        return;
                    }
                }
            }

            if !finished {
                let _ = tx
                    .send(Err(ClientError::EventStream(
                        "progress channel closed before a terminal event".to_string(),
                    )))
                    .await;
            }
        });

        Self { rx }
    }

    /// `None` once the channel has ended.
    pub async fn next_event(&mut self) -> Option<Result<ProgressEvent>> {
        self.rx.recv().await
    }
}
