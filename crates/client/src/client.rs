use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use toolshed_core::{InstalledRecord, PackageKind};

use crate::error::{ClientError, Result};
use crate::progress::{ProgressStream, RetryPolicy};
use crate::types::{
    CheckCommandBody, CommandCheck, ErrorBody, HealthStatus, InstallBody, ScanResponse,
    SoftwareListing, UpdateStatus, UpdateVersionBody,
};

/// Bearer-token client for the software API.
#[derive(Clone)]
pub struct ToolshedClient {
    base_url: String,
    token: String,
    client: Client,
}

impl ToolshedClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(base_url, token, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, token: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Progress channel for this client's owner.
    pub fn progress_stream(&self, policy: RetryPolicy) -> ProgressStream {
        ProgressStream::with_client(&self.base_url, &self.token, self.client.clone(), policy)
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn list_software(&self) -> Result<Vec<SoftwareListing>> {
        self.send_json(self.get("/api/software")).await
    }

    pub async fn list_installed(&self) -> Result<Vec<InstalledRecord>> {
        self.send_json(self.get("/api/software/installed")).await
    }

    /// Admin only.
    pub async fn list_installed_for(&self, owner_id: &str) -> Result<Vec<InstalledRecord>> {
        self.send_json(self.get(&format!("/api/software/users/{}", owner_id)))
            .await
    }

    pub async fn check_command(&self, command: &str) -> Result<CommandCheck> {
        let request = self
            .post("/api/software/check-command")
            .json(&CheckCommandBody { command });
        self.send_json(request).await
    }

    pub async fn install(&self, app_id: &str, kind: PackageKind) -> Result<InstalledRecord> {
        let request = self
            .post("/api/software/install")
            .json(&InstallBody { app_id, kind });
        self.send_json(request).await
    }

    pub async fn scan(&self) -> Result<ScanResponse> {
        self.send_json(self.post("/api/software/scan")).await
    }

    pub async fn check_updates(&self, app_id: &str) -> Result<UpdateStatus> {
        self.send_json(self.get(&format!("/api/software/{}/updates", app_id)))
            .await
    }

    pub async fn update_version(&self, app_id: &str, version: &str) -> Result<InstalledRecord> {
        let request = self
            .client
            .put(format!("{}/api/software/{}", self.base_url, app_id))
            .bearer_auth(&self.token)
            .json(&UpdateVersionBody { version });
        self.send_json(request).await
    }

    pub async fn uninstall(&self, app_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/api/software/{}", self.base_url, app_id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        Ok(())
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let body = response.json().await?;
        Ok(body)
    }

    async fn error_from(response: reqwest::Response) -> ClientError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_else(|_| ErrorBody {
            error: String::new(),
            message: text,
        });

        match status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized(body.message),
            StatusCode::NOT_FOUND if body.error.is_empty() => ClientError::NotFound(body.message),
            _ => ClientError::Api {
                status: status.as_u16(),
                error: body.error,
                message: body.message,
            },
        }
    }
}
