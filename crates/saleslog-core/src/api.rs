use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, StatusCode, header};
use saleslog_shared::{
    ErrorBody, NoteArgs, StatusArgs, TaskCreate, TaskDto, TaskPatch, TaskStatus,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("request could not complete: {0}")]
    Network(String),

    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("malformed response body: {0}")]
    Decode(String),

    #[error("request body could not be encoded: {0}")]
    Encode(String),
}

/// The remote task collection. Each call is exactly one request.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn list(&self) -> Result<Vec<TaskDto>, ApiError>;

    async fn create(&self, create: &TaskCreate) -> Result<TaskDto, ApiError>;

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<TaskDto, ApiError>;

    async fn set_note(&self, id: &str, note: &str) -> Result<TaskDto, ApiError>;

    async fn set_status(&self, id: &str, status: TaskStatus) -> Result<TaskDto, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTaskApi {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("failed building HTTP client for task API")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<B, R>(&self, method: Method, path: &str, body: Option<&B>) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method.clone(), url.as_str())
            .header(header::ACCEPT, "application/json");

        if let Some(body) = body {
            let payload = encode_body(body)?;
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(payload);
        }

        let response = request.send().await.map_err(|err| {
            warn!(%method, url = %url, error = %err, "task API request failed");
            ApiError::Network(err.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ApiError::Network(format!("failed reading response body: {err}")))?;
        debug!(%method, url = %url, status = status.as_u16(), bytes = text.len(), "task API response");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or_else(|_| text.trim().to_string());
            return Err(if status == StatusCode::NOT_FOUND {
                ApiError::NotFound(message)
            } else {
                ApiError::Rejected {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        serde_json::from_str(&text).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(body).map_err(|err| ApiError::Encode(err.to_string()))
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<TaskDto>, ApiError> {
        self.send::<(), _>(Method::GET, "/api/list", None).await
    }

    #[instrument(skip(self, create), fields(entity = %create.entity_name))]
    async fn create(&self, create: &TaskCreate) -> Result<TaskDto, ApiError> {
        self.send(Method::POST, "/api/tasks", Some(create)).await
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<TaskDto, ApiError> {
        self.send(Method::PUT, &format!("/api/tasks/{id}"), Some(patch))
            .await
    }

    #[instrument(skip(self, note), fields(note_len = note.len()))]
    async fn set_note(&self, id: &str, note: &str) -> Result<TaskDto, ApiError> {
        let args = NoteArgs {
            note: note.to_string(),
        };
        self.send(Method::PUT, &format!("/api/task/{id}"), Some(&args))
            .await
    }

    #[instrument(skip(self))]
    async fn set_status(&self, id: &str, status: TaskStatus) -> Result<TaskDto, ApiError> {
        let args = StatusArgs { status };
        self.send(Method::PUT, &format!("/api/task/status/{id}"), Some(&args))
            .await
    }
}
