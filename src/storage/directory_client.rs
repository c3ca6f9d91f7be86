// src/storage/directory_client.rs
//! PLC directory client.
//!
//! The directory is the authoritative store of every did:plc operation log.
//! This module is its HTTP boundary:
//! - `GET  {base}/{did}/data`      current document state
//! - `GET  {base}/{did}/log/audit` full audit log, nullified entries included
//! - `POST {base}/{did}`           submit a signed operation (DAG-JSON body)
//!
//! Each call makes exactly one attempt and classifies its failure precisely.
//! Retrying is the state machine's job. Every call races the request against
//! a [`CancellationToken`] and is bounded by the client's request timeout.

use crate::config::Settings;
use crate::models::operation::{LogEntry, Operation, PlcData};
use crate::utils::serialization::{encode_dag_json, EncodingError};
use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Failure of a single directory call.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("not found in directory")]
    NotFound,

    #[error("directory returned status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed directory response: {0}")]
    Decode(String),

    #[error("request body could not be encoded: {0}")]
    Encoding(#[from] EncodingError),

    #[error("request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DirectoryError::Decode(err.to_string())
        } else {
            DirectoryError::Transport(err.to_string())
        }
    }
}

/// Operations a PLC directory offers. Implemented over HTTP by
/// [`HttpDirectory`]; tests substitute an in-memory directory.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Fetches the current document for `did`.
    async fn fetch_data(&self, did: &str, cancel: &CancellationToken) -> Result<PlcData, DirectoryError>;

    /// Fetches every log entry for `did`, in the directory's order.
    async fn fetch_audit_log(&self, did: &str, cancel: &CancellationToken) -> Result<Vec<LogEntry>, DirectoryError>;

    /// Submits a signed operation for `did`.
    async fn submit(&self, did: &str, op: &Operation, cancel: &CancellationToken) -> Result<(), DirectoryError>;
}

/// Runs `fut` unless `cancel` fires first.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, DirectoryError>
where
    F: Future<Output = Result<T, DirectoryError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DirectoryError::Cancelled),
        res = fut => res,
    }
}

/// Thread-safe HTTP client for a PLC directory.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: Client,
    base_url: String,
}

impl HttpDirectory {
    /// Creates a client for the directory at `base_url`.
    ///
    /// # Arguments
    /// * `base_url` - e.g. `https://plc.directory`; a trailing slash is ignored
    /// * `timeout` - deadline applied to every request
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, DirectoryError> {
        Self::new(
            &settings.directory_url,
            Duration::from_millis(settings.request_timeout_ms),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, did: &str, suffix: &str) -> String {
        format!("{}/{}{}", self.base_url, did, suffix)
    }

    /// Maps a non-success status to the matching error.
    async fn check_status(response: Response) -> Result<Response, DirectoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DirectoryError::ServerError {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, DirectoryError> {
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| DirectoryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn fetch_data(&self, did: &str, cancel: &CancellationToken) -> Result<PlcData, DirectoryError> {
        cancellable(cancel, self.get_json(self.url(did, "/data"))).await
    }

    async fn fetch_audit_log(&self, did: &str, cancel: &CancellationToken) -> Result<Vec<LogEntry>, DirectoryError> {
        cancellable(cancel, self.get_json(self.url(did, "/log/audit"))).await
    }

    async fn submit(&self, did: &str, op: &Operation, cancel: &CancellationToken) -> Result<(), DirectoryError> {
        let body = encode_dag_json(op)?;
        let url = self.url(did, "");
        cancellable(cancel, async {
            debug!("POST {} ({})", url, op.kind());
            let response = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await?;
            // any 2xx counts; directories differ between 200 and 201
            Self::check_status(response).await.map(|_| ())
        })
        .await
    }
}
