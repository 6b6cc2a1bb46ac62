use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

use crate::Result;

/// Multipart field the downstream service reads the upload from
pub const FORM_FIELD: &str = "video";
const UPLOAD_FILE_NAME: &str = "audio.mp3";
const UPLOAD_MIME: &str = "audio/mpeg";

/// Ships the finished MP3 to the downstream processing service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Upload the file at `path`, returning the downstream response body
    async fn forward(&self, path: &Path) -> Result<Value>;
}

/// Multipart HTTP uploader with a bounded request timeout
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: Client,
    endpoint: String,
}

impl HttpForwarder {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, path: &Path) -> Result<Value> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let length = file.metadata().await?.len();

        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(UPLOAD_MIME)?;
        let form = Form::new().part(FORM_FIELD, part);

        tracing::info!(endpoint = %self.endpoint, bytes = length, "Forwarding MP3");

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Upload timed out: {}", e)
                } else {
                    anyhow::anyhow!("Upload request failed: {}", e)
                }
            })?;

        let status = response.status();
        let body = response.bytes().await.context("Failed to read downstream response")?;

        if !status.is_success() {
            anyhow::bail!(
                "Downstream returned HTTP {}: {}",
                status,
                String::from_utf8_lossy(&body).trim()
            );
        }

        Ok(parse_payload(&body))
    }
}

/// Downstream replies are usually JSON; anything else is passed through as a string
fn parse_payload(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
