use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use crate::media::SelectedImage;

/// Multipart field the service reads the upload from.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub request_timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

/// What a well-formed response carried. `caption` is `None` when the body
/// had no usable `caption` string; that is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionReply {
    pub caption: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("caption request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("caption service returned status {0}")]
    Status(StatusCode),
    #[error("caption response was not JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("caption worker panicked: {0}")]
    Panicked(String),
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    endpoint: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("caption client user agent required");
        }

        let endpoint = Url::parse(config.endpoint.trim())
            .with_context(|| format!("parse caption endpoint {:?}", config.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!(
                "caption endpoint must be http or https, got {:?}",
                endpoint.scheme()
            );
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.request_timeout)
                .build()
                .context("build caption HTTP client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST the image as multipart field `image` and read the `caption` field
    /// out of the JSON reply.
    pub fn caption(&self, image: &SelectedImage) -> Result<CaptionReply, CaptionError> {
        let part = Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)?;
        let form = Form::new().part(IMAGE_FIELD, part);

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptionError::Status(status));
        }

        let body = response.text()?;
        let payload: Value = serde_json::from_str(&body)?;
        Ok(CaptionReply {
            caption: extract_caption(&payload),
        })
    }
}

fn extract_caption(payload: &Value) -> Option<String> {
    payload
        .get("caption")
        .and_then(Value::as_str)
        .filter(|caption| !caption.is_empty())
        .map(str::to_string)
}
