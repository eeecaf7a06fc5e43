//! HTTP client for a single Alloy node.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;

use crate::api::{AlloyApi, AudioRequest, ChatRequest, ImageOutput, ImageRequest};
use crate::error::{ClientError, Error};
use crate::types::{AlloyModelsResponse, AudioResponse, ChatResponse, ImageEvent};

/// Default node address for local development.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Default per-call timeout. Image and audio generation can take minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for one Alloy inference node.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct AlloyClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AlloyClient {
    /// Create a client with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit default timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(ClientError::Http)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    /// The node's base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Fetch the node's model inventory.
    pub async fn models(&self, timeout: Option<Duration>) -> Result<AlloyModelsResponse, Error> {
        let url = self.url("/models");
        tracing::debug!(%url, "fetching node inventory");
        let response = self
            .http
            .get(&url)
            .timeout(timeout.unwrap_or(self.timeout))
            .send()
            .await
            .map_err(ClientError::Http)?;
        let response = Self::check_status(response).await?;
        let inventory = response.json().await.map_err(ClientError::Http)?;
        Ok(inventory)
    }

    /// Generate images. With `stream = true` the node replies with
    /// server-sent events and the result is a lazy event sequence.
    pub async fn image(&self, request: ImageRequest) -> Result<ImageOutput, Error> {
        let url = self.url("/image");
        let timeout = request.timeout.unwrap_or(self.timeout);
        tracing::debug!(%url, model_id = %request.model_id, stream = request.stream, "image request");

        let accept = if request.stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, accept)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(ClientError::Http)?;
        let response = Self::check_status(response).await?;

        if request.stream {
            let events = response
                .bytes_stream()
                .eventsource()
                .map(|frame| match frame {
                    Ok(frame) => parse_image_event(frame),
                    Err(err) => Err(ClientError::EventStream(err.to_string()).into()),
                });
            return Ok(ImageOutput::Stream(Box::pin(events)));
        }

        let body = response.json().await.map_err(ClientError::Http)?;
        Ok(ImageOutput::Complete(body))
    }

    /// Run a chat completion.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
        if request.stream {
            return Err(Error::StreamingUnsupported { operation: "chat" });
        }
        let url = self.url("/chat");
        tracing::debug!(%url, model = %request.model, "chat request");
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(ClientError::Http)?;
        let response = Self::check_status(response).await?;
        let body = response.json().await.map_err(ClientError::Http)?;
        Ok(body)
    }

    /// Synthesize speech.
    pub async fn audio(&self, request: AudioRequest) -> Result<AudioResponse, Error> {
        if request.stream {
            return Err(Error::StreamingUnsupported { operation: "audio" });
        }
        let url = self.url("/audio");
        let timeout = request.timeout.unwrap_or(self.timeout);
        tracing::debug!(%url, model_id = %request.model_id, "audio request");
        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(ClientError::Http)?;
        let response = Self::check_status(response).await?;
        let body = response.json().await.map_err(ClientError::Http)?;
        Ok(body)
    }

    /// Map non-2xx responses to `ClientError::Status`, capturing the body.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let reason = if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string()
        } else {
            body.clone()
        };
        Err(ClientError::Status {
            status: status.as_u16(),
            reason,
            body: if body.is_empty() { None } else { Some(body) },
        })
    }
}

/// Decode one SSE frame into an [`ImageEvent`].
///
/// The `data:` field, when present, must be JSON.
fn parse_image_event(frame: eventsource_stream::Event) -> Result<ImageEvent, Error> {
    let payload = if frame.data.trim().is_empty() {
        None
    } else {
        Some(serde_json::from_str(&frame.data).map_err(ClientError::Json)?)
    };
    Ok(ImageEvent {
        event: if frame.event.is_empty() {
            None
        } else {
            Some(frame.event)
        },
        payload,
    })
}

#[async_trait]
impl AlloyApi for AlloyClient {
    async fn models(&self, timeout: Option<Duration>) -> Result<AlloyModelsResponse, Error> {
        AlloyClient::models(self, timeout).await
    }

    async fn image(&self, request: ImageRequest) -> Result<ImageOutput, Error> {
        AlloyClient::image(self, request).await
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
        AlloyClient::chat(self, request).await
    }

    async fn audio(&self, request: AudioRequest) -> Result<AudioResponse, Error> {
        AlloyClient::audio(self, request).await
    }
}
