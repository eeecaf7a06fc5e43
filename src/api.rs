//! The Alloy node API surface.
//!
//! [`AlloyApi`] is the seam between the dispatcher and a backend: a single
//! node ([`AlloyClient`](crate::AlloyClient)) and the whole fleet
//! ([`AlloyNodeManager`](crate::AlloyNodeManager)) implement the same trait,
//! so a manager can be substituted anywhere one node is used.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::error::Error;
use crate::types::{
    AlloyModelsResponse, AudioResponse, ChatFormat, ChatResponse, ImageEvent, ImageResponse,
    KeepAlive, Message, ThinkSetting, Tool,
};

/// A lazy sequence of server-sent image events.
pub type ImageEventStream = Pin<Box<dyn Stream<Item = Result<ImageEvent, Error>> + Send>>;

/// Result of an image request: a complete response, or an event stream when
/// the caller asked for `stream = true`.
pub enum ImageOutput {
    Complete(ImageResponse),
    Stream(ImageEventStream),
}

impl ImageOutput {
    /// The complete response, if this is not a stream.
    pub fn into_complete(self) -> Option<ImageResponse> {
        match self {
            Self::Complete(response) => Some(response),
            Self::Stream(_) => None,
        }
    }

    /// The event stream, if the request was streaming.
    pub fn into_stream(self) -> Option<ImageEventStream> {
        match self {
            Self::Complete(_) => None,
            Self::Stream(stream) => Some(stream),
        }
    }
}

impl std::fmt::Debug for ImageOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(response) => f.debug_tuple("Complete").field(response).finish(),
            Self::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// An image generation request.
///
/// Serializes directly into the `/image` wire payload; backend-specific
/// generation parameters (size, steps, seed, ...) ride in the flattened
/// `params` map.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub model_id: String,
    pub prompt: serde_json::Value,
    pub stream: bool,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Per-call timeout override; not part of the wire payload.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl ImageRequest {
    pub fn new(model_id: impl Into<String>, prompt: impl Into<serde_json::Value>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            stream: false,
            params: serde_json::Map::new(),
            timeout: None,
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a backend-specific generation parameter.
    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A chat completion request. Serializes directly into the `/chat` payload.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub think: Option<ThinkSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ChatFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<KeepAlive>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            think: None,
            tools: None,
            options: None,
            stream: false,
            format: None,
            keep_alive: None,
        }
    }

    pub fn with_think(mut self, think: impl Into<ThinkSetting>) -> Self {
        self.think = Some(think.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_options(mut self, options: serde_json::Map<String, serde_json::Value>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_format(mut self, format: ChatFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: impl Into<KeepAlive>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }
}

/// A speech synthesis request. Serializes directly into the `/audio` payload.
#[derive(Debug, Clone, Serialize)]
pub struct AudioRequest {
    pub model_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruct: Option<String>,
    /// Base64-encoded reference audio for voice cloning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_text: Option<String>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<KeepAlive>,
    /// Per-call timeout override; not part of the wire payload.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl AudioRequest {
    pub fn new(model_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            text: text.into(),
            language: None,
            speaker: None,
            instruct: None,
            ref_audio: None,
            ref_text: None,
            stream: false,
            keep_alive: None,
            timeout: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_instruct(mut self, instruct: impl Into<String>) -> Self {
        self.instruct = Some(instruct.into());
        self
    }

    pub fn with_ref_audio(mut self, ref_audio: impl Into<String>) -> Self {
        self.ref_audio = Some(ref_audio.into());
        self
    }

    pub fn with_ref_text(mut self, ref_text: impl Into<String>) -> Self {
        self.ref_text = Some(ref_text.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: impl Into<KeepAlive>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Operations every Alloy backend exposes.
#[async_trait]
pub trait AlloyApi: Send + Sync {
    /// Fetch the model inventory.
    async fn models(&self, timeout: Option<Duration>) -> Result<AlloyModelsResponse, Error>;

    /// Generate images, optionally streaming progress events.
    async fn image(&self, request: ImageRequest) -> Result<ImageOutput, Error>;

    /// Run a chat completion. Streaming is not supported yet.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, Error>;

    /// Synthesize speech. Streaming is not supported yet.
    async fn audio(&self, request: AudioRequest) -> Result<AudioResponse, Error>;
}
