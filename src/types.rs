//! Wire types for the Alloy node protocol.
//!
//! Everything a node sends or receives over HTTP/JSON lives here: the model
//! inventory (`/models`), chat messages and responses (`/chat`), image
//! payloads and streamed events (`/image`), and audio responses (`/audio`).

use std::collections::BTreeSet;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ClientError;

/// Input/output domain of a model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Video,
}

/// Residency state a node reports for a model.
///
/// `Unknown` absorbs statuses newer than this crate; selection charges them
/// a middling penalty instead of refusing to parse the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    /// Warm and serving.
    Allocated,
    /// Pending warm-up.
    Queue,
    /// Cold.
    Deallocated,
    #[serde(other)]
    Unknown,
}

/// One capability advertised by a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapability {
    pub inputs: BTreeSet<Modality>,
    pub outputs: BTreeSet<Modality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A model as listed in a node's inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlloyModel {
    pub model_id: String,
    pub active_requests: u32,
    pub is_supported: bool,
    #[serde(default)]
    pub supports_concurrent_requests: bool,
    #[serde(default)]
    pub capabilities: Vec<ModelCapability>,
    pub allocation_status: AllocationStatus,
}

/// Inventory response: models grouped by output modality.
///
/// A model may appear in more than one bucket when it produces multiple
/// modalities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlloyModelsResponse {
    #[serde(default)]
    pub image: Vec<AlloyModel>,
    #[serde(default)]
    pub audio: Vec<AlloyModel>,
    #[serde(default)]
    pub video: Vec<AlloyModel>,
    #[serde(default)]
    pub text: Vec<AlloyModel>,
}

impl AlloyModelsResponse {
    /// The four buckets paired with their modality, in wire order.
    pub fn buckets(&self) -> [(Modality, &[AlloyModel]); 4] {
        [
            (Modality::Image, self.image.as_slice()),
            (Modality::Audio, self.audio.as_slice()),
            (Modality::Video, self.video.as_slice()),
            (Modality::Text, self.text.as_slice()),
        ]
    }

    /// True when no bucket lists any model.
    pub fn is_empty(&self) -> bool {
        self.buckets().iter().all(|(_, bucket)| bucket.is_empty())
    }
}

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Message text. Response messages carry fragments when streaming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Thinking content, present only when thinking is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Name of the executed tool, for tool-role messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool calls requested by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a tool result message.
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            thinking: None,
            tool_name: None,
            tool_calls: None,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: ToolCallFunction,
}

/// The function a tool call invokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Definition of a tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type", default = "Tool::default_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<ToolFunction>,
}

impl Tool {
    fn default_type() -> String {
        "function".to_string()
    }

    /// A function tool with a JSON-schema parameter spec.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: Self::default_type(),
            function: Some(ToolFunction {
                name: Some(name.into()),
                description: Some(description.into()),
                parameters: Some(parameters),
            }),
        }
    }
}

/// Function spec of a tool definition. Parameters are a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Thinking effort level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkEffort {
    Low,
    Medium,
    High,
}

/// Thinking mode: a plain on/off switch or an explicit effort level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThinkSetting {
    Enabled(bool),
    Effort(ThinkEffort),
}

impl From<bool> for ThinkSetting {
    fn from(enabled: bool) -> Self {
        Self::Enabled(enabled)
    }
}

impl From<ThinkEffort> for ThinkSetting {
    fn from(effort: ThinkEffort) -> Self {
        Self::Effort(effort)
    }
}

/// How long a node keeps the model resident after the call: seconds or a
/// duration string such as `"5m"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeepAlive {
    Seconds(f64),
    Text(String),
}

impl From<f64> for KeepAlive {
    fn from(seconds: f64) -> Self {
        Self::Seconds(seconds)
    }
}

impl From<&str> for KeepAlive {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Response format constraint: a named format (`"json"`) or an inline JSON
/// schema the response must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatFormat {
    Named(String),
    Schema(serde_json::Value),
}

impl ChatFormat {
    /// The `"json"` named format.
    pub fn json() -> Self {
        Self::Named("json".to_string())
    }
}

/// Response returned by chat requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Model that generated the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// True on the final response; useful to detect the end of a stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    /// Total duration in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    /// Model load duration in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    /// Tokens evaluated in the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    /// Tokens evaluated during inference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
    pub message: Message,
}

/// Image bytes, carried base64-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData(pub Vec<u8>);

impl ImageData {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Serialize for ImageData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for ImageData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(ImageData)
            .map_err(serde::de::Error::custom)
    }
}

/// Response returned by non-streaming image requests.
///
/// Generation metadata beyond the images themselves (timings, seeds, ...)
/// varies per backend and rides in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageData>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One server-sent event from a streaming image request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageEvent {
    /// Event name (`received`, `progress`, `done`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// JSON payload of the `data:` field, if the event carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ImageEvent {
    /// Decode any base64 images in the payload's `images` array.
    ///
    /// Returns an empty vec when the payload has no images.
    pub fn decoded_images(&self) -> Result<Vec<Vec<u8>>, ClientError> {
        let Some(images) = self
            .payload
            .as_ref()
            .and_then(|payload| payload.get("images"))
            .and_then(|images| images.as_array())
        else {
            return Ok(Vec::new());
        };
        images
            .iter()
            .filter_map(|item| item.as_str())
            .map(|encoded| BASE64.decode(encoded.as_bytes()).map_err(ClientError::from))
            .collect()
    }
}

/// Response returned by audio requests. Backends differ on everything except
/// the sample rate, so the rest of the body rides in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
