//! Error types for alloy-fleet.

/// Top-level error type for the crate.
///
/// Per-concern errors (`ConfigError`, `ClientError`) nest into this via
/// `#[from]`, so both `AlloyClient` and `AlloyNodeManager` surface a single
/// error type through the [`AlloyApi`](crate::AlloyApi) trait.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Strict initialization failed: at least one node errored during the
    /// initial inventory refresh. `details` lists `name: message` per node.
    #[error("failed to initialize node manager: {details}")]
    Init { details: String },

    /// Every managed node returned an empty model inventory at construction.
    #[error("no node provided a valid models response")]
    EmptyInventory,

    /// No node lists the requested model as supported, even after a forced
    /// inventory refresh.
    #[error("no candidate node supports model '{model_id}'")]
    NoCandidateNode { model_id: String },

    /// The caller requested `stream = true` on an operation that does not
    /// stream yet.
    #[error("streaming {operation} is not supported yet")]
    StreamingUnsupported { operation: &'static str },

    #[error(transparent)]
    Backend(#[from] ClientError),
}

/// Manager construction errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("nodes must include at least one node")]
    NoNodes,

    #[error("max_nodes_to_query must be positive")]
    MaxNodesToQuery,
}

/// Errors surfaced by the per-node HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Non-2xx response. `reason` carries the response body when the node
    /// sent one, otherwise the canonical status phrase.
    #[error("HTTP {status}: {reason}")]
    Status {
        status: u16,
        reason: String,
        body: Option<String>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event stream error: {0}")]
    EventStream(String),

    #[error("invalid base64 image data: {0}")]
    ImageDecode(#[from] base64::DecodeError),
}
