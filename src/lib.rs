//! Client-side load balancing for fleets of Alloy inference nodes.
//!
//! An Alloy node serves image, chat, audio, and model-inventory endpoints
//! over HTTP/JSON. [`AlloyClient`] talks to one node;
//! [`AlloyNodeManager`] holds a fleet of them behind the same [`AlloyApi`]
//! surface and routes each call to the node most likely to serve it quickly,
//! scoring cached inventories, locally tracked in-flight work, remotely
//! reported load, and allocation state.
//!
//! ```no_run
//! use alloy_fleet::{AlloyNodeManager, ImageRequest, ManagerOptions};
//!
//! # async fn run() -> Result<(), alloy_fleet::Error> {
//! let manager = AlloyNodeManager::connect(
//!     ["http://node0:8000", "http://node1:8000"],
//!     ManagerOptions::default(),
//! )
//! .await?;
//!
//! let output = manager
//!     .image(ImageRequest::new("qwen-image", "a fox in the snow"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod types;

pub use api::{AlloyApi, AudioRequest, ChatRequest, ImageEventStream, ImageOutput, ImageRequest};
pub use client::AlloyClient;
pub use config::{ManagerOptions, NodeConfig, NodeQueryMode};
pub use error::{ClientError, ConfigError, Error};
pub use manager::{AlloyNodeManager, NodeSnapshot};
pub use types::{
    AllocationStatus, AlloyModel, AlloyModelsResponse, AudioResponse, ChatFormat, ChatResponse,
    ImageData, ImageEvent, ImageResponse, KeepAlive, Message, Modality, ModelCapability, Role,
    ThinkEffort, ThinkSetting, Tool, ToolCall, ToolCallFunction, ToolFunction,
};
