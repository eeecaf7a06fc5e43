//! Manager configuration.

use std::time::Duration;

use crate::client::DEFAULT_TIMEOUT;

/// How the manager refreshes node inventories around a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeQueryMode {
    /// Select from cached inventories only.
    LocalOnly,
    /// Refresh every candidate node before each dispatch.
    QueryEverytime,
    /// Refresh only the most promising candidates (bounded by
    /// `max_nodes_to_query`) before each dispatch.
    #[default]
    ControlledQuerying,
}

impl std::str::FromStr for NodeQueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local_only" => Ok(Self::LocalOnly),
            "query_everytime" => Ok(Self::QueryEverytime),
            "controlled_querying" => Ok(Self::ControlledQuerying),
            _ => Err(format!(
                "invalid node query mode '{}', expected one of: local_only, query_everytime, controlled_querying",
                s
            )),
        }
    }
}

impl std::fmt::Display for NodeQueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalOnly => write!(f, "local_only"),
            Self::QueryEverytime => write!(f, "query_everytime"),
            Self::ControlledQuerying => write!(f, "controlled_querying"),
        }
    }
}

/// Configuration for one managed node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub base_url: String,
    /// Display name; defaults to `node-<index>` when unset.
    pub name: Option<String>,
    /// Selection bias. Higher-weight nodes score better; clamped at zero.
    pub weight: f64,
}

impl NodeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            name: None,
            weight: 1.0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl From<&str> for NodeConfig {
    fn from(base_url: &str) -> Self {
        Self::new(base_url)
    }
}

impl From<String> for NodeConfig {
    fn from(base_url: String) -> Self {
        Self::new(base_url)
    }
}

/// Manager-wide options.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Default per-call timeout, also used for inventory refreshes.
    pub timeout: Duration,
    pub mode: NodeQueryMode,
    /// Candidate refresh budget under [`NodeQueryMode::ControlledQuerying`].
    pub max_nodes_to_query: usize,
    /// Fail construction if any node errors during the initial refresh.
    pub strict_init: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            mode: NodeQueryMode::default(),
            max_nodes_to_query: 2,
            strict_init: false,
        }
    }
}

impl ManagerOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_mode(mut self, mode: NodeQueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_nodes_to_query(mut self, max_nodes_to_query: usize) -> Self {
        self.max_nodes_to_query = max_nodes_to_query;
        self
    }

    pub fn with_strict_init(mut self, strict_init: bool) -> Self {
        self.strict_init = strict_init;
        self
    }
}
