//! Multi-node dispatch.
//!
//! [`AlloyNodeManager`] fronts a fleet of Alloy nodes behind the same
//! [`AlloyApi`] surface a single node exposes. Each routed call scores every
//! node whose cached inventory supports the requested model and dispatches
//! to the minimum; `models()` merges all inventories into one view.

mod aggregate;
mod refresh;
mod score;
mod state;
mod stream;

pub use state::NodeSnapshot;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{AlloyApi, AudioRequest, ChatRequest, ImageOutput, ImageRequest};
use crate::client::AlloyClient;
use crate::config::{ManagerOptions, NodeConfig, NodeQueryMode};
use crate::error::{ConfigError, Error};
use crate::types::{AlloyModelsResponse, AudioResponse, ChatResponse};

use aggregate::combined_models;
use score::node_score;
use state::{NodeCache, NodeHandle};
use stream::{InflightGuard, TrackedEventStream};

/// Client-side load balancer over a fleet of Alloy nodes.
///
/// Thread-safe: all mutable state sits behind one manager-wide lock whose
/// critical sections are short field updates. The lock is never held across
/// a network call, so concurrent dispatches only contend for bookkeeping.
/// On locking choice, `std::sync::Mutex` over the async one: no guard lives
/// across an `await`.
pub struct AlloyNodeManager {
    nodes: Vec<NodeHandle>,
    caches: Arc<Mutex<Vec<NodeCache>>>,
    timeout: Duration,
    mode: NodeQueryMode,
    max_nodes_to_query: usize,
}

impl std::fmt::Debug for AlloyNodeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyNodeManager")
            .field(
                "nodes",
                &self.nodes.iter().map(|node| &node.name).collect::<Vec<_>>(),
            )
            .field("mode", &self.mode)
            .field("max_nodes_to_query", &self.max_nodes_to_query)
            .finish()
    }
}

impl AlloyNodeManager {
    /// Connect to a fleet, building one [`AlloyClient`] per node.
    ///
    /// Node configs may be given as bare URLs. Fails on an empty node list, a
    /// zero `max_nodes_to_query`, or when the initial inventory refresh
    /// leaves every node empty (or any node errored, under `strict_init`).
    pub async fn connect<I, C>(nodes: I, options: ManagerOptions) -> Result<Self, Error>
    where
        I: IntoIterator<Item = C>,
        C: Into<NodeConfig>,
    {
        let timeout = options.timeout;
        Self::with_clients(nodes, options, |_, config| {
            let client = AlloyClient::with_timeout(&config.base_url, timeout)?;
            Ok(Arc::new(client) as Arc<dyn AlloyApi>)
        })
        .await
    }

    /// Like [`connect`](Self::connect), but the caller supplies the client
    /// for each node. This is the seam for injecting instrumented or mock
    /// backends.
    pub async fn with_clients<I, C, F>(
        nodes: I,
        options: ManagerOptions,
        mut factory: F,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = C>,
        C: Into<NodeConfig>,
        F: FnMut(usize, &NodeConfig) -> Result<Arc<dyn AlloyApi>, Error>,
    {
        let configs: Vec<NodeConfig> = nodes.into_iter().map(Into::into).collect();
        if configs.is_empty() {
            return Err(ConfigError::NoNodes.into());
        }
        if options.max_nodes_to_query == 0 {
            return Err(ConfigError::MaxNodesToQuery.into());
        }

        let mut handles = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let name = config
                .name
                .clone()
                .unwrap_or_else(|| format!("node-{index}"));
            handles.push(NodeHandle {
                name,
                weight: config.weight,
                client: factory(index, config)?,
            });
        }

        let manager = Self {
            caches: Arc::new(Mutex::new(
                handles.iter().map(|_| NodeCache::default()).collect(),
            )),
            nodes: handles,
            timeout: options.timeout,
            mode: options.mode,
            max_nodes_to_query: options.max_nodes_to_query,
        };
        tracing::info!(
            nodes = manager.nodes.len(),
            mode = %manager.mode,
            "initializing node manager"
        );

        let errors = manager.refresh_nodes(None, None).await;
        if options.strict_init && !errors.is_empty() {
            let mut details: Vec<String> = errors
                .into_iter()
                .map(|(name, message)| format!("{name}: {message}"))
                .collect();
            details.sort();
            return Err(Error::Init {
                details: details.join("; "),
            });
        }
        // Even without strict_init, a fleet where nothing answered usably is
        // unusable: every dispatch would fail anyway.
        if manager
            .lock_caches()
            .iter()
            .all(|cache| cache.models.is_empty())
        {
            return Err(Error::EmptyInventory);
        }

        Ok(manager)
    }

    /// Generate images on the best node for the model. Streaming results
    /// keep the node's in-flight accounting alive until the event sequence
    /// terminates or is dropped.
    pub async fn image(&self, request: ImageRequest) -> Result<ImageOutput, Error> {
        let index = self.select_node(&request.model_id).await?;
        let mut guard = InflightGuard::acquire(Arc::clone(&self.caches), index, &request.model_id);
        match self.nodes[index].client.image(request).await {
            Ok(ImageOutput::Stream(inner)) => {
                Ok(ImageOutput::Stream(TrackedEventStream::wrap(inner, guard)))
            }
            Ok(output) => {
                guard.release();
                Ok(output)
            }
            Err(err) => {
                guard.release();
                Err(err)
            }
        }
    }

    /// Run a chat completion on the best node for the model.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
        if request.stream {
            return Err(Error::StreamingUnsupported { operation: "chat" });
        }
        let index = self.select_node(&request.model).await?;
        let mut guard = InflightGuard::acquire(Arc::clone(&self.caches), index, &request.model);
        let result = self.nodes[index].client.chat(request).await;
        guard.release();
        result
    }

    /// Synthesize speech on the best node for the model.
    pub async fn audio(&self, request: AudioRequest) -> Result<AudioResponse, Error> {
        if request.stream {
            return Err(Error::StreamingUnsupported { operation: "audio" });
        }
        let index = self.select_node(&request.model_id).await?;
        let mut guard = InflightGuard::acquire(Arc::clone(&self.caches), index, &request.model_id);
        let result = self.nodes[index].client.audio(request).await;
        guard.release();
        result
    }

    /// Refresh every node and return the merged fleet-wide inventory.
    ///
    /// Unlike routed calls this never fails on individual node errors:
    /// errored nodes contribute their last cached snapshot, or nothing if
    /// they never answered.
    pub async fn models(&self, timeout: Option<Duration>) -> Result<AlloyModelsResponse, Error> {
        self.refresh_nodes(timeout, None).await;
        Ok(combined_models(&self.lock_caches()))
    }

    /// Point-in-time view of every node's cache and accounting, in
    /// configuration order.
    pub fn node_snapshots(&self) -> Vec<NodeSnapshot> {
        let caches = self.lock_caches();
        self.nodes
            .iter()
            .zip(caches.iter())
            .map(|(node, cache)| NodeSnapshot {
                name: node.name.clone(),
                weight: node.weight,
                supported_model_count: cache.supported_model_count,
                remote_active_total: cache.remote_active_total,
                local_inflight_total: cache.local_inflight_total,
                local_inflight_by_model: cache.local_inflight_by_model.clone(),
                has_refreshed: cache.last_refresh.is_some(),
                last_refresh_error: cache.last_refresh_error.clone(),
            })
            .collect()
    }

    pub(crate) fn lock_caches(&self) -> MutexGuard<'_, Vec<NodeCache>> {
        state::lock(&self.caches)
    }

    /// Pick the node to serve `model_id`.
    ///
    /// Candidates are nodes whose cached inventory lists the model as
    /// supported. An empty candidate set forces a full refresh before giving
    /// up; otherwise the query mode decides which candidates to refresh.
    /// Refreshes happen with the state lock dropped, so candidacy is
    /// re-checked afterwards. Ties go to the node listed first.
    async fn select_node(&self, model_id: &str) -> Result<usize, Error> {
        let mut candidates = self.candidates(model_id);
        if candidates.is_empty() {
            self.refresh_nodes(None, None).await;
            candidates = self.candidates(model_id);
            if candidates.is_empty() {
                return Err(Error::NoCandidateNode {
                    model_id: model_id.to_string(),
                });
            }
        }

        match self.mode {
            NodeQueryMode::LocalOnly => {}
            NodeQueryMode::QueryEverytime => {
                let names = self.names_of(&candidates);
                self.refresh_nodes(None, Some(&names)).await;
            }
            NodeQueryMode::ControlledQuerying => {
                let mut ranked: Vec<(usize, f64)> = {
                    let caches = self.lock_caches();
                    candidates
                        .iter()
                        .map(|&index| {
                            (
                                index,
                                node_score(&caches[index], self.nodes[index].weight, model_id),
                            )
                        })
                        .collect()
                };
                ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
                ranked.truncate(self.max_nodes_to_query.min(ranked.len()));
                let indices: Vec<usize> = ranked.into_iter().map(|(index, _)| index).collect();
                let names = self.names_of(&indices);
                self.refresh_nodes(None, Some(&names)).await;
            }
        }

        let caches = self.lock_caches();
        let mut best: Option<(usize, f64)> = None;
        for index in 0..self.nodes.len() {
            if !caches[index].supports(model_id) {
                continue;
            }
            let score = node_score(&caches[index], self.nodes[index].weight, model_id);
            if best.is_none_or(|(_, best_score)| score < best_score) {
                best = Some((index, score));
            }
        }

        match best {
            Some((index, score)) => {
                tracing::debug!(
                    node = %self.nodes[index].name,
                    model_id,
                    score,
                    "selected node"
                );
                Ok(index)
            }
            None => Err(Error::NoCandidateNode {
                model_id: model_id.to_string(),
            }),
        }
    }

    /// Indices of nodes whose cache currently supports `model_id`.
    fn candidates(&self, model_id: &str) -> Vec<usize> {
        let caches = self.lock_caches();
        (0..self.nodes.len())
            .filter(|&index| caches[index].supports(model_id))
            .collect()
    }

    fn names_of(&self, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .map(|&index| self.nodes[index].name.clone())
            .collect()
    }
}

#[async_trait]
impl AlloyApi for AlloyNodeManager {
    async fn models(&self, timeout: Option<Duration>) -> Result<AlloyModelsResponse, Error> {
        AlloyNodeManager::models(self, timeout).await
    }

    async fn image(&self, request: ImageRequest) -> Result<ImageOutput, Error> {
        AlloyNodeManager::image(self, request).await
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
        AlloyNodeManager::chat(self, request).await
    }

    async fn audio(&self, request: AudioRequest) -> Result<AudioResponse, Error> {
        AlloyNodeManager::audio(self, request).await
    }
}
