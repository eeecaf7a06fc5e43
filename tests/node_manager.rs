//! Routing, accounting, and refresh behavior of `AlloyNodeManager`, driven
//! through mock backends injected with `with_clients`.
//!
//! Each mock node serves a configurable inventory and records how often each
//! endpoint was hit, so the tests can assert both where a call landed and
//! how many inventory fetches a dispatch cost.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use alloy_fleet::{
    AllocationStatus, AlloyApi, AlloyModel, AlloyModelsResponse, AlloyNodeManager, AudioRequest,
    AudioResponse, ChatRequest, ChatResponse, ClientError, Error, ImageEvent, ImageOutput,
    ImageRequest, ImageResponse, ManagerOptions, Message, Modality, ModelCapability, NodeConfig,
    NodeQueryMode, NodeSnapshot,
};

/// A mock Alloy node.
struct MockNode {
    name: String,
    /// `Err` makes inventory fetches fail with that message.
    inventory: Mutex<Result<AlloyModelsResponse, String>>,
    /// When set, image/chat/audio dispatches fail with this reason.
    dispatch_error: Option<String>,
    models_calls: AtomicUsize,
    image_calls: AtomicUsize,
    image_stream_calls: AtomicUsize,
}

impl MockNode {
    fn new(name: &str, inventory: AlloyModelsResponse) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            inventory: Mutex::new(Ok(inventory)),
            dispatch_error: None,
            models_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            image_stream_calls: AtomicUsize::new(0),
        })
    }

    fn erroring(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            inventory: Mutex::new(Err(message.to_string())),
            dispatch_error: None,
            models_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            image_stream_calls: AtomicUsize::new(0),
        })
    }

    fn failing_dispatch(name: &str, inventory: AlloyModelsResponse, reason: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            inventory: Mutex::new(Ok(inventory)),
            dispatch_error: Some(reason.to_string()),
            models_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            image_stream_calls: AtomicUsize::new(0),
        })
    }

    fn set_inventory(&self, inventory: AlloyModelsResponse) {
        *self.inventory.lock().unwrap() = Ok(inventory);
    }

    fn set_inventory_error(&self, message: &str) {
        *self.inventory.lock().unwrap() = Err(message.to_string());
    }

    fn models_calls(&self) -> usize {
        self.models_calls.load(Ordering::SeqCst)
    }

    fn dispatch_failure(&self) -> Option<Error> {
        self.dispatch_error.as_ref().map(|reason| {
            ClientError::Status {
                status: 500,
                reason: reason.clone(),
                body: None,
            }
            .into()
        })
    }
}

#[async_trait]
impl AlloyApi for MockNode {
    async fn models(
        &self,
        _timeout: Option<std::time::Duration>,
    ) -> Result<AlloyModelsResponse, Error> {
        self.models_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.inventory.lock().unwrap() {
            Ok(inventory) => Ok(inventory.clone()),
            Err(message) => Err(ClientError::Status {
                status: 503,
                reason: message.clone(),
                body: None,
            }
            .into()),
        }
    }

    async fn image(&self, request: ImageRequest) -> Result<ImageOutput, Error> {
        if let Some(err) = self.dispatch_failure() {
            return Err(err);
        }
        if request.stream {
            self.image_stream_calls.fetch_add(1, Ordering::SeqCst);
            let events = vec![
                Ok(ImageEvent {
                    event: Some("received".to_string()),
                    payload: Some(json!({"model_id": request.model_id})),
                }),
                Ok(ImageEvent {
                    event: Some("done".to_string()),
                    payload: Some(json!({})),
                }),
            ];
            return Ok(ImageOutput::Stream(Box::pin(futures::stream::iter(
                events,
            ))));
        }
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let mut extra = serde_json::Map::new();
        extra.insert("node".to_string(), json!(self.name));
        extra.insert("model_id".to_string(), json!(request.model_id));
        Ok(ImageOutput::Complete(ImageResponse {
            images: vec![],
            extra,
        }))
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
        if let Some(err) = self.dispatch_failure() {
            return Err(err);
        }
        Ok(ChatResponse {
            model: Some(request.model),
            created_at: None,
            done: Some(true),
            done_reason: Some("stop".to_string()),
            total_duration: None,
            load_duration: None,
            prompt_eval_count: None,
            prompt_eval_duration: None,
            eval_count: None,
            eval_duration: None,
            message: Message::assistant(format!("ok from {}", self.name)),
        })
    }

    async fn audio(&self, _request: AudioRequest) -> Result<AudioResponse, Error> {
        if let Some(err) = self.dispatch_failure() {
            return Err(err);
        }
        let mut extra = serde_json::Map::new();
        extra.insert("node".to_string(), json!(self.name));
        Ok(AudioResponse {
            sample_rate: Some(24000),
            extra,
        })
    }
}

fn image_model(
    model_id: &str,
    active_requests: u32,
    concurrent: bool,
    status: AllocationStatus,
) -> AlloyModel {
    AlloyModel {
        model_id: model_id.to_string(),
        active_requests,
        is_supported: true,
        supports_concurrent_requests: concurrent,
        capabilities: vec![ModelCapability {
            inputs: BTreeSet::from([Modality::Text]),
            outputs: BTreeSet::from([Modality::Image]),
            name: Some("text-to-image".to_string()),
        }],
        allocation_status: status,
    }
}

fn inventory(image: Vec<AlloyModel>) -> AlloyModelsResponse {
    AlloyModelsResponse {
        image,
        ..Default::default()
    }
}

async fn manager_for(nodes: &[Arc<MockNode>], options: ManagerOptions) -> AlloyNodeManager {
    try_manager_for(nodes, options).await.unwrap()
}

async fn try_manager_for(
    nodes: &[Arc<MockNode>],
    options: ManagerOptions,
) -> Result<AlloyNodeManager, Error> {
    let configs: Vec<NodeConfig> = nodes
        .iter()
        .map(|node| NodeConfig::new(format!("http://{}:8000", node.name)).with_name(&node.name))
        .collect();
    AlloyNodeManager::with_clients(configs, options, |index, _| {
        Ok(Arc::clone(&nodes[index]) as Arc<dyn AlloyApi>)
    })
    .await
}

fn snapshot_of<'a>(snapshots: &'a [NodeSnapshot], name: &str) -> &'a NodeSnapshot {
    snapshots
        .iter()
        .find(|snapshot| snapshot.name == name)
        .unwrap()
}

fn total_models_calls(nodes: &[Arc<MockNode>]) -> usize {
    nodes.iter().map(|node| node.models_calls()).sum()
}

fn local_only() -> ManagerOptions {
    ManagerOptions::default().with_mode(NodeQueryMode::LocalOnly)
}

async fn routed_node(manager: &AlloyNodeManager, model_id: &str) -> String {
    let output = manager
        .image(ImageRequest::new(model_id, "fox"))
        .await
        .unwrap();
    output.into_complete().unwrap().extra["node"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn routes_to_the_node_with_lower_queue_depth() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 4, true, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 1, true, AllocationStatus::Allocated)]),
        ),
    ];
    let manager = manager_for(&nodes, local_only()).await;
    assert_eq!(routed_node(&manager, "qwen-image").await, "node1");
}

#[tokio::test]
async fn non_concurrent_penalty_outweighs_lower_queue_depth() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 1, false, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 2, true, AllocationStatus::Allocated)]),
        ),
    ];
    let manager = manager_for(&nodes, local_only()).await;
    assert_eq!(routed_node(&manager, "qwen-image").await, "node1");
}

#[tokio::test]
async fn equal_scores_break_ties_in_configuration_order() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 1, true, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 1, true, AllocationStatus::Allocated)]),
        ),
    ];
    let manager = manager_for(&nodes, local_only()).await;
    assert_eq!(routed_node(&manager, "qwen-image").await, "node0");
}

#[tokio::test]
async fn higher_weight_wins_a_near_tie() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 1, true, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 1, true, AllocationStatus::Allocated)]),
        ),
    ];
    let configs = vec![
        NodeConfig::new("http://node0:8000").with_name("node0"),
        NodeConfig::new("http://node1:8000")
            .with_name("node1")
            .with_weight(2.0),
    ];
    let manager = AlloyNodeManager::with_clients(configs, local_only(), |index, _| {
        Ok(Arc::clone(&nodes[index]) as Arc<dyn AlloyApi>)
    })
    .await
    .unwrap();
    assert_eq!(routed_node(&manager, "qwen-image").await, "node1");
}

#[tokio::test]
async fn controlled_querying_refreshes_at_most_the_budget() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 1, true, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 2, true, AllocationStatus::Deallocated)]),
        ),
    ];
    let manager = manager_for(
        &nodes,
        ManagerOptions::default()
            .with_mode(NodeQueryMode::ControlledQuerying)
            .with_max_nodes_to_query(1),
    )
    .await;

    let before = total_models_calls(&nodes);
    manager
        .image(ImageRequest::new("qwen-image", "fox"))
        .await
        .unwrap();
    assert_eq!(total_models_calls(&nodes) - before, 1);
}

#[tokio::test]
async fn query_everytime_refreshes_every_candidate() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Deallocated)]),
        ),
    ];
    let manager = manager_for(
        &nodes,
        ManagerOptions::default().with_mode(NodeQueryMode::QueryEverytime),
    )
    .await;

    let before = total_models_calls(&nodes);
    manager
        .image(ImageRequest::new("qwen-image", "fox"))
        .await
        .unwrap();
    assert_eq!(total_models_calls(&nodes) - before, 2);
}

#[tokio::test]
async fn local_only_dispatches_without_fetching() {
    let nodes = [MockNode::new(
        "node0",
        inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
    )];
    let manager = manager_for(&nodes, local_only()).await;

    let before = total_models_calls(&nodes);
    manager
        .image(ImageRequest::new("qwen-image", "fox"))
        .await
        .unwrap();
    assert_eq!(total_models_calls(&nodes), before);
}

#[tokio::test]
async fn candidacy_lost_during_refresh_reroutes() {
    // node0 looks best from the cache, but its refreshed inventory no longer
    // supports the model; the post-refresh recheck must route to node1.
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 1, true, AllocationStatus::Allocated)]),
        ),
    ];
    let manager = manager_for(
        &nodes,
        ManagerOptions::default().with_mode(NodeQueryMode::QueryEverytime),
    )
    .await;

    let mut dropped = image_model("qwen-image", 0, true, AllocationStatus::Allocated);
    dropped.is_supported = false;
    nodes[0].set_inventory(inventory(vec![dropped]));

    assert_eq!(routed_node(&manager, "qwen-image").await, "node1");
}

#[tokio::test]
async fn draining_a_stream_releases_inflight_counters() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 4, true, AllocationStatus::Allocated)]),
        ),
    ];
    let manager = manager_for(&nodes, local_only()).await;

    let output = manager
        .image(ImageRequest::new("qwen-image", "fox").with_stream(true))
        .await
        .unwrap();
    let mut stream = output.into_stream().unwrap();

    // The dispatch is in flight until the stream terminates.
    let during = manager.node_snapshots();
    let node0 = snapshot_of(&during, "node0");
    assert_eq!(node0.local_inflight_total, 1);
    assert_eq!(node0.local_inflight_by_model["qwen-image"], 1);

    let mut events: Vec<ImageEvent> = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }
    assert_eq!(events.last().unwrap().event.as_deref(), Some("done"));

    let after = manager.node_snapshots();
    let node0 = snapshot_of(&after, "node0");
    assert_eq!(node0.local_inflight_total, 0);
    assert!(!node0.local_inflight_by_model.contains_key("qwen-image"));
    assert_eq!(nodes[0].image_stream_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abandoning_a_stream_releases_inflight_counters() {
    let nodes = [MockNode::new(
        "node0",
        inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
    )];
    let manager = manager_for(&nodes, local_only()).await;

    let output = manager
        .image(ImageRequest::new("qwen-image", "fox").with_stream(true))
        .await
        .unwrap();
    let mut stream = output.into_stream().unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.event.as_deref(), Some("received"));
    drop(stream);

    let snapshots = manager.node_snapshots();
    let node0 = snapshot_of(&snapshots, "node0");
    assert_eq!(node0.local_inflight_total, 0);
    assert!(node0.local_inflight_by_model.is_empty());
}

#[tokio::test]
async fn dispatch_errors_propagate_after_releasing_counters() {
    let nodes = [MockNode::failing_dispatch(
        "node0",
        inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
        "backend exploded",
    )];
    let manager = manager_for(&nodes, local_only()).await;

    let err = manager
        .image(ImageRequest::new("qwen-image", "fox"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Backend(ClientError::Status { status: 500, .. })
    ));

    let snapshots = manager.node_snapshots();
    assert_eq!(snapshot_of(&snapshots, "node0").local_inflight_total, 0);
}

#[tokio::test]
async fn unknown_model_forces_a_full_refresh_then_fails() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
        ),
    ];
    let manager = manager_for(&nodes, local_only()).await;

    let before = total_models_calls(&nodes);
    let err = manager
        .image(ImageRequest::new("missing-model", "fox"))
        .await
        .unwrap_err();
    match err {
        Error::NoCandidateNode { model_id } => assert_eq!(model_id, "missing-model"),
        other => panic!("expected NoCandidateNode, got: {other:?}"),
    }
    // One forced fetch per node before giving up.
    assert_eq!(total_models_calls(&nodes) - before, 2);
}

#[tokio::test]
async fn strict_init_reports_every_failing_node() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
        ),
        MockNode::erroring("node1", "connection refused"),
    ];
    let err = try_manager_for(&nodes, local_only().with_strict_init(true))
        .await
        .unwrap_err();
    match err {
        Error::Init { details } => {
            assert!(details.contains("node1: "));
            assert!(details.contains("connection refused"));
        }
        other => panic!("expected Init, got: {other:?}"),
    }
}

#[tokio::test]
async fn lenient_init_records_errors_and_skips_dead_nodes() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 9, true, AllocationStatus::Queue)]),
        ),
        MockNode::erroring("node1", "connection refused"),
    ];
    let manager = manager_for(&nodes, local_only()).await;

    let snapshots = manager.node_snapshots();
    let node1 = snapshot_of(&snapshots, "node1");
    assert!(!node1.has_refreshed);
    assert!(
        node1
            .last_refresh_error
            .as_deref()
            .unwrap()
            .contains("connection refused")
    );

    // The dead node has no inventory, so even a badly scored node0 wins.
    assert_eq!(routed_node(&manager, "qwen-image").await, "node0");
}

#[tokio::test]
async fn all_empty_inventories_fail_construction() {
    let nodes = [
        MockNode::new("node0", AlloyModelsResponse::default()),
        MockNode::new("node1", AlloyModelsResponse::default()),
    ];
    let err = try_manager_for(&nodes, local_only()).await.unwrap_err();
    assert!(matches!(err, Error::EmptyInventory));
}

#[tokio::test]
async fn one_empty_node_does_not_fail_construction() {
    let nodes = [
        MockNode::new("node0", AlloyModelsResponse::default()),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
        ),
    ];
    let manager = manager_for(&nodes, local_only()).await;
    assert_eq!(routed_node(&manager, "qwen-image").await, "node1");
}

#[tokio::test]
async fn refresh_targets_only_the_named_nodes() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
        ),
    ];
    let manager = manager_for(&nodes, local_only()).await;

    let before = (nodes[0].models_calls(), nodes[1].models_calls());
    let errors = manager
        .refresh_nodes(None, Some(&["node1".to_string(), "ghost".to_string()]))
        .await;
    assert!(errors.is_empty());
    assert_eq!(nodes[0].models_calls(), before.0);
    assert_eq!(nodes[1].models_calls(), before.1 + 1);
}

#[tokio::test]
async fn failed_refresh_keeps_the_previous_snapshot() {
    let nodes = [MockNode::new(
        "node0",
        inventory(vec![image_model("qwen-image", 2, true, AllocationStatus::Allocated)]),
    )];
    let manager = manager_for(&nodes, local_only()).await;

    nodes[0].set_inventory_error("node went away");
    let errors = manager.refresh_nodes(None, None).await;
    assert!(errors["node0"].contains("node went away"));

    // Cached inventory still routes; the error is only recorded.
    assert_eq!(routed_node(&manager, "qwen-image").await, "node0");
    let snapshots = manager.node_snapshots();
    let node0 = snapshot_of(&snapshots, "node0");
    assert!(
        node0
            .last_refresh_error
            .as_deref()
            .unwrap()
            .contains("node went away")
    );
    assert_eq!(node0.remote_active_total, 2);
}

#[tokio::test]
async fn models_aggregates_across_nodes() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 1, false, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 2, true, AllocationStatus::Deallocated)]),
        ),
    ];
    let manager = manager_for(&nodes, local_only()).await;

    let before = total_models_calls(&nodes);
    let combined = manager.models(None).await.unwrap();
    // models() refreshes every node first.
    assert_eq!(total_models_calls(&nodes) - before, 2);

    assert_eq!(combined.image.len(), 1);
    let merged = &combined.image[0];
    assert_eq!(merged.model_id, "qwen-image");
    assert_eq!(merged.active_requests, 3);
    assert_eq!(merged.allocation_status, AllocationStatus::Allocated);
    assert!(merged.supports_concurrent_requests);
}

#[tokio::test]
async fn models_tolerates_errored_nodes_via_cached_snapshots() {
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 1, true, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 2, true, AllocationStatus::Allocated)]),
        ),
    ];
    let manager = manager_for(&nodes, local_only()).await;

    nodes[1].set_inventory_error("mid-flight failure");
    let combined = manager.models(None).await.unwrap();
    // node1 contributes its cached snapshot from construction time.
    assert_eq!(combined.image[0].active_requests, 3);
}

#[tokio::test]
async fn streaming_chat_and_audio_are_rejected_before_selection() {
    let nodes = [MockNode::new(
        "node0",
        inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
    )];
    let manager = manager_for(&nodes, local_only()).await;

    // An unknown model would raise NoCandidateNode if selection ran; the
    // streaming check comes first.
    let err = manager
        .chat(ChatRequest::new("missing-model", vec![Message::user("hi")]).with_stream(true))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::StreamingUnsupported { operation: "chat" }
    ));

    let err = manager
        .audio(AudioRequest::new("missing-model", "hello").with_stream(true))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::StreamingUnsupported { operation: "audio" }
    ));
}

#[tokio::test]
async fn chat_routes_and_releases_counters() {
    let nodes = [MockNode::new(
        "node0",
        inventory(vec![image_model("qwen-chat", 0, true, AllocationStatus::Allocated)]),
    )];
    let manager = manager_for(&nodes, local_only()).await;

    let response = manager
        .chat(ChatRequest::new("qwen-chat", vec![Message::user("hi")]))
        .await
        .unwrap();
    assert_eq!(response.message.content.as_deref(), Some("ok from node0"));

    let snapshots = manager.node_snapshots();
    assert_eq!(snapshot_of(&snapshots, "node0").local_inflight_total, 0);
}

#[tokio::test]
async fn audio_routes_to_a_supporting_node() {
    let nodes = [MockNode::new(
        "node0",
        inventory(vec![image_model("tts-1", 0, true, AllocationStatus::Allocated)]),
    )];
    let manager = manager_for(&nodes, local_only()).await;

    let response = manager
        .audio(AudioRequest::new("tts-1", "hello"))
        .await
        .unwrap();
    assert_eq!(response.sample_rate, Some(24000));
    assert_eq!(response.extra["node"], json!("node0"));
}

#[tokio::test]
async fn manager_substitutes_for_a_single_client() {
    let nodes = [MockNode::new(
        "node0",
        inventory(vec![image_model("qwen-image", 0, true, AllocationStatus::Allocated)]),
    )];
    let manager = manager_for(&nodes, local_only()).await;

    // Anything programmed against AlloyApi accepts the manager.
    let backend: Arc<dyn AlloyApi> = Arc::new(manager);
    let combined = backend.models(None).await.unwrap();
    assert_eq!(combined.image.len(), 1);
}

#[tokio::test]
async fn concurrent_dispatches_spread_over_equivalent_nodes() {
    // Non-concurrent model: a single local in-flight dispatch carries a 10x
    // penalty, so the second concurrent call must land on the other node.
    let nodes = [
        MockNode::new(
            "node0",
            inventory(vec![image_model("qwen-image", 0, false, AllocationStatus::Allocated)]),
        ),
        MockNode::new(
            "node1",
            inventory(vec![image_model("qwen-image", 0, false, AllocationStatus::Allocated)]),
        ),
    ];
    let manager = manager_for(&nodes, local_only()).await;

    let first = manager
        .image(ImageRequest::new("qwen-image", "fox").with_stream(true))
        .await
        .unwrap();
    let second = manager
        .image(ImageRequest::new("qwen-image", "fox").with_stream(true))
        .await
        .unwrap();

    let snapshots = manager.node_snapshots();
    assert_eq!(snapshot_of(&snapshots, "node0").local_inflight_total, 1);
    assert_eq!(snapshot_of(&snapshots, "node1").local_inflight_total, 1);

    drop(first);
    drop(second);
    let snapshots = manager.node_snapshots();
    assert_eq!(snapshot_of(&snapshots, "node0").local_inflight_total, 0);
    assert_eq!(snapshot_of(&snapshots, "node1").local_inflight_total, 0);
}
