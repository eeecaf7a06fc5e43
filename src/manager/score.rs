//! Node scoring for dispatch selection. Lower is better.

use crate::types::AllocationStatus;

use super::state::NodeCache;

/// Score a node for serving `model_id`, from a snapshot of its cache.
///
/// Active load dominates: remote queue depth plus local in-flight work on the
/// model, with a 10x multiplier when the model cannot serve concurrent
/// requests so its queue depth swamps every other factor. Allocation status
/// is the next strongest discriminator (warm beats cold beats queued). The
/// remaining biases are small corrections: nodes supporting fewer models get
/// a slight boost to avoid under-utilization, higher-weight nodes are mildly
/// favored, and overall node load (local and remote) discourages piling onto
/// one saturated node.
///
/// Nodes that do not list the model as supported score infinity and are
/// never selected.
pub(crate) fn node_score(cache: &NodeCache, weight: f64, model_id: &str) -> f64 {
    let Some(model) = cache.models.get(model_id) else {
        return f64::INFINITY;
    };
    if !model.is_supported {
        return f64::INFINITY;
    }

    let remote_active = f64::from(model.active_requests);
    let local_active_model = cache
        .local_inflight_by_model
        .get(model_id)
        .copied()
        .unwrap_or(0) as f64;

    let mut load_score = remote_active + local_active_model;
    if !model.supports_concurrent_requests {
        load_score *= 10.0;
    }

    let status_penalty = match model.allocation_status {
        AllocationStatus::Allocated => 0.0,
        AllocationStatus::Deallocated => 1.0,
        AllocationStatus::Queue => 4.0,
        AllocationStatus::Unknown => 1.5,
    };

    let scarcity_bias = cache.supported_model_count.max(1) as f64 * 0.01;
    let weight_bias = -weight.max(0.0) * 0.25;
    let node_load_bias = cache.local_inflight_total as f64 * 0.1;
    let remote_load_bias = cache.remote_active_total as f64 * 0.01;

    load_score + status_penalty + scarcity_bias + node_load_bias + remote_load_bias + weight_bias
}
