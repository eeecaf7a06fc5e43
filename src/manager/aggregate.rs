//! Merging per-node inventories into one fleet-wide view.

use std::collections::{BTreeSet, HashMap, hash_map::Entry};

use crate::types::{AllocationStatus, AlloyModel, AlloyModelsResponse, Modality};

use super::state::NodeCache;

/// Promotion ladder for allocation statuses. Merging only ever moves a model
/// up the ladder, never down.
fn status_priority(status: AllocationStatus) -> u8 {
    match status {
        AllocationStatus::Allocated => 3,
        AllocationStatus::Queue => 2,
        AllocationStatus::Deallocated => 1,
        AllocationStatus::Unknown => 0,
    }
}

/// Merge the cached inventories of every node into a single response.
///
/// `active_requests` sums across nodes, the boolean flags OR, the allocation
/// status promotes upward, and the first node with capabilities supplies
/// them. Models land in the bucket of every modality any node tagged them
/// with; a model no node tagged falls back to the union of its capability
/// outputs. Buckets are sorted by model id.
pub(crate) fn combined_models(caches: &[NodeCache]) -> AlloyModelsResponse {
    let mut summary: HashMap<String, AlloyModel> = HashMap::new();
    let mut categories: HashMap<String, BTreeSet<Modality>> = HashMap::new();

    for cache in caches {
        for (model_id, model) in &cache.models {
            categories.entry(model_id.clone()).or_default().extend(
                cache
                    .categories_by_model_id
                    .get(model_id)
                    .into_iter()
                    .flatten()
                    .copied(),
            );
            match summary.entry(model_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(model.clone());
                }
                Entry::Occupied(mut slot) => {
                    let merged = slot.get_mut();
                    merged.active_requests += model.active_requests;
                    merged.is_supported |= model.is_supported;
                    merged.supports_concurrent_requests |= model.supports_concurrent_requests;
                    if status_priority(model.allocation_status)
                        > status_priority(merged.allocation_status)
                    {
                        merged.allocation_status = model.allocation_status;
                    }
                    if merged.capabilities.is_empty() && !model.capabilities.is_empty() {
                        merged.capabilities = model.capabilities.clone();
                    }
                }
            }
        }
    }

    let mut response = AlloyModelsResponse::default();
    for (model_id, model) in &summary {
        let mut tags = categories.get(model_id).cloned().unwrap_or_default();
        if tags.is_empty() {
            tags = model
                .capabilities
                .iter()
                .flat_map(|capability| capability.outputs.iter().copied())
                .collect();
        }
        for modality in tags {
            let bucket = match modality {
                Modality::Image => &mut response.image,
                Modality::Audio => &mut response.audio,
                Modality::Video => &mut response.video,
                Modality::Text => &mut response.text,
            };
            bucket.push(model.clone());
        }
    }

    for bucket in [
        &mut response.image,
        &mut response.audio,
        &mut response.video,
        &mut response.text,
    ] {
        bucket.sort_by(|a, b| a.model_id.cmp(&b.model_id));
    }
    response
}
