//! Per-node state: the immutable handle, the cached inventory snapshot, and
//! local in-flight accounting.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::api::AlloyApi;
use crate::types::{AlloyModel, AlloyModelsResponse, Modality};

/// Immutable per-node data, fixed at construction.
pub(crate) struct NodeHandle {
    pub name: String,
    pub weight: f64,
    pub client: Arc<dyn AlloyApi>,
}

/// Mutable per-node cache, guarded by the manager-wide lock.
#[derive(Debug, Default)]
pub(crate) struct NodeCache {
    /// Last-seen inventory, keyed by model id. Replaced wholesale on each
    /// successful refresh; a failed refresh leaves it untouched.
    pub models: HashMap<String, AlloyModel>,
    /// Which modality buckets the node listed each model in.
    pub categories_by_model_id: HashMap<String, BTreeSet<Modality>>,
    pub supported_model_count: usize,
    /// Sum of `active_requests` across the node's models at last refresh.
    pub remote_active_total: u64,
    /// Dispatches issued through this manager and not yet completed.
    pub local_inflight_total: usize,
    pub local_inflight_by_model: HashMap<String, usize>,
    pub last_refresh: Option<Instant>,
    pub last_refresh_error: Option<String>,
}

impl NodeCache {
    /// Whether the cached inventory lists `model_id` as supported.
    pub fn supports(&self, model_id: &str) -> bool {
        self.models
            .get(model_id)
            .is_some_and(|model| model.is_supported)
    }

    /// Replace the cached inventory with a fresh snapshot and recompute the
    /// derived totals.
    pub fn apply_inventory(&mut self, response: &AlloyModelsResponse) {
        let (models, categories) = index_models(response);
        self.supported_model_count = models.values().filter(|model| model.is_supported).count();
        self.remote_active_total = models
            .values()
            .map(|model| u64::from(model.active_requests))
            .sum();
        self.models = models;
        self.categories_by_model_id = categories;
        self.last_refresh = Some(Instant::now());
        self.last_refresh_error = None;
    }

    /// Record a failed refresh, leaving cached data intact.
    pub fn record_refresh_error(&mut self, message: String) {
        self.last_refresh_error = Some(message);
    }

    pub fn increment_inflight(&mut self, model_id: &str) {
        self.local_inflight_total += 1;
        *self
            .local_inflight_by_model
            .entry(model_id.to_string())
            .or_insert(0) += 1;
    }

    /// Saturates at zero; zero-valued entries are removed rather than kept.
    pub fn decrement_inflight(&mut self, model_id: &str) {
        self.local_inflight_total = self.local_inflight_total.saturating_sub(1);
        match self.local_inflight_by_model.get_mut(model_id) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.local_inflight_by_model.remove(model_id);
            }
            None => {}
        }
    }
}

/// Lock the cache vector, recovering from a poisoned lock.
///
/// All critical sections are short field updates that cannot leave the caches
/// in a torn state, so continuing past a panicked holder is safe.
pub(crate) fn lock(caches: &Mutex<Vec<NodeCache>>) -> MutexGuard<'_, Vec<NodeCache>> {
    caches.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Index an inventory response into a deduplicated `model_id -> model` map
/// plus the modality buckets each model appeared in.
///
/// The first occurrence of a model wins; if it lacked capabilities and a
/// later occurrence has them, they are copied in.
pub(crate) fn index_models(
    response: &AlloyModelsResponse,
) -> (
    HashMap<String, AlloyModel>,
    HashMap<String, BTreeSet<Modality>>,
) {
    let mut models: HashMap<String, AlloyModel> = HashMap::new();
    let mut categories: HashMap<String, BTreeSet<Modality>> = HashMap::new();

    for (modality, bucket) in response.buckets() {
        for model in bucket {
            let entry = models
                .entry(model.model_id.clone())
                .or_insert_with(|| model.clone());
            if entry.capabilities.is_empty() && !model.capabilities.is_empty() {
                entry.capabilities = model.capabilities.clone();
            }
            categories
                .entry(model.model_id.clone())
                .or_default()
                .insert(modality);
        }
    }

    (models, categories)
}

/// Point-in-time view of one node's state, for observability and tests.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub name: String,
    pub weight: f64,
    pub supported_model_count: usize,
    pub remote_active_total: u64,
    pub local_inflight_total: usize,
    pub local_inflight_by_model: HashMap<String, usize>,
    /// False until the node's first successful refresh.
    pub has_refreshed: bool,
    pub last_refresh_error: Option<String>,
}
