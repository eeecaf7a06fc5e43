//! Parallel inventory refresh.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;

use super::AlloyNodeManager;

/// Soft cap on concurrent inventory fetches, tuned for typical fleet sizes.
const MAX_CONCURRENT_FETCHES: usize = 16;

impl AlloyNodeManager {
    /// Refresh the cached inventories of the named nodes (all nodes when
    /// `node_names` is `None` or empty; unknown names are ignored).
    ///
    /// One fetch is dispatched per target node, at most
    /// [`MAX_CONCURRENT_FETCHES`] at a time, and each node's snapshot is
    /// applied as its fetch completes. A failed fetch leaves that node's
    /// cached data untouched and records the error instead. Returns the
    /// failures as a `name -> message` map; the call itself never fails.
    ///
    /// The state lock is never held across a fetch.
    pub async fn refresh_nodes(
        &self,
        timeout: Option<Duration>,
        node_names: Option<&[String]>,
    ) -> HashMap<String, String> {
        let timeout = timeout.unwrap_or(self.timeout);
        let targets: Vec<usize> = match node_names {
            None | Some([]) => (0..self.nodes.len()).collect(),
            Some(names) => {
                let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
                (0..self.nodes.len())
                    .filter(|&index| wanted.contains(self.nodes[index].name.as_str()))
                    .collect()
            }
        };
        if targets.is_empty() {
            return HashMap::new();
        }

        let limit = targets.len().min(MAX_CONCURRENT_FETCHES);
        let mut fetches = stream::iter(targets.into_iter().map(|index| {
            let client = Arc::clone(&self.nodes[index].client);
            async move { (index, client.models(Some(timeout)).await) }
        }))
        .buffer_unordered(limit);

        let mut errors = HashMap::new();
        while let Some((index, result)) = fetches.next().await {
            let name = &self.nodes[index].name;
            match result {
                Ok(inventory) => {
                    tracing::debug!(node = %name, "node inventory refreshed");
                    self.lock_caches()[index].apply_inventory(&inventory);
                }
                Err(err) => {
                    let message = err.to_string();
                    tracing::warn!(node = %name, error = %message, "node inventory refresh failed");
                    self.lock_caches()[index].record_refresh_error(message.clone());
                    errors.insert(name.clone(), message);
                }
            }
        }
        errors
    }
}
