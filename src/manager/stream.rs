//! In-flight release for streaming dispatches.
//!
//! A streaming image call stays in flight until its event sequence
//! terminates. [`InflightGuard`] ties the counter release to scoped cleanup:
//! the wrapped stream releases on exhaustion or on an error item, and `Drop`
//! covers a consumer that abandons the sequence early. Release is idempotent,
//! so every exit path lands on exactly one decrement.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;

use crate::api::ImageEventStream;
use crate::error::Error;
use crate::types::ImageEvent;

use super::state::{self, NodeCache};

/// Holds one unit of in-flight accounting on a node/model pair.
pub(crate) struct InflightGuard {
    caches: Arc<Mutex<Vec<NodeCache>>>,
    node_index: usize,
    model_id: String,
    released: bool,
}

impl InflightGuard {
    /// Increment the node's counters and return the guard that will
    /// decrement them.
    pub fn acquire(
        caches: Arc<Mutex<Vec<NodeCache>>>,
        node_index: usize,
        model_id: &str,
    ) -> Self {
        state::lock(&caches)[node_index].increment_inflight(model_id);
        Self {
            caches,
            node_index,
            model_id: model_id.to_string(),
            released: false,
        }
    }

    /// Decrement the counters. Safe to call more than once; only the first
    /// call has an effect.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        state::lock(&self.caches)[self.node_index].decrement_inflight(&self.model_id);
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Event stream wrapper that releases its guard on the first terminal
/// condition: exhaustion, an error item, or drop.
pub(crate) struct TrackedEventStream {
    inner: ImageEventStream,
    guard: InflightGuard,
}

impl TrackedEventStream {
    pub fn wrap(inner: ImageEventStream, guard: InflightGuard) -> ImageEventStream {
        Box::pin(Self { inner, guard })
    }
}

impl Stream for TrackedEventStream {
    type Item = Result<ImageEvent, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let poll = this.inner.as_mut().poll_next(cx);
        match &poll {
            Poll::Ready(None) | Poll::Ready(Some(Err(_))) => this.guard.release(),
            _ => {}
        }
        poll
    }
}
