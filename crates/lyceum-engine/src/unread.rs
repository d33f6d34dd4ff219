use std::collections::HashMap;

use dashmap::DashMap;

use lyceum_core::ids::{ContextId, UserId};

/// Per-(viewer, context) unread-count cache, keyed by context so a write
/// to a context touches exactly one shard entry.
///
/// The cache is latency-only: entries are maintained incrementally where
/// cheap (viewers who have polled recently) and dropped where not; a miss
/// falls back to the definitional recount against the store. Counts here
/// are never treated as a source of truth.
pub struct UnreadIndex {
    by_context: DashMap<ContextId, HashMap<UserId, i64>>,
}

impl UnreadIndex {
    pub fn new() -> Self {
        Self {
            by_context: DashMap::new(),
        }
    }

    /// Cached count for a viewer, if one is resident.
    pub fn get(&self, context: &ContextId, viewer: &UserId) -> Option<i64> {
        self.by_context
            .get(context)
            .and_then(|viewers| viewers.get(viewer).copied())
    }

    /// Install a freshly recounted value.
    pub fn insert(&self, context: &ContextId, viewer: &UserId, count: i64) {
        self.by_context
            .entry(context.clone())
            .or_default()
            .insert(viewer.clone(), count);
    }

    /// A post landed in the context: bump every resident counter except
    /// the author's. Viewers without a resident entry recount on their
    /// next poll.
    pub fn on_post(&self, context: &ContextId, author: &UserId) {
        if let Some(mut viewers) = self.by_context.get_mut(context) {
            for (viewer, count) in viewers.iter_mut() {
                if viewer != author {
                    *count += 1;
                }
            }
        }
    }

    /// The viewer advanced their marker: drop their entry so the next
    /// poll recounts against the new marker.
    pub fn on_seen(&self, context: &ContextId, viewer: &UserId) {
        if let Some(mut viewers) = self.by_context.get_mut(context) {
            viewers.remove(viewer);
        }
    }

    /// Posts disappeared from the context (cascade delete): resident
    /// counts can only be overestimates now, so drop them all.
    pub fn invalidate(&self, context: &ContextId) {
        self.by_context.remove(context);
    }
}

impl Default for UnreadIndex {
    fn default() -> Self {
        Self::new()
    }
}
