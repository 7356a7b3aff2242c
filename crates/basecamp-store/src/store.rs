use std::sync::Arc;

use basecamp_types::{DataItem, KeyRange, NodeId};

use crate::codec;
use crate::segment::Segment;

/// A node's view of its local data: the slice of the named segment covering
/// exactly the node's data range.
///
/// Every operation acquires the segment's named mutex and releases it on all
/// exit paths (guard scope). Writes outside the owned range are rejected, so
/// a write fanned out to a non-owning node is a no-op.
pub struct LocalStore {
    node_id: NodeId,
    range: KeyRange,
    segment: Arc<Segment>,
}

impl LocalStore {
    pub fn attach(node_id: impl Into<NodeId>, range: KeyRange, segment: Arc<Segment>) -> Self {
        LocalStore {
            node_id: node_id.into(),
            range,
            segment,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn range(&self) -> KeyRange {
        self.range
    }

    /// Insert-or-overwrite; last writer wins for the key. Returns `false`
    /// when the key falls outside this node's range.
    pub async fn put(&self, item: &DataItem) -> bool {
        if !self.range.contains(item.key) {
            tracing::debug!(
                key = item.key,
                node = %self.node_id,
                "put outside owned range ignored"
            );
            return false;
        }
        let bytes = codec::encode_item(item);
        let mut data = self.segment.lock().await;
        data.insert(item.key, bytes);
        true
    }

    /// Fails silently: absent keys and undecodable entries both read as
    /// `None` (the latter is logged).
    pub async fn get(&self, key: i32) -> Option<DataItem> {
        let data = self.segment.lock().await;
        let bytes = data.get(&key)?;
        match codec::decode_item(bytes) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(key, error = %e, "skipping undecodable stored item");
                None
            }
        }
    }

    /// Keys present in the segment within `[lo, hi]`, clamped to the node's
    /// own range.
    pub async fn keys_in_range(&self, lo: i32, hi: i32) -> Vec<i32> {
        let Some(window) = self.range.clamp(lo, hi) else {
            return Vec::new();
        };
        let data = self.segment.lock().await;
        data.range(window.lo()..=window.hi()).map(|(k, _)| *k).collect()
    }

    /// Decoded items within `[lo, hi]`, clamped to the node's own range.
    /// Undecodable entries are logged and omitted.
    pub async fn get_range(&self, lo: i32, hi: i32) -> Vec<DataItem> {
        let Some(window) = self.range.clamp(lo, hi) else {
            return Vec::new();
        };
        let data = self.segment.lock().await;
        data.range(window.lo()..=window.hi())
            .filter_map(|(key, bytes)| match codec::decode_item(bytes) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(key, error = %e, "skipping undecodable stored item");
                    None
                }
            })
            .collect()
    }
}
