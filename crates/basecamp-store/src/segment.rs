use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::{Mutex as DataMutex, MutexGuard};

/// Process-level registry of named segments. Any component that opens a
/// segment by the configured `shared_memory_key` observes the same map.
fn registry() -> &'static Mutex<HashMap<String, Arc<Segment>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<Segment>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A named in-memory segment holding serialized items keyed by data key,
/// guarded by a single named mutex.
///
/// Segments are process-backed, not file-backed: contents never survive the
/// process, and `reset` gives every start-up a clean slate.
pub struct Segment {
    name: String,
    data: DataMutex<BTreeMap<i32, Vec<u8>>>,
}

impl Segment {
    /// Idempotent start-up reset: any pre-existing segment (and its mutex)
    /// with this name is removed, then a fresh empty segment is registered.
    pub fn reset(name: &str) -> Arc<Segment> {
        let mut reg = registry().lock().unwrap_or_else(PoisonError::into_inner);
        let segment = Arc::new(Segment {
            name: name.to_string(),
            data: DataMutex::new(BTreeMap::new()),
        });
        reg.insert(name.to_string(), Arc::clone(&segment));
        segment
    }

    /// Attach to an existing segment by name.
    pub fn open(name: &str) -> Option<Arc<Segment>> {
        let reg = registry().lock().unwrap_or_else(PoisonError::into_inner);
        reg.get(name).cloned()
    }

    /// Unregister the named segment; later `open` calls find nothing.
    pub fn destroy(name: &str) {
        let mut reg = registry().lock().unwrap_or_else(PoisonError::into_inner);
        reg.remove(name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire the named mutex. Held only for the span of a single
    /// store operation.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, BTreeMap<i32, Vec<u8>>> {
        self.data.lock().await
    }
}
