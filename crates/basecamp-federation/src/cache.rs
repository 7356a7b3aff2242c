use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use basecamp_types::QueryOutcome;

struct CacheEntry {
    query_id: String,
    response: QueryOutcome,
    inserted_at: Instant,
}

/// Bounded FIFO of recent portal responses, keyed by query id.
///
/// Lookup matches on `query_id` alone, so two semantically different queries
/// sharing an id alias to the same entry. Duplicate ids are legal; lookup
/// returns the first live match in insertion order.
///
/// A single mutex protects the whole structure; operations are short and
/// never release it mid-way.
pub struct QueryCache {
    entries: Mutex<VecDeque<CacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        QueryCache {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ttl,
        }
    }

    /// First non-expired entry for `query_id`, with `from_cache` set.
    pub fn lookup(&self, query_id: &str) -> Option<QueryOutcome> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::sweep(&mut entries, self.ttl);
        entries.iter().find(|e| e.query_id == query_id).map(|e| {
            let mut response = e.response.clone();
            response.from_cache = true;
            response
        })
    }

    /// Append; evicts the oldest entry first when at capacity. Does not
    /// deduplicate by id.
    pub fn insert(&self, response: QueryOutcome) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::sweep(&mut entries, self.ttl);
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(CacheEntry {
            query_id: response.query_id.clone(),
            response,
            inserted_at: Instant::now(),
        });
    }

    fn sweep(entries: &mut VecDeque<CacheEntry>, ttl: Duration) {
        entries.retain(|e| e.inserted_at.elapsed() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
