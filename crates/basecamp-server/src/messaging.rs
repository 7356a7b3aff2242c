//! In-memory messaging surface: no durability, no delivery guarantees.
//! Shares the service definition with the query engine but touches none of
//! the federated state.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use basecamp_proto::v1 as proto;

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[derive(Default)]
pub struct MessagingState {
    messages: Mutex<HashMap<String, proto::MessageRequest>>,
    subscriptions: Mutex<HashMap<String, Vec<String>>>,
}

impl MessagingState {
    pub fn new() -> Self {
        MessagingState::default()
    }

    fn generate_message_id() -> String {
        format!("msg_{}", uuid::Uuid::new_v4().simple())
    }

    /// Store a message under a fresh id; returns the id.
    pub fn store_message(&self, message: proto::MessageRequest) -> String {
        let message_id = Self::generate_message_id();
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(message_id.clone(), message);
        message_id
    }

    /// Replace the subscriber's topic list.
    pub fn record_subscription(&self, subscriber_id: &str, topics: &[String]) {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscriber_id.to_string(), topics.to_vec());
    }

    pub fn message_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
