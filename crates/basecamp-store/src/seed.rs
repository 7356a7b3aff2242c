use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use basecamp_types::{DataItem, DataValue, NestedObject};

use crate::store::LocalStore;

/// Data type tag per `key mod 5`.
pub const SEED_DATA_TYPES: [&str; 5] = ["user", "product", "transaction", "event", "log"];

const HOUR_MS: i64 = 3_600_000;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// The synthetic item seeded for `key` at start-up. The value variant and
/// data type tag are both selected by `key mod 5`.
pub fn seed_item(node_id: &str, key: i32) -> DataItem {
    let now = now_ms();
    let variant = key.rem_euclid(5) as usize;
    let value = match variant {
        0 => DataValue::String(format!("String value for key {key} from {node_id}")),
        1 => DataValue::Double(key as f64 * 1.5),
        2 => DataValue::Bool(key.rem_euclid(2) == 0),
        3 => DataValue::Object(NestedObject {
            name: format!("Object_{key}"),
            tags: vec!["tag1".to_string(), "tag2".to_string()],
            properties: HashMap::from([
                ("property1".to_string(), "value1".to_string()),
                ("property2".to_string(), "value2".to_string()),
            ]),
            created_at: now - HOUR_MS,
            updated_at: now,
        }),
        _ => DataValue::Binary(format!("Binary data for key {key}").into_bytes()),
    };
    DataItem {
        key,
        source_node: node_id.to_string(),
        timestamp: now,
        data_type: SEED_DATA_TYPES[variant].to_string(),
        metadata: HashMap::from([
            ("created_by".to_string(), node_id.to_string()),
            ("version".to_string(), "1.0".to_string()),
        ]),
        value,
    }
}

/// Seed one synthetic item per key in the store's range. Returns the number
/// of items written.
pub async fn seed_store(store: &LocalStore) -> usize {
    let mut written = 0;
    for key in store.range().keys() {
        if store.put(&seed_item(store.node_id(), key)).await {
            written += 1;
        }
    }
    written
}
