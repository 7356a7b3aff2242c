//! Canonical byte encoding of a [`DataItem`]: the protobuf wire schema.
//!
//! `decode_item(encode_item(x)) == x` for every well-formed item; the same
//! bytes are what peers exchange inside `DataResponse`, so the stored form
//! and the wire form never diverge.

use prost::Message;

use basecamp_proto::v1 as proto;
use basecamp_types::{BasecampError, DataItem, DataValue, NestedObject};

pub fn encode_item(item: &DataItem) -> Vec<u8> {
    item_to_proto(item).encode_to_vec()
}

pub fn decode_item(bytes: &[u8]) -> Result<DataItem, BasecampError> {
    let decoded =
        proto::DataItem::decode(bytes).map_err(|e| BasecampError::Codec(e.to_string()))?;
    item_from_proto(decoded)
}

pub fn item_to_proto(item: &DataItem) -> proto::DataItem {
    let value = match &item.value {
        DataValue::String(s) => proto::data_item::Value::StringValue(s.clone()),
        DataValue::Double(d) => proto::data_item::Value::DoubleValue(*d),
        DataValue::Bool(b) => proto::data_item::Value::BoolValue(*b),
        DataValue::Object(o) => proto::data_item::Value::ObjectValue(proto::NestedObject {
            name: o.name.clone(),
            tags: o.tags.clone(),
            properties: o.properties.clone().into_iter().collect(),
            created_at: o.created_at,
            updated_at: o.updated_at,
        }),
        DataValue::Binary(b) => proto::data_item::Value::BinaryValue(b.clone()),
    };
    proto::DataItem {
        key: item.key,
        source_node: item.source_node.clone(),
        timestamp: item.timestamp,
        data_type: item.data_type.clone(),
        metadata: item.metadata.clone().into_iter().collect(),
        value: Some(value),
    }
}

pub fn item_from_proto(item: proto::DataItem) -> Result<DataItem, BasecampError> {
    let value = match item.value {
        None => {
            return Err(BasecampError::Codec(format!(
                "item for key {} carries no value variant",
                item.key
            )))
        }
        Some(proto::data_item::Value::StringValue(s)) => DataValue::String(s),
        Some(proto::data_item::Value::DoubleValue(d)) => DataValue::Double(d),
        Some(proto::data_item::Value::BoolValue(b)) => DataValue::Bool(b),
        Some(proto::data_item::Value::ObjectValue(o)) => DataValue::Object(NestedObject {
            name: o.name,
            tags: o.tags,
            properties: o.properties.into_iter().collect(),
            created_at: o.created_at,
            updated_at: o.updated_at,
        }),
        Some(proto::data_item::Value::BinaryValue(b)) => DataValue::Binary(b),
    };
    Ok(DataItem {
        key: item.key,
        source_node: item.source_node,
        timestamp: item.timestamp,
        data_type: item.data_type,
        metadata: item.metadata.into_iter().collect(),
        value,
    })
}
