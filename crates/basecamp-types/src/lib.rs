use std::collections::HashMap;

/// Topology node identifier, e.g. `"A"`.
pub type NodeId = String;

/// Closed integer interval `[lo, hi]` of keys owned by a node.
///
/// Deserializes from the two-element JSON array used in topology files
/// (`"data_range": [1, 100]`); a malformed range (`lo > hi`) is rejected at
/// parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "(i32, i32)", into = "(i32, i32)")]
pub struct KeyRange {
    lo: i32,
    hi: i32,
}

impl KeyRange {
    pub fn new(lo: i32, hi: i32) -> Result<Self, BasecampError> {
        if lo > hi {
            return Err(BasecampError::InvalidArgument(format!(
                "malformed range [{lo}, {hi}]"
            )));
        }
        Ok(KeyRange { lo, hi })
    }

    pub fn lo(&self) -> i32 {
        self.lo
    }

    pub fn hi(&self) -> i32 {
        self.hi
    }

    pub fn contains(&self, key: i32) -> bool {
        self.lo <= key && key <= self.hi
    }

    /// Overlap test against another closed interval.
    pub fn overlaps(&self, start: i32, end: i32) -> bool {
        self.lo <= end && self.hi >= start
    }

    /// The sub-interval of `self` covered by `[start, end]`, if any.
    pub fn clamp(&self, start: i32, end: i32) -> Option<KeyRange> {
        if !self.overlaps(start, end) {
            return None;
        }
        Some(KeyRange {
            lo: self.lo.max(start),
            hi: self.hi.min(end),
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = i32> {
        self.lo..=self.hi
    }

    pub fn len(&self) -> usize {
        (self.hi as i64 - self.lo as i64 + 1) as usize
    }
}

impl TryFrom<(i32, i32)> for KeyRange {
    type Error = BasecampError;

    fn try_from((lo, hi): (i32, i32)) -> Result<Self, Self::Error> {
        KeyRange::new(lo, hi)
    }
}

impl From<KeyRange> for (i32, i32) {
    fn from(r: KeyRange) -> (i32, i32) {
        (r.lo, r.hi)
    }
}

/// Structured value stored under a key.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NestedObject {
    pub name: String,
    /// Ordered, duplicates allowed.
    pub tags: Vec<String>,
    pub properties: HashMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Tagged value union carried by a [`DataItem`]. Exactly one variant is set.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum DataValue {
    String(String),
    Double(f64),
    Bool(bool),
    Object(NestedObject),
    Binary(Vec<u8>),
}

/// The unit of storage and transport.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DataItem {
    pub key: i32,
    /// Node that last wrote the item.
    pub source_node: NodeId,
    /// Milliseconds since epoch at last write.
    pub timestamp: i64,
    pub data_type: String,
    pub metadata: HashMap<String, String>,
    pub value: DataValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Exact,
    Range,
    All,
    Write,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Exact => "exact",
            QueryKind::Range => "range",
            QueryKind::All => "all",
            QueryKind::Write => "write",
        }
    }
}

/// A client query as accepted by the portal.
#[derive(Debug, Clone)]
pub struct QueryArgs {
    pub query_id: String,
    pub client_id: String,
    pub kind: QueryKind,
    pub key: i32,
    pub range_start: i32,
    pub range_end: i32,
    /// Value payload for [`QueryKind::Write`].
    pub string_param: String,
}

/// The portal's reply to a [`QueryArgs`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub query_id: String,
    pub results: Vec<DataItem>,
    pub success: bool,
    pub error_message: String,
    pub timestamp: i64,
    pub processing_time_ms: i64,
    pub from_cache: bool,
    pub contributing_nodes: Vec<NodeId>,
}

/// Inter-node gather request.
///
/// On emission `requester_id` is a member of `visited_nodes` and
/// `hop_count <= max_hops`.
#[derive(Debug, Clone)]
pub struct GatherArgs {
    pub query: QueryArgs,
    pub requester_id: NodeId,
    pub hop_count: u32,
    pub max_hops: u32,
    /// `"A->B->C"` record of the nodes touched so far.
    pub route_path: String,
    pub visited_nodes: Vec<NodeId>,
    pub forward_to_peers: bool,
    pub query_context: HashMap<String, String>,
}

/// A node's reply to a [`GatherArgs`].
#[derive(Debug, Clone)]
pub struct GatherOutcome {
    pub request_id: String,
    pub data_items: Vec<DataItem>,
    pub responder_id: NodeId,
    pub route_path: String,
    /// Ordered multiset: a node appears once per response it contributed to.
    pub contributing_nodes: Vec<NodeId>,
    pub success: bool,
    pub error_message: String,
    pub processing_time_ms: i64,
}

/// Append a node to a `"A->B"` route record.
pub fn append_route(path: &str, node: &str) -> String {
    if path.is_empty() {
        node.to_string()
    } else {
        format!("{path}->{node}")
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BasecampError {
    #[error("unknown peer '{0}'")]
    UnknownPeer(NodeId),
    #[error("peer '{peer}' unreachable: {detail}")]
    PeerUnreachable { peer: NodeId, detail: String },
    #[error("operation timed out")]
    Timeout,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
