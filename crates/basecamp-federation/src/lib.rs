pub mod cache;
pub mod coordinator;
pub mod engine;
pub mod router;

pub use cache::QueryCache;
pub use coordinator::{
    fan_out, FanoutResult, PeerTransport, FANOUT_DEADLINE, MAX_HOPS, PER_PEER_TIMEOUT,
};
pub use engine::{Engine, QueryNode, NOT_PORTAL_ERROR};
