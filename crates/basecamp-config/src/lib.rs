use std::collections::BTreeMap;
use std::path::Path;

use figment::{
    providers::{Env, Format, Json},
    Figment,
};

use basecamp_types::{KeyRange, NodeId};

/// Environment variable naming the address of peers in a different computer
/// group. Unset falls back to loopback.
pub const REMOTE_IP_ENV: &str = "REMOTE_IP";

/// Per-node entry in the topology file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NodeSpec {
    pub data_range: KeyRange,
    pub port: u16,
    /// Computer-group tag: nodes sharing it are co-located.
    pub computer: u32,
    #[serde(default)]
    pub connects_to: Vec<NodeId>,
}

/// The shared topology description, immutable after start-up.
///
/// The peer graph need not be complete or symmetric; data ranges across
/// nodes are pairwise disjoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Topology {
    pub portal: NodeId,
    pub shared_memory_key: String,
    pub cache_size: usize,
    pub cache_ttl_seconds: u64,
    pub nodes: BTreeMap<NodeId, NodeSpec>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to load topology: {0}")]
    Load(#[from] figment::Error),
    #[error("node '{0}' not present in topology")]
    UnknownNode(NodeId),
    #[error("portal '{0}' not present in topology")]
    UnknownPortal(NodeId),
    #[error("data ranges of '{a}' and '{b}' overlap")]
    OverlappingRanges { a: NodeId, b: NodeId },
    #[error("{0} must be positive")]
    NonPositive(&'static str),
}

impl Topology {
    /// Load the topology file and validate it for `node_id`.
    ///
    /// `BASECAMP_`-prefixed environment variables override file values.
    pub fn load(path: impl AsRef<Path>, node_id: &str) -> Result<Topology, ConfigError> {
        let topology: Topology = Figment::new()
            .merge(Json::file_exact(path.as_ref()))
            .merge(Env::prefixed("BASECAMP_").split("__"))
            .extract()?;
        topology.validate(node_id)?;
        Ok(topology)
    }

    fn validate(&self, node_id: &str) -> Result<(), ConfigError> {
        if !self.nodes.contains_key(node_id) {
            return Err(ConfigError::UnknownNode(node_id.to_string()));
        }
        if !self.nodes.contains_key(&self.portal) {
            return Err(ConfigError::UnknownPortal(self.portal.clone()));
        }
        if self.cache_size == 0 {
            return Err(ConfigError::NonPositive("cache_size"));
        }
        if self.cache_ttl_seconds == 0 {
            return Err(ConfigError::NonPositive("cache_ttl_seconds"));
        }

        let mut by_lo: Vec<(&NodeId, KeyRange)> = self
            .nodes
            .iter()
            .map(|(id, spec)| (id, spec.data_range))
            .collect();
        by_lo.sort_by_key(|(_, r)| r.lo());
        for pair in by_lo.windows(2) {
            let (a, ra) = pair[0];
            let (b, rb) = pair[1];
            if ra.hi() >= rb.lo() {
                return Err(ConfigError::OverlappingRanges {
                    a: a.clone(),
                    b: b.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn is_portal(&self, node_id: &str) -> bool {
        self.portal == node_id
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeSpec> {
        self.nodes.get(node_id)
    }
}

/// Resolve the dialable address of `peer` as seen from `local`.
///
/// Peers in the same computer group are reached over loopback; others use
/// the operator-supplied remote address, falling back to loopback when it
/// is unset.
pub fn peer_address(local: &NodeSpec, peer: &NodeSpec, remote_ip: Option<&str>) -> String {
    let host = if peer.computer == local.computer {
        "127.0.0.1"
    } else {
        remote_ip.unwrap_or("127.0.0.1")
    };
    format!("http://{host}:{}", peer.port)
}
