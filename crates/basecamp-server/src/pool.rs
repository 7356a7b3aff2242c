use std::collections::HashMap;

use tonic::transport::{Channel, Endpoint};

use basecamp_config::{peer_address, Topology, REMOTE_IP_ENV};
use basecamp_federation::PeerTransport;
use basecamp_proto::v1::basecamp_service_client::BasecampServiceClient;
use basecamp_types::{BasecampError, GatherArgs, GatherOutcome, NodeId};

use crate::convert;

/// One long-lived gRPC stub per configured peer, created once at start-up
/// and reused for every call. Channels connect lazily; there is no
/// reconnection backoff beyond what the transport provides.
pub struct GrpcPeerPool {
    clients: HashMap<NodeId, BasecampServiceClient<Channel>>,
}

impl GrpcPeerPool {
    pub fn build(topology: &Topology, local_id: &str) -> Self {
        let remote_ip = std::env::var(REMOTE_IP_ENV).ok();
        let mut clients = HashMap::new();
        let Some(local) = topology.node(local_id) else {
            return GrpcPeerPool { clients };
        };
        for peer_id in &local.connects_to {
            let Some(peer) = topology.node(peer_id) else {
                tracing::warn!(peer = %peer_id, "connects_to references unknown node, no stub created");
                continue;
            };
            let address = peer_address(local, peer, remote_ip.as_deref());
            match Endpoint::from_shared(address.clone()) {
                Ok(endpoint) => {
                    let channel = endpoint.connect_lazy();
                    clients.insert(peer_id.clone(), BasecampServiceClient::new(channel));
                    tracing::info!(peer = %peer_id, %address, "peer stub ready");
                }
                Err(e) => {
                    tracing::warn!(peer = %peer_id, %address, error = %e, "invalid peer address, no stub created");
                }
            }
        }
        GrpcPeerPool { clients }
    }

    pub fn peer_count(&self) -> usize {
        self.clients.len()
    }
}

impl PeerTransport for GrpcPeerPool {
    async fn gather(
        &self,
        peer: NodeId,
        request: GatherArgs,
    ) -> Result<GatherOutcome, BasecampError> {
        let Some(client) = self.clients.get(&peer) else {
            return Err(BasecampError::UnknownPeer(peer));
        };
        let mut client = client.clone();
        let response = client
            .gather_data(tonic::Request::new(convert::gather_args_to_proto(request)))
            .await
            .map_err(|status| BasecampError::PeerUnreachable {
                peer: peer.clone(),
                detail: status.to_string(),
            })?;
        Ok(convert::gather_outcome_from_proto(response.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> Topology {
        serde_json::from_str(
            r#"{
                "portal": "A",
                "shared_memory_key": "pool_shm",
                "cache_size": 4,
                "cache_ttl_seconds": 30,
                "nodes": {
                    "A": { "data_range": [1, 100], "port": 50051, "computer": 1,
                           "connects_to": ["B", "GHOST"] },
                    "B": { "data_range": [101, 200], "port": 50052, "computer": 1,
                           "connects_to": ["A"] }
                }
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn builds_stubs_only_for_known_peers() {
        let pool = GrpcPeerPool::build(&topology(), "A");
        assert_eq!(pool.peer_count(), 1);
    }

    #[tokio::test]
    async fn unknown_peer_is_an_in_band_error() {
        let pool = GrpcPeerPool::build(&topology(), "A");
        let err = pool
            .gather(
                "Z".to_string(),
                GatherArgs {
                    query: basecamp_types::QueryArgs {
                        query_id: "q".to_string(),
                        client_id: "c".to_string(),
                        kind: basecamp_types::QueryKind::All,
                        key: 0,
                        range_start: 0,
                        range_end: 0,
                        string_param: String::new(),
                    },
                    requester_id: "A".to_string(),
                    hop_count: 0,
                    max_hops: 3,
                    route_path: "A".to_string(),
                    visited_nodes: vec!["A".to_string()],
                    forward_to_peers: true,
                    query_context: HashMap::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BasecampError::UnknownPeer(peer) if peer == "Z"));
    }
}
