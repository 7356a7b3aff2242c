use basecamp_config::Topology;
use basecamp_types::{NodeId, QueryArgs, QueryKind};

/// Peers of `local_id` that must be contacted for `query`.
///
/// * `exact` — peers whose range contains the key.
/// * `range` — peers whose range overlaps `[range_start, range_end]`.
/// * `all` — every connected peer.
/// * `write` — peers whose range contains the key (only the owner can apply
///   it; fanning the write any wider would just hit range guards).
///
/// Peers already present in `visited` are excluded, as are peer ids missing
/// from the topology (logged, never fatal).
pub fn peers_for_query(
    topology: &Topology,
    local_id: &str,
    query: &QueryArgs,
    visited: &[NodeId],
) -> Vec<NodeId> {
    let Some(local) = topology.node(local_id) else {
        return Vec::new();
    };
    let mut peers = Vec::new();
    for peer_id in &local.connects_to {
        if peer_id == local_id || visited.iter().any(|v| v == peer_id) {
            continue;
        }
        let Some(peer) = topology.node(peer_id) else {
            tracing::warn!(peer = %peer_id, "connects_to references unknown node, skipping");
            continue;
        };
        let wanted = match query.kind {
            QueryKind::Exact | QueryKind::Write => peer.data_range.contains(query.key),
            QueryKind::Range => peer.data_range.overlaps(query.range_start, query.range_end),
            QueryKind::All => true,
        };
        if wanted {
            peers.push(peer_id.clone());
        }
    }
    tracing::debug!(
        node = %local_id,
        kind = query.kind.as_str(),
        peers = ?peers,
        "routed query"
    );
    peers
}
