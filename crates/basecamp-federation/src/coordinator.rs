use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};

use basecamp_types::{BasecampError, DataItem, GatherArgs, GatherOutcome, NodeId};

/// Forwarding stops once a request would reach this many hops.
pub const MAX_HOPS: u32 = 3;

/// Wall-clock budget for a single outbound peer call.
pub const PER_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Wall-clock budget for a whole fan-out; replies landing later are
/// discarded.
pub const FANOUT_DEADLINE: Duration = Duration::from_secs(4);

/// Outbound side of the inter-node gather contract.
///
/// RPITIT with an explicit `+ Send` bound, so generic callers can `.await`
/// across task boundaries without an `async-trait` dependency.
pub trait PeerTransport: Send + Sync + 'static {
    fn gather(
        &self,
        peer: NodeId,
        request: GatherArgs,
    ) -> impl Future<Output = Result<GatherOutcome, BasecampError>> + Send;
}

/// Items and contributor acknowledgements merged from successful peers.
#[derive(Debug, Default)]
pub struct FanoutResult {
    pub items: Vec<DataItem>,
    pub contributing: Vec<NodeId>,
}

/// Issue `request` to every peer concurrently and merge replies until
/// `deadline`.
///
/// One task per peer, each under [`PER_PEER_TIMEOUT`]. Peers already in the
/// request's visited set are never scheduled. Unreachable peers, peer-side
/// failures, and timeouts are logged and skipped; they never fail the
/// overall query. Once `deadline` passes, in-flight tasks are left to finish
/// detached and their results are dropped.
pub async fn fan_out<T: PeerTransport>(
    transport: &Arc<T>,
    request: &GatherArgs,
    peers: &[NodeId],
    deadline: Instant,
) -> FanoutResult {
    let mut tasks = JoinSet::new();
    for peer in peers {
        if request.visited_nodes.iter().any(|v| v == peer) {
            continue;
        }
        let transport = Arc::clone(transport);
        let request = request.clone();
        let peer = peer.clone();
        tasks.spawn(async move {
            let reply = match timeout(PER_PEER_TIMEOUT, transport.gather(peer.clone(), request)).await
            {
                Ok(reply) => reply,
                Err(_) => Err(BasecampError::Timeout),
            };
            (peer, reply)
        });
    }

    let mut merged = FanoutResult::default();
    loop {
        let next = timeout_at(deadline, tasks.join_next()).await;
        let joined = match next {
            Err(_) => {
                tracing::warn!(
                    pending = tasks.len(),
                    query_id = %request.query.query_id,
                    "fan-out deadline exceeded, discarding stragglers"
                );
                tasks.detach_all();
                break;
            }
            Ok(None) => break,
            Ok(Some(joined)) => joined,
        };
        match joined {
            Err(e) => tracing::warn!(error = %e, "fan-out task failed"),
            Ok((peer, Err(e))) => {
                tracing::warn!(peer = %peer, error = %e, "peer skipped");
            }
            Ok((peer, Ok(reply))) if !reply.success => {
                tracing::warn!(
                    peer = %peer,
                    error = %reply.error_message,
                    "peer reported failure, skipped"
                );
            }
            Ok((peer, Ok(reply))) => {
                tracing::debug!(
                    peer = %peer,
                    items = reply.data_items.len(),
                    route = %reply.route_path,
                    "merged peer reply"
                );
                merged.items.extend(reply.data_items);
                merged.contributing.extend(reply.contributing_nodes);
            }
        }
    }
    merged
}
