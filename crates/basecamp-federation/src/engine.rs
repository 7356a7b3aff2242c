use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

use basecamp_config::Topology;
use basecamp_store::LocalStore;
use basecamp_types::{
    append_route, DataItem, DataValue, GatherArgs, GatherOutcome, NodeId, QueryArgs, QueryKind,
    QueryOutcome,
};

use crate::cache::QueryCache;
use crate::coordinator::{fan_out, PeerTransport, FANOUT_DEADLINE, MAX_HOPS};
use crate::router;

/// In-band error text returned when `QueryData` reaches a non-portal node.
pub const NOT_PORTAL_ERROR: &str = "This node is not the portal";

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn elapsed_ms(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}

/// One node's view of the federated query protocol: the portal-facing
/// `query` and the inter-node `gather`.
///
/// Both return in-band outcomes; the transport status of the carrying RPC
/// stays OK regardless.
pub trait QueryNode: Send + Sync + 'static {
    fn query(&self, args: QueryArgs) -> impl Future<Output = QueryOutcome> + Send;

    fn gather(&self, args: GatherArgs) -> impl Future<Output = GatherOutcome> + Send;
}

/// The federated query engine for a single node.
///
/// Owns the node's local store and (when this node is the portal) the result
/// cache; peer calls go through the injected [`PeerTransport`].
pub struct Engine<T: PeerTransport> {
    node_id: NodeId,
    topology: Arc<Topology>,
    store: LocalStore,
    cache: QueryCache,
    transport: Arc<T>,
}

impl<T: PeerTransport> Engine<T> {
    pub fn new(
        node_id: impl Into<NodeId>,
        topology: Arc<Topology>,
        store: LocalStore,
        transport: Arc<T>,
    ) -> Self {
        let cache = QueryCache::new(
            topology.cache_size,
            Duration::from_secs(topology.cache_ttl_seconds),
        );
        Engine {
            node_id: node_id.into(),
            topology,
            store,
            cache,
            transport,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn write_item(&self, args: &QueryArgs) -> DataItem {
        DataItem {
            key: args.key,
            source_node: self.node_id.clone(),
            timestamp: now_ms(),
            data_type: "write".to_string(),
            metadata: HashMap::from([("written_by".to_string(), args.client_id.clone())]),
            value: DataValue::String(args.string_param.clone()),
        }
    }

    /// Local-store portion of a query. The store applies the node's own
    /// range, so a write for a key this node does not own is a no-op.
    async fn lookup_local(&self, args: &QueryArgs) -> Vec<DataItem> {
        match args.kind {
            QueryKind::Exact => {
                if self.store.range().contains(args.key) {
                    self.store.get(args.key).await.into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            QueryKind::Range => self.store.get_range(args.range_start, args.range_end).await,
            QueryKind::All => {
                let range = self.store.range();
                self.store.get_range(range.lo(), range.hi()).await
            }
            QueryKind::Write => {
                let item = self.write_item(args);
                if self.store.put(&item).await {
                    vec![item]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Drop duplicate keys collected from sibling fan-out paths, keeping
    /// first occurrence. Disjoint ranges guarantee the copies are identical.
    fn dedup_by_key(items: Vec<DataItem>) -> Vec<DataItem> {
        let mut seen = HashSet::new();
        items.into_iter().filter(|i| seen.insert(i.key)).collect()
    }
}

impl<T: PeerTransport> QueryNode for Engine<T> {
    async fn query(&self, args: QueryArgs) -> QueryOutcome {
        let started = Instant::now();

        if !self.topology.is_portal(&self.node_id) {
            tracing::warn!(node = %self.node_id, query_id = %args.query_id, "query rejected: not the portal");
            return QueryOutcome {
                query_id: args.query_id,
                results: Vec::new(),
                success: false,
                error_message: NOT_PORTAL_ERROR.to_string(),
                timestamp: now_ms(),
                processing_time_ms: elapsed_ms(started),
                from_cache: false,
                contributing_nodes: Vec::new(),
            };
        }

        if let Some(mut hit) = self.cache.lookup(&args.query_id) {
            hit.processing_time_ms = elapsed_ms(started);
            tracing::debug!(query_id = %hit.query_id, "served from cache");
            return hit;
        }

        let mut results = self.lookup_local(&args).await;
        let mut contributing = vec![self.node_id.clone()];

        if started.elapsed() < FANOUT_DEADLINE {
            let visited = vec![self.node_id.clone()];
            let peers = router::peers_for_query(&self.topology, &self.node_id, &args, &visited);
            if !peers.is_empty() {
                let request = GatherArgs {
                    query: args.clone(),
                    requester_id: self.node_id.clone(),
                    hop_count: 0,
                    max_hops: MAX_HOPS,
                    route_path: self.node_id.clone(),
                    visited_nodes: visited,
                    forward_to_peers: true,
                    query_context: HashMap::from([
                        ("origin".to_string(), "portal".to_string()),
                        ("client_id".to_string(), args.client_id.clone()),
                    ]),
                };
                let merged =
                    fan_out(&self.transport, &request, &peers, started + FANOUT_DEADLINE).await;
                results.extend(merged.items);
                contributing.extend(merged.contributing);
            }
        }

        let outcome = QueryOutcome {
            query_id: args.query_id.clone(),
            results: Self::dedup_by_key(results),
            success: true,
            error_message: String::new(),
            timestamp: now_ms(),
            processing_time_ms: elapsed_ms(started),
            from_cache: false,
            contributing_nodes: contributing,
        };
        self.cache.insert(outcome.clone());
        tracing::info!(
            query_id = %outcome.query_id,
            kind = args.kind.as_str(),
            results = outcome.results.len(),
            elapsed_ms = outcome.processing_time_ms,
            "query complete"
        );
        outcome
    }

    async fn gather(&self, args: GatherArgs) -> GatherOutcome {
        let started = Instant::now();
        let route_path = append_route(&args.route_path, &self.node_id);
        let mut outcome = GatherOutcome {
            request_id: args.query.query_id.clone(),
            data_items: Vec::new(),
            responder_id: self.node_id.clone(),
            route_path: route_path.clone(),
            contributing_nodes: vec![self.node_id.clone()],
            success: true,
            error_message: String::new(),
            processing_time_ms: 0,
        };

        outcome.data_items = self.lookup_local(&args.query).await;

        if args.forward_to_peers && args.hop_count + 1 < args.max_hops {
            let mut visited = args.visited_nodes.clone();
            if !visited.iter().any(|v| v == &self.node_id) {
                visited.push(self.node_id.clone());
            }
            let peers = router::peers_for_query(&self.topology, &self.node_id, &args.query, &visited);
            if !peers.is_empty() {
                let forward = GatherArgs {
                    query: args.query.clone(),
                    requester_id: self.node_id.clone(),
                    hop_count: args.hop_count + 1,
                    max_hops: args.max_hops,
                    route_path,
                    visited_nodes: visited,
                    forward_to_peers: true,
                    query_context: args.query_context.clone(),
                };
                let merged =
                    fan_out(&self.transport, &forward, &peers, started + FANOUT_DEADLINE).await;
                outcome.data_items.extend(merged.items);
                outcome.contributing_nodes.extend(merged.contributing);
            }
        }

        outcome.processing_time_ms = elapsed_ms(started);
        tracing::debug!(
            request_id = %outcome.request_id,
            route = %outcome.route_path,
            items = outcome.data_items.len(),
            "gather complete"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::Mutex;

    use basecamp_store::seed::seed_store;
    use basecamp_store::Segment;
    use basecamp_types::BasecampError;

    /// In-memory federation: peer calls are dispatched straight to the
    /// target node's engine.
    struct TestNet {
        engines: Mutex<HashMap<NodeId, Arc<Engine<TestNet>>>>,
        dead: Mutex<HashSet<NodeId>>,
    }

    impl TestNet {
        fn engine(&self, node: &str) -> Arc<Engine<TestNet>> {
            self.engines.lock().unwrap().get(node).cloned().unwrap()
        }

        fn kill(&self, node: &str) {
            self.dead.lock().unwrap().insert(node.to_string());
        }
    }

    impl PeerTransport for TestNet {
        async fn gather(
            &self,
            peer: NodeId,
            request: GatherArgs,
        ) -> Result<GatherOutcome, BasecampError> {
            if self.dead.lock().unwrap().contains(&peer) {
                return Err(BasecampError::PeerUnreachable {
                    peer,
                    detail: "connection refused".to_string(),
                });
            }
            let engine = self
                .engines
                .lock()
                .unwrap()
                .get(&peer)
                .cloned()
                .ok_or_else(|| BasecampError::UnknownPeer(peer.clone()))?;
            // Boxed so the recursive gather-through-transport future has a
            // finite type.
            let reply: Pin<Box<dyn Future<Output = GatherOutcome> + Send>> =
                Box::pin(async move { engine.gather(request).await });
            Ok(reply.await)
        }
    }

    fn topology() -> Arc<Topology> {
        Arc::new(
            serde_json::from_str(
                r#"{
                    "portal": "A",
                    "shared_memory_key": "engine_shm",
                    "cache_size": 4,
                    "cache_ttl_seconds": 30,
                    "nodes": {
                        "A": { "data_range": [1, 100], "port": 50051, "computer": 1,
                               "connects_to": ["B", "C"] },
                        "B": { "data_range": [101, 200], "port": 50052, "computer": 1,
                               "connects_to": ["A", "C"] },
                        "C": { "data_range": [201, 300], "port": 50053, "computer": 1,
                               "connects_to": ["A", "B"] }
                    }
                }"#,
            )
            .unwrap(),
        )
    }

    async fn build_net(prefix: &str) -> Arc<TestNet> {
        let topology = topology();
        let net = Arc::new(TestNet {
            engines: Mutex::new(HashMap::new()),
            dead: Mutex::new(HashSet::new()),
        });
        for (id, spec) in &topology.nodes {
            let segment = Segment::reset(&format!("{prefix}_{id}"));
            let store = LocalStore::attach(id.clone(), spec.data_range, segment);
            seed_store(&store).await;
            let engine = Arc::new(Engine::new(
                id.clone(),
                Arc::clone(&topology),
                store,
                Arc::clone(&net),
            ));
            net.engines.lock().unwrap().insert(id.clone(), engine);
        }
        net
    }

    fn exact(query_id: &str, key: i32) -> QueryArgs {
        QueryArgs {
            query_id: query_id.to_string(),
            client_id: "client-1".to_string(),
            kind: QueryKind::Exact,
            key,
            range_start: 0,
            range_end: 0,
            string_param: String::new(),
        }
    }

    fn range(query_id: &str, start: i32, end: i32) -> QueryArgs {
        QueryArgs {
            query_id: query_id.to_string(),
            client_id: "client-1".to_string(),
            kind: QueryKind::Range,
            key: 0,
            range_start: start,
            range_end: end,
            string_param: String::new(),
        }
    }

    fn all(query_id: &str) -> QueryArgs {
        QueryArgs {
            query_id: query_id.to_string(),
            client_id: "client-1".to_string(),
            kind: QueryKind::All,
            key: 0,
            range_start: 0,
            range_end: 0,
            string_param: String::new(),
        }
    }

    fn write(query_id: &str, key: i32, value: &str) -> QueryArgs {
        QueryArgs {
            query_id: query_id.to_string(),
            client_id: "client-1".to_string(),
            kind: QueryKind::Write,
            key,
            range_start: 0,
            range_end: 0,
            string_param: value.to_string(),
        }
    }

    #[tokio::test]
    async fn exact_local_key_and_cache_replay() {
        let net = build_net("eng_s1").await;
        let portal = net.engine("A");

        let first = portal.query(exact("q1", 42)).await;
        assert!(first.success);
        assert!(!first.from_cache);
        assert_eq!(first.results.len(), 1);
        assert_eq!(first.results[0].key, 42);
        assert_eq!(first.results[0].source_node, "A");

        let replay = portal.query(exact("q1", 42)).await;
        assert!(replay.from_cache);
        assert_eq!(replay.results, first.results);
    }

    #[tokio::test]
    async fn exact_remote_key_reaches_owner() {
        let net = build_net("eng_s2").await;
        let outcome = net.engine("A").query(exact("q2", 175)).await;

        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].key, 175);
        assert_eq!(outcome.results[0].source_node, "B");
        assert!(outcome.contributing_nodes.contains(&"B".to_string()));
    }

    #[tokio::test]
    async fn range_query_spans_three_nodes() {
        let net = build_net("eng_s3").await;
        let outcome = net.engine("A").query(range("q3", 95, 205)).await;

        assert!(outcome.success);
        let mut keys: Vec<i32> = outcome.results.iter().map(|i| i.key).collect();
        keys.sort_unstable();
        assert_eq!(keys, (95..=205).collect::<Vec<_>>());
        for node in ["A", "B", "C"] {
            assert!(outcome.contributing_nodes.contains(&node.to_string()));
        }
    }

    #[tokio::test]
    async fn all_query_covers_every_range_once() {
        let net = build_net("eng_s4").await;
        let outcome = net.engine("A").query(all("q4")).await;

        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 300);
        let keys: HashSet<i32> = outcome.results.iter().map(|i| i.key).collect();
        assert_eq!(keys, (1..=300).collect::<HashSet<_>>());
        let contributing: HashSet<&str> = outcome
            .contributing_nodes
            .iter()
            .map(|n| n.as_str())
            .collect();
        assert_eq!(contributing, HashSet::from(["A", "B", "C"]));
    }

    #[tokio::test]
    async fn write_then_read_observes_the_write() {
        let net = build_net("eng_s5").await;
        let portal = net.engine("A");

        let written = portal.query(write("q5", 42, "hello")).await;
        assert!(written.success);
        assert_eq!(written.results.len(), 1);
        assert_eq!(written.results[0].key, 42);
        assert_eq!(written.results[0].source_node, "A");
        assert_eq!(
            written.results[0].value,
            DataValue::String("hello".to_string())
        );

        let read = portal.query(exact("q5-read", 42)).await;
        assert_eq!(
            read.results[0].value,
            DataValue::String("hello".to_string())
        );
    }

    #[tokio::test]
    async fn write_routes_to_the_remote_owner() {
        let net = build_net("eng_write_remote").await;
        let portal = net.engine("A");

        let written = portal.query(write("q5r", 250, "remote")).await;
        assert!(written.success);
        assert_eq!(written.results.len(), 1);
        assert_eq!(written.results[0].source_node, "C");

        let read = portal.query(exact("q5r-read", 250)).await;
        assert_eq!(
            read.results[0].value,
            DataValue::String("remote".to_string())
        );
    }

    #[tokio::test]
    async fn dead_peer_yields_partial_results_without_error() {
        let net = build_net("eng_s6").await;
        net.kill("C");

        let outcome = net.engine("A").query(all("q6")).await;
        assert!(outcome.success);
        assert!(outcome.error_message.is_empty());
        assert_eq!(outcome.results.len(), 200);
        let contributing: HashSet<&str> = outcome
            .contributing_nodes
            .iter()
            .map(|n| n.as_str())
            .collect();
        assert!(contributing.contains("A"));
        assert!(contributing.contains("B"));
        assert!(!contributing.contains("C"));
    }

    #[tokio::test]
    async fn non_portal_rejects_queries_in_band() {
        let net = build_net("eng_portal_guard").await;
        let outcome = net.engine("B").query(exact("q7", 42)).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error_message, NOT_PORTAL_ERROR);
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn cache_aliases_on_query_id_alone() {
        let net = build_net("eng_alias").await;
        let portal = net.engine("A");

        let first = portal.query(exact("q8", 42)).await;
        // A semantically different query with the same id is served the
        // cached payload.
        let aliased = portal.query(exact("q8", 99)).await;
        assert!(aliased.from_cache);
        assert_eq!(aliased.results, first.results);
    }

    #[tokio::test]
    async fn gather_stops_at_the_hop_limit() {
        let net = build_net("eng_hops").await;
        let request = GatherArgs {
            query: all("q9"),
            requester_id: "A".to_string(),
            hop_count: 2,
            max_hops: MAX_HOPS,
            route_path: "A".to_string(),
            visited_nodes: vec!["A".to_string()],
            forward_to_peers: true,
            query_context: HashMap::new(),
        };

        let outcome = net.engine("B").gather(request).await;
        assert!(outcome.success);
        // hop_count + 1 == max_hops: local data only, no forwarding to C.
        assert_eq!(outcome.data_items.len(), 100);
        assert_eq!(outcome.contributing_nodes, vec!["B"]);
    }

    #[tokio::test]
    async fn gather_forwards_and_records_the_route() {
        let net = build_net("eng_route").await;
        let request = GatherArgs {
            query: all("q10"),
            requester_id: "A".to_string(),
            hop_count: 0,
            max_hops: MAX_HOPS,
            route_path: "A".to_string(),
            visited_nodes: vec!["A".to_string()],
            forward_to_peers: true,
            query_context: HashMap::new(),
        };

        let outcome = net.engine("B").gather(request).await;
        assert!(outcome.success);
        assert_eq!(outcome.route_path, "A->B");
        assert_eq!(outcome.data_items.len(), 200);
        assert_eq!(outcome.contributing_nodes, vec!["B", "C"]);

        // No node repeats along any route.
        let hops: Vec<&str> = outcome.route_path.split("->").collect();
        let unique: HashSet<&str> = hops.iter().copied().collect();
        assert_eq!(hops.len(), unique.len());
    }

    #[tokio::test]
    async fn gather_without_forwarding_stays_local() {
        let net = build_net("eng_no_forward").await;
        let request = GatherArgs {
            query: all("q11"),
            requester_id: "A".to_string(),
            hop_count: 0,
            max_hops: MAX_HOPS,
            route_path: "A".to_string(),
            visited_nodes: vec!["A".to_string()],
            forward_to_peers: false,
            query_context: HashMap::new(),
        };

        let outcome = net.engine("B").gather(request).await;
        assert_eq!(outcome.data_items.len(), 100);
        assert_eq!(outcome.contributing_nodes, vec!["B"]);
    }

    #[tokio::test]
    async fn returned_items_all_fall_in_contributing_ranges() {
        let net = build_net("eng_inv3").await;
        let topology = topology();
        let outcome = net.engine("A").query(range("q12", 50, 250)).await;

        for item in &outcome.results {
            let owner = topology
                .nodes
                .iter()
                .find(|(_, spec)| spec.data_range.contains(item.key))
                .map(|(id, _)| id.clone())
                .expect("every key belongs to a node");
            assert!(outcome.contributing_nodes.contains(&owner));
        }
    }
}
