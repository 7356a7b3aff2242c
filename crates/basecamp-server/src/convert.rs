use basecamp_proto::v1 as proto;
use basecamp_store::codec::{item_from_proto, item_to_proto};
use basecamp_types::{
    GatherArgs, GatherOutcome, QueryArgs, QueryKind, QueryOutcome,
};

pub fn query_kind_from_proto(raw: i32) -> QueryKind {
    match proto::QueryType::try_from(raw).unwrap_or(proto::QueryType::Unspecified) {
        proto::QueryType::Range => QueryKind::Range,
        proto::QueryType::All => QueryKind::All,
        proto::QueryType::Write => QueryKind::Write,
        proto::QueryType::Exact | proto::QueryType::Unspecified => QueryKind::Exact,
    }
}

pub fn query_kind_to_proto(kind: QueryKind) -> i32 {
    let mapped = match kind {
        QueryKind::Exact => proto::QueryType::Exact,
        QueryKind::Range => proto::QueryType::Range,
        QueryKind::All => proto::QueryType::All,
        QueryKind::Write => proto::QueryType::Write,
    };
    mapped as i32
}

pub fn query_args_from_proto(req: proto::QueryRequest) -> QueryArgs {
    QueryArgs {
        query_id: req.query_id,
        client_id: req.client_id,
        kind: query_kind_from_proto(req.query_type),
        key: req.key,
        range_start: req.range_start,
        range_end: req.range_end,
        string_param: req.string_param,
    }
}

pub fn query_outcome_to_proto(outcome: QueryOutcome) -> proto::QueryResponse {
    proto::QueryResponse {
        query_id: outcome.query_id,
        results: outcome.results.iter().map(item_to_proto).collect(),
        success: outcome.success,
        error_message: outcome.error_message,
        timestamp: outcome.timestamp,
        processing_time_ms: outcome.processing_time_ms,
        from_cache: outcome.from_cache,
        contributing_nodes: outcome.contributing_nodes,
    }
}

pub fn gather_args_from_proto(req: proto::DataRequest) -> GatherArgs {
    GatherArgs {
        query: QueryArgs {
            query_id: req.query_id,
            client_id: req.client_id,
            kind: query_kind_from_proto(req.query_type),
            key: req.key,
            range_start: req.range_start,
            range_end: req.range_end,
            string_param: req.string_param,
        },
        requester_id: req.requester_id,
        hop_count: req.hop_count,
        max_hops: req.max_hops,
        route_path: req.route_path,
        visited_nodes: req.visited_nodes,
        forward_to_peers: req.forward_to_peers,
        query_context: req.query_context.into_iter().collect(),
    }
}

pub fn gather_args_to_proto(args: GatherArgs) -> proto::DataRequest {
    proto::DataRequest {
        query_id: args.query.query_id,
        client_id: args.query.client_id,
        query_type: query_kind_to_proto(args.query.kind),
        key: args.query.key,
        range_start: args.query.range_start,
        range_end: args.query.range_end,
        string_param: args.query.string_param,
        requester_id: args.requester_id,
        hop_count: args.hop_count,
        max_hops: args.max_hops,
        route_path: args.route_path,
        visited_nodes: args.visited_nodes,
        forward_to_peers: args.forward_to_peers,
        query_context: args.query_context.into_iter().collect(),
    }
}

/// Items that fail to decode (no value variant) are logged and omitted,
/// matching the treatment of undecodable stored entries.
pub fn gather_outcome_from_proto(resp: proto::DataResponse) -> GatherOutcome {
    let data_items = resp
        .data_items
        .into_iter()
        .filter_map(|item| match item_from_proto(item) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(responder = %resp.responder_id, error = %e, "dropping malformed item");
                None
            }
        })
        .collect();
    GatherOutcome {
        request_id: resp.request_id,
        data_items,
        responder_id: resp.responder_id,
        route_path: resp.route_path,
        contributing_nodes: resp.contributing_nodes,
        success: resp.success,
        error_message: resp.error_message,
        processing_time_ms: resp.processing_time_ms,
    }
}

pub fn gather_outcome_to_proto(outcome: GatherOutcome) -> proto::DataResponse {
    proto::DataResponse {
        request_id: outcome.request_id,
        data_items: outcome.data_items.iter().map(item_to_proto).collect(),
        responder_id: outcome.responder_id,
        route_path: outcome.route_path,
        contributing_nodes: outcome.contributing_nodes,
        success: outcome.success,
        error_message: outcome.error_message,
        processing_time_ms: outcome.processing_time_ms,
    }
}
