use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use basecamp_federation::QueryNode;
use basecamp_proto::v1 as proto;
use basecamp_proto::v1::basecamp_service_server::BasecampService;
use basecamp_types::{GatherOutcome, QueryOutcome};

use crate::convert;
use crate::messaging::{now_ms, MessagingState};

/// Implements the full Basecamp service: the federated query surface
/// delegated to a [`QueryNode`], plus the in-memory messaging toys.
///
/// Application failures are always returned in-band (`success = false` with
/// an error message) on an OK transport status; transport-level codes are
/// reserved for transport problems.
pub struct BasecampServiceImpl<N> {
    node: Arc<N>,
    messaging: MessagingState,
}

impl<N: QueryNode> BasecampServiceImpl<N> {
    pub fn new(node: Arc<N>) -> Self {
        BasecampServiceImpl {
            node,
            messaging: MessagingState::new(),
        }
    }
}

fn query_failure(query_id: String, error_message: String) -> QueryOutcome {
    QueryOutcome {
        query_id,
        results: Vec::new(),
        success: false,
        error_message,
        timestamp: now_ms(),
        processing_time_ms: 0,
        from_cache: false,
        contributing_nodes: Vec::new(),
    }
}

fn gather_failure(request_id: String, error_message: String) -> GatherOutcome {
    GatherOutcome {
        request_id,
        data_items: Vec::new(),
        responder_id: String::new(),
        route_path: String::new(),
        contributing_nodes: Vec::new(),
        success: false,
        error_message,
        processing_time_ms: 0,
    }
}

#[tonic::async_trait]
impl<N: QueryNode> BasecampService for BasecampServiceImpl<N> {
    async fn query_data(
        &self,
        request: Request<proto::QueryRequest>,
    ) -> Result<Response<proto::QueryResponse>, Status> {
        let req = request.into_inner();
        let query_id = req.query_id.clone();
        let args = convert::query_args_from_proto(req);

        // Run on a separate task so an internal panic surfaces as an
        // in-band failure rather than a transport error.
        let node = Arc::clone(&self.node);
        let outcome = match tokio::spawn(async move { node.query(args).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(query_id = %query_id, error = %e, "query handler failed");
                query_failure(query_id, e.to_string())
            }
        };
        Ok(Response::new(convert::query_outcome_to_proto(outcome)))
    }

    async fn gather_data(
        &self,
        request: Request<proto::DataRequest>,
    ) -> Result<Response<proto::DataResponse>, Status> {
        let req = request.into_inner();
        let request_id = req.query_id.clone();
        let args = convert::gather_args_from_proto(req);

        let node = Arc::clone(&self.node);
        let outcome = match tokio::spawn(async move { node.gather(args).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "gather handler failed");
                gather_failure(request_id, e.to_string())
            }
        };
        Ok(Response::new(convert::gather_outcome_to_proto(outcome)))
    }

    async fn send_message(
        &self,
        request: Request<proto::MessageRequest>,
    ) -> Result<Response<proto::MessageResponse>, Status> {
        let message_id = self.messaging.store_message(request.into_inner());
        Ok(Response::new(proto::MessageResponse {
            success: true,
            message_id,
            timestamp: now_ms(),
            error_message: String::new(),
        }))
    }

    async fn send_multiple_messages(
        &self,
        request: Request<Streaming<proto::MessageRequest>>,
    ) -> Result<Response<proto::BatchResponse>, Status> {
        let mut inbound = request.into_inner();
        let mut response = proto::BatchResponse::default();
        while let Some(message) = inbound.message().await? {
            let id = self.messaging.store_message(message);
            response.success_count += 1;
            response.message_ids.push(id);
        }
        if response.failure_count > 0 {
            response.error_message =
                format!("Failed to store {} messages", response.failure_count);
        }
        Ok(Response::new(response))
    }

    type SubscribeToUpdatesStream = ReceiverStream<Result<proto::UpdateResponse, Status>>;

    async fn subscribe_to_updates(
        &self,
        request: Request<proto::SubscriptionRequest>,
    ) -> Result<Response<Self::SubscribeToUpdatesStream>, Status> {
        let req = request.into_inner();
        self.messaging.record_subscription(&req.subscriber_id, &req.topics);

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for topic in &req.topics {
                let update = proto::UpdateResponse {
                    topic: topic.clone(),
                    content: format!("Subscribed to {topic}"),
                    timestamp: now_ms(),
                };
                if tx.send(Ok(update)).await.is_err() {
                    return;
                }
            }
            // Client disconnect drops the receiver and aborts the loop.
            for round in 0..10 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                for topic in &req.topics {
                    let update = proto::UpdateResponse {
                        topic: topic.clone(),
                        content: format!("Update {round} for {topic}"),
                        timestamp: now_ms(),
                    };
                    if tx.send(Ok(update)).await.is_err() {
                        return;
                    }
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type ChatStream = ReceiverStream<Result<proto::ChatMessage, Status>>;

    async fn chat(
        &self,
        request: Request<Streaming<proto::ChatMessage>>,
    ) -> Result<Response<Self::ChatStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Ok(Some(message)) = inbound.message().await {
                let echo = proto::ChatMessage {
                    sender_id: "server".to_string(),
                    content: format!("Echo: {}", message.content),
                    timestamp: now_ms(),
                };
                if tx.send(Ok(echo)).await.is_err() {
                    break;
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
