mod convert;
mod messaging;
mod pool;
mod service;

use std::net::SocketAddr;
use std::sync::Arc;

use tonic_reflection::server::Builder as ReflectionBuilder;

use basecamp_federation::QueryNode;
use basecamp_proto::v1::basecamp_service_server::BasecampServiceServer;

pub use pool::GrpcPeerPool;
pub use service::BasecampServiceImpl;

/// Serve the Basecamp gRPC surface for `node` until shutdown.
pub async fn serve<N: QueryNode>(addr: SocketAddr, node: Arc<N>) -> anyhow::Result<()> {
    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(basecamp_proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .expect("failed to build reflection service");
    tracing::info!(%addr, "gRPC server starting");
    tonic::transport::Server::builder()
        .add_service(BasecampServiceServer::new(BasecampServiceImpl::new(node)))
        .add_service(reflection)
        .serve(addr)
        .await
        .map_err(Into::into)
}
