//! Generated protobuf/gRPC bindings for the Basecamp wire contract.

pub mod v1 {
    tonic::include_proto!("basecamp.v1");
}

/// Compiled descriptor set for gRPC server reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/descriptor.bin"));
