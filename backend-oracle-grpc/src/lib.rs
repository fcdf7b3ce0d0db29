//! Streaming gRPC transport for the compute-index oracle.
//!
//! Wraps the generated `OracleService` client and adapts its messages into
//! the internal-byte-order records [`spr_core::oracle::Oracle`] expects.
//! TLS is optional per client.

mod backend;
mod client;
mod convert;

/// Generated protobuf/tonic types for the oracle service.
pub mod pb {
    tonic::include_proto!("oracle");
}

pub use client::OracleGrpcClient;
