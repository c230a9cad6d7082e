//! Generated protobuf/tonic types plus the domain↔wire conversion layer, and the ingestion
//! and query clients built on top of them (`spec.md` §4.F, §4.G).

pub mod ingest;
pub mod query;
pub mod wire;

pub use ingest::IngestClient;
pub use query::QueryClient;

/// Generated protobuf/tonic code for `proto/dp.proto`.
#[allow(missing_docs)]
pub mod pb {
    tonic::include_proto!("dp");
}
