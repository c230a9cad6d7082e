//! H5→DP ingestion engine: discovers HDF5 accelerator PV-signal archive files, extracts
//! timestamped signals, converts them to DP ingest requests, and transmits them via gRPC with
//! backpressure, file-level parallelism, and resumability. A secondary query+decode path mirrors
//! ingestion in reverse.

pub mod cli;
pub mod config;
pub mod decode;
pub mod dp_client;
pub mod error;
pub mod hdf5_reader;
pub mod model;
pub mod progress;
pub mod request_builder;
pub mod scanner;
pub mod signal_parser;
pub mod tracing_init;
pub mod worker_pool;

pub use error::{IngestError, Result};
