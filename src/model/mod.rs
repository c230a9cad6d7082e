//! The shared data model: timestamps, tagged values, signal identity, and ingest records
//! (`spec.md` §3).

mod cache;
mod signal;
mod timestamp;
mod value;

pub use cache::ProcessedFileCache;
pub use signal::{
    next_client_request_id, EventMetadata, ProviderRegistration, Signal, SignalFileMetadata,
    SignalInfo, ValueQualityCounts,
};
pub use timestamp::{
    infer_data_timestamps, DataTimestamps, SamplingClock, Timestamp, TimestampList,
    DEFAULT_PERIOD_NANOS, MAX_PLAUSIBLE_PERIOD_NANOS, MIN_PLAUSIBLE_PERIOD_NANOS,
};
pub use value::{
    deserialize_data_column, serialize_data_column, ColumnPayload, DataArray, DataColumn,
    DataValue, ExceptionalResult, ExceptionalStatus, Image, ImageFileType, SerializedDataColumn,
    StatusedValue, Structure, StructureField, ValueStatus,
};

pub use signal::IngestRecord;
