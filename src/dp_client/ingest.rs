//! DP ingestion client: provider registration, unary/streaming/bidi ingest, and the bounded
//! in-flight window that provides backpressure (`spec.md` §4.F).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;

use crate::error::{IngestError, Result};
use crate::model::IngestRecord;

use super::pb;
use super::wire;

/// Inter-batch pause in streaming mode; zero within a batch (`spec.md` §4.F, §9).
const INTER_BATCH_PAUSE: Duration = Duration::from_millis(200);

/// Outcome of acking one record, without treating a per-record rejection as a transport
/// failure — per `spec.md` §4.F's retry policy, rejections are counted, not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// The server accepted the record.
    Ack,
    /// The server rejected the record (malformed, policy, etc).
    Rejected,
    /// The server encountered an internal error processing the record.
    Error,
}

impl AckStatus {
    fn from_pb(raw: i32) -> Self {
        match pb::IngestionRequestStatus::try_from(raw).unwrap_or(pb::IngestionRequestStatus::ErrorStatus) {
            pb::IngestionRequestStatus::Ack => Self::Ack,
            pb::IngestionRequestStatus::Rejected => Self::Rejected,
            pb::IngestionRequestStatus::ErrorStatus => Self::Error,
        }
    }
}

/// One record's ack, carrying enough to attribute a rejection back to its `clientRequestId`.
#[derive(Debug, Clone)]
pub struct RecordAck {
    /// The record this ack corresponds to.
    pub client_request_id: String,
    /// Accept/reject/error status.
    pub status: AckStatus,
    /// Server-supplied detail, if any.
    pub message: Option<String>,
}

/// Aggregate outcome of a streamed batch: how many records were acked vs. rejected, plus the
/// individual acks for per-record accounting.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Records the server acknowledged.
    pub acked: u64,
    /// Records the server rejected or errored.
    pub rejected: u64,
    /// Per-record detail, in send order where the server preserved it.
    pub acks: Vec<RecordAck>,
}

impl BatchOutcome {
    fn merge(&mut self, other: BatchOutcome) {
        self.acked += other.acked;
        self.rejected += other.rejected;
        self.acks.extend(other.acks);
    }
}

/// A connected DP ingestion client.
///
/// Holds a bounded [`Semaphore`] that caps the number of batches (or unary calls) in flight at
/// once; callers block on `submit` when the window is full, which is the sole memory-bounding
/// throttle described in `spec.md` §4.F.
#[derive(Clone)]
pub struct IngestClient {
    inner: pb::dp_ingestion_service_client::DpIngestionServiceClient<Channel>,
    call_deadline: Duration,
    stream_deadline: Duration,
    inflight: Arc<Semaphore>,
}

impl IngestClient {
    /// Connects to `server` (`host:port`), with `max_inflight` bounding concurrent batches.
    ///
    /// # Errors
    /// Returns [`IngestError::Connectivity`] if the channel cannot be established.
    pub async fn connect(
        server: &str,
        call_deadline_ms: u64,
        stream_deadline_ms: u64,
        max_inflight: usize,
    ) -> Result<Self> {
        let uri = format!("http://{server}");
        let endpoint = Channel::from_shared(uri).map_err(|e| IngestError::InvalidConfig(e.to_string()))?;
        let channel = endpoint.connect().await.map_err(|source| IngestError::Connectivity {
            server: server.to_string(),
            source,
        })?;
        Ok(Self {
            inner: pb::dp_ingestion_service_client::DpIngestionServiceClient::new(channel),
            call_deadline: Duration::from_millis(call_deadline_ms),
            stream_deadline: Duration::from_millis(stream_deadline_ms),
            inflight: Arc::new(Semaphore::new(max_inflight.max(1))),
        })
    }

    /// Registers this process as a data provider; fatal on failure, per `spec.md` §4.F.
    ///
    /// # Errors
    /// Returns [`IngestError::RegistrationFailed`] on timeout, transport error, or a rejected
    /// registration.
    pub async fn register_provider(
        &mut self,
        name: &str,
        attributes: &BTreeMap<String, String>,
        tags: &[String],
        description: &str,
    ) -> Result<String> {
        let request = pb::RegisterProviderRequest {
            provider_name: name.to_string(),
            attributes: wire::attributes_to_pb(attributes),
            tags: tags.to_vec(),
            description: description.to_string(),
        };

        let response = tokio::time::timeout(self.call_deadline, self.inner.register_provider(request))
            .await
            .map_err(|_| IngestError::RegistrationFailed("timed out".to_string()))?
            .map_err(IngestError::from)?
            .into_inner();

        match response.result {
            Some(pb::register_provider_response::Result::ProviderId(id)) => Ok(id),
            Some(pb::register_provider_response::Result::ExceptionalResult(e)) => {
                Err(IngestError::RegistrationFailed(e.message))
            }
            None => Err(IngestError::RegistrationFailed("empty response".to_string())),
        }
    }

    /// Sends one record as a unary call. Returns the ack status rather than an `Err` for a
    /// rejection — only transport/timeout failures are errors (`spec.md` §4.F retry policy).
    ///
    /// # Errors
    /// Returns an error on timeout, transport failure, or column serialization failure.
    pub async fn ingest_unary(&mut self, record: &IngestRecord, use_serialized: bool) -> Result<RecordAck> {
        let request = wire::ingest_record_to_pb(record, use_serialized)?;
        let _permit = Arc::clone(&self.inflight).acquire_owned().await.map_err(|_| {
            IngestError::Config("ingest semaphore closed unexpectedly".to_string())
        })?;

        let response = tokio::time::timeout(self.call_deadline, self.inner.ingest_data(request))
            .await
            .map_err(|_| IngestError::Watchdog { elapsed_secs: self.call_deadline.as_secs(), completed: 0, total: 1 })?
            .map_err(IngestError::from)?
            .into_inner();

        Ok(RecordAck {
            client_request_id: response.client_request_id,
            status: AckStatus::from_pb(response.status),
            message: response.exceptional_result.map(|e| e.message),
        })
    }

    /// Sends `records` as one client-streaming batch (within-batch pause is zero, per
    /// `spec.md` §4.F). The in-flight semaphore is held for the duration of the whole batch.
    ///
    /// # Errors
    /// Returns an error on timeout, transport failure, or column serialization failure.
    pub async fn ingest_batch_stream(&mut self, records: &[IngestRecord], use_serialized: bool) -> Result<BatchOutcome> {
        let _permit = Arc::clone(&self.inflight).acquire_owned().await.map_err(|_| {
            IngestError::Config("ingest semaphore closed unexpectedly".to_string())
        })?;

        let (tx, rx) = mpsc::channel(records.len().max(1));
        for record in records {
            let wire_request = wire::ingest_record_to_pb(record, use_serialized)?;
            tx.send(wire_request).await.map_err(|_| {
                IngestError::Config("ingest stream receiver dropped early".to_string())
            })?;
        }
        drop(tx);

        let outbound = ReceiverStream::new(rx);
        let response = tokio::time::timeout(self.stream_deadline, self.inner.ingest_data_stream(outbound))
            .await
            .map_err(|_| IngestError::Watchdog {
                elapsed_secs: self.stream_deadline.as_secs(),
                completed: 0,
                total: records.len(),
            })?
            .map_err(IngestError::from)?
            .into_inner();

        Ok(BatchOutcome {
            acked: response.requests_acked,
            rejected: response.requests_rejected,
            acks: response
                .responses
                .into_iter()
                .map(|r| RecordAck {
                    client_request_id: r.client_request_id,
                    status: AckStatus::from_pb(r.status),
                    message: r.exceptional_result.map(|e| e.message),
                })
                .collect(),
        })
    }

    /// Sends `records` in batches of `batch_size`, pausing `INTER_BATCH_PAUSE` between batches
    /// (not within one). This is the entry point `--streaming` mode uses per file.
    ///
    /// # Errors
    /// Returns an error on the first batch that fails at the transport level; the caller marks
    /// the containing file failed without retrying (`spec.md` §4.F).
    pub async fn ingest_streaming(
        &mut self,
        records: &[IngestRecord],
        batch_size: usize,
        use_serialized: bool,
    ) -> Result<BatchOutcome> {
        let batch_size = batch_size.max(1);
        let mut total = BatchOutcome::default();
        let mut chunks = records.chunks(batch_size).peekable();
        while let Some(chunk) = chunks.next() {
            let outcome = self.ingest_batch_stream(chunk, use_serialized).await?;
            total.merge(outcome);
            if chunks.peek().is_some() {
                tokio::time::sleep(INTER_BATCH_PAUSE).await;
            }
        }
        Ok(total)
    }

    /// Opens a bidirectional session: sends every record then drains the interleaved ack
    /// stream until the server closes it (`spec.md` §4.F).
    ///
    /// # Errors
    /// Returns an error on timeout, transport failure, or column serialization failure.
    pub async fn ingest_bidi_stream(&mut self, records: &[IngestRecord], use_serialized: bool) -> Result<BatchOutcome> {
        let _permit = Arc::clone(&self.inflight).acquire_owned().await.map_err(|_| {
            IngestError::Config("ingest semaphore closed unexpectedly".to_string())
        })?;

        let (tx, rx) = mpsc::channel(records.len().max(1));
        for record in records {
            tx.send(wire::ingest_record_to_pb(record, use_serialized)?).await.map_err(|_| {
                IngestError::Config("ingest bidi stream receiver dropped early".to_string())
            })?;
        }
        drop(tx);

        let outbound = ReceiverStream::new(rx);
        let mut inbound = tokio::time::timeout(self.stream_deadline, self.inner.ingest_data_bidi_stream(outbound))
            .await
            .map_err(|_| IngestError::Watchdog {
                elapsed_secs: self.stream_deadline.as_secs(),
                completed: 0,
                total: records.len(),
            })?
            .map_err(IngestError::from)?
            .into_inner();

        let mut outcome = BatchOutcome::default();
        while let Some(response) = inbound.message().await.map_err(IngestError::from)? {
            let status = AckStatus::from_pb(response.status);
            match status {
                AckStatus::Ack => outcome.acked += 1,
                AckStatus::Rejected | AckStatus::Error => outcome.rejected += 1,
            }
            outcome.acks.push(RecordAck {
                client_request_id: response.client_request_id,
                status,
                message: response.exceptional_result.map(|e| e.message),
            });
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_status_maps_from_wire_enum() {
        assert_eq!(AckStatus::from_pb(pb::IngestionRequestStatus::Ack as i32), AckStatus::Ack);
        assert_eq!(AckStatus::from_pb(pb::IngestionRequestStatus::Rejected as i32), AckStatus::Rejected);
        assert_eq!(AckStatus::from_pb(999), AckStatus::Error);
    }

    #[test]
    fn batch_outcome_merge_sums_counts() {
        let mut total = BatchOutcome::default();
        total.merge(BatchOutcome { acked: 3, rejected: 1, acks: vec![] });
        total.merge(BatchOutcome { acked: 2, rejected: 0, acks: vec![] });
        assert_eq!(total.acked, 5);
        assert_eq!(total.rejected, 1);
    }
}
