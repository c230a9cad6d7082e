//! DP query client: unary, server-streaming, and cursor-driven bidirectional queries, plus PV
//! metadata discovery (`spec.md` §4.G).

use std::time::Duration;

use tonic::transport::Channel;

use crate::error::{IngestError, Result};
use crate::model::Timestamp;

use super::pb;

/// A connected DP query client.
pub struct QueryClient {
    inner: pb::dp_query_service_client::DpQueryServiceClient<Channel>,
    call_deadline: Duration,
    stream_deadline: Duration,
}

/// One decoded-or-raw time series bucket returned by a query, before timestamp/value decode.
pub type RawBucket = pb::DataBucket;

impl QueryClient {
    /// Connects to `server` (`host:port`).
    ///
    /// # Errors
    /// Returns [`IngestError::Connectivity`] if the channel cannot be established.
    pub async fn connect(server: &str, call_deadline_ms: u64, stream_deadline_ms: u64) -> Result<Self> {
        let uri = format!("http://{server}");
        let endpoint = Channel::from_shared(uri).map_err(|e| IngestError::InvalidConfig(e.to_string()))?;
        let channel = endpoint.connect().await.map_err(|source| IngestError::Connectivity {
            server: server.to_string(),
            source,
        })?;
        Ok(Self {
            inner: pb::dp_query_service_client::DpQueryServiceClient::new(channel),
            call_deadline: Duration::from_millis(call_deadline_ms),
            stream_deadline: Duration::from_millis(stream_deadline_ms),
        })
    }

    fn build_spec(begin: Timestamp, end: Timestamp, pv_names: &[String], use_serialized: bool) -> pb::QuerySpec {
        pb::QuerySpec {
            begin_time: Some(super::wire::timestamp_to_pb(&begin)),
            end_time: Some(super::wire::timestamp_to_pb(&end)),
            pv_names: pv_names.to_vec(),
            use_serialized,
        }
    }

    /// Unary query: one response containing all matching buckets (`spec.md` §4.G shape 1).
    ///
    /// # Errors
    /// Returns an error on timeout, transport failure, or a structured exceptional result.
    pub async fn query_data(
        &mut self,
        begin: Timestamp,
        end: Timestamp,
        pv_names: &[String],
        use_serialized: bool,
    ) -> Result<Vec<RawBucket>> {
        let request = pb::QueryDataRequest {
            request: Some(pb::query_data_request::Request::QuerySpec(Self::build_spec(
                begin,
                end,
                pv_names,
                use_serialized,
            ))),
        };

        let response = tokio::time::timeout(self.call_deadline, self.inner.query_data(request))
            .await
            .map_err(|_| IngestError::Watchdog { elapsed_secs: self.call_deadline.as_secs(), completed: 0, total: 1 })?
            .map_err(IngestError::from)?
            .into_inner();

        match response.result {
            Some(pb::query_data_response::Result::QueryData(data)) => Ok(data.data_buckets),
            Some(pb::query_data_response::Result::ExceptionalResult(e)) => Err(IngestError::Exceptional {
                status: super::wire::exceptional_status_from_pb(e.status),
                message: e.message,
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Server-streaming query: reads the stream to completion, concatenating buckets
    /// (`spec.md` §4.G shape 2).
    ///
    /// # Errors
    /// Returns an error on timeout or transport failure.
    pub async fn query_data_stream(
        &mut self,
        begin: Timestamp,
        end: Timestamp,
        pv_names: &[String],
        use_serialized: bool,
    ) -> Result<Vec<RawBucket>> {
        let request = pb::QueryDataRequest {
            request: Some(pb::query_data_request::Request::QuerySpec(Self::build_spec(
                begin,
                end,
                pv_names,
                use_serialized,
            ))),
        };

        let mut stream = tokio::time::timeout(self.stream_deadline, self.inner.query_data_stream(request))
            .await
            .map_err(|_| IngestError::Watchdog { elapsed_secs: self.stream_deadline.as_secs(), completed: 0, total: 1 })?
            .map_err(IngestError::from)?
            .into_inner();

        let mut buckets = Vec::new();
        while let Some(response) = stream.message().await.map_err(IngestError::from)? {
            match response.result {
                Some(pb::query_data_response::Result::QueryData(data)) => buckets.extend(data.data_buckets),
                Some(pb::query_data_response::Result::ExceptionalResult(e)) => {
                    return Err(IngestError::Exceptional {
                        status: super::wire::exceptional_status_from_pb(e.status),
                        message: e.message,
                    })
                }
                None => {}
            }
        }
        Ok(buckets)
    }

    /// Bidirectional cursor query: sends the initial spec, then issues `CURSOR_NEXT` until the
    /// server closes the stream, pulling pages under flow control (`spec.md` §4.G shape 3).
    ///
    /// # Errors
    /// Returns an error on timeout or transport failure.
    pub async fn query_data_bidi_stream(
        &mut self,
        begin: Timestamp,
        end: Timestamp,
        pv_names: &[String],
        use_serialized: bool,
    ) -> Result<Vec<RawBucket>> {
        let spec = Self::build_spec(begin, end, pv_names, use_serialized);
        let requests = vec![
            pb::QueryDataRequest { request: Some(pb::query_data_request::Request::QuerySpec(spec)) },
            pb::QueryDataRequest {
                request: Some(pb::query_data_request::Request::CursorOp(pb::CursorOperation {
                    r#type: pb::cursor_operation::CursorOperationType::CursorNext as i32,
                })),
            },
        ];
        let outbound = tokio_stream::iter(requests);

        let mut inbound = tokio::time::timeout(self.stream_deadline, self.inner.query_data_bidi_stream(outbound))
            .await
            .map_err(|_| IngestError::Watchdog { elapsed_secs: self.stream_deadline.as_secs(), completed: 0, total: 1 })?
            .map_err(IngestError::from)?
            .into_inner();

        let mut buckets = Vec::new();
        while let Some(response) = inbound.message().await.map_err(IngestError::from)? {
            match response.result {
                Some(pb::query_data_response::Result::QueryData(data)) => buckets.extend(data.data_buckets),
                Some(pb::query_data_response::Result::ExceptionalResult(e)) => {
                    return Err(IngestError::Exceptional {
                        status: super::wire::exceptional_status_from_pb(e.status),
                        message: e.message,
                    })
                }
                None => {}
            }
        }
        Ok(buckets)
    }

    /// Looks up PV metadata for an explicit name list, used by the decode CLI to validate
    /// arguments before issuing a query.
    ///
    /// # Errors
    /// Returns an error on timeout, transport failure, or a structured exceptional result.
    pub async fn query_pv_metadata_by_names(&mut self, pv_names: &[String]) -> Result<Vec<pb::PvInfo>> {
        self.query_pv_metadata(pb::query_pv_metadata_request::Selector::Names(pb::PvNameList {
            names: pv_names.to_vec(),
        }))
        .await
    }

    /// Discovers PVs matching a glob/regex-like `pattern`, so callers can enumerate PV sets
    /// without typing exact names (`spec.md` §4.G).
    ///
    /// # Errors
    /// Returns an error on timeout, transport failure, or a structured exceptional result.
    pub async fn query_pv_metadata_by_pattern(&mut self, pattern: &str) -> Result<Vec<pb::PvInfo>> {
        self.query_pv_metadata(pb::query_pv_metadata_request::Selector::Pattern(pb::PvNamePattern {
            pattern: pattern.to_string(),
        }))
        .await
    }

    async fn query_pv_metadata(&mut self, selector: pb::query_pv_metadata_request::Selector) -> Result<Vec<pb::PvInfo>> {
        let request = pb::QueryPvMetadataRequest { selector: Some(selector) };
        let response = tokio::time::timeout(self.call_deadline, self.inner.query_pv_metadata(request))
            .await
            .map_err(|_| IngestError::Watchdog { elapsed_secs: self.call_deadline.as_secs(), completed: 0, total: 1 })?
            .map_err(IngestError::from)?
            .into_inner();

        match response.result {
            Some(pb::query_pv_metadata_response::Result::MetadataResult(r)) => Ok(r.pv_infos),
            Some(pb::query_pv_metadata_response::Result::ExceptionalResult(e)) => Err(IngestError::Exceptional {
                status: super::wire::exceptional_status_from_pb(e.status),
                message: e.message,
            }),
            None => Ok(Vec::new()),
        }
    }
}
