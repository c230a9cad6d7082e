//! Query-response decoding: reconstructs timestamp/value pairs from a `DataBucket`, pairs and
//! truncates them, and computes finite-only statistics (`spec.md` §4.G).

use crate::dp_client::pb;
use crate::dp_client::wire;
use crate::error::Result;
use crate::model::{DataColumn, Timestamp};

/// One PV's decoded series: timestamps paired with projected `f64` values, truncated to
/// `min(len(timestamps), len(values))` per `spec.md` §4.G.
#[derive(Debug, Clone)]
pub struct DecodedPvSeries {
    /// The PV this series belongs to.
    pub pv_name: String,
    /// Reconstructed timestamps, one per value.
    pub timestamps: Vec<Timestamp>,
    /// Projected `f64` values (NaN/±∞ preserved where the source carried them).
    pub values: Vec<f64>,
}

/// Finite-only statistics over a [`DecodedPvSeries`] (`spec.md` §4.G: "NaN/∞ excluded").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    /// Number of finite samples the statistics were computed over.
    pub count: usize,
    /// Minimum finite value, or `NaN` if there were none.
    pub min: f64,
    /// Maximum finite value, or `NaN` if there were none.
    pub max: f64,
    /// Mean of finite values, or `NaN` if there were none.
    pub mean: f64,
}

impl DecodedPvSeries {
    /// Computes [`SeriesSummary`] over this series' finite values.
    #[must_use]
    pub fn summarize(&self) -> SeriesSummary {
        let finite: Vec<f64> = self.values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return SeriesSummary { count: 0, min: f64::NAN, max: f64::NAN, mean: f64::NAN };
        }
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        SeriesSummary { count: finite.len(), min, max, mean }
    }

    /// Number of paired (timestamp, value) samples in this series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if this series has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decodes one `DataBucket` into a [`DecodedPvSeries`].
///
/// A `SerializedDataColumn` payload is always deserialized (never left opaque) per the Open
/// Question resolution recorded in `DESIGN.md`: the stubbed "return empty" variant from one of
/// the source decode paths is not implemented here.
///
/// # Errors
/// Returns an error if a serialized column payload cannot be decoded.
pub fn decode_bucket(bucket: &pb::DataBucket) -> Result<DecodedPvSeries> {
    let timestamps = bucket
        .timestamps
        .as_ref()
        .map(wire::data_timestamps_from_pb)
        .map(|dt| dt.extract_all())
        .unwrap_or_default();

    let column: DataColumn = match &bucket.payload {
        Some(pb::data_bucket::Payload::Column(c)) => wire::data_column_from_pb(c),
        Some(pb::data_bucket::Payload::SerializedColumn(s)) => {
            crate::model::deserialize_data_column(&wire::serialized_column_from_pb(s))?
        }
        None => DataColumn { name: bucket.pv_name.clone(), values: Vec::new() },
    };

    let values = column.to_f64_vec();
    let n = timestamps.len().min(values.len());

    Ok(DecodedPvSeries {
        pv_name: bucket.pv_name.clone(),
        timestamps: timestamps.into_iter().take(n).collect(),
        values: values.into_iter().take(n).collect(),
    })
}

/// Decodes every bucket in `buckets`, skipping any that fail to decode and logging a warning
/// for each (consistent with the "smallest scope that can still make progress" rule applied to
/// the decode path).
#[must_use]
pub fn decode_buckets(buckets: &[pb::DataBucket]) -> Vec<DecodedPvSeries> {
    buckets
        .iter()
        .filter_map(|bucket| match decode_bucket(bucket) {
            Ok(series) => Some(series),
            Err(e) => {
                tracing::warn!(pv_name = %bucket.pv_name, error = %e, "failed to decode bucket");
                None
            }
        })
        .collect()
}
