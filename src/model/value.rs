//! The `DataValue` tagged union and `DataColumn`/`SerializedDataColumn` container types
//! (`spec.md` §3).

use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Out-of-band status attached to a [`DataValue`], mirroring the DP wire protocol's
/// `DataValue.ValueStatus` nested enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueStatus {
    /// The value is trustworthy.
    Good,
    /// The value carries a device-reported alarm condition.
    Alarm,
    /// The value is stale (the device has not updated it recently).
    Stale,
    /// The value could not be determined.
    Invalid,
}

/// A single entry of a [`Structure`] value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureField {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: DataValue,
}

/// A named bag of [`DataValue`]s, mirroring the wire protocol's `Structure` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Structure {
    /// The fields making up this structure, in insertion order.
    pub fields: Vec<StructureField>,
}

impl Structure {
    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Collects the fields into a name→value map, discarding duplicate-name ordering.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, DataValue> {
        self.fields.iter().map(|f| (f.name.clone(), f.value.clone())).collect()
    }
}

/// An ordered sequence of [`DataValue`]s, mirroring the wire protocol's `Array` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DataArray {
    /// The contained values, in order.
    pub values: Vec<DataValue>,
}

/// File type tag for an [`Image`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFileType {
    /// PNG-encoded bytes.
    Png,
    /// JPEG-encoded bytes.
    Jpeg,
    /// Raw, untagged bytes.
    Raw,
}

/// An opaque image blob, mirroring the wire protocol's `Image` message. Never constructed by
/// the H5 ingestion path; modeled for decode-path forward compatibility (`SPEC_FULL.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// The encoding of `data`.
    pub file_type: ImageFileType,
}

/// Tagged variant across every scalar and compound shape a DP column element can take.
///
/// NaN and ±∞ are representable in the floating arms and **must** be preserved bit-exact when
/// the underlying signal carries them; they are scientifically meaningful data, not error
/// signals (`spec.md` §3, §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    /// UTF-8 string.
    String(String),
    /// Boolean.
    Bool(bool),
    /// Signed 32-bit integer.
    I32(i32),
    /// Signed 64-bit integer.
    I64(i64),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// 32-bit IEEE-754 float, NaN/±∞ preserved.
    F32(f32),
    /// 64-bit IEEE-754 float, NaN/±∞ preserved.
    F64(f64),
    /// Raw bytes.
    ByteArray(Vec<u8>),
    /// A point in time.
    Timestamp(Timestamp),
    /// A nested sequence of values.
    Array(DataArray),
    /// A named bag of values.
    Structure(Structure),
    /// An opaque image blob.
    Image(Image),
}

impl DataValue {
    /// Attaches a [`ValueStatus`] to this value. The status is modeled as a sibling field on
    /// [`DataColumn`] element wrappers rather than inline on every arm, matching the wire
    /// protocol's optional out-of-band status (see [`StatusedValue`]).
    #[must_use]
    pub fn with_status(self, status: ValueStatus) -> StatusedValue {
        StatusedValue { value: self, status: Some(status) }
    }

    /// `true` for every numeric arm (integer or floating).
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::I32(_) | Self::I64(_) | Self::U32(_) | Self::U64(_) | Self::F32(_) | Self::F64(_)
        )
    }

    /// Projects this value to `f64` for decode/statistics purposes.
    ///
    /// Strings parse as `f64` if possible, else `NaN`; booleans become `0.0`/`1.0`; numeric
    /// arms cast directly (NaN/±∞ preserved); every other arm (byte array, timestamp, array,
    /// structure, image) is unknown to a flat numeric projection and becomes `NaN`, per
    /// `spec.md` §4.G ("unknown → NaN").
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        match self {
            Self::String(s) => s.parse::<f64>().unwrap_or(f64::NAN),
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::I32(v) => f64::from(*v),
            Self::I64(v) => *v as f64,
            Self::U32(v) => f64::from(*v),
            Self::U64(v) => *v as f64,
            Self::F32(v) => f64::from(*v),
            Self::F64(v) => *v,
            Self::ByteArray(_) | Self::Timestamp(_) | Self::Array(_) | Self::Structure(_) | Self::Image(_) => {
                f64::NAN
            }
        }
    }
}

/// A [`DataValue`] paired with an optional out-of-band [`ValueStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusedValue {
    /// The value itself.
    pub value: DataValue,
    /// Optional status (alarm/stale/invalid), absent when the value is known-good.
    pub status: Option<ValueStatus>,
}

impl From<DataValue> for StatusedValue {
    fn from(value: DataValue) -> Self {
        Self { value, status: None }
    }
}

/// A named, ordered sequence of values — one column of a data frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataColumn {
    /// Column name (the PV name, by convention).
    pub name: String,
    /// The column's values, in sample order.
    pub values: Vec<StatusedValue>,
}

impl DataColumn {
    /// Builds a column of plain `f64` values with no status, the shape the H5 ingestion path
    /// always produces.
    #[must_use]
    pub fn from_f64_values(name: impl Into<String>, values: &[f64]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| DataValue::F64(*v).into()).collect(),
        }
    }

    /// Number of values in this column.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if the column has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Projects every value to `f64`, per [`DataValue::to_f64`].
    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.value.to_f64()).collect()
    }
}

/// An opaque, wire-encoded [`DataColumn`]: a byte blob plus the column name, used when a
/// column is carried through a layer that does not need to interpret its contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedDataColumn {
    /// The column name, carried alongside the opaque payload so callers can route without
    /// deserializing.
    pub name: String,
    /// The wire encoding of a [`DataColumn`] (produced by [`serialize_data_column`]).
    pub payload: Vec<u8>,
}

/// Serializes a [`DataColumn`] into its opaque wire form.
///
/// Uses `bincode` rather than a text format: JSON cannot round-trip `NaN`/±∞ bit-exactly (it
/// serializes non-finite floats as `null`), which would violate the NaN-preserving invariant
/// `spec.md` §3/§9 demands for this exact path.
///
/// # Errors
/// Returns an error if the column cannot be encoded.
pub fn serialize_data_column(column: &DataColumn) -> crate::error::Result<SerializedDataColumn> {
    let payload = bincode::serialize(column)
        .map_err(|e| crate::error::IngestError::Config(format!("failed to serialize column: {e}")))?;
    Ok(SerializedDataColumn { name: column.name.clone(), payload })
}

/// Deserializes a [`SerializedDataColumn`] back into a [`DataColumn`].
///
/// This is always the fully-implemented path: the stubbed "return empty" variant from one of
/// the source code paths is never present here, per the Open Question resolution recorded in
/// `DESIGN.md`.
///
/// # Errors
/// Returns an error if the payload cannot be decoded.
pub fn deserialize_data_column(serialized: &SerializedDataColumn) -> crate::error::Result<DataColumn> {
    bincode::deserialize(&serialized.payload)
        .map_err(|e| crate::error::IngestError::Config(format!("failed to deserialize column {}: {e}", serialized.name)))
}

/// A `DataColumn` that may be carried either inline or in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnPayload {
    /// Materialized inline.
    Inline(DataColumn),
    /// Opaque wire-encoded form.
    Serialized(SerializedDataColumn),
}

impl ColumnPayload {
    /// Resolves to an inline [`DataColumn`], deserializing if necessary.
    ///
    /// # Errors
    /// Returns an error if the serialized form cannot be decoded.
    pub fn into_inline(self) -> crate::error::Result<DataColumn> {
        match self {
            Self::Inline(column) => Ok(column),
            Self::Serialized(serialized) => deserialize_data_column(&serialized),
        }
    }
}

/// Status taxonomy returned by the DP server instead of an affirmative ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionalStatus {
    /// The request was rejected outright (e.g. malformed).
    Reject,
    /// The server encountered an internal error processing the request.
    Error,
    /// The request was valid but matched no data.
    Empty,
    /// The server is not yet ready to serve the request.
    NotReady,
}

/// The two possible outcomes of an ingest or query call: an affirmative payload, or a
/// structured [`ExceptionalStatus`] plus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExceptionalResult<T> {
    /// The call succeeded.
    Ok(T),
    /// The call failed with a structured status.
    Exceptional {
        /// Which kind of failure occurred.
        status: ExceptionalStatus,
        /// Server-supplied human-readable message.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_and_infinity_survive_f64_projection() {
        assert!(DataValue::F64(f64::NAN).to_f64().is_nan());
        assert_eq!(DataValue::F64(f64::INFINITY).to_f64(), f64::INFINITY);
        assert_eq!(DataValue::F64(f64::NEG_INFINITY).to_f64(), f64::NEG_INFINITY);
    }

    #[test]
    fn unknown_variants_project_to_nan() {
        assert!(DataValue::ByteArray(vec![1, 2, 3]).to_f64().is_nan());
        assert!(DataValue::Structure(Structure::default()).to_f64().is_nan());
    }

    #[test]
    fn bool_projects_to_zero_or_one() {
        assert_eq!(DataValue::Bool(true).to_f64(), 1.0);
        assert_eq!(DataValue::Bool(false).to_f64(), 0.0);
    }

    #[test]
    fn serialize_round_trip_preserves_nan_bit_pattern() {
        let column = DataColumn::from_f64_values("BPMS_DMPH_502_TMITBR", &[1.5, f64::NAN]);
        let serialized = serialize_data_column(&column).expect("serialize");
        let decoded = deserialize_data_column(&serialized).expect("deserialize");
        assert_eq!(decoded.values[0].value.to_f64(), 1.5);
        assert!(decoded.values[1].value.to_f64().is_nan());
    }
}
