//! Conversions between the domain model (`src/model/`) and the generated wire types
//! (`dp_client::pb`).
//!
//! The domain model is the type the rest of the crate works with; the wire types only exist
//! at the gRPC boundary. Keeping the conversion in one place means every other module can stay
//! ignorant of the protobuf shape.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    ColumnPayload, DataArray, DataColumn, DataTimestamps, DataValue, EventMetadata,
    ExceptionalStatus, IngestRecord, Image, ImageFileType, SamplingClock, StatusedValue,
    Structure, StructureField, Timestamp, TimestampList, ValueStatus,
};

use super::pb;

pub fn timestamp_to_pb(ts: &Timestamp) -> pb::Timestamp {
    pb::Timestamp { epoch_seconds: ts.epoch_seconds, nanoseconds: ts.nanoseconds }
}

pub fn timestamp_from_pb(ts: &pb::Timestamp) -> Timestamp {
    Timestamp::new(ts.epoch_seconds, ts.nanoseconds)
}

pub fn data_timestamps_to_pb(dt: &DataTimestamps) -> pb::DataTimestamps {
    let value = match dt {
        DataTimestamps::Clock(clock) => pb::data_timestamps::Value::SamplingClock(pb::SamplingClock {
            start_time: Some(timestamp_to_pb(&clock.start_time)),
            period_nanos: clock.period_nanos,
            count: u64::from(clock.count),
        }),
        DataTimestamps::List(list) => pb::data_timestamps::Value::TimestampList(pb::TimestampList {
            timestamps: list.timestamps.iter().map(timestamp_to_pb).collect(),
        }),
    };
    pb::DataTimestamps { value: Some(value) }
}

pub fn data_timestamps_from_pb(dt: &pb::DataTimestamps) -> DataTimestamps {
    match &dt.value {
        Some(pb::data_timestamps::Value::SamplingClock(clock)) => {
            DataTimestamps::Clock(SamplingClock {
                start_time: clock
                    .start_time
                    .as_ref()
                    .map(timestamp_from_pb)
                    .unwrap_or(Timestamp::new(0, 0)),
                period_nanos: clock.period_nanos,
                count: clock.count as u32,
            })
        }
        Some(pb::data_timestamps::Value::TimestampList(list)) => {
            DataTimestamps::List(TimestampList::new(list.timestamps.iter().map(timestamp_from_pb).collect()))
        }
        None => DataTimestamps::List(TimestampList::new(Vec::new())),
    }
}

fn value_status_to_pb(status: ValueStatus) -> i32 {
    let v = match status {
        ValueStatus::Good => pb::data_value::ValueStatus::Good,
        ValueStatus::Alarm => pb::data_value::ValueStatus::Alarm,
        ValueStatus::Stale => pb::data_value::ValueStatus::Stale,
        ValueStatus::Invalid => pb::data_value::ValueStatus::Invalid,
    };
    v as i32
}

fn value_status_from_pb(raw: i32) -> Option<ValueStatus> {
    match pb::data_value::ValueStatus::try_from(raw).unwrap_or(pb::data_value::ValueStatus::Good) {
        pb::data_value::ValueStatus::Good => None,
        pb::data_value::ValueStatus::Alarm => Some(ValueStatus::Alarm),
        pb::data_value::ValueStatus::Stale => Some(ValueStatus::Stale),
        pb::data_value::ValueStatus::Invalid => Some(ValueStatus::Invalid),
    }
}

fn image_file_type_to_pb(file_type: ImageFileType) -> i32 {
    let v = match file_type {
        ImageFileType::Png => pb::image::FileType::Png,
        ImageFileType::Jpeg => pb::image::FileType::Jpeg,
        ImageFileType::Raw => pb::image::FileType::Raw,
    };
    v as i32
}

fn image_file_type_from_pb(raw: i32) -> ImageFileType {
    match pb::image::FileType::try_from(raw).unwrap_or(pb::image::FileType::Raw) {
        pb::image::FileType::Png => ImageFileType::Png,
        pb::image::FileType::Jpeg => ImageFileType::Jpeg,
        pb::image::FileType::Raw => ImageFileType::Raw,
    }
}

pub fn data_value_to_pb(value: &DataValue) -> pb::DataValue {
    use pb::data_value::Value as W;
    let inner = match value {
        DataValue::String(s) => W::StringValue(s.clone()),
        DataValue::Bool(b) => W::BoolValue(*b),
        DataValue::I32(v) => W::Int32Value(*v),
        DataValue::I64(v) => W::Int64Value(*v),
        DataValue::U32(v) => W::Uint32Value(*v),
        DataValue::U64(v) => W::Uint64Value(*v),
        DataValue::F32(v) => W::FloatValue(*v),
        DataValue::F64(v) => W::DoubleValue(*v),
        DataValue::ByteArray(b) => W::ByteArrayValue(b.clone()),
        DataValue::Timestamp(ts) => W::TimestampValue(timestamp_to_pb(ts)),
        DataValue::Array(arr) => W::ArrayValue(pb::Array {
            values: arr.values.iter().map(data_value_to_pb).collect(),
        }),
        DataValue::Structure(s) => W::StructureValue(pb::Structure {
            fields: s
                .fields
                .iter()
                .map(|f| pb::StructureField { name: f.name.clone(), value: Some(data_value_to_pb(&f.value)) })
                .collect(),
        }),
        DataValue::Image(img) => W::ImageValue(pb::Image {
            data: img.data.clone(),
            file_type: image_file_type_to_pb(img.file_type),
        }),
    };
    pb::DataValue { value: Some(inner), status: 0 }
}

pub fn statused_value_to_pb(value: &StatusedValue) -> pb::DataValue {
    let mut wire = data_value_to_pb(&value.value);
    wire.status = value.status.map(value_status_to_pb).unwrap_or(0);
    wire
}

pub fn data_value_from_pb(wire: &pb::DataValue) -> StatusedValue {
    use pb::data_value::Value as W;
    let value = match &wire.value {
        Some(W::StringValue(s)) => DataValue::String(s.clone()),
        Some(W::BoolValue(b)) => DataValue::Bool(*b),
        Some(W::Int32Value(v)) => DataValue::I32(*v),
        Some(W::Int64Value(v)) => DataValue::I64(*v),
        Some(W::Uint32Value(v)) => DataValue::U32(*v),
        Some(W::Uint64Value(v)) => DataValue::U64(*v),
        Some(W::FloatValue(v)) => DataValue::F32(*v),
        Some(W::DoubleValue(v)) => DataValue::F64(*v),
        Some(W::ByteArrayValue(b)) => DataValue::ByteArray(b.clone()),
        Some(W::TimestampValue(ts)) => DataValue::Timestamp(timestamp_from_pb(ts)),
        Some(W::ArrayValue(arr)) => DataValue::Array(DataArray {
            values: arr.values.iter().map(|v| data_value_from_pb(v).value).collect(),
        }),
        Some(W::StructureValue(s)) => DataValue::Structure(Structure {
            fields: s
                .fields
                .iter()
                .map(|f| StructureField {
                    name: f.name.clone(),
                    value: f.value.as_ref().map(|v| data_value_from_pb(v).value).unwrap_or(DataValue::F64(f64::NAN)),
                })
                .collect(),
        }),
        Some(W::ImageValue(img)) => DataValue::Image(Image {
            data: img.data.clone(),
            file_type: image_file_type_from_pb(img.file_type),
        }),
        None => DataValue::F64(f64::NAN),
    };
    StatusedValue { value, status: value_status_from_pb(wire.status) }
}

pub fn data_column_to_pb(column: &DataColumn) -> pb::DataColumn {
    pb::DataColumn {
        name: column.name.clone(),
        values: column.values.iter().map(statused_value_to_pb).collect(),
    }
}

pub fn data_column_from_pb(wire: &pb::DataColumn) -> DataColumn {
    DataColumn {
        name: wire.name.clone(),
        values: wire.values.iter().map(data_value_from_pb).collect(),
    }
}

pub fn serialized_column_to_pb(serialized: &crate::model::SerializedDataColumn) -> pb::SerializedDataColumn {
    pb::SerializedDataColumn { name: serialized.name.clone(), payload: serialized.payload.clone() }
}

pub fn serialized_column_from_pb(wire: &pb::SerializedDataColumn) -> crate::model::SerializedDataColumn {
    crate::model::SerializedDataColumn { name: wire.name.clone(), payload: wire.payload.clone() }
}

pub fn column_payload_from_pb_ingest(payload: Option<pb::ingest_data_request::Payload>) -> Option<ColumnPayload> {
    match payload {
        Some(pb::ingest_data_request::Payload::Column(c)) => Some(ColumnPayload::Inline(data_column_from_pb(&c))),
        Some(pb::ingest_data_request::Payload::SerializedColumn(s)) => {
            Some(ColumnPayload::Serialized(serialized_column_from_pb(&s)))
        }
        None => None,
    }
}

pub fn attributes_to_pb(attributes: &BTreeMap<String, String>) -> Vec<pb::Attribute> {
    attributes
        .iter()
        .map(|(name, value)| pb::Attribute { name: name.clone(), value: value.clone() })
        .collect()
}

pub fn attributes_from_pb(attributes: &[pb::Attribute]) -> BTreeMap<String, String> {
    attributes.iter().map(|a| (a.name.clone(), a.value.clone())).collect()
}

pub fn event_metadata_to_pb(event: &EventMetadata) -> pb::EventMetadata {
    pb::EventMetadata {
        description: event.description.clone(),
        start_time: Some(timestamp_to_pb(&event.start_time)),
        stop_time: Some(timestamp_to_pb(&event.stop_time)),
    }
}

pub fn event_metadata_from_pb(wire: &pb::EventMetadata) -> EventMetadata {
    EventMetadata {
        description: wire.description.clone(),
        start_time: wire.start_time.as_ref().map(timestamp_from_pb).unwrap_or(Timestamp::new(0, 0)),
        stop_time: wire.stop_time.as_ref().map(timestamp_from_pb).unwrap_or(Timestamp::new(0, 0)),
    }
}

pub fn exceptional_status_from_pb(raw: i32) -> ExceptionalStatus {
    match pb::exceptional_result::ExceptionalResultStatus::try_from(raw)
        .unwrap_or(pb::exceptional_result::ExceptionalResultStatus::Error)
    {
        pb::exceptional_result::ExceptionalResultStatus::Reject => ExceptionalStatus::Reject,
        pb::exceptional_result::ExceptionalResultStatus::Error => ExceptionalStatus::Error,
        pb::exceptional_result::ExceptionalResultStatus::Empty => ExceptionalStatus::Empty,
        pb::exceptional_result::ExceptionalResultStatus::NotReady => ExceptionalStatus::NotReady,
    }
}

/// Builds the wire `IngestDataRequest` for one [`IngestRecord`].
///
/// `use_serialized` selects whether the column travels inline or pre-serialized via
/// [`crate::model::serialize_data_column`] — the caller decides per `spec.md` §4.F's streaming
/// vs. unary tradeoff (serialized columns are cheaper to re-batch without re-encoding values).
///
/// # Errors
/// Returns an error if `use_serialized` is set and the column cannot be bincode-encoded.
pub fn ingest_record_to_pb(record: &IngestRecord, use_serialized: bool) -> crate::error::Result<pb::IngestDataRequest> {
    let payload = if use_serialized {
        let serialized = crate::model::serialize_data_column(&record.column)?;
        pb::ingest_data_request::Payload::SerializedColumn(serialized_column_to_pb(&serialized))
    } else {
        pb::ingest_data_request::Payload::Column(data_column_to_pb(&record.column))
    };

    let timestamps = record.timestamps.as_deref().map(data_timestamps_to_pb);

    Ok(pb::IngestDataRequest {
        provider_id: record.provider_id.clone(),
        client_request_id: record.client_request_id.clone(),
        timestamps,
        payload: Some(payload),
        attributes: attributes_to_pb(&record.attributes),
        tags: record.tags.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect(),
        event_metadata: record.event_metadata.as_ref().map(event_metadata_to_pb),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp as ModelTimestamp;

    #[test]
    fn timestamp_round_trips() {
        let ts = ModelTimestamp::new(1_700_000_000, 42);
        let wire = timestamp_to_pb(&ts);
        assert_eq!(timestamp_from_pb(&wire), ts);
    }

    #[test]
    fn data_value_preserves_nan_through_wire_round_trip() {
        let value = DataValue::F64(f64::NAN);
        let wire = data_value_to_pb(&value);
        let decoded = data_value_from_pb(&wire);
        assert!(decoded.value.to_f64().is_nan());
    }

    #[test]
    fn data_column_round_trips_names_and_values() {
        let column = DataColumn::from_f64_values("BPMS_DMPH_502_TMITBR", &[1.0, 2.0, f64::INFINITY]);
        let wire = data_column_to_pb(&column);
        let decoded = data_column_from_pb(&wire);
        assert_eq!(decoded.name, column.name);
        assert_eq!(decoded.to_f64_vec()[2], f64::INFINITY);
    }

    #[test]
    fn sampling_clock_round_trips_through_wire() {
        let clock = DataTimestamps::Clock(SamplingClock {
            start_time: ModelTimestamp::new(1_700_000_000, 0),
            period_nanos: 1_000_000_000,
            count: 5,
        });
        let wire = data_timestamps_to_pb(&clock);
        let decoded = data_timestamps_from_pb(&wire);
        assert_eq!(decoded.len(), 5);
    }
}
