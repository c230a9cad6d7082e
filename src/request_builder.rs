//! Assembles one `IngestRecord` per signal: attributes, tags, event metadata, and an
//! idempotent `clientRequestId` (`spec.md` §4.D).

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{next_client_request_id, DataColumn, EventMetadata, IngestRecord, Signal};
use crate::signal_parser::signal_name_matched;

/// Prefix used in every `clientRequestId` this process emits.
const CLIENT_REQUEST_ID_PREFIX: &str = "h5";

/// Builds the `IngestRecord` for one signal.
///
/// `source_file` is the path the signal was read from (used for the `source_file` attribute
/// and in error messages); `run_epoch_secs` anchors `clientRequestId` generation to this run's
/// start time (`spec.md` §9).
#[must_use]
pub fn build_ingest_record(
    provider_id: &str,
    signal: &Signal,
    source_file: &str,
    run_epoch_secs: u64,
) -> IngestRecord {
    let counts = signal.value_quality_counts();
    let column = DataColumn::from_f64_values(signal.info.full_name.clone(), &signal.values);

    let mut attributes = BTreeMap::new();
    attributes.insert("pv_name".to_string(), signal.info.full_name.clone());
    attributes.insert("source_file".to_string(), source_file.to_string());
    attributes.insert("sample_count".to_string(), signal.values.len().to_string());
    attributes.insert(
        "beam_line".to_string(),
        format!("{}_{}", signal.file_metadata.origin, signal.file_metadata.pathway),
    );
    attributes.insert("acquisition_date".to_string(), signal.file_metadata.date.clone());
    attributes.insert("acquisition_time".to_string(), signal.file_metadata.time.clone());
    attributes.insert("valid_samples".to_string(), counts.valid.to_string());
    attributes.insert("nan_samples".to_string(), counts.nan.to_string());
    attributes.insert("inf_samples".to_string(), counts.inf.to_string());
    attributes.insert("data_quality_ratio".to_string(), counts.quality_ratio().to_string());

    if signal_name_matched(&signal.info) {
        attributes.insert("device".to_string(), signal.info.device.clone());
        attributes.insert("device_area".to_string(), signal.info.device_area.clone());
        attributes.insert("device_location".to_string(), signal.info.device_location.clone());
        attributes.insert("measurement_type".to_string(), signal.info.signal_type.clone());
    }

    let mut tags: BTreeSet<String> = BTreeSet::new();
    tags.insert("h5_data".to_string());
    tags.insert("accelerator_data".to_string());
    if counts.nan > 0 {
        tags.insert("contains_nan".to_string());
    }
    if counts.inf > 0 {
        tags.insert("contains_inf".to_string());
    }
    if counts.valid == counts.total() {
        tags.insert("all_valid".to_string());
    }
    if !signal_name_matched(&signal.info) {
        tags.insert("unparsed_name".to_string());
    }

    let all_timestamps = signal.timestamps.extract_all();
    let event_metadata = match (all_timestamps.first(), all_timestamps.last()) {
        (Some(&start), Some(&stop)) => Some(EventMetadata {
            description: format!("H5: {}", signal.info.full_name),
            start_time: start,
            stop_time: stop,
        }),
        _ => None,
    };

    IngestRecord {
        provider_id: provider_id.to_string(),
        client_request_id: next_client_request_id(CLIENT_REQUEST_ID_PREFIX, run_epoch_secs),
        timestamps: Some(signal.timestamps.clone()),
        column,
        attributes,
        tags,
        event_metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataTimestamps, SignalFileMetadata, SignalInfo, TimestampList};
    use crate::signal_parser::parse_signal_name;
    use std::sync::Arc;

    fn sample_signal(values: Vec<f64>) -> Signal {
        Signal {
            info: parse_signal_name("BPMS_DMPH_502_TMITBR"),
            file_metadata: SignalFileMetadata {
                origin: "BSA".to_string(),
                pathway: "LCLS".to_string(),
                date: "20231114".to_string(),
                time: "221320".to_string(),
                project: None,
            },
            timestamps: Arc::new(DataTimestamps::List(TimestampList::new(vec![
                crate::model::Timestamp::new(1_700_000_000, 0),
                crate::model::Timestamp::new(1_700_000_001, 0),
            ]))),
            values,
        }
    }

    #[test]
    fn record_carries_quality_attributes_and_tags() {
        let signal = sample_signal(vec![1.5, f64::NAN]);
        let record = build_ingest_record("provider-1", &signal, "/data/run1.h5", 1_700_000_000);

        assert_eq!(record.attributes.get("valid_samples"), Some(&"1".to_string()));
        assert_eq!(record.attributes.get("nan_samples"), Some(&"1".to_string()));
        assert!(record.tags.contains("contains_nan"));
        assert!(!record.tags.contains("all_valid"));
        assert!(record.tags.contains("h5_data"));
        assert!(record.tags.contains("accelerator_data"));
    }

    #[test]
    fn all_valid_tag_set_when_no_nan_or_inf() {
        let signal = sample_signal(vec![1.0, 2.0]);
        let record = build_ingest_record("provider-1", &signal, "/data/run1.h5", 1_700_000_000);
        assert!(record.tags.contains("all_valid"));
    }

    #[test]
    fn parsed_name_adds_device_attributes() {
        let signal = sample_signal(vec![1.0]);
        let record = build_ingest_record("provider-1", &signal, "/data/run1.h5", 1_700_000_000);
        assert_eq!(record.attributes.get("device"), Some(&"BPMS".to_string()));
        assert_eq!(record.attributes.get("measurement_type"), Some(&"charge".to_string()));
    }

    #[test]
    fn event_metadata_spans_first_to_last_timestamp() {
        let signal = sample_signal(vec![1.0, 2.0]);
        let record = build_ingest_record("provider-1", &signal, "/data/run1.h5", 1_700_000_000);
        let event = record.event_metadata.expect("event metadata present");
        assert_eq!(event.description, "H5: BPMS_DMPH_502_TMITBR");
        assert_eq!(event.start_time.epoch_seconds, 1_700_000_000);
        assert_eq!(event.stop_time.epoch_seconds, 1_700_000_001);
    }

    #[test]
    fn client_request_ids_differ_across_records() {
        let signal = sample_signal(vec![1.0]);
        let a = build_ingest_record("provider-1", &signal, "/data/run1.h5", 1_700_000_000);
        let b = build_ingest_record("provider-1", &signal, "/data/run1.h5", 1_700_000_000);
        assert_ne!(a.client_request_id, b.client_request_id);
    }
}
