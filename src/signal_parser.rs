//! PV identifier parsing and filename metadata extraction (`spec.md` §4.C).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{SignalFileMetadata, SignalInfo};

static SIGNAL_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]+)_([A-Z0-9]+)_(\d+)_([A-Z0-9_]+)$").expect("valid regex"));

static FILENAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z]+)_([A-Z]+)_(\d{8})_(\d{6})(?:_([A-Za-z0-9]+))?$").expect("valid regex")
});

/// Parses a PV identifier of the form `DEVICE_AREA_LOCATION_ATTRIBUTE` (e.g.
/// `BPMS_DMPH_502_TMITBR`, `KLYS_LI23_31_AMPL`).
///
/// A name that doesn't match the convention yields `"unknown"` placeholders rather than an
/// error; callers should additionally tag the resulting record `unparsed_name` (`spec.md`
/// §4.C).
#[must_use]
pub fn parse_signal_name(signal_name: &str) -> SignalInfo {
    match SIGNAL_NAME_PATTERN.captures(signal_name) {
        Some(caps) => {
            let device_attribute = caps[4].to_string();
            let units = infer_units(&device_attribute);
            let signal_type = infer_signal_type(&device_attribute);
            SignalInfo {
                full_name: signal_name.to_string(),
                device: caps[1].to_string(),
                device_area: caps[2].to_string(),
                device_location: caps[3].to_string(),
                device_attribute,
                signal_type,
                units,
                matlab_class: None,
                label: None,
            }
        }
        None => SignalInfo {
            full_name: signal_name.to_string(),
            device: "unknown".to_string(),
            device_area: "unknown".to_string(),
            device_location: "unknown".to_string(),
            device_attribute: signal_name.to_string(),
            signal_type: "unknown".to_string(),
            units: "unknown".to_string(),
            matlab_class: None,
            label: None,
        },
    }
}

/// `true` if the signal name matched the recognized `DEVICE_AREA_LOCATION_ATTRIBUTE` pattern.
#[must_use]
pub fn signal_name_matched(info: &SignalInfo) -> bool {
    info.device != "unknown"
}

/// Infers physical units from a device-attribute suffix (`spec.md` §4.C).
#[must_use]
pub fn infer_units(device_attribute: &str) -> String {
    let units = match device_attribute {
        "X" | "Y" | "Z" => "mm",
        "TMIT" | "TMITBR" => "pC",
        "BCTRL" | "BDES" | "BACT" => "kG",
        _ if device_attribute.contains("PHAS") => "deg",
        _ if device_attribute.contains("AMPL") => "MV/m",
        _ if device_attribute.contains("POW") => "MW",
        _ if device_attribute.contains("TEMP") => "\u{b0}C",
        _ if device_attribute.contains("PRESS") => "Torr",
        _ if device_attribute.contains("CURR") => "A",
        _ if device_attribute.contains("VOLT") => "V",
        _ => "unknown",
    };
    units.to_string()
}

/// Infers a coarse signal-type label from a device-attribute suffix (`spec.md` §4.C).
#[must_use]
pub fn infer_signal_type(device_attribute: &str) -> String {
    let signal_type = match device_attribute {
        "X" | "Y" | "Z" => "position",
        "TMIT" | "TMITBR" => "charge",
        "BCTRL" | "BDES" => "control",
        "BACT" => "actual",
        _ if device_attribute.contains("PHAS") => "phase",
        _ if device_attribute.contains("AMPL") => "amplitude",
        _ if device_attribute.contains("POW") => "power",
        _ if device_attribute.contains("TEMP") => "temperature",
        _ if device_attribute.contains("PRESS") => "pressure",
        _ if device_attribute.contains("CURR") => "current",
        _ if device_attribute.contains("VOLT") => "voltage",
        _ => "measurement",
    };
    signal_type.to_string()
}

/// Parses filename metadata from an H5 file stem matching
/// `ORIGIN_PATHWAY_YYYYMMDD_HHMMSS[_PROJECT]`.
///
/// Best-effort: a stem that doesn't match the convention yields [`SignalFileMetadata::unknown`]
/// rather than an error (`spec.md` §3).
#[must_use]
pub fn parse_filename_metadata(file_stem: &str) -> SignalFileMetadata {
    match FILENAME_PATTERN.captures(file_stem) {
        Some(caps) => SignalFileMetadata {
            origin: caps[1].to_string(),
            pathway: caps[2].to_string(),
            date: caps[3].to_string(),
            time: caps[4].to_string(),
            project: caps.get(5).map(|m| m.as_str().to_string()),
        },
        None => SignalFileMetadata::unknown(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_signal_name() {
        let info = parse_signal_name("BPMS_DMPH_502_TMITBR");
        assert_eq!(info.device, "BPMS");
        assert_eq!(info.device_area, "DMPH");
        assert_eq!(info.device_location, "502");
        assert_eq!(info.device_attribute, "TMITBR");
        assert_eq!(info.units, "pC");
        assert_eq!(info.signal_type, "charge");
    }

    #[test]
    fn parses_klystron_amplitude() {
        let info = parse_signal_name("KLYS_LI23_31_AMPL");
        assert_eq!(info.device, "KLYS");
        assert_eq!(info.units, "MV/m");
        assert_eq!(info.signal_type, "amplitude");
    }

    #[test]
    fn unrecognized_name_falls_back_to_unknown() {
        let info = parse_signal_name("not a valid pv name");
        assert_eq!(info.device, "unknown");
        assert_eq!(info.units, "unknown");
        assert!(!signal_name_matched(&info));
    }

    #[test]
    fn filename_metadata_parses_with_optional_project() {
        let metadata = parse_filename_metadata("BSA_LCLS_20231114_221320_LINAC");
        assert_eq!(metadata.origin, "BSA");
        assert_eq!(metadata.pathway, "LCLS");
        assert_eq!(metadata.date, "20231114");
        assert_eq!(metadata.time, "221320");
        assert_eq!(metadata.project, Some("LINAC".to_string()));
    }

    #[test]
    fn filename_metadata_without_project_is_none() {
        let metadata = parse_filename_metadata("BSA_LCLS_20231114_221320");
        assert_eq!(metadata.project, None);
    }

    #[test]
    fn malformed_filename_falls_back_to_unknown() {
        let metadata = parse_filename_metadata("totally-unrecognized");
        assert_eq!(metadata.origin, "unknown_origin");
    }
}
