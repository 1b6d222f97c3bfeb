use std::fs;

use memdiff_core::config::{load_config, AnalysisConfig, ConfigError, HeapLayout, PointerBand};
use tempfile::tempdir;

#[test]
fn defaults_match_32_bit_process_heap_layout() {
    let config = AnalysisConfig::default();
    assert_eq!(config.pointer_band, PointerBand { min: 0x10000, max: 0x8000_0000 });
    assert_eq!(config.heap.segment_list_offset, 0x58);
    assert_eq!(config.heap.segment_list_slots, 64);
    assert_eq!(config.heap.unit_size, 8);
    assert_eq!(config.heap.header_size, 8);
    assert_eq!((config.heap.flags_offset, config.heap.unused_bytes_offset), (5, 6));
    assert_eq!((config.heap.used_flag, config.heap.end_flag), (0x01, 0x10));
    assert!(!config.scan_private_data);
    assert!(config.validate().is_ok());
}

#[test]
fn yaml_overrides_only_the_given_fields() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("analysis.yaml");
    fs::write(&path, "scan_private_data: true\npointer_band:\n  min: 131072\n").expect("write");

    let config = load_config(&path).expect("load yaml");
    assert!(config.scan_private_data);
    assert_eq!(config.pointer_band.min, 0x20000);
    assert_eq!(config.pointer_band.max, 0x8000_0000);
    assert_eq!(config.heap, HeapLayout::default());
}

#[test]
fn json_is_picked_by_extension() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("analysis.json");
    fs::write(&path, r#"{"heap": {"unit_size": 16}}"#).expect("write");

    let config = load_config(&path).expect("load json");
    assert_eq!(config.heap.unit_size, 16);
    assert_eq!(config.heap.header_size, 8);
}

#[test]
fn invalid_values_are_rejected() {
    let empty_band = AnalysisConfig {
        pointer_band: PointerBand { min: 0x1000, max: 0x1000 },
        ..AnalysisConfig::default()
    };
    assert_eq!(
        empty_band.validate(),
        Err(ConfigError::EmptyPointerBand { min: 0x1000, max: 0x1000 })
    );

    let mut zero_unit = AnalysisConfig::default();
    zero_unit.heap.unit_size = 0;
    assert_eq!(zero_unit.validate(), Err(ConfigError::ZeroUnitSize));

    let mut outside = AnalysisConfig::default();
    outside.heap.unused_bytes_offset = 8;
    assert!(matches!(
        outside.validate(),
        Err(ConfigError::HeaderFieldOutOfRange { field: "unused_bytes_offset", .. })
    ));
}

#[test]
fn header_field_offsets_near_the_integer_limit_are_rejected() {
    let config = AnalysisConfig {
        heap: HeapLayout { flags_offset: u64::MAX, ..HeapLayout::default() },
        ..AnalysisConfig::default()
    };
    assert_eq!(
        config.validate(),
        Err(ConfigError::HeaderFieldOutOfRange {
            field: "flags_offset",
            offset: u64::MAX,
            header_size: 8,
        })
    );

    let mut size_field = AnalysisConfig::default();
    size_field.heap.size_field = u64::MAX - 1;
    assert!(matches!(
        size_field.validate(),
        Err(ConfigError::HeaderFieldOutOfRange { field: "size_field", .. })
    ));
}

#[test]
fn invalid_file_reports_path() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "heap:\n  unit_size: 0\n").expect("write");

    let err = load_config(&path).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("bad.yaml"), "{message}");
    assert!(message.contains("non-zero"), "{message}");
}
