//! Tests for serde serialization and deserialization

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{FlexBuilder, FlexOptions, FlexType, from_slice, get_root, to_vec, to_vec_with_options};
use crate::error::FlatError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Limits {
    burst: u32,
    ratio: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Mode {
    Fast,
    Retry(u8),
    Window(u16, u16),
    Throttle { rps: u64, jitter: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Service {
    name: String,
    port: u16,
    offset: i32,
    hosts: Vec<String>,
    limits: Limits,
    fallback: Option<Limits>,
    owner: Option<String>,
    mode: Mode,
    checksum: Vec<u8>,
    weights: (f64, f64),
    labels: BTreeMap<String, i64>,
    initial: char,
}

fn sample_service() -> Service {
    Service {
        name: "ingest".to_string(),
        port: 8080,
        offset: -42,
        hosts: vec!["a.internal".to_string(), "b.internal".to_string()],
        limits: Limits {
            burst: 250,
            ratio: 0.75,
        },
        fallback: None,
        owner: Some("ops".to_string()),
        mode: Mode::Throttle {
            rps: 5000,
            jitter: true,
        },
        checksum: vec![0xDE, 0xAD, 0xBE, 0xEF, 0x01],
        weights: (0.5, 1.25),
        labels: BTreeMap::from([("tier".to_string(), 2), ("zone".to_string(), -1)]),
        initial: 'λ',
    }
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn test_struct_round_trip() {
    let service = sample_service();
    let buf = to_vec(&service).unwrap();
    let decoded: Service = from_slice(&buf).unwrap();
    assert_eq!(decoded, service);
}

#[test]
fn test_struct_is_readable_as_map() {
    let buf = to_vec(&sample_service()).unwrap();
    let root = get_root(&buf).unwrap();
    assert_eq!(root.flex_type(), FlexType::Map);

    let map = root.as_map().unwrap();
    assert_eq!(map.len(), 12);
    assert_eq!(map.get("name").and_then(|v| v.as_str()), Some("ingest"));
    assert_eq!(map.get("port").and_then(|v| v.as_uint()), Some(8080));
    assert_eq!(map.get("offset").and_then(|v| v.as_int()), Some(-42));
    assert!(map.get("fallback").unwrap().is_null());
    assert_eq!(map.get("initial").and_then(|v| v.as_str()), Some("λ"));

    let limits = map.get("limits").and_then(|v| v.as_map()).unwrap();
    assert_eq!(limits.get("ratio").and_then(|v| v.as_float()), Some(0.75));

    let weights = map.get("weights").unwrap();
    assert_eq!(weights.flex_type(), FlexType::VectorFloat2);
}

#[test]
fn test_struct_fields_are_sorted() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Unsorted {
        zeta: u8,
        mid: u8,
        alpha: u8,
    }

    let value = Unsorted {
        zeta: 1,
        mid: 2,
        alpha: 3,
    };
    let buf = to_vec(&value).unwrap();
    let map = get_root(&buf).unwrap().as_map().unwrap();
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["alpha", "mid", "zeta"]);
    assert_eq!(from_slice::<Unsorted>(&buf).unwrap(), value);
}

#[test]
fn test_single_field_struct_bytes() {
    #[derive(Serialize)]
    struct Single {
        a: i32,
    }

    // key "a", keys vector, map header, value, packed type, root trailer
    let buf = to_vec(&Single { a: 13 }).unwrap();
    assert_eq!(buf, vec![97, 0, 1, 3, 1, 1, 1, 13, 4, 2, 36, 1]);
}

#[test]
fn test_matches_json_bridge() {
    #[derive(Serialize)]
    struct Event {
        enabled: bool,
        hosts: Vec<String>,
        name: String,
        score: f64,
        tag: Option<String>,
        total: i64,
    }

    let event = Event {
        enabled: true,
        hosts: vec!["a".to_string(), "b".to_string()],
        name: "ingest".to_string(),
        score: 0.5,
        tag: None,
        total: -12,
    };
    let document = json!({
        "enabled": true,
        "hosts": ["a", "b"],
        "name": "ingest",
        "score": 0.5,
        "tag": null,
        "total": -12
    });

    let mut builder = FlexBuilder::new();
    builder.add(&document).unwrap();
    assert_eq!(to_vec(&event).unwrap(), builder.finish().unwrap());
}

#[test]
fn test_scalar_extremes() {
    let buf = to_vec(&u64::MAX).unwrap();
    assert_eq!(from_slice::<u64>(&buf).unwrap(), u64::MAX);

    let buf = to_vec(&i64::MIN).unwrap();
    assert_eq!(from_slice::<i64>(&buf).unwrap(), i64::MIN);

    let buf = to_vec(&-0.1f64).unwrap();
    assert_eq!(from_slice::<f64>(&buf).unwrap(), -0.1);

    let buf = to_vec(&(true, 'x', "tuple")).unwrap();
    assert_eq!(
        from_slice::<(bool, char, String)>(&buf).unwrap(),
        (true, 'x', "tuple".to_string())
    );
}

#[test]
fn test_option_roots() {
    let none = to_vec(&None::<u8>).unwrap();
    assert_eq!(none, vec![0, 0, 1]);
    assert_eq!(from_slice::<Option<u8>>(&none).unwrap(), None);

    let some = to_vec(&Some(5u8)).unwrap();
    assert_eq!(some, vec![5, 8, 1]);
    assert_eq!(from_slice::<Option<u8>>(&some).unwrap(), Some(5));
}

#[test]
fn test_borrowed_strings() {
    #[derive(Serialize)]
    struct Owned {
        name: String,
    }
    #[derive(Deserialize)]
    struct Borrowed<'a> {
        name: &'a str,
    }

    let buf = to_vec(&Owned {
        name: "zero-copy".to_string(),
    })
    .unwrap();
    let borrowed: Borrowed<'_> = from_slice(&buf).unwrap();
    assert_eq!(borrowed.name, "zero-copy");
}

// =============================================================================
// Enums
// =============================================================================

#[test]
fn test_unit_variant_is_string() {
    let buf = to_vec(&Mode::Fast).unwrap();
    assert_eq!(get_root(&buf).unwrap().as_str(), Some("Fast"));
    assert_eq!(from_slice::<Mode>(&buf).unwrap(), Mode::Fast);
}

#[test]
fn test_data_variants_are_single_entry_maps() {
    let modes = [
        Mode::Retry(3),
        Mode::Window(10, 20),
        Mode::Throttle {
            rps: 1 << 40,
            jitter: false,
        },
    ];
    for mode in modes {
        let buf = to_vec(&mode).unwrap();
        let map = get_root(&buf).unwrap().as_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(from_slice::<Mode>(&buf).unwrap(), mode);
    }

    let buf = to_vec(&Mode::Retry(3)).unwrap();
    let map = get_root(&buf).unwrap().as_map().unwrap();
    assert_eq!(map.get("Retry").and_then(|v| v.as_uint()), Some(3));
}

#[test]
fn test_enum_map_with_two_entries() {
    let buf = to_vec(&BTreeMap::from([("Fast", 1), ("Retry", 2)])).unwrap();
    let err = from_slice::<Mode>(&buf).unwrap_err();
    assert!(matches!(err, FlatError::Deserialize(_)));
}

// =============================================================================
// Builder integration
// =============================================================================

#[test]
fn test_serialize_inside_manual_document() {
    let limits = Limits {
        burst: 10,
        ratio: 0.5,
    };

    let mut builder = FlexBuilder::new();
    builder.start_vector().unwrap();
    builder.add_serialize(&limits).unwrap();
    builder.add_int(7).unwrap();
    builder.end().unwrap();
    let buf = builder.finish().unwrap().to_vec();

    let vector = get_root(&buf).unwrap().as_vector().unwrap();
    let first = vector.get(0).unwrap();
    assert_eq!(Limits::deserialize(first).unwrap(), limits);
    assert_eq!(vector.get(1).and_then(|v| v.as_int()), Some(7));
}

#[test]
fn test_dedup_options_apply() {
    let batch = vec![
        Limits {
            burst: 1,
            ratio: 0.5,
        };
        4
    ];
    let plain = to_vec_with_options(
        &batch,
        FlexOptions {
            dedup_keys: false,
            dedup_key_vectors: false,
            ..FlexOptions::default()
        },
    )
    .unwrap();
    let shared = to_vec(&batch).unwrap();

    assert!(shared.len() < plain.len());
    assert_eq!(from_slice::<Vec<Limits>>(&plain).unwrap(), batch);
    assert_eq!(from_slice::<Vec<Limits>>(&shared).unwrap(), batch);
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_non_string_map_key() {
    let err = to_vec(&BTreeMap::from([(1u32, true)])).unwrap_err();
    assert!(matches!(err, FlatError::Serialize(ref msg) if msg.contains("uint")));
    assert!(err.is_contract_violation());
}

#[test]
fn test_wrong_type() {
    let buf = to_vec(&5i32).unwrap();
    let err = from_slice::<Limits>(&buf).unwrap_err();
    assert!(matches!(err, FlatError::Deserialize(_)));
    assert!(!err.is_contract_violation());

    assert!(matches!(
        from_slice::<String>(&buf),
        Err(FlatError::Deserialize(_))
    ));
}

#[test]
fn test_missing_field() {
    let buf = to_vec(&BTreeMap::from([("burst", 1u32)])).unwrap();
    let err = from_slice::<Limits>(&buf).unwrap_err();
    assert!(matches!(err, FlatError::Deserialize(ref msg) if msg.contains("ratio")));
}

#[test]
fn test_value_out_of_range_for_type() {
    let buf = to_vec(&300u32).unwrap();
    assert!(matches!(from_slice::<u8>(&buf), Err(FlatError::Deserialize(_))));
    assert_eq!(from_slice::<u16>(&buf).unwrap(), 300);
}

#[test]
fn test_malformed_root() {
    assert!(matches!(
        from_slice::<u8>(&[1]),
        Err(FlatError::BufferTooSmall { .. })
    ));
}
