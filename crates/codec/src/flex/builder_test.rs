//! Tests for the FlexBuffers builder

use flatwire_config::FlexConfig;

use super::{BitWidth, FlexBuilder, FlexOptions, FlexType, fwidth, get_root, iwidth, uwidth};
use crate::error::FlatError;

fn finish_single(add: impl FnOnce(&mut FlexBuilder) -> crate::Result<()>) -> Vec<u8> {
    let mut builder = FlexBuilder::new();
    add(&mut builder).unwrap();
    builder.finish().unwrap().to_vec()
}

fn build_hello_map(builder: &mut FlexBuilder) {
    builder.start_map().unwrap();
    builder.add_key("hello").unwrap();
    builder.add_string("world").unwrap();
    builder.add_key("int").unwrap();
    builder.add_int(10).unwrap();
    builder.end().unwrap();
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

// =============================================================================
// Width inference
// =============================================================================

#[test]
fn test_uwidth() {
    assert_eq!(uwidth(0), BitWidth::W8);
    assert_eq!(uwidth(255), BitWidth::W8);
    assert_eq!(uwidth(256), BitWidth::W16);
    assert_eq!(uwidth(65_536), BitWidth::W32);
    assert_eq!(uwidth(1 << 40), BitWidth::W64);
}

#[test]
fn test_iwidth() {
    assert_eq!(iwidth(5), BitWidth::W8);
    assert_eq!(iwidth(127), BitWidth::W8);
    assert_eq!(iwidth(128), BitWidth::W16);
    assert_eq!(iwidth(-128), BitWidth::W8);
    assert_eq!(iwidth(-129), BitWidth::W16);
    assert_eq!(iwidth(1 << 40), BitWidth::W64);
    assert_eq!(iwidth(i64::MIN), BitWidth::W64);
}

#[test]
fn test_fwidth() {
    assert_eq!(fwidth(0.5), BitWidth::W32);
    assert_eq!(fwidth(-1024.25), BitWidth::W32);
    assert_eq!(fwidth(0.1), BitWidth::W64);
    assert_eq!(fwidth(f64::NAN), BitWidth::W64);
}

// =============================================================================
// Scalar roots
// =============================================================================

#[test]
fn test_int_root_bytes() {
    assert_eq!(finish_single(|b| b.add_int(5)), vec![5, 4, 1]);
    assert_eq!(finish_single(|b| b.add_int(-1)), vec![0xFF, 4, 1]);
}

#[test]
fn test_uint_root_bytes() {
    assert_eq!(finish_single(|b| b.add_uint(300)), vec![0x2C, 0x01, 9, 2]);
}

#[test]
fn test_float_root_bytes() {
    assert_eq!(finish_single(|b| b.add_float(1.5)), vec![0, 0, 0xC0, 0x3F, 14, 4]);
}

#[test]
fn test_bool_and_null_root_bytes() {
    assert_eq!(finish_single(|b| b.add_bool(true)), vec![1, 104, 1]);
    assert_eq!(finish_single(|b| b.add_null()), vec![0, 0, 1]);
}

#[test]
fn test_wide_int_root() {
    let buf = finish_single(|b| b.add_int(1 << 40));
    assert_eq!(buf.len(), 10);
    assert_eq!(&buf[..8], &(1i64 << 40).to_le_bytes());
    assert_eq!(buf[8], 4 | 3);
    assert_eq!(buf[9], 8);
}

// =============================================================================
// Vectors
// =============================================================================

#[test]
fn test_fixed_int_vector_bytes() {
    let buf = finish_single(|b| {
        b.start_vector()?;
        b.add_int(1)?;
        b.add_int(2)?;
        b.add_int(3)?;
        b.end()
    });
    // no length prefix, no packed types
    assert_eq!(buf, vec![1, 2, 3, 3, (FlexType::VectorInt3 as u8) << 2, 1]);
}

#[test]
fn test_mixed_vector_bytes() {
    let buf = finish_single(|b| {
        b.start_vector()?;
        b.add_int(7)?;
        b.add_string("a")?;
        b.end()
    });
    assert_eq!(
        buf,
        vec![
            1, b'a', 0, // string
            2, 7, 4, // length, int, offset to string
            4, 20, // packed types
            4, 40, 1, // root
        ]
    );
}

#[test]
fn test_wide_element_widens_vector() {
    let buf = finish_single(|b| {
        b.start_vector()?;
        b.add_int(1)?;
        b.add_int(1 << 40)?;
        b.end()
    });
    assert_eq!(buf.len(), 19);
    assert_eq!(&buf[..8], &1i64.to_le_bytes());
    assert_eq!(&buf[8..16], &(1i64 << 40).to_le_bytes());
    assert_eq!(buf[17], (FlexType::VectorInt2 as u8) << 2 | 3);

    let vector = get_root(&buf).unwrap().as_fixed_typed_vector().unwrap();
    assert_eq!(vector.len(), 2);
    assert_eq!(vector.get(1).and_then(|r| r.as_int()), Some(1 << 40));
}

fn vector_type(fill: impl FnOnce(&mut FlexBuilder) -> crate::Result<()>) -> FlexType {
    let buf = finish_single(|b| {
        b.start_vector()?;
        fill(b)?;
        b.end()
    });
    get_root(&buf).unwrap().flex_type()
}

#[test]
fn test_typed_vector_types() {
    assert_eq!(
        vector_type(|b| (0..5).try_for_each(|i| b.add_int(i))),
        FlexType::VectorInt
    );
    assert_eq!(
        vector_type(|b| (0..5).try_for_each(|i| b.add_uint(i))),
        FlexType::VectorUInt
    );
    assert_eq!(
        vector_type(|b| (0..5).try_for_each(|i| b.add_float(f64::from(i)))),
        FlexType::VectorFloat
    );
    assert_eq!(
        vector_type(|b| [true, false, true].into_iter().try_for_each(|v| b.add_bool(v))),
        FlexType::VectorBool
    );
    assert_eq!(
        vector_type(|b| {
            b.add_uint(9)?;
            b.add_uint(8)
        }),
        FlexType::VectorUInt2
    );
}

#[test]
fn test_string_vector_is_untyped() {
    let buf = finish_single(|b| {
        b.start_vector()?;
        b.add_string("x")?;
        b.add_string("y")?;
        b.end()
    });
    assert_eq!(get_root(&buf).unwrap().flex_type(), FlexType::Vector);
}

#[test]
fn test_fixed_vector_limits() {
    for (len, expected) in [
        (1, FlexType::VectorFloat),
        (4, FlexType::VectorFloat4),
        (5, FlexType::VectorFloat),
    ] {
        let buf = finish_single(|b| {
            b.start_vector()?;
            (0..len).try_for_each(|i| b.add_float(f64::from(i)))?;
            b.end()
        });
        assert_eq!(get_root(&buf).unwrap().flex_type(), expected, "len {len}");
    }
}

#[test]
fn test_long_vector_offsets() {
    let text = "x".repeat(300);
    let buf = finish_single(|b| {
        b.start_vector()?;
        b.add_string(&text)?;
        b.add_int(1)?;
        b.end()
    });
    let vector = get_root(&buf).unwrap().as_vector().unwrap();
    assert_eq!(vector.get(0).and_then(|r| r.as_str()), Some(text.as_str()));
    assert_eq!(vector.get(1).and_then(|r| r.as_int()), Some(1));
}

#[test]
fn test_nested_containers() {
    let buf = finish_single(|b| {
        b.start_vector()?;
        b.start_map()?;
        b.add_key("inner")?;
        b.start_vector()?;
        b.add_int(-5)?;
        b.add_null()?;
        b.end()?;
        b.end()?;
        b.add_bool(false)?;
        b.end()
    });
    let outer = get_root(&buf).unwrap().as_vector().unwrap();
    assert_eq!(outer.len(), 2);
    let inner = outer
        .get(0)
        .and_then(|r| r.as_map())
        .and_then(|m| m.get("inner"))
        .and_then(|r| r.as_vector())
        .unwrap();
    assert_eq!(inner.get(0).and_then(|r| r.as_int()), Some(-5));
    assert!(inner.get(1).unwrap().is_null());
    assert_eq!(outer.get(1).and_then(|r| r.as_bool()), Some(false));
}

// =============================================================================
// Maps
// =============================================================================

#[test]
fn test_hello_map_bytes() {
    let mut builder = FlexBuilder::new();
    build_hello_map(&mut builder);
    let buf = builder.finish().unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(b"hello\0");
    expected.push(5);
    expected.extend_from_slice(b"world\0");
    expected.extend_from_slice(b"int\0");
    expected.extend_from_slice(&[2, 18, 6]); // keys vector
    expected.extend_from_slice(&[2, 1, 2, 16, 10, 20, 4]); // values
    expected.extend_from_slice(&[4, 36, 1]); // root
    assert_eq!(buf, &expected[..]);

    let map = get_root(buf).unwrap().as_map().unwrap();
    assert_eq!(map.get("hello").and_then(|r| r.as_str()), Some("world"));
    assert_eq!(map.get("int").and_then(|r| r.as_int()), Some(10));
}

#[test]
fn test_map_sorted_on_end() {
    let buf = finish_single(|b| {
        b.start_map()?;
        b.add_key("b")?;
        b.add_int(1)?;
        b.add_key("a")?;
        b.add_int(2)?;
        b.end()
    });
    assert_eq!(
        buf,
        vec![98, 0, 97, 0, 2, 3, 6, 2, 1, 2, 2, 1, 4, 4, 4, 36, 1]
    );

    let map = get_root(&buf).unwrap().as_map().unwrap();
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(map.get("a").and_then(|r| r.as_int()), Some(2));
    assert_eq!(map.get("b").and_then(|r| r.as_int()), Some(1));
}

#[test]
fn test_map_sorts_by_bytes() {
    let buf = finish_single(|b| {
        b.start_map()?;
        for key in ["b", "ab", "B", "a"] {
            b.add_key(key)?;
            b.add_string(key)?;
        }
        b.end()
    });
    let map = get_root(&buf).unwrap().as_map().unwrap();
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["B", "a", "ab", "b"]);
    for (key, value) in map.iter() {
        assert_eq!(value.as_str(), Some(key));
    }
}

#[test]
fn test_large_map_quick_sort() {
    let buf = finish_single(|b| {
        b.start_map()?;
        for i in (0..30).rev() {
            b.add_key(&format!("key{i:02}"))?;
            b.add_int(i)?;
        }
        b.end()
    });
    let map = get_root(&buf).unwrap().as_map().unwrap();
    assert_eq!(map.len(), 30);

    let keys: Vec<&str> = map.keys().collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);

    for i in 0..30 {
        let value = map.get(&format!("key{i:02}")).and_then(|r| r.as_int());
        assert_eq!(value, Some(i));
    }
    assert!(map.get("key30").is_none());
}

#[test]
fn test_presorted_map() {
    let buf = finish_single(|b| {
        b.start_map_presorted()?;
        b.add_key("alpha")?;
        b.add_int(1)?;
        b.add_key("beta")?;
        b.add_int(2)?;
        b.end_map()
    });
    let map = get_root(&buf).unwrap().as_map().unwrap();
    assert_eq!(map.get("beta").and_then(|r| r.as_int()), Some(2));
}

#[test]
fn test_empty_map_and_vector() {
    let buf = finish_single(|b| {
        b.start_vector()?;
        b.start_map()?;
        b.end()?;
        b.start_vector()?;
        b.end()?;
        b.end()
    });
    let outer = get_root(&buf).unwrap().as_vector().unwrap();
    assert!(outer.get(0).and_then(|r| r.as_map()).unwrap().is_empty());
    assert!(outer.get(1).and_then(|r| r.as_vector()).unwrap().is_empty());
}

// =============================================================================
// Deduplication
// =============================================================================

fn build_two_hello_maps(options: FlexOptions) -> Vec<u8> {
    let mut builder = FlexBuilder::with_options(options);
    builder.start_vector().unwrap();
    build_hello_map(&mut builder);
    build_hello_map(&mut builder);
    builder.end().unwrap();
    builder.finish().unwrap().to_vec()
}

#[test]
fn test_key_dedup_shrinks_buffer() {
    let shared = build_two_hello_maps(FlexOptions::default());
    let separate = build_two_hello_maps(FlexOptions {
        dedup_keys: false,
        ..FlexOptions::default()
    });

    assert!(shared.len() < separate.len());
    assert_eq!(count_occurrences(&shared, b"hello\0"), 1);
    assert_eq!(count_occurrences(&separate, b"hello\0"), 2);

    for buf in [&shared, &separate] {
        let maps = get_root(buf).unwrap().as_vector().unwrap();
        for map in maps.iter() {
            let map = map.as_map().unwrap();
            assert_eq!(map.get("hello").and_then(|r| r.as_str()), Some("world"));
            assert_eq!(map.get("int").and_then(|r| r.as_int()), Some(10));
        }
    }
}

#[test]
fn test_key_vector_dedup() {
    let shared = build_two_hello_maps(FlexOptions::default());
    let separate = build_two_hello_maps(FlexOptions {
        dedup_key_vectors: false,
        ..FlexOptions::default()
    });
    // the second keys vector costs three bytes: length plus two offsets
    assert_eq!(separate.len(), shared.len() + 3);
}

#[test]
fn test_string_dedup() {
    let build = |dedup_strings| {
        let mut builder = FlexBuilder::with_options(FlexOptions {
            dedup_strings,
            ..FlexOptions::default()
        });
        builder.start_vector().unwrap();
        builder.add_string("repeat").unwrap();
        builder.add_string("repeat").unwrap();
        builder.end().unwrap();
        builder.finish().unwrap().to_vec()
    };

    assert_eq!(count_occurrences(&build(true), b"repeat"), 1);
    assert_eq!(count_occurrences(&build(false), b"repeat"), 2);
}

#[test]
fn test_indirect_int_dedup() {
    let buf = finish_single(|b| {
        b.start_vector()?;
        b.add_indirect_int(1000, true)?;
        b.add_indirect_int(1000, true)?;
        b.end()
    });
    assert_eq!(buf, vec![0xE8, 0x03, 2, 3, 4, 25, 25, 4, 40, 1]);

    let vector = get_root(&buf).unwrap().as_vector().unwrap();
    for value in vector.iter() {
        assert_eq!(value.flex_type(), FlexType::IndirectInt);
        assert_eq!(value.as_int(), Some(1000));
    }
}

#[test]
fn test_indirect_without_dedup() {
    let buf = finish_single(|b| {
        b.start_vector()?;
        b.add_indirect_uint(70_000, false)?;
        b.add_indirect_uint(70_000, false)?;
        b.add_indirect_float(0.1, true)?;
        b.add_indirect_float(0.1, true)?;
        b.end()
    });
    assert_eq!(count_occurrences(&buf, &70_000u32.to_le_bytes()), 2);
    assert_eq!(count_occurrences(&buf, &0.1f64.to_le_bytes()), 1);

    let vector = get_root(&buf).unwrap().as_vector().unwrap();
    assert_eq!(vector.get(1).and_then(|r| r.as_uint()), Some(70_000));
    assert_eq!(vector.get(3).and_then(|r| r.as_float()), Some(0.1));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_finish_twice_returns_same_buffer() {
    let mut builder = FlexBuilder::new();
    builder.add_int(42).unwrap();
    let first = builder.finish().unwrap().to_vec();
    assert!(builder.is_finished());
    assert_eq!(builder.finish().unwrap(), &first[..]);
}

#[test]
fn test_to_bytes() {
    let mut builder = FlexBuilder::new();
    builder.add_int(1).unwrap();
    assert!(matches!(builder.to_bytes(), Err(FlatError::NotFinished)));
    let buf = builder.finish().unwrap().to_vec();
    assert_eq!(builder.to_bytes().unwrap(), buf);
}

#[test]
fn test_reset_reuses_builder() {
    let mut builder = FlexBuilder::new();
    builder.start_vector().unwrap();
    builder.add_string("kept?").unwrap();
    builder.end().unwrap();
    builder.finish().unwrap();

    builder.reset();
    assert!(builder.is_empty());
    assert!(!builder.is_finished());

    builder.add_string("kept?").unwrap();
    let buf = builder.finish().unwrap();
    // the string is written again rather than taken from the stale cache
    assert_eq!(count_occurrences(buf, b"kept?"), 1);
    assert_eq!(get_root(buf).unwrap().as_str(), Some("kept?"));
}

#[test]
fn test_from_config() {
    let config = FlexConfig {
        initial_capacity: 64,
        dedup_strings: false,
        ..FlexConfig::default()
    };
    let builder = FlexBuilder::from_config(&config);
    let options = builder.options();
    assert_eq!(options.initial_capacity, 64);
    assert!(!options.dedup_strings);
    assert!(options.dedup_keys);
    assert!(options.dedup_key_vectors);
}

// =============================================================================
// Contract violations
// =============================================================================

#[test]
fn test_add_after_finish() {
    let mut builder = FlexBuilder::new();
    builder.add_int(1).unwrap();
    builder.finish().unwrap();
    assert!(matches!(builder.add_int(2), Err(FlatError::AlreadyFinished)));
    assert!(matches!(builder.add_key("k"), Err(FlatError::AlreadyFinished)));
    assert!(matches!(builder.start_vector(), Err(FlatError::AlreadyFinished)));
}

#[test]
fn test_value_without_key() {
    let mut builder = FlexBuilder::new();
    builder.start_map().unwrap();
    assert!(matches!(builder.add_int(1), Err(FlatError::MissingKey)));
    assert!(matches!(builder.start_vector(), Err(FlatError::MissingKey)));

    builder.add_key("a").unwrap();
    builder.add_int(1).unwrap();
    assert!(matches!(builder.add_string("x"), Err(FlatError::MissingKey)));
}

#[test]
fn test_map_ended_after_key() {
    let mut builder = FlexBuilder::new();
    builder.start_map().unwrap();
    builder.add_key("dangling").unwrap();
    assert!(matches!(builder.end(), Err(FlatError::MissingKey)));
}

#[test]
fn test_second_key_before_value() {
    let mut builder = FlexBuilder::new();
    builder.start_map().unwrap();
    builder.add_key("a").unwrap();
    let err = builder.add_key("b").unwrap_err();
    assert!(matches!(err, FlatError::KeyWithoutValue));
    assert!(err.is_contract_violation());

    // the rejected key leaves the map intact
    builder.add_int(1).unwrap();
    builder.end().unwrap();
    let buf = builder.finish().unwrap();
    let map = get_root(buf).unwrap().as_map().unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("a").and_then(|v| v.as_int()), Some(1));
    assert!(map.get("b").is_none());
}

#[test]
fn test_key_outside_map() {
    let mut builder = FlexBuilder::new();
    assert!(matches!(builder.add_key("k"), Err(FlatError::KeyOutsideMap)));
    builder.start_vector().unwrap();
    assert!(matches!(builder.add_key("k"), Err(FlatError::KeyOutsideMap)));
}

#[test]
fn test_frame_mismatch() {
    let mut builder = FlexBuilder::new();
    builder.start_vector().unwrap();
    let err = builder.end_map().unwrap_err();
    assert!(matches!(
        err,
        FlatError::FrameMismatch {
            expected: "map",
            found: "vector"
        }
    ));
    assert!(err.is_contract_violation());
    builder.end_vector().unwrap();
}

#[test]
fn test_end_without_frame() {
    let mut builder = FlexBuilder::new();
    assert!(matches!(builder.end(), Err(FlatError::NoOpenFrame)));
    assert!(matches!(builder.end_vector(), Err(FlatError::NoOpenFrame)));
}

#[test]
fn test_unbalanced_stack() {
    let mut builder = FlexBuilder::new();
    assert!(matches!(builder.finish(), Err(FlatError::UnbalancedStack(0))));

    builder.add_int(1).unwrap();
    builder.add_int(2).unwrap();
    assert!(matches!(builder.finish(), Err(FlatError::UnbalancedStack(2))));
}

#[test]
fn test_finish_with_open_vector() {
    let mut builder = FlexBuilder::new();
    builder.start_vector().unwrap();
    builder.add_int(1).unwrap();
    assert!(matches!(builder.finish(), Err(FlatError::Nesting(_))));
}
