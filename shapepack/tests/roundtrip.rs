use std::collections::HashMap;

use shapepack::{from_bytes, to_bytes, Packable, RawBytes, Serializer};

fn roundtrip<T>(value: T)
where
    T: Packable + PartialEq + core::fmt::Debug,
{
    let bytes = to_bytes(&value).expect("failed to serialize value");
    let back: T = from_bytes(&bytes).expect("failed to deserialize value");
    assert_eq!(back, value);
}

#[test]
fn primitives() {
    roundtrip(());
    roundtrip(true);
    roundtrip(false);
    roundtrip(42_i32);
    roundtrip(-1_i8);
    roundtrip(i64::MIN);
    roundtrip(u64::MAX);
    roundtrip(65_535_u16);
    roundtrip(3.5_f32);
    roundtrip(-2.25_f64);
    roundtrip(String::new());
    roundtrip("hello world".to_string());
}

#[test]
fn the_answer_is_one_byte() {
    assert_eq!(to_bytes(&42_i32).unwrap(), [0x2a]);
    assert_eq!(from_bytes::<i32>(&[0x2a]).unwrap(), 42);
}

#[test]
fn collections() {
    roundtrip(Vec::<i32>::new());
    roundtrip(vec![1_i32, -2, 300]);
    roundtrip(vec![vec!["a".to_string()], vec![]]);
    roundtrip(Some(7_u8));
    roundtrip(Option::<u8>::None);
    roundtrip(vec![Some(1_i64), None, Some(-3)]);

    let mut map = HashMap::new();
    map.insert("one".to_string(), 1_i32);
    map.insert("two".to_string(), 2);
    roundtrip(map);
}

#[test]
fn raw_bytes_pass_through() {
    let raw = RawBytes::new(vec![0x81, 0xa1, b'k', 0x07]);
    let bytes = to_bytes(&raw).unwrap();
    assert_eq!(bytes, raw.as_bytes());

    let back: RawBytes = from_bytes(&bytes).unwrap();
    assert_eq!(back, raw);
}

#[test]
fn raw_bytes_share_a_refcounted_input() {
    let shared = shapepack::bytes::Bytes::from(to_bytes(&vec![1_i32, 2, 3]).unwrap());
    let serializer = Serializer::new();

    let view: RawBytes = serializer.from_shared::<RawBytes>(&shared).unwrap();
    assert!(!view.is_owned());
    assert_eq!(view.as_bytes(), &shared[..]);

    let copied: RawBytes = serializer.from_bytes(&shared[..]).unwrap();
    assert!(copied.is_owned());
    assert_eq!(copied, view);
}

#[test]
fn reencoding_decoded_bytes_is_stable() {
    let bytes = to_bytes(&vec![1_i32, 2, 3]).unwrap();
    let decoded: Vec<i32> = from_bytes(&bytes).unwrap();
    assert_eq!(to_bytes(&decoded).unwrap(), bytes);

    let bytes = to_bytes(&Some("x".to_string())).unwrap();
    let decoded: Option<String> = from_bytes(&bytes).unwrap();
    assert_eq!(to_bytes(&decoded).unwrap(), bytes);
}

#[test]
fn converters_are_cached_per_serializer() {
    let serializer = Serializer::new();
    let first = serializer.converter_for::<Vec<i32>>().unwrap();
    let second = serializer.converter_for::<Vec<i32>>().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

#[test]
fn a_shared_serializer_is_usable_from_many_threads() {
    let serializer = std::sync::Arc::new(Serializer::new());
    let mut handles = Vec::new();
    for n in 0..8_i64 {
        let serializer = std::sync::Arc::clone(&serializer);
        handles.push(std::thread::spawn(move || {
            let bytes = serializer.to_bytes(&vec![n, n + 1]).unwrap();
            let back: Vec<i64> = serializer.from_bytes(&bytes).unwrap();
            assert_eq!(back, vec![n, n + 1]);
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
