//! Property tests for ring splitting and the value codec

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use ringbridge::codec::{decode_row, decode_value, encode_row, encode_value, EncodedColumn, RawColumn};
use ringbridge::model::{Cell, Row, TypeTag, Value};
use ringbridge::ring::{RingEntry, Token, TokenRange, TokenRangeSplitter, RING_SPAN};
use uuid::Uuid;

/// A ring cut at the given boundaries; the last range wraps to the first
fn topology(mut cuts: Vec<i64>) -> Vec<RingEntry> {
    cuts.sort_unstable();
    cuts.dedup();
    if cuts.len() < 2 {
        return vec![RingEntry::new(TokenRange::full_ring(), vec!["h0".into()])];
    }
    (0..cuts.len())
        .map(|i| {
            let end = cuts[(i + 1) % cuts.len()];
            RingEntry::new(
                TokenRange::new(Token(cuts[i]), Token(end)),
                vec![format!("h{}", i % 3)],
            )
        })
        .collect()
}

proptest! {
    #[test]
    fn split_tiles_the_ring(cuts in prop::collection::vec(any::<i64>(), 0..12), target in 1usize..64) {
        let input = topology(cuts);
        let splitter = TokenRangeSplitter::new(target);
        let partitions = splitter.split(&input).unwrap();

        let total: u128 = partitions.iter().map(|p| p.range.span()).sum();
        prop_assert_eq!(total, RING_SPAN);
        for pair in partitions.windows(2) {
            prop_assert_eq!(pair[0].range.end, pair[1].range.start);
        }
        let first = partitions.first().unwrap();
        let last = partitions.last().unwrap();
        prop_assert_eq!(last.range.end, first.range.start);
        for (i, p) in partitions.iter().enumerate() {
            prop_assert_eq!(p.index, i);
            prop_assert!(p.range.span() <= splitter.max_span() || p.range.span() == 1);
        }
    }

    #[test]
    fn split_keeps_replicas_of_the_parent(cuts in prop::collection::vec(any::<i64>(), 2..8), target in 1usize..32) {
        let input = topology(cuts);
        let partitions = TokenRangeSplitter::new(target).split(&input).unwrap();
        for p in &partitions {
            let owner = input
                .iter()
                .find(|e| e.range.contains(p.range.end))
                .unwrap();
            let replicas: Vec<_> = p.replicas.iter().cloned().collect();
            prop_assert_eq!(&replicas, &owner.endpoints);
        }
    }
}

fn scalar() -> impl Strategy<Value = (TypeTag, Value)> {
    prop_oneof![
        "[a-zA-Z0-9 _-]{0,16}".prop_map(|s| (TypeTag::Text, Value::Text(s))),
        any::<i8>().prop_map(|v| (TypeTag::TinyInt, Value::TinyInt(v))),
        any::<i16>().prop_map(|v| (TypeTag::SmallInt, Value::SmallInt(v))),
        any::<i32>().prop_map(|v| (TypeTag::Int, Value::Int(v))),
        any::<i64>().prop_map(|v| (TypeTag::BigInt, Value::BigInt(v))),
        any::<f32>().prop_map(|v| (TypeTag::Float, Value::Float(v))),
        any::<f64>().prop_map(|v| (TypeTag::Double, Value::Double(v))),
        any::<bool>().prop_map(|v| (TypeTag::Boolean, Value::Boolean(v))),
        (-8_000_000_000_000i64..8_000_000_000_000i64).prop_map(|ms| {
            let ts = Utc.timestamp_millis_opt(ms).single().unwrap();
            (TypeTag::Timestamp, Value::Timestamp(ts))
        }),
        any::<u128>().prop_map(|n| (TypeTag::Uuid, Value::Uuid(Uuid::from_u128(n)))),
        prop::collection::vec(any::<u8>(), 0..24).prop_map(|b| (TypeTag::Blob, Value::Blob(b))),
    ]
}

fn collection() -> impl Strategy<Value = (TypeTag, Value)> {
    prop_oneof![
        prop::collection::vec(any::<i32>(), 0..6)
            .prop_map(|items| (TypeTag::list(TypeTag::Int), Value::list(items))),
        prop::collection::vec("[a-z]{0,6}", 0..6)
            .prop_map(|items| (TypeTag::set(TypeTag::Text), Value::set(items))),
        prop::collection::vec((any::<u128>(), any::<i64>()), 0..6).prop_map(|entries| {
            let tag = TypeTag::map(TypeTag::Uuid, TypeTag::BigInt);
            (tag, Value::map(entries.into_iter().map(|(k, v)| (Uuid::from_u128(k), v))))
        }),
    ]
}

proptest! {
    #[test]
    fn codec_round_trip((tag, value) in prop_oneof![scalar(), collection()]) {
        let bytes = encode_value(&value, &tag).unwrap().unwrap();
        let back = decode_value(&bytes, &tag).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn timestamps_round_trip_or_are_rejected(nanos in prop_oneof![
        -8_000_000_000_000_000_000i64..i64::MAX,
        (-8_000_000_000_000i64..8_000_000_000_000i64).prop_map(|ms| ms * 1_000_000),
    ]) {
        let ts = Utc.timestamp_nanos(nanos);
        match Cell::new("at", TypeTag::Timestamp, ts) {
            Ok(cell) => {
                prop_assert_eq!(nanos % 1_000_000, 0);
                let row = Row::from_cells([cell]).unwrap();
                let raw: Vec<RawColumn> = encode_row(&row)
                    .unwrap()
                    .columns
                    .iter()
                    .map(EncodedColumn::to_raw)
                    .collect();
                prop_assert_eq!(decode_row(&raw).unwrap(), row);
            }
            Err(_) => {
                prop_assert_ne!(nanos % 1_000_000, 0);
                prop_assert!(encode_value(&Value::Timestamp(ts), &TypeTag::Timestamp).is_err());
            }
        }
    }
}

#[test]
fn empty_collections_stay_empty() {
    for tag in [
        TypeTag::list(TypeTag::Text),
        TypeTag::set(TypeTag::Int),
        TypeTag::map(TypeTag::Text, TypeTag::Double),
    ] {
        let value = match &tag {
            TypeTag::List(_) => Value::List(Vec::new()),
            TypeTag::Set(_) => Value::Set(Default::default()),
            _ => Value::Map(Default::default()),
        };
        let bytes = encode_value(&value, &tag).unwrap();
        assert_eq!(bytes.as_deref(), Some(&[0u8, 0, 0, 0][..]));
        assert_eq!(decode_value(bytes.as_deref().unwrap(), &tag).unwrap(), value);
    }
}
