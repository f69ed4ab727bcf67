use proptest::prelude::*;

use crate::aggregate::{AggregateFn, aggregate};
use crate::codec::{LiteralOutcome, compare, decode, encode, literal_parse, max_value, min_value};
use crate::value::{SqlType, Value};

fn round_trip(ty: SqlType, length: usize, value: Value) -> Value {
    let mut buf = vec![0u8; length];
    encode(&value, ty, length, &mut buf).expect("encode");
    decode(&buf, ty).expect("decode")
}

#[test]
fn round_trips_every_scalar_type() {
    assert!(matches!(round_trip(SqlType::I8, 2, Value::I8(-12)), Value::I8(-12)));
    assert!(matches!(round_trip(SqlType::U8, 2, Value::U8(250)), Value::U8(250)));
    assert!(matches!(round_trip(SqlType::I16, 3, Value::I16(-3000)), Value::I16(-3000)));
    assert!(matches!(round_trip(SqlType::U16, 3, Value::U16(60000)), Value::U16(60000)));
    assert!(matches!(round_trip(SqlType::I32, 5, Value::I32(-70000)), Value::I32(-70000)));
    assert!(matches!(round_trip(SqlType::U32, 5, Value::U32(4_000_000_000)), Value::U32(4_000_000_000)));
    assert!(matches!(round_trip(SqlType::I64, 9, Value::I64(-1)), Value::I64(-1)));
    assert!(matches!(round_trip(SqlType::U64, 9, Value::U64(u64::MAX)), Value::U64(u64::MAX)));
    assert!(matches!(round_trip(SqlType::Bool, 2, Value::Bool(true)), Value::Bool(true)));
    match round_trip(SqlType::Float, 5, Value::Float(1.5)) {
        Value::Float(v) => assert_eq!(v, 1.5),
        other => panic!("unexpected {other:?}"),
    }
    match round_trip(SqlType::Double, 9, Value::Double(2.5)) {
        Value::Double(v) => assert_eq!(v, 2.5),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn string_payload_trims_trailing_padding() {
    let mut buf = vec![0u8; 9];
    encode(&Value::Char("hi".into()), SqlType::Char, 9, &mut buf).unwrap();
    match decode(&buf, SqlType::Char).unwrap() {
        Value::Char(s) => assert_eq!(s, "hi"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn string_too_long_is_rejected() {
    let mut buf = vec![0u8; 4];
    let err = encode(&Value::Char("toolong".into()), SqlType::Char, 4, &mut buf).unwrap_err();
    assert!(matches!(err, crate::CodecError::StringTooLong { .. }));
}

#[test]
fn null_round_trips_for_every_type() {
    for ty in SqlType::ALL {
        let length = ty.default_field_length().unwrap_or(9) as usize;
        let mut buf = vec![0xAAu8; length];
        encode(&Value::Null, ty, length, &mut buf).unwrap();
        assert!(matches!(decode(&buf, ty).unwrap(), Value::Null));
    }
}

#[test]
fn null_sorts_before_every_non_null_value() {
    let mut lo = vec![0u8; 5];
    encode(&Value::Null, SqlType::I32, 5, &mut lo).unwrap();
    let mut hi = vec![0u8; 5];
    encode(&Value::I32(i32::MIN), SqlType::I32, 5, &mut hi).unwrap();
    assert_eq!(compare(&lo, &hi, SqlType::I32), std::cmp::Ordering::Less);
}

#[test]
fn signed_comparison_respects_sign() {
    let mut neg = vec![0u8; 5];
    encode(&Value::I32(-5), SqlType::I32, 5, &mut neg).unwrap();
    let mut pos = vec![0u8; 5];
    encode(&Value::I32(5), SqlType::I32, 5, &mut pos).unwrap();
    assert_eq!(compare(&neg, &pos, SqlType::I32), std::cmp::Ordering::Less);
}

#[test]
fn min_value_sorts_below_any_encoded_value() {
    let floor = min_value(SqlType::I32, 5);
    let mut v = vec![0u8; 5];
    encode(&Value::I32(i32::MIN + 1), SqlType::I32, 5, &mut v).unwrap();
    assert_eq!(compare(&floor, &v, SqlType::I32), std::cmp::Ordering::Less);
}

#[test]
fn max_value_sorts_above_any_encoded_value() {
    let ceiling = max_value(SqlType::I32, 5);
    let mut v = vec![0u8; 5];
    encode(&Value::I32(i32::MAX - 1), SqlType::I32, 5, &mut v).unwrap();
    assert_eq!(compare(&ceiling, &v, SqlType::I32), std::cmp::Ordering::Greater);
}

#[test]
fn literal_parse_handles_null_and_escapes() {
    assert!(matches!(literal_parse("null", SqlType::I32, 5), LiteralOutcome::Value(Value::Null)));
    match literal_parse(r"a\nb", SqlType::Char, 16) {
        LiteralOutcome::Value(Value::Char(s)) => assert_eq!(s, "a\nb"),
        _ => panic!("unexpected outcome"),
    }
    assert!(matches!(literal_parse("256", SqlType::U8, 2), LiteralOutcome::OutOfRange));
    assert!(matches!(literal_parse("notanumber", SqlType::I32, 5), LiteralOutcome::ParseFailed));
}

#[test]
fn aggregate_sum_widens_to_i64() {
    let values = vec![Value::I8(1), Value::I8(2), Value::Null, Value::I8(3)];
    assert!(matches!(aggregate(AggregateFn::Sum, &values), Value::I64(6)));
}

#[test]
fn aggregate_avg_is_always_double() {
    let values = vec![Value::I32(1), Value::I32(2), Value::I32(3)];
    match aggregate(AggregateFn::Avg, &values) {
        Value::Double(v) => assert!((v - 2.0).abs() < 1e-9),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn aggregate_count_skips_nulls() {
    let values = vec![Value::I32(1), Value::Null, Value::I32(3)];
    assert!(matches!(aggregate(AggregateFn::Count, &values), Value::U64(2)));
}

#[test]
fn aggregate_max_min_preserve_source_type() {
    let values = vec![Value::I16(-4), Value::I16(9), Value::Null, Value::I16(2)];
    assert!(matches!(aggregate(AggregateFn::Max, &values), Value::I16(9)));
    assert!(matches!(aggregate(AggregateFn::Min, &values), Value::I16(-4)));
}

#[test]
fn aggregate_of_all_nulls_is_null() {
    let values = vec![Value::Null, Value::Null];
    assert!(matches!(aggregate(AggregateFn::Sum, &values), Value::Null));
    assert!(matches!(aggregate(AggregateFn::Max, &values), Value::Null));
}

proptest! {
    #[test]
    fn i32_round_trip_matches_any_value(v in any::<i32>()) {
        let mut buf = vec![0u8; 5];
        encode(&Value::I32(v), SqlType::I32, 5, &mut buf).unwrap();
        match decode(&buf, SqlType::I32).unwrap() {
            Value::I32(got) => prop_assert_eq!(got, v),
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    #[test]
    fn i32_ordering_matches_native_ordering(a in any::<i32>(), b in any::<i32>()) {
        let mut ba = vec![0u8; 5];
        encode(&Value::I32(a), SqlType::I32, 5, &mut ba).unwrap();
        let mut bb = vec![0u8; 5];
        encode(&Value::I32(b), SqlType::I32, 5, &mut bb).unwrap();
        prop_assert_eq!(compare(&ba, &bb, SqlType::I32), a.cmp(&b));
    }

    #[test]
    fn string_round_trip_for_ascii(s in "[a-zA-Z0-9]{0,20}") {
        let mut buf = vec![0u8; 21];
        encode(&Value::Char(s.clone()), SqlType::Char, 21, &mut buf).unwrap();
        match decode(&buf, SqlType::Char).unwrap() {
            Value::Char(got) => prop_assert_eq!(got, s),
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}
