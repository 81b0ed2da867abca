//! Tests for the record model

use super::*;
use serde_json::json;

fn sample() -> Record {
    let mut record = Record::new();
    record.insert(fields::SESSION_ID, "s1");
    record.insert(fields::TIME_TAG, 100_i64);
    record.insert(fields::ACTIVE_NAME, "pageview");
    record.insert("price", 9.5);
    record
}

#[test]
fn test_typed_accessors() {
    let record = sample();
    assert_eq!(record.get_str(fields::SESSION_ID).unwrap(), "s1");
    assert_eq!(record.get_i64(fields::TIME_TAG).unwrap(), 100);
    assert_eq!(record.get_f64("price").unwrap(), 9.5);
}

#[test]
fn test_type_mismatch_is_not_cast() {
    let record = sample();

    let err = record.get_i64(fields::SESSION_ID).unwrap_err();
    match err {
        Error::TypeMismatch {
            field,
            expected,
            found,
        } => {
            assert_eq!(field, "session_id");
            assert_eq!(expected, "integer");
            assert_eq!(found, "string");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // An integer is not silently widened to a float
    assert!(matches!(
        record.get_f64(fields::TIME_TAG),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_missing_field() {
    let record = sample();
    assert!(matches!(
        record.get_str(fields::IP),
        Err(Error::MissingField(name)) if name == "ip"
    ));
}

#[test]
fn test_opt_str() {
    let mut record = sample();
    assert_eq!(record.opt_str(fields::REQ_URL).unwrap(), None);

    record.insert(fields::REQ_URL, FieldValue::Null);
    assert_eq!(record.opt_str(fields::REQ_URL).unwrap(), None);

    record.insert(fields::REQ_URL, "/home");
    assert_eq!(record.opt_str(fields::REQ_URL).unwrap(), Some("/home"));

    record.insert(fields::REQ_URL, 7_i64);
    assert!(record.opt_str(fields::REQ_URL).is_err());
}

#[test]
fn test_merge_json_object_overwrites() {
    let mut record = sample();
    let object = json!({
        "active_name": "click",
        "ip": "1.1.1.1",
        "cart": {"items": 3, "total": 12.25},
        "tags": ["a", "b"],
        "vip": true
    });
    let serde_json::Value::Object(map) = object else {
        unreachable!()
    };
    record.merge_json_object(map);

    assert_eq!(record.get_str(fields::ACTIVE_NAME).unwrap(), "click");
    let cart = record.get_object("cart").unwrap();
    assert_eq!(cart.get("items"), Some(&FieldValue::Integer(3)));
    assert_eq!(cart.get("total"), Some(&FieldValue::Float(12.25)));
    assert_eq!(record.get("vip"), Some(&FieldValue::Boolean(true)));
}

#[test]
fn test_serialization_is_sorted_and_stable() {
    let mut a = Record::new();
    a.insert("zeta", 1_i64);
    a.insert("alpha", "x");

    let mut b = Record::new();
    b.insert("alpha", "x");
    b.insert("zeta", 1_i64);

    let json_a = serde_json::to_string(&a).unwrap();
    let json_b = serde_json::to_string(&b).unwrap();
    assert_eq!(json_a, r#"{"alpha":"x","zeta":1}"#);
    assert_eq!(json_a, json_b);
}

#[test]
fn test_untagged_deserialize_keeps_integers() {
    let record: Record =
        serde_json::from_str(r#"{"time_tag": 1700000000000, "ratio": 0.5, "n": null}"#).unwrap();
    assert_eq!(record.get_i64("time_tag").unwrap(), 1_700_000_000_000);
    assert_eq!(record.get_f64("ratio").unwrap(), 0.5);
    assert_eq!(record.get("n"), Some(&FieldValue::Null));
}

#[test]
fn test_project_keeps_key_fields() {
    let mut record = sample();
    record.insert(fields::IP, "1.1.1.1");
    record.insert("noise", "dropped");

    record.project(&["ip"]);

    assert!(record.contains(fields::SESSION_ID));
    assert!(record.contains(fields::TIME_TAG));
    assert!(record.contains(fields::ACTIVE_NAME));
    assert!(record.contains(fields::IP));
    assert!(!record.contains("noise"));
    assert!(!record.contains("price"));
}

#[test]
fn test_large_unsigned_ids_survive_round_trip() {
    let mut record = sample();
    let serde_json::Value::Object(map) = json!({"order_id": 18446744073709551615_u64}) else {
        unreachable!()
    };
    record.merge_json_object(map);

    assert_eq!(
        record.get(fields::ORDER_ID),
        Some(&FieldValue::Unsigned(u64::MAX))
    );
    let line = serde_json::to_string(&record).unwrap();
    assert!(line.contains(r#""order_id":18446744073709551615"#));

    let parsed: Record = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed, record);
}
