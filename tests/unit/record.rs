use super::*;

#[test]
fn json_array_manifest() {
    let records = parse_records(
        r#"[ { "id": 1, "title": "A", "image": "a.png" },
             { "id": "two", "title": "B", "dur": 2.5 } ]"#,
    )
    .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id().as_deref(), Some("1"));
    assert_eq!(records[1].id().as_deref(), Some("two"));
    assert_eq!(records[1].get("dur").and_then(FieldValue::as_f64), Some(2.5));
}

#[test]
fn json_lines_manifest_skips_blank_lines() {
    let records = parse_records("{\"title\": \"A\"}\n\n{\"title\": \"B\"}\n").unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id(), None);
    assert_eq!(records[1].get("title"), Some(&FieldValue::from("B")));
}

#[test]
fn bad_line_reports_its_number() {
    let err = parse_records("{\"title\": \"A\"}\n{oops}\n").unwrap_err();
    assert!(err.to_string().contains("line 2"), "{err}");
}

#[test]
fn nested_values_are_rejected() {
    assert!(parse_records(r#"[ { "title": { "nested": true } } ]"#).is_err());
}

#[test]
fn empty_manifest_is_empty() {
    assert!(parse_records("  \n").unwrap().is_empty());
}

#[test]
fn number_display_drops_integral_fraction() {
    assert_eq!(FieldValue::Number(3.0).to_string(), "3");
    assert_eq!(FieldValue::Number(2.5).to_string(), "2.5");
    assert_eq!(FieldValue::from("x").as_f64(), None);
    assert_eq!(FieldValue::from(" 4 ").as_f64(), Some(4.0));
}

#[test]
fn blank_id_is_ignored() {
    let r = DataRecord::new().with("id", "  ");
    assert_eq!(r.id(), None);
}

#[test]
fn load_records_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.jsonl");
    std::fs::write(&path, "{\"id\": 7}\n").unwrap();
    let records = load_records(&path).unwrap();
    assert_eq!(records[0].id().as_deref(), Some("7"));

    let err = load_records(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, VidstampError::Config(_)));
}
