use super::*;

#[test]
fn exact_placeholder_is_recognized() {
    assert_eq!(
        ValueRef::parse("{title}").unwrap(),
        ValueRef::Placeholder("title".to_string())
    );
    assert_eq!(
        ValueRef::parse("{ title }").unwrap(),
        ValueRef::Placeholder("title".to_string())
    );
}

#[test]
fn plain_strings_are_literals() {
    assert_eq!(
        ValueRef::parse("logo.png").unwrap(),
        ValueRef::Literal("logo.png".to_string())
    );
    assert_eq!(ValueRef::parse("").unwrap(), ValueRef::Literal(String::new()));
    assert_eq!(
        ValueRef::parse("{{not a key}}").unwrap(),
        ValueRef::Literal("{not a key}".to_string())
    );
}

#[test]
fn mixed_text_is_interpolated() {
    let v = ValueRef::parse("Hello {name}, see {img}!").unwrap();
    assert_eq!(v.keys(), vec!["name", "img"]);
    assert_eq!(
        v,
        ValueRef::Interpolated(vec![
            Segment::Literal("Hello ".to_string()),
            Segment::Key("name".to_string()),
            Segment::Literal(", see ".to_string()),
            Segment::Key("img".to_string()),
            Segment::Literal("!".to_string()),
        ])
    );
}

#[test]
fn malformed_placeholders_are_template_errors() {
    for bad in ["{title", "{}", "a } b", "{a{b}}"] {
        let err = ValueRef::parse(bad).unwrap_err();
        assert!(
            matches!(err, VidstampError::Template(_)),
            "expected template error for {bad:?}, got {err}"
        );
    }
}

#[test]
fn display_restores_source_syntax() {
    for src in ["{title}", "plain", "a {{b}} {c}"] {
        let v = ValueRef::parse(src).unwrap();
        assert_eq!(ValueRef::parse(&v.to_string()).unwrap(), v);
    }
}

#[test]
fn number_ref_accepts_numbers_and_single_placeholders() {
    let n: NumberRef = serde_json::from_str("2.5").unwrap();
    assert_eq!(n, NumberRef::Literal(2.5));
    let p: NumberRef = serde_json::from_str("\"{dur}\"").unwrap();
    assert_eq!(p.key(), Some("dur"));
    assert_eq!(serde_json::to_string(&p).unwrap(), "\"{dur}\"");
    assert!(serde_json::from_str::<NumberRef>("\"3 seconds\"").is_err());
}
