use super::*;

const PROMO: &str = r##"{
    "version": "1",
    "canvas": { "width": 64, "height": 64 },
    "fps": 30,
    "duration": 6.0,
    "background": "#101820",
    "layers": [
        { "kind": "image", "value": "{image}", "duration": 4.0,
          "style": { "fade_in": 0.5, "fit": "contain" } },
        { "kind": "image", "value": "brand/closing.png", "start": 4.0, "duration": 2.0 },
        { "kind": "text", "value": "Now showing: {title}", "position": { "x": 8, "y": 40 },
          "style": { "font_size": 12, "color": [255, 255, 0] } },
        { "kind": "audio", "value": "{music}", "style": { "loop": true, "volume": 0.8 } }
    ]
}"##;

#[test]
fn parses_layers_in_order_with_styles() {
    let t = Template::from_json_str(PROMO).unwrap();
    assert_eq!(t.canvas(), Canvas::new(64, 64));
    assert_eq!(t.fps(), 30);
    assert_eq!(t.declared_duration(), Some(6.0));
    assert_eq!(t.background(), Rgb8([0x10, 0x18, 0x20]));

    let kinds: Vec<&str> = t.layers().iter().map(|l| l.kind.name()).collect();
    assert_eq!(kinds, vec!["image", "image", "text", "audio"]);

    let LayerKind::Image { style } = &t.layers()[0].kind else {
        panic!("expected image layer");
    };
    assert_eq!(style.fit, Fit::Contain);
    assert_eq!(style.fade_in, 0.5);

    let LayerKind::Audio { style } = &t.layers()[3].kind else {
        panic!("expected audio layer");
    };
    assert!(style.looped);
}

#[test]
fn placeholder_keys_cover_values_and_timing() {
    let mut t: serde_json::Value = serde_json::from_str(PROMO).unwrap();
    t["layers"][1]["duration"] = serde_json::json!("{outro}");
    let t = Template::from_json_str(&t.to_string()).unwrap();
    let keys: Vec<String> = t.placeholder_keys().into_iter().collect();
    assert_eq!(keys, vec!["image", "music", "outro", "title"]);
}

#[test]
fn unknown_layer_kind_is_a_template_error() {
    let src = r#"{ "canvas": { "width": 64, "height": 64 },
                   "layers": [ { "kind": "hologram", "value": "x" } ] }"#;
    let err = Template::from_json_str(src).unwrap_err();
    assert!(matches!(err, VidstampError::Template(_)), "{err}");
}

#[test]
fn malformed_json_is_a_template_error() {
    let err = Template::from_json_str("{ \"layers\": [").unwrap_err();
    assert!(err.to_string().starts_with("template error:"));
}

#[test]
fn structural_violations_are_rejected() {
    let cases = [
        r#"{ "layers": [] }"#,
        r#"{ "layers": [ { "kind": "audio", "value": "a.mp3", "duration": 2 } ] }"#,
        r#"{ "canvas": { "width": 63, "height": 64 }, "layers": [ { "kind": "text", "value": "x" } ] }"#,
        r#"{ "fps": 0, "layers": [ { "kind": "text", "value": "x" } ] }"#,
        r#"{ "layers": [ { "kind": "text", "value": "x", "duration": 0 } ] }"#,
        r#"{ "layers": [ { "kind": "text", "value": "x", "start": -1 } ] }"#,
        r#"{ "layers": [ { "kind": "image", "value": "  " } ] }"#,
        r#"{ "layers": [ { "kind": "image", "value": "a.png", "duration": 1,
                           "style": { "fade_in": 0.8, "fade_out": 0.8 } } ] }"#,
        r#"{ "version": "2", "layers": [ { "kind": "text", "value": "x" } ] }"#,
        r#"{ "preset": "tiktok", "canvas": { "width": 64, "height": 64 },
             "layers": [ { "kind": "text", "value": "x" } ] }"#,
        r#"{ "layers": [ { "kind": "text", "value": "x" } ], "colour": "red" }"#,
    ];
    for src in cases {
        let err = Template::from_json_str(src).unwrap_err();
        assert!(
            matches!(err, VidstampError::Template(_)),
            "expected template error for {src}, got {err}"
        );
    }
}

#[test]
fn preset_selects_canvas_and_override_returns_new_template() {
    let src = r#"{ "preset": "instagram-feed", "layers": [ { "kind": "text", "value": "x" } ] }"#;
    let t = Template::from_json_str(src).unwrap();
    assert_eq!(t.canvas(), Canvas::new(1080, 1080));

    let shorts = t.with_preset(OutputPreset::YoutubeShorts);
    assert_eq!(shorts.canvas(), Canvas::new(1080, 1920));
    assert_eq!(t.canvas(), Canvas::new(1080, 1080));
}

#[test]
fn default_canvas_is_landscape_hd() {
    let t = Template::from_json_str(r#"{ "layers": [ { "kind": "text", "value": "x" } ] }"#)
        .unwrap();
    assert_eq!(t.canvas(), Canvas::new(1920, 1080));
    assert_eq!(t.fps(), 30);
}

#[test]
fn serialized_template_reloads_identically() {
    let t = Template::from_json_str(PROMO).unwrap();
    let again = Template::from_json_str(&t.to_json_pretty().unwrap()).unwrap();
    assert_eq!(again.layers(), t.layers());
    assert_eq!(again.placeholder_keys(), t.placeholder_keys());
}
