use super::*;

#[test]
fn empty_object_gives_defaults() {
    let cfg = BatchConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, BatchConfig::default());
    let o = cfg.batch_options();
    assert_eq!(o.concurrency_limit, 3);
    assert_eq!(o.max_retries, 2);
    assert_eq!(o.retry_backoff, Duration::from_millis(500));
    assert_eq!(o.skip_policy, SkipPolicy::Fingerprint);
    assert_eq!(cfg.encoder.video_codec, "libx264");
}

#[test]
fn partial_files_override_selected_fields() {
    let cfg = BatchConfig::from_json_str(
        r#"{ "concurrency_limit": 8, "skip_policy": "never", "extension": "mov",
             "encoder": { "preset": "medium", "crf": 20 } }"#,
    )
    .unwrap();
    assert_eq!(cfg.concurrency_limit, 8);
    assert_eq!(cfg.skip_policy, SkipPolicy::Never);
    assert_eq!(cfg.encoder.preset, "medium");
    assert_eq!(cfg.encoder.crf, Some(20));
    assert_eq!(cfg.encoder.audio_codec, "aac");
    assert_eq!(
        cfg.bind_context("/assets").output_path_for("7"),
        Path::new("output").join("7.mov")
    );
}

#[test]
fn invalid_values_are_config_errors() {
    for json in [
        r#"{ "concurrency_limit": 0 }"#,
        r#"{ "extension": ".mp4" }"#,
        r#"{ "extension": "" }"#,
        r#"{ "max_cached_assets": 0 }"#,
        r#"{ "threads": 4 }"#,
        r#"{ "skip_policy": "sometimes" }"#,
    ] {
        let err = BatchConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, VidstampError::Config(_)), "{json}: {err}");
    }
}

#[test]
fn backoff_cap_never_undercuts_the_base() {
    let cfg = BatchConfig {
        retry_backoff_ms: 2000,
        max_backoff_ms: 100,
        ..BatchConfig::default()
    };
    assert_eq!(cfg.batch_options().max_backoff, Duration::from_millis(2000));
}

#[test]
fn from_path_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let err = BatchConfig::from_path(dir.path().join("nope.json")).unwrap_err();
    assert!(err.to_string().contains("nope.json"));
}
