use super::*;

#[test]
fn canvas_validation_rejects_zero_and_odd() {
    assert!(Canvas::new(0, 10).validate().is_err());
    assert!(Canvas::new(11, 10).validate().is_err());
    assert!(Canvas::new(10, 9).validate().is_err());
    assert!(Canvas::new(1080, 1920).validate().is_ok());
}

#[test]
fn every_preset_has_a_valid_canvas_and_round_trips_its_name() {
    for preset in OutputPreset::ALL {
        preset.canvas().validate().unwrap();
        assert_eq!(preset.name().parse::<OutputPreset>().unwrap(), preset);
    }
}

#[test]
fn preset_parsing_is_lenient_about_case_and_separators() {
    assert_eq!(
        "YouTube Shorts".parse::<OutputPreset>().unwrap(),
        OutputPreset::YoutubeShorts
    );
    assert_eq!(
        "instagram_feed".parse::<OutputPreset>().unwrap(),
        OutputPreset::InstagramFeed
    );
    let err = "vhs".parse::<OutputPreset>().unwrap_err();
    assert!(err.to_string().contains("unknown output preset"));
}

#[test]
fn preset_resolutions_match_known_targets() {
    assert_eq!(OutputPreset::InstagramFeed.canvas(), Canvas::new(1080, 1080));
    assert_eq!(OutputPreset::YoutubeVideo.canvas(), Canvas::new(1920, 1080));
    assert_eq!(OutputPreset::Tiktok.canvas(), Canvas::new(1080, 1920));
    assert_eq!(OutputPreset::FacebookFeed.canvas(), Canvas::new(1200, 628));
    assert_eq!(OutputPreset::Cover.canvas(), Canvas::new(800, 320));
}

#[test]
fn color_accepts_array_and_hex() {
    let a: Rgb8 = serde_json::from_str("[255, 0, 16]").unwrap();
    let b: Rgb8 = serde_json::from_str("\"#ff0010\"").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_ffmpeg(), "0xFF0010");
    assert!(serde_json::from_str::<Rgb8>("\"red\"").is_err());
}

#[test]
fn seconds_formatting_is_compact() {
    assert_eq!(fmt_secs(3.0), "3");
    assert_eq!(fmt_secs(2.5), "2.5");
    assert_eq!(fmt_secs(0.0), "0");
    assert_eq!(fmt_secs(1.23456), "1.235");
}
