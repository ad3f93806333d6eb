use super::*;
use caps::{Caps, CapsValue};

fn blueprint(codec: Codec, media_caps_name: &str) -> CodecBlueprint {
    let mut rtp_caps = codec.to_rtp_caps();
    if codec.id == CodecId::Any {
        rtp_caps.set("payload", CapsValue::IntRange(96, 127));
    }
    CodecBlueprint::new(codec, Caps::new(media_caps_name), rtp_caps)
}

fn pcmu_blueprint() -> CodecBlueprint {
    let mut codec = Codec::new(CodecId::Pt(0), MediaType::Audio, "PCMU", 8000);
    codec.channels = 1;
    blueprint(codec, "audio/x-mulaw")
}

fn ilbc_blueprint() -> CodecBlueprint {
    let mut codec = Codec::new(CodecId::Any, MediaType::Audio, "iLBC", 8000)
        .with_parameter("mode", "30");
    codec.channels = 1;
    blueprint(codec, "audio/x-iLBC")
}

fn speex_blueprint() -> CodecBlueprint {
    blueprint(
        Codec::new(CodecId::Any, MediaType::Audio, "SPEEX", 8000),
        "audio/x-speex",
    )
}

fn audio_blueprints() -> Vec<CodecBlueprint> {
    vec![pcmu_blueprint(), ilbc_blueprint(), speex_blueprint()]
}

fn no_previous() -> CodecAssociationMap {
    CodecAssociationMap::new()
}

#[test]
fn test_preferences_come_first() {
    let blueprints = audio_blueprints();
    let prefs = vec![
        Codec::new(CodecId::Any, MediaType::Audio, "iLBC", 0),
        Codec::new(CodecId::Any, MediaType::Audio, "PCMU", 0),
    ];

    let local =
        create_local_codec_associations(MediaType::Audio, &blueprints, &prefs, &no_previous())
            .unwrap();

    // preferred codecs lead the offer, in preference order
    assert_eq!(local.codecs[0].encoding_name, "iLBC");
    assert_eq!(local.codecs[0].id, CodecId::Pt(96));
    assert_eq!(local.codecs[0].clock_rate, 8000);
    assert_eq!(local.codecs[1].encoding_name, "PCMU");
    assert_eq!(local.codecs[1].id, CodecId::Pt(0));
    // the non-preferred SPEEX blueprint still gets offered afterwards
    assert_eq!(local.codecs[2].encoding_name, "SPEEX");
    assert_eq!(local.codecs[2].id, CodecId::Pt(97));

    for (pt, association) in &local.associations {
        assert_eq!(association.codec.id, CodecId::Pt(*pt));
    }
}

#[test]
fn test_blueprint_order_is_fallback_priority() {
    let blueprints = audio_blueprints();
    let local =
        create_local_codec_associations(MediaType::Audio, &blueprints, &[], &no_previous())
            .unwrap();

    let names: Vec<&str> = local
        .codecs
        .iter()
        .map(|c| c.encoding_name.as_str())
        .collect();
    assert_eq!(names, vec!["PCMU", "iLBC", "SPEEX"]);
    assert_eq!(local.codecs[0].id, CodecId::Pt(0));
    assert_eq!(local.codecs[1].id, CodecId::Pt(96));
    assert_eq!(local.codecs[2].id, CodecId::Pt(97));
}

#[test]
fn test_preference_fills_unspecified_fields_and_merges_params() {
    let blueprints = audio_blueprints();
    let prefs = vec![
        Codec::new(CodecId::Any, MediaType::Audio, "iLBC", 0).with_parameter("ptime", "20"),
    ];

    let local =
        create_local_codec_associations(MediaType::Audio, &blueprints, &prefs, &no_previous())
            .unwrap();

    let ilbc = &local.codecs[0];
    assert_eq!(ilbc.clock_rate, 8000);
    assert_eq!(ilbc.channels, 1);
    // preference parameters first, blueprint extras appended
    assert_eq!(ilbc.optional_params[0].name, "ptime");
    assert_eq!(ilbc.parameter("mode").map(|p| p.value.as_str()), Some("30"));
}

#[test]
fn test_preference_with_conflicting_shared_param_is_dropped() {
    let blueprints = audio_blueprints();
    // the discovered iLBC implementation only does mode=30
    let prefs = vec![
        Codec::new(CodecId::Any, MediaType::Audio, "iLBC", 0).with_parameter("mode", "20"),
        Codec::new(CodecId::Any, MediaType::Audio, "PCMU", 0),
    ];

    let local =
        create_local_codec_associations(MediaType::Audio, &blueprints, &prefs, &no_previous())
            .unwrap();
    assert_eq!(local.codecs[0].encoding_name, "PCMU");
    // iLBC is not gone, it just lost its preferred slot
    assert!(local.codecs.iter().any(|c| c.encoding_name == "iLBC"));
}

#[test]
fn test_static_pt_collision_moves_to_dynamic_range() {
    let blueprints = vec![ilbc_blueprint(), speex_blueprint()];
    let prefs = vec![
        Codec::new(CodecId::Pt(97), MediaType::Audio, "iLBC", 0),
        Codec::new(CodecId::Pt(97), MediaType::Audio, "SPEEX", 0),
    ];

    let local =
        create_local_codec_associations(MediaType::Audio, &blueprints, &prefs, &no_previous())
            .unwrap();

    assert_eq!(local.codecs[0].id, CodecId::Pt(97));
    assert_eq!(local.codecs[1].id, CodecId::Pt(96));
    assert_eq!(local.associations.len(), 2);
}

#[test]
fn test_dynamic_pts_avoid_previous_session() {
    let blueprints = audio_blueprints();

    let first =
        create_local_codec_associations(MediaType::Audio, &blueprints, &[], &no_previous())
            .unwrap();

    // a renegotiation with different preferences must not reuse dynamic
    // payload types from the previous table
    let prefs = vec![Codec::new(CodecId::Any, MediaType::Audio, "SPEEX", 0)];
    let second = create_local_codec_associations(
        MediaType::Audio,
        &blueprints,
        &prefs,
        &first.associations,
    )
    .unwrap();

    for pt in second.associations.keys() {
        if (96..=127).contains(pt) {
            assert!(
                !first.associations.contains_key(pt),
                "payload type {pt} was already in use"
            );
        }
    }
}

#[test]
fn test_disable_preference_excludes_blueprint() {
    let blueprints = audio_blueprints();
    let prefs = vec![Codec::new(CodecId::Disable, MediaType::Audio, "iLBC", 0)];

    let local =
        create_local_codec_associations(MediaType::Audio, &blueprints, &prefs, &no_previous())
            .unwrap();

    assert!(local.codecs.iter().all(|c| c.encoding_name != "iLBC"));
    assert!(local.codecs.iter().any(|c| c.encoding_name == "PCMU"));
}

#[test]
fn test_everything_disabled_is_a_failure() {
    let blueprints = vec![ilbc_blueprint()];
    let prefs = vec![Codec::new(CodecId::Disable, MediaType::Audio, "iLBC", 0)];

    assert_eq!(
        create_local_codec_associations(MediaType::Audio, &blueprints, &prefs, &no_previous()),
        Err(Error::ErrNoLocalCodecs)
    );
}

#[test]
fn test_no_blueprints_is_a_failure() {
    assert_eq!(
        create_local_codec_associations(MediaType::Audio, &[], &[], &no_previous()),
        Err(Error::ErrNoLocalCodecs)
    );
}

#[test]
fn test_dynamic_pt_exhaustion_aborts_the_build() {
    let blueprints = vec![ilbc_blueprint()];

    let mut previous = CodecAssociationMap::new();
    for pt in 96..=127u8 {
        previous.insert(
            pt,
            CodecAssociation {
                codec: Codec::new(CodecId::Pt(pt), MediaType::Audio, "X-OLD", 8000),
                blueprint: 0,
            },
        );
    }

    assert_eq!(
        create_local_codec_associations(MediaType::Audio, &blueprints, &[], &previous),
        Err(Error::ErrDynamicPayloadTypesExhausted)
    );
}

#[test]
fn test_blueprint_without_clock_rate_is_not_offered() {
    let no_rate = blueprint(
        Codec::new(CodecId::Any, MediaType::Audio, "X-RATELESS", 0),
        "audio/x-rateless",
    );
    let blueprints = vec![no_rate, pcmu_blueprint()];

    let local =
        create_local_codec_associations(MediaType::Audio, &blueprints, &[], &no_previous())
            .unwrap();
    assert_eq!(local.codecs.len(), 1);
    assert_eq!(local.codecs[0].encoding_name, "PCMU");
}

#[test]
fn test_build_is_deterministic() {
    let blueprints = audio_blueprints();
    let prefs = vec![
        Codec::new(CodecId::Any, MediaType::Audio, "SPEEX", 0),
        Codec::new(CodecId::Any, MediaType::Audio, "iLBC", 0),
    ];

    let first =
        create_local_codec_associations(MediaType::Audio, &blueprints, &prefs, &no_previous())
            .unwrap();
    let second =
        create_local_codec_associations(MediaType::Audio, &blueprints, &prefs, &no_previous())
            .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_validate_codec_preferences() {
    let blueprints = audio_blueprints();
    let prefs = vec![
        // fine: blueprint has the clock rate
        Codec::new(CodecId::Any, MediaType::Audio, "PCMU", 0),
        // wrong media type
        Codec::new(CodecId::Any, MediaType::Video, "H264", 90000),
        // nothing discovered speaks this
        Codec::new(CodecId::Any, MediaType::Audio, "G729", 8000),
        // clock rate disagrees with the blueprint
        Codec::new(CodecId::Any, MediaType::Audio, "PCMU", 16000),
    ];

    let valid = validate_codec_preferences(MediaType::Audio, &blueprints, &prefs);
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].encoding_name, "PCMU");
}

#[test]
fn test_validate_requires_a_clock_rate_somewhere() {
    let no_rate = blueprint(
        Codec::new(CodecId::Any, MediaType::Audio, "X-RATELESS", 0),
        "audio/x-rateless",
    );
    let prefs = vec![Codec::new(CodecId::Any, MediaType::Audio, "X-RATELESS", 0)];
    // neither side knows the clock rate: not usable
    assert!(validate_codec_preferences(MediaType::Audio, &[no_rate], &prefs).is_empty());
}
