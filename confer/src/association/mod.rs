//! Local codec association building.
//!
//! Turns the discovered blueprints and the user's ordered codec preferences
//! into the list of locally offered codecs, each bound to a concrete payload
//! type. Preference order is authoritative; blueprint order is the fallback
//! priority for everything the user did not ask about.

#[cfg(test)]
mod association_test;

use std::collections::BTreeMap;

use log::{debug, warn};

use codec::codec::{DYNAMIC_PT_MAX, DYNAMIC_PT_MIN};
use codec::{Codec, CodecBlueprint, CodecId, MediaType};
use shared::error::{Error, Result};

/// A blueprint bound to a concrete payload type for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecAssociation {
    pub codec: Codec,
    /// Index of the originating blueprint in the session's blueprint list.
    pub blueprint: usize,
}

/// Payload-type table of one negotiation session.
pub type CodecAssociationMap = BTreeMap<u8, CodecAssociation>;

/// Outcome of association building: the payload-type table plus the codecs
/// in offer order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCodecAssociations {
    pub associations: CodecAssociationMap,
    pub codecs: Vec<Codec>,
}

/// Validates a codec preference list against the discovered blueprints.
///
/// Entries for the wrong media type and entries no blueprint can satisfy are
/// removed; the survivors keep their order.
pub fn validate_codec_preferences(
    media_type: MediaType,
    blueprints: &[CodecBlueprint],
    codec_prefs: &[Codec],
) -> Vec<Codec> {
    let mut valid = vec![];

    for codec in codec_prefs {
        if codec.media_type != media_type {
            debug!("preferred codec {codec} has the wrong media type");
            continue;
        }
        if !blueprints.iter().any(|bp| blueprint_accepts(bp, codec)) {
            debug!("preferred codec {codec} could not be matched with a blueprint");
            continue;
        }
        valid.push(codec.clone());
    }

    valid
}

/// Builds the local codec associations for one session.
///
/// `current_associations` is the previous session's table; payload types in
/// it are never handed out dynamically again, which keeps assignments stable
/// across a renegotiation. Running out of dynamic payload types aborts the
/// whole build.
pub fn create_local_codec_associations(
    media_type: MediaType,
    blueprints: &[CodecBlueprint],
    codec_prefs: &[Codec],
    current_associations: &CodecAssociationMap,
) -> Result<LocalCodecAssociations> {
    if blueprints.is_empty() {
        warn!("no blueprints for media type {media_type}");
        return Err(Error::ErrNoLocalCodecs);
    }

    let mut associations = CodecAssociationMap::new();
    let mut local_codecs = vec![];

    // first, build the preferred part of the table
    let mut pending = vec![];
    for codec_pref in codec_prefs {
        if codec_pref.media_type != media_type {
            debug!("preferred codec {codec_pref} has the wrong media type");
            continue;
        }
        // negative preferences only filter the blueprint pass below
        if codec_pref.id == CodecId::Disable {
            continue;
        }
        let Some(blueprint_index) = find_matching_blueprint(codec_pref, blueprints) else {
            debug!("preferred codec {codec_pref} could not be matched with a blueprint");
            continue;
        };
        let blueprint = &blueprints[blueprint_index];

        // the preference may leave the payload type and stream parameters
        // open, the blueprint fills them in
        let mut codec = codec_pref.clone();
        if codec.id == CodecId::Any {
            codec.id = blueprint.codec.id;
        }
        if codec.clock_rate == 0 {
            codec.clock_rate = blueprint.codec.clock_rate;
        }
        if codec.channels == 0 {
            codec.channels = blueprint.codec.channels;
        }
        for blueprint_param in &blueprint.codec.optional_params {
            if codec.parameter(&blueprint_param.name).is_none() {
                codec.add_optional_parameter(
                    blueprint_param.name.clone(),
                    blueprint_param.value.clone(),
                );
            }
        }

        pending.push(CodecAssociation {
            codec,
            blueprint: blueprint_index,
        });
    }

    // attribute payload types in preference order; whatever has no usable
    // payload type gets the first free dynamic one
    for mut association in pending {
        let pt = match association.codec.id.as_pt() {
            Some(pt) if !associations.contains_key(&pt) => pt,
            _ => next_dynamic_pt(&associations, current_associations).ok_or_else(|| {
                warn!("ran out of dynamic payload types");
                Error::ErrDynamicPayloadTypesExhausted
            })?,
        };
        association.codec.id = CodecId::Pt(pt);
        local_codecs.push(association.codec.clone());
        associations.insert(pt, association);
    }

    // then add every remaining usable blueprint
    for (blueprint_index, blueprint) in blueprints.iter().enumerate() {
        // without a known clock rate the codec cannot be offered
        if blueprint.codec.clock_rate == 0 {
            continue;
        }
        if associations
            .values()
            .any(|a| a.blueprint == blueprint_index)
        {
            continue;
        }
        if is_disabled(codec_prefs, blueprint) {
            debug!("codec {} disabled by config", blueprint.codec);
            continue;
        }

        let mut codec = blueprint.codec.clone();
        let pt = match codec.id.as_pt() {
            Some(pt) if !associations.contains_key(&pt) => pt,
            _ => next_dynamic_pt(&associations, current_associations).ok_or_else(|| {
                warn!("ran out of dynamic payload types");
                Error::ErrDynamicPayloadTypesExhausted
            })?,
        };
        codec.id = CodecId::Pt(pt);
        local_codecs.push(codec.clone());
        associations.insert(
            pt,
            CodecAssociation {
                codec,
                blueprint: blueprint_index,
            },
        );
    }

    if local_codecs.is_empty() {
        debug!("there are no local codecs for media type {media_type}");
        return Err(Error::ErrNoLocalCodecs);
    }

    Ok(LocalCodecAssociations {
        associations,
        codecs: local_codecs,
    })
}

/// Whether a blueprint can satisfy a preference entry.
///
/// The encoding names must match, the clock rate must agree when both sides
/// know it (and at least one side has to), and parameters specified by both
/// sides must carry the same value.
fn blueprint_accepts(blueprint: &CodecBlueprint, codec: &Codec) -> bool {
    if !blueprint.codec.same_encoding_name(codec) {
        return false;
    }

    let blueprint_rate = blueprint.codec.clock_rate;
    if blueprint_rate > 0 && codec.clock_rate > 0 && blueprint_rate != codec.clock_rate {
        return false;
    }
    if blueprint_rate == 0 && codec.clock_rate == 0 {
        return false;
    }

    for param in &codec.optional_params {
        if let Some(blueprint_param) = blueprint.codec.parameter(&param.name)
            && !blueprint_param.value.eq_ignore_ascii_case(&param.value)
        {
            return false;
        }
    }

    true
}

/// First blueprint able to satisfy the preference, in blueprint order.
fn find_matching_blueprint(codec: &Codec, blueprints: &[CodecBlueprint]) -> Option<usize> {
    let caps = codec.to_rtp_caps();
    blueprints
        .iter()
        .position(|bp| blueprint_accepts(bp, codec) && caps.intersects(&bp.rtp_caps))
}

/// A `Disable` preference disables any blueprint whose wire capabilities
/// intersect the descriptor derived from the preference entry.
fn is_disabled(codec_prefs: &[Codec], blueprint: &CodecBlueprint) -> bool {
    codec_prefs.iter().any(|codec| {
        codec.id == CodecId::Disable && codec.to_rtp_caps().intersects(&blueprint.rtp_caps)
    })
}

/// Lowest dynamic payload type free in both the table being built and the
/// previous session's table.
fn next_dynamic_pt(
    new_associations: &CodecAssociationMap,
    current_associations: &CodecAssociationMap,
) -> Option<u8> {
    (DYNAMIC_PT_MIN..=DYNAMIC_PT_MAX)
        .find(|pt| !new_associations.contains_key(pt) && !current_associations.contains_key(pt))
}
