//! Per-codec SDP compatibility negotiation.
//!
//! [`NegotiationRegistry::negotiate`] decides whether a local and a remote
//! codec description can interoperate and what the agreed codec looks like.
//! Most codecs are handled by a generic rule; codecs whose parameters need
//! protocol-specific reconciliation register their own rule under their
//! (media type, encoding name) pair. Incompatibility is an expected outcome,
//! not an error: callers simply try the next remote candidate.


use log::debug;
use unicase::UniCase;

use codec::{Codec, MediaType};

/// A codec-specific compatibility rule.
pub type NegotiationFn = fn(&Codec, &Codec) -> Option<Codec>;

struct NegotiationRule {
    media_type: MediaType,
    encoding_name: String,
    negotiate: NegotiationFn,
}

/// Dispatch table of per-codec negotiation rules.
pub struct NegotiationRegistry {
    rules: Vec<NegotiationRule>,
}

impl Default for NegotiationRegistry {
    /// The built-in rule set: iLBC and H263-1998.
    fn default() -> Self {
        let mut registry = NegotiationRegistry::empty();
        registry.register(MediaType::Audio, "iLBC", negotiate_ilbc);
        registry.register(MediaType::Video, "H263-1998", negotiate_h263_1998);
        registry
    }
}

impl NegotiationRegistry {
    /// A registry without any codec-specific rules; everything goes through
    /// the generic rule.
    pub fn empty() -> Self {
        NegotiationRegistry { rules: vec![] }
    }

    /// Registers a rule for a codec, replacing any previous rule registered
    /// under the same (media type, encoding name) pair.
    pub fn register(
        &mut self,
        media_type: MediaType,
        encoding_name: impl Into<String>,
        negotiate: NegotiationFn,
    ) {
        let encoding_name = encoding_name.into();
        if let Some(rule) = self.rules.iter_mut().find(|rule| {
            rule.media_type == media_type
                && UniCase::new(rule.encoding_name.as_str()) == UniCase::new(encoding_name.as_str())
        }) {
            rule.negotiate = negotiate;
        } else {
            self.rules.push(NegotiationRule {
                media_type,
                encoding_name,
                negotiate,
            });
        }
    }

    /// Checks if a local and a remote codec are compatible and returns the
    /// negotiated codec, or `None` when they cannot interoperate.
    pub fn negotiate(&self, local_codec: &Codec, remote_codec: &Codec) -> Option<Codec> {
        if local_codec.media_type != remote_codec.media_type {
            debug!(
                "wrong media type, local: {}, remote: {}",
                local_codec.media_type, remote_codec.media_type
            );
            return None;
        }
        if !local_codec.same_encoding_name(remote_codec) {
            debug!(
                "encoding names dont match, local: {}, remote: {}",
                local_codec.encoding_name, remote_codec.encoding_name
            );
            return None;
        }

        for rule in &self.rules {
            if rule.media_type == remote_codec.media_type
                && UniCase::new(rule.encoding_name.as_str())
                    == UniCase::new(remote_codec.encoding_name.as_str())
            {
                return (rule.negotiate)(local_codec, remote_codec);
            }
        }

        negotiate_default(local_codec, remote_codec)
    }
}

/// Negotiates one local against one remote codec with the built-in rules.
pub fn negotiate_sdp_codec(local_codec: &Codec, remote_codec: &Codec) -> Option<Codec> {
    NegotiationRegistry::default().negotiate(local_codec, remote_codec)
}

/// Generic rule: clock rate and channel count must agree where both sides
/// specify them, and every parameter the local side specifies must either
/// match the remote value or be absent remotely (in which case it is carried
/// into the result). The negotiated codec is based on the remote one.
fn negotiate_default(local_codec: &Codec, remote_codec: &Codec) -> Option<Codec> {
    debug!("using default codec negotiation");

    if local_codec.clock_rate > 0
        && remote_codec.clock_rate > 0
        && local_codec.clock_rate != remote_codec.clock_rate
    {
        debug!(
            "clock rates differ local={} remote={}",
            local_codec.clock_rate, remote_codec.clock_rate
        );
        return None;
    }
    if local_codec.channels > 0
        && remote_codec.channels > 0
        && local_codec.channels != remote_codec.channels
    {
        debug!(
            "channel counts differ local={} remote={}",
            local_codec.channels, remote_codec.channels
        );
        return None;
    }

    let mut negotiated_codec = remote_codec.clone();

    // fix up missing clock rate and channel count from our side
    if negotiated_codec.channels == 0 && local_codec.channels > 0 {
        negotiated_codec.channels = local_codec.channels;
    }
    if negotiated_codec.clock_rate == 0 {
        negotiated_codec.clock_rate = local_codec.clock_rate;
    }

    for local_param in &local_codec.optional_params {
        if let Some(negotiated_param) = negotiated_codec.parameter(&local_param.name) {
            if negotiated_param.value != local_param.value {
                debug!(
                    "different values for {}, local={} remote={}",
                    local_param.name, local_param.value, negotiated_param.value
                );
                return None;
            }
        } else {
            negotiated_codec
                .add_optional_parameter(local_param.name.clone(), local_param.value.clone());
        }
    }

    Some(negotiated_codec)
}

/// The iLBC frame mode, when one is specified. Anything but the 20ms and
/// 30ms frames of RFC 3952 is invalid.
fn ilbc_mode(ilbc: &Codec) -> std::result::Result<Option<i32>, ()> {
    let Some(param) = ilbc.parameter("mode") else {
        return Ok(None);
    };
    match param.value.trim().parse::<i32>() {
        Ok(20) => Ok(Some(20)),
        Ok(30) => Ok(Some(30)),
        _ => Err(()),
    }
}

/// iLBC rule: like the generic rule, except for the "mode" parameter. All
/// implementations must support 30ms frames, so when the two sides disagree
/// the negotiated mode is 30, and a codec without any mode still gets
/// mode=30 since the parameter is mandatory on the wire.
fn negotiate_ilbc(local_codec: &Codec, remote_codec: &Codec) -> Option<Codec> {
    debug!("using ilbc negotiation");

    if local_codec.clock_rate > 0
        && remote_codec.clock_rate > 0
        && local_codec.clock_rate != remote_codec.clock_rate
    {
        debug!(
            "clock rates differ local={} remote={}",
            local_codec.clock_rate, remote_codec.clock_rate
        );
        return None;
    }
    if local_codec.channels > 0
        && remote_codec.channels > 0
        && local_codec.channels != remote_codec.channels
    {
        debug!(
            "channel counts differ local={} remote={}",
            local_codec.channels, remote_codec.channels
        );
        return None;
    }

    let local_mode = match ilbc_mode(local_codec) {
        Ok(mode) => mode,
        Err(()) => {
            debug!("invalid mode on local ilbc");
            return None;
        }
    };
    let remote_mode = match ilbc_mode(remote_codec) {
        Ok(mode) => mode,
        Err(()) => {
            debug!("invalid mode on remote ilbc");
            return None;
        }
    };

    let mut negotiated_codec = remote_codec.clone();

    if negotiated_codec.channels == 0 && local_codec.channels > 0 {
        negotiated_codec.channels = local_codec.channels;
    }
    if negotiated_codec.clock_rate == 0 {
        negotiated_codec.clock_rate = local_codec.clock_rate;
    }

    // every parameter other than the mode follows the generic rule
    for local_param in &local_codec.optional_params {
        if UniCase::new(local_param.name.as_str()) == UniCase::new("mode") {
            continue;
        }
        if let Some(negotiated_param) = negotiated_codec.parameter(&local_param.name) {
            if negotiated_param.value != local_param.value {
                debug!(
                    "different values for {}, local={} remote={}",
                    local_param.name, local_param.value, negotiated_param.value
                );
                return None;
            }
        } else {
            negotiated_codec
                .add_optional_parameter(local_param.name.clone(), local_param.value.clone());
        }
    }

    let mode = match (local_mode, remote_mode) {
        (Some(local), Some(remote)) if local == remote => local,
        // a remote mode we did not contradict stands
        (None, Some(remote)) => remote,
        // disagreement, or nobody said anything: 30ms frames
        _ => 30,
    };
    set_parameter(&mut negotiated_codec, "mode", &mode.to_string());

    Some(negotiated_codec)
}

/// H263-1998 rule: the remote side must use the fixed 90kHz clock and at
/// most one channel. A remote "profile" has to be known and identical
/// locally; the answer is then our own codec under the remote payload type.
fn negotiate_h263_1998(local_codec: &Codec, remote_codec: &Codec) -> Option<Codec> {
    debug!("using H263-1998 negotiation");

    if remote_codec.clock_rate != 90000 {
        debug!(
            "remote clock rate is {} which is not 90000",
            remote_codec.clock_rate
        );
        return None;
    }
    if remote_codec.channels > 1 {
        debug!("channel count {} > 1", remote_codec.channels);
        return None;
    }

    let mut remote_profiles = remote_codec
        .optional_params
        .iter()
        .filter(|p| UniCase::new(p.name.as_str()) == UniCase::new("profile"));
    let remote_profile = remote_profiles.next();
    if remote_profiles.next().is_some() {
        debug!("remote codec has the profile parameter more than once, ignoring");
        return None;
    }

    let Some(remote_profile) = remote_profile else {
        // no profile offered: answer with our own codec, untouched. The
        // payload type stays the local one on this path; only the
        // matching-profile path below adopts the remote id.
        return Some(local_codec.clone());
    };

    let Some(local_profile) = local_codec.parameter("profile") else {
        debug!(
            "profile ({}) is unknown locally, rejecting",
            remote_profile.value
        );
        return None;
    };
    if !local_profile.value.eq_ignore_ascii_case(&remote_profile.value) {
        debug!(
            "local ({}) and remote ({}) profiles are different",
            local_profile.value, remote_profile.value
        );
        return None;
    }

    // same profile: our own codec under the remote payload type
    let mut negotiated_codec = local_codec.clone();
    negotiated_codec.id = remote_codec.id;
    Some(negotiated_codec)
}

/// Replaces a parameter value in place, or appends it when missing.
fn set_parameter(codec: &mut Codec, name: &str, value: &str) {
    for param in &mut codec.optional_params {
        if UniCase::new(param.name.as_str()) == UniCase::new(name) {
            param.value = value.to_owned();
            return;
        }
    }
    codec.add_optional_parameter(name, value);
}
