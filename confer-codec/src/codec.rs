use std::fmt;

use caps::{Caps, CapsValue};
use unicase::UniCase;

/// First payload type of the dynamic range.
pub const DYNAMIC_PT_MIN: u8 = 96;
/// Last payload type of the dynamic range.
pub const DYNAMIC_PT_MAX: u8 = 127;

/// Media kind of a codec.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
}

impl MediaType {
    /// Parses the `media` field of an RTP capability descriptor.
    pub fn from_media_str(raw: &str) -> Option<MediaType> {
        match raw {
            "audio" => Some(MediaType::Audio),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }

    /// Media byte used in the codecs cache magic header.
    pub(crate) fn cache_tag(&self) -> u8 {
        match self {
            MediaType::Audio => b'A',
            MediaType::Video => b'V',
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        };
        write!(f, "{s}")
    }
}

/// Payload-type identifier of a codec.
///
/// Concrete payload types live in `[0, 127]`; `[96, 127]` is the dynamic
/// range handed out during association building.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CodecId {
    /// No payload type chosen yet; one is assigned during association
    /// building.
    Any,
    /// Preference-list sentinel: disable every capability matching this
    /// entry instead of selecting it.
    Disable,
    /// A concrete payload type in `[0, 127]`.
    Pt(u8),
}

impl CodecId {
    /// The concrete payload type, if one is set and in range.
    pub fn as_pt(&self) -> Option<u8> {
        match self {
            CodecId::Pt(pt) if *pt <= DYNAMIC_PT_MAX => Some(*pt),
            _ => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, CodecId::Pt(pt) if (DYNAMIC_PT_MIN..=DYNAMIC_PT_MAX).contains(pt))
    }

    /// Signed form used by the blueprint cache.
    pub(crate) fn to_raw(self) -> i32 {
        match self {
            CodecId::Any => -1,
            CodecId::Disable => -2,
            CodecId::Pt(pt) => pt as i32,
        }
    }

    pub(crate) fn from_raw(raw: i32) -> Option<CodecId> {
        match raw {
            -1 => Some(CodecId::Any),
            -2 => Some(CodecId::Disable),
            0..=127 => Some(CodecId::Pt(raw as u8)),
            _ => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecId::Any => write!(f, "any"),
            CodecId::Disable => write!(f, "disabled"),
            CodecId::Pt(pt) => write!(f, "{pt}"),
        }
    }
}

/// One `a=fmtp`-style optional parameter.
///
/// Parameter order is preserved for serialization; lookups compare names
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecParameter {
    pub name: String,
    pub value: String,
}

/// One codec description, either discovered locally, configured as a
/// preference, or received from the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    pub id: CodecId,
    pub media_type: MediaType,
    /// SDP encoding name, compared case-insensitively.
    pub encoding_name: String,
    /// Clock rate in Hz, 0 when unspecified.
    pub clock_rate: u32,
    /// Audio channel count, 0 when unspecified.
    pub channels: u32,
    pub optional_params: Vec<CodecParameter>,
}

impl Codec {
    pub fn new(
        id: CodecId,
        media_type: MediaType,
        encoding_name: impl Into<String>,
        clock_rate: u32,
    ) -> Self {
        Codec {
            id,
            media_type,
            encoding_name: encoding_name.into(),
            clock_rate,
            channels: 0,
            optional_params: vec![],
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_optional_parameter(name, value);
        self
    }

    pub fn add_optional_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.optional_params.push(CodecParameter {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Case-insensitive optional-parameter lookup.
    pub fn parameter(&self, name: &str) -> Option<&CodecParameter> {
        self.optional_params
            .iter()
            .find(|p| UniCase::new(p.name.as_str()) == UniCase::new(name))
    }

    /// Whether the encoding names match, ignoring case.
    pub fn same_encoding_name(&self, other: &Codec) -> bool {
        UniCase::new(self.encoding_name.as_str()) == UniCase::new(other.encoding_name.as_str())
    }

    /// Synthesizes the RTP capability descriptor for this codec.
    ///
    /// Used to match preferences (including `Disable` entries) against
    /// blueprint wire capabilities. Unspecified fields are simply left out
    /// so they do not constrain the intersection.
    pub fn to_rtp_caps(&self) -> Caps {
        let mut caps = Caps::new("application/x-rtp")
            .with_field("media", CapsValue::str(self.media_type.to_string()));
        if let Some(pt) = self.id.as_pt() {
            caps.set("payload", CapsValue::Int(pt as i32));
        }
        if self.clock_rate > 0 {
            caps.set("clock-rate", CapsValue::Int(self.clock_rate as i32));
        }
        if !self.encoding_name.is_empty() {
            caps.set(
                "encoding-name",
                CapsValue::str(self.encoding_name.to_ascii_uppercase()),
            );
        }
        if self.channels > 0 {
            caps.set("encoding-params", CapsValue::str(self.channels.to_string()));
        }
        for param in &self.optional_params {
            caps.set(param.name.clone(), CapsValue::str(param.value.clone()));
        }
        caps
    }

    /// Derives a codec from an RTP capability descriptor.
    ///
    /// Returns `None` when a known field carries an unexpected type, in
    /// which case the whole structure must be skipped by the caller.
    ///
    /// Field semantics:
    /// - `media`: selects the media kind, other strings leave the given
    ///   default untouched
    /// - `payload`: an exact integer is a static payload type (values above
    ///   96 are invalid as fixed assignments), a range must stay within
    ///   `[96, 255]` and leaves the id unassigned
    /// - `clock-rate`: an exact integer sets the rate, a range leaves it
    ///   unspecified for negotiation
    /// - `encoding-name`: first string value wins
    /// - `encoding-params`: channel count, parsed from a string
    /// - `ssrc`, `clock-base`, `seqnum-base`: ignored
    /// - anything else string-valued becomes an optional parameter
    pub fn from_rtp_caps(media_type: MediaType, caps: &Caps) -> Option<Codec> {
        let mut codec = Codec::new(CodecId::Any, media_type, "", 0);

        for (name, value) in caps.fields() {
            match name {
                "media" => match value {
                    CapsValue::Str(s) => {
                        if let Some(media_type) = MediaType::from_media_str(s) {
                            codec.media_type = media_type;
                        }
                    }
                    _ => return None,
                },
                "payload" => match value {
                    CapsValue::Int(id) => {
                        if *id < 0 || *id > 96 {
                            return None;
                        }
                        codec.id = CodecId::Pt(*id as u8);
                    }
                    CapsValue::IntRange(min, max) => {
                        if *min < 96 || *max > 255 {
                            return None;
                        }
                    }
                    CapsValue::Str(_) => return None,
                },
                "clock-rate" => match value {
                    CapsValue::Int(rate) => {
                        if *rate < 0 {
                            return None;
                        }
                        codec.clock_rate = *rate as u32;
                    }
                    // left for the parameter negotiation to settle
                    CapsValue::IntRange(..) => codec.clock_rate = 0,
                    CapsValue::Str(_) => return None,
                },
                "ssrc" | "clock-base" | "seqnum-base" => {}
                "encoding-name" => match value {
                    CapsValue::Str(s) => {
                        if codec.encoding_name.is_empty() {
                            codec.encoding_name = s.clone();
                        }
                    }
                    _ => return None,
                },
                "encoding-params" => match value {
                    CapsValue::Str(s) => {
                        codec.channels = s.trim().parse().unwrap_or(0);
                    }
                    _ => return None,
                },
                _ => {
                    if let CapsValue::Str(s) = value {
                        codec.add_optional_parameter(name, s.clone());
                    }
                }
            }
        }

        Some(codec)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} clock:{} channels:{}",
            self.id, self.media_type, self.encoding_name, self.clock_rate, self.channels
        )?;
        for param in &self.optional_params {
            write!(f, " {}={}", param.name, param.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_lookup_is_case_insensitive() {
        let codec = Codec::new(CodecId::Any, MediaType::Audio, "iLBC", 8000)
            .with_parameter("Mode", "30");
        assert_eq!(codec.parameter("mode").map(|p| p.value.as_str()), Some("30"));
        assert_eq!(codec.parameter("MODE").map(|p| p.value.as_str()), Some("30"));
        assert!(codec.parameter("ptime").is_none());
    }

    #[test]
    fn test_to_rtp_caps_skips_unspecified_fields() {
        let codec = Codec::new(CodecId::Any, MediaType::Audio, "iLBC", 0);
        let caps = codec.to_rtp_caps();
        assert_eq!(caps.field("media"), Some(&CapsValue::str("audio")));
        assert_eq!(caps.field("encoding-name"), Some(&CapsValue::str("ILBC")));
        assert!(caps.field("payload").is_none());
        assert!(caps.field("clock-rate").is_none());
        assert!(caps.field("encoding-params").is_none());
    }

    #[test]
    fn test_from_rtp_caps_static_payload() {
        let caps = Caps::new("application/x-rtp")
            .with_field("media", CapsValue::str("audio"))
            .with_field("payload", CapsValue::Int(0))
            .with_field("clock-rate", CapsValue::Int(8000))
            .with_field("encoding-name", CapsValue::str("PCMU"));
        let codec = Codec::from_rtp_caps(MediaType::Audio, &caps).unwrap();
        assert_eq!(codec.id, CodecId::Pt(0));
        assert_eq!(codec.clock_rate, 8000);
        assert_eq!(codec.encoding_name, "PCMU");
    }

    #[test]
    fn test_from_rtp_caps_dynamic_range() {
        let caps = Caps::new("application/x-rtp")
            .with_field("media", CapsValue::str("video"))
            .with_field("payload", CapsValue::IntRange(96, 127))
            .with_field("clock-rate", CapsValue::IntRange(1, 2147483647))
            .with_field("encoding-name", CapsValue::str("H263-1998"));
        let codec = Codec::from_rtp_caps(MediaType::Video, &caps).unwrap();
        assert_eq!(codec.id, CodecId::Any);
        assert_eq!(codec.clock_rate, 0);
        assert_eq!(codec.media_type, MediaType::Video);
    }

    #[test]
    fn test_from_rtp_caps_rejects_fixed_dynamic_payload() {
        let caps = Caps::new("application/x-rtp")
            .with_field("media", CapsValue::str("audio"))
            .with_field("payload", CapsValue::Int(97));
        assert!(Codec::from_rtp_caps(MediaType::Audio, &caps).is_none());

        // 96 itself is still accepted as an exact value
        let caps = Caps::new("application/x-rtp")
            .with_field("media", CapsValue::str("audio"))
            .with_field("payload", CapsValue::Int(96));
        assert!(Codec::from_rtp_caps(MediaType::Audio, &caps).is_some());
    }

    #[test]
    fn test_from_rtp_caps_rejects_bad_field_types() {
        let caps = Caps::new("application/x-rtp")
            .with_field("media", CapsValue::Int(1));
        assert!(Codec::from_rtp_caps(MediaType::Audio, &caps).is_none());

        let caps = Caps::new("application/x-rtp")
            .with_field("encoding-name", CapsValue::Int(5));
        assert!(Codec::from_rtp_caps(MediaType::Audio, &caps).is_none());

        let caps = Caps::new("application/x-rtp")
            .with_field("payload", CapsValue::IntRange(0, 127));
        assert!(Codec::from_rtp_caps(MediaType::Audio, &caps).is_none());
    }

    #[test]
    fn test_from_rtp_caps_collects_optional_params() {
        let caps = Caps::new("application/x-rtp")
            .with_field("media", CapsValue::str("audio"))
            .with_field("encoding-name", CapsValue::str("iLBC"))
            .with_field("mode", CapsValue::str("30"))
            .with_field("ssrc", CapsValue::str("12345"))
            .with_field("some-number", CapsValue::Int(42));
        let codec = Codec::from_rtp_caps(MediaType::Audio, &caps).unwrap();
        assert_eq!(codec.optional_params.len(), 1);
        assert_eq!(codec.parameter("mode").map(|p| p.value.as_str()), Some("30"));
    }

    #[test]
    fn test_codec_id_raw_round_trip() {
        for id in [CodecId::Any, CodecId::Disable, CodecId::Pt(0), CodecId::Pt(127)] {
            assert_eq!(CodecId::from_raw(id.to_raw()), Some(id));
        }
        assert_eq!(CodecId::from_raw(128), None);
        assert_eq!(CodecId::from_raw(-3), None);
    }
}
