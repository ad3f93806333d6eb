use caps::Caps;

use crate::codec::Codec;

/// One discovered, locally usable codec capability.
///
/// Carries the codec template derived from the wire capabilities, the raw
/// capability descriptors, and the element chains able to produce
/// (`send_pipelines`) or consume (`receive_pipelines`) this codec. Each
/// chain is an ordered list of element-factory names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecBlueprint {
    pub codec: Codec,
    /// Decoded-media capability descriptor.
    pub media_caps: Caps,
    /// RTP wire capability descriptor.
    pub rtp_caps: Caps,
    pub send_pipelines: Vec<Vec<String>>,
    pub receive_pipelines: Vec<Vec<String>>,
    /// A receive chain ends in a sink element.
    pub has_sink: bool,
    /// A send chain starts from a source element.
    pub has_src: bool,
    pub send_has_unique: bool,
    pub receive_has_unique: bool,
}

impl CodecBlueprint {
    pub fn new(codec: Codec, media_caps: Caps, rtp_caps: Caps) -> Self {
        CodecBlueprint {
            codec,
            media_caps,
            rtp_caps,
            send_pipelines: vec![],
            receive_pipelines: vec![],
            has_sink: false,
            has_src: false,
            send_has_unique: false,
            receive_has_unique: false,
        }
    }
}
