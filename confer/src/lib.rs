#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! # Confer - codec negotiation core
//!
//! Everything needed to agree on codecs with a remote conferencing peer:
//!
//! - **Blueprint store** - per-media-type list of locally usable codec
//!   capabilities, discovered once and shared between sessions
//! - **Association builder** - merges user codec preferences with the
//!   discovered capabilities and assigns payload types, keeping dynamic
//!   assignments stable across renegotiation
//! - **SDP compatibility engine** - per-codec rules deciding whether a local
//!   and a remote codec description can interoperate, and what the agreed
//!   codec looks like
//!
//! The media framework around this crate supplies element capability lists
//! and consumes the negotiated codecs; no media is processed here.
//!
//! ## Example
//!
//! ```
//! use codec::{Codec, CodecId, MediaType};
//! use confer::negotiate_sdp_codec;
//!
//! let local = Codec::new(CodecId::Pt(96), MediaType::Audio, "iLBC", 8000)
//!     .with_parameter("mode", "20");
//! let remote = Codec::new(CodecId::Pt(102), MediaType::Audio, "iLBC", 8000)
//!     .with_parameter("mode", "30");
//!
//! // both ends must support 30ms frames, so disagreement settles on 30
//! let negotiated = negotiate_sdp_codec(&local, &remote).unwrap();
//! assert_eq!(negotiated.parameter("mode").unwrap().value, "30");
//! ```

pub mod association;
pub mod nego;
pub mod store;

pub use association::{
    CodecAssociation, CodecAssociationMap, LocalCodecAssociations,
    create_local_codec_associations, validate_codec_preferences,
};
pub use nego::{NegotiationRegistry, negotiate_sdp_codec};
pub use store::BlueprintStore;

pub use codec::{Codec, CodecBlueprint, CodecId, CodecParameter, MediaType};
