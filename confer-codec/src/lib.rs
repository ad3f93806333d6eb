#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! Codec model, blueprint cache and capability discovery.
//!
//! A [`CodecBlueprint`](blueprint::CodecBlueprint) captures one locally
//! usable codec: the RTP-level description of its wire format plus the
//! element chains able to produce and consume it. Blueprints are built by
//! [`discover`] from framework-supplied element capabilities and persisted
//! between runs by [`cache`].

pub mod blueprint;
pub mod cache;
pub mod codec;
pub mod discover;

pub use blueprint::CodecBlueprint;
pub use codec::{Codec, CodecId, CodecParameter, MediaType};
pub use discover::Discoverer;
