//! Capability-set algebra behind codec discovery.
//!
//! The surrounding media framework knows which element factories exist and
//! what their pad capabilities look like; everything framework-bound stays on
//! that side of the [`DiscoveredElement`] boundary. This module owns the
//! algorithm that turns those lists into duplex codec blueprints: find all
//! encoder/payloader and depayloader/decoder capability pairs, intersect the
//! two directions, drop dynamic duplicates of static payload types and parse
//! whatever remains into [`CodecBlueprint`]s.


use std::collections::HashMap;

use log::{debug, warn};
use unicase::UniCase;

use crate::blueprint::CodecBlueprint;
use crate::codec::{Codec, MediaType};
use caps::{Caps, CapsValue};
use shared::error::{Error, Result};

/// Produces the codec blueprints for one media type.
///
/// [`ElementListDiscoverer`] implements this over a static element list; an
/// application may plug in anything else (for instance a live registry
/// scan).
pub trait Discoverer {
    fn discover(&self, media_type: MediaType) -> Result<Vec<CodecBlueprint>>;
}

/// One element factory as reported by the surrounding media framework.
#[derive(Debug, Clone)]
pub struct DiscoveredElement {
    pub factory_name: String,
    /// Classification path such as `Codec/Encoder/Audio` or
    /// `Codec/Payloader/Network`.
    pub klass: String,
    pub src_caps: Vec<Caps>,
    pub sink_caps: Vec<Caps>,
}

impl DiscoveredElement {
    pub fn new(factory_name: impl Into<String>, klass: impl Into<String>) -> Self {
        DiscoveredElement {
            factory_name: factory_name.into(),
            klass: klass.into(),
            src_caps: vec![],
            sink_caps: vec![],
        }
    }

    pub fn with_src_caps(mut self, caps: Caps) -> Self {
        self.src_caps.push(caps);
        self
    }

    pub fn with_sink_caps(mut self, caps: Caps) -> Self {
        self.sink_caps.push(caps);
        self
    }
}

/// Discovers duplex codec blueprints from an element capability list.
///
/// Elements are considered in list order, which becomes the blueprint
/// priority order. `unique_elements` names factories that cannot be
/// instantiated more than once; chains using them are flagged on the
/// resulting blueprints.
pub fn discover_codec_blueprints(
    media_type: MediaType,
    elements: &[DiscoveredElement],
    unique_elements: &[String],
) -> Result<Vec<CodecBlueprint>> {
    let rtp_filter = Caps::new("application/x-rtp")
        .with_field("media", CapsValue::str(media_type.to_string()));

    let recv_list = detect_recv_codecs(elements, &rtp_filter);
    let send_list = detect_send_codecs(elements, &rtp_filter);
    if recv_list.is_empty() && send_list.is_empty() {
        warn!("no codecs for media type {media_type} detected");
        return Err(Error::ErrNoCodecCapabilities);
    }

    let duplex_list = codec_cap_list_intersect(&recv_list, &send_list);
    if duplex_list.is_empty() {
        warn!("there are no duplex send/recv codecs");
        return Err(Error::ErrNoCodecCapabilities);
    }

    let duplex_list = remove_dynamic_duplicates(duplex_list);
    if duplex_list.is_empty() {
        warn!("dynamic duplicate removal left no codecs");
        return Err(Error::ErrNoCodecCapabilities);
    }

    let klasses: HashMap<&str, &str> = elements
        .iter()
        .map(|e| (e.factory_name.as_str(), e.klass.as_str()))
        .collect();

    let mut blueprints = vec![];
    for codec_cap in duplex_list {
        let Some(rtp_caps) = codec_cap.rtp_caps.clone() else {
            continue;
        };
        let Some(codec) = Codec::from_rtp_caps(media_type, &rtp_caps) else {
            debug!("skipping {rtp_caps}, unusable wire capability field");
            continue;
        };
        if codec.encoding_name.is_empty() {
            debug!(
                "skipping codec {}/unknown, no encoding name specified (pt: {} clock_rate: {})",
                codec.media_type, codec.id, codec.clock_rate
            );
            continue;
        }

        let consistent = match codec.media_type {
            MediaType::Video => validate_h263_codecs(&codec_cap),
            MediaType::Audio => validate_amr_codecs(&codec_cap),
        };
        if !consistent {
            continue;
        }

        let mut blueprint = CodecBlueprint::new(codec, codec_cap.caps.clone(), rtp_caps);
        blueprint.send_pipelines = vec![codec_cap.elements2.clone()];
        blueprint.receive_pipelines = vec![codec_cap.elements1.clone()];
        blueprint.has_src = chain_has_klass(&codec_cap.elements2, &klasses, "Source");
        blueprint.has_sink = chain_has_klass(&codec_cap.elements1, &klasses, "Sink");
        blueprint.send_has_unique = chain_has_unique(&codec_cap.elements2, unique_elements);
        blueprint.receive_has_unique = chain_has_unique(&codec_cap.elements1, unique_elements);

        debug!(
            "adding codec {} with pt {}",
            blueprint.codec.encoding_name, blueprint.codec.id
        );

        if blueprint.codec.encoding_name.eq_ignore_ascii_case("H263-1998") {
            // the same wire format is also offered under the N800 alias
            let mut variant = blueprint.clone();
            variant.codec.encoding_name = "H263-N800".to_owned();
            blueprints.push(blueprint);
            blueprints.push(variant);
        } else {
            blueprints.push(blueprint);
        }
    }

    Ok(blueprints)
}

/// Discovers blueprints from a fixed element list handed over by the
/// application.
pub struct ElementListDiscoverer {
    elements: Vec<DiscoveredElement>,
    unique_elements: Vec<String>,
}

impl ElementListDiscoverer {
    pub fn new(elements: Vec<DiscoveredElement>) -> Self {
        ElementListDiscoverer {
            elements,
            unique_elements: vec![],
        }
    }

    pub fn with_unique_elements(mut self, unique_elements: Vec<String>) -> Self {
        self.unique_elements = unique_elements;
        self
    }
}

impl Discoverer for ElementListDiscoverer {
    fn discover(&self, media_type: MediaType) -> Result<Vec<CodecBlueprint>> {
        discover_codec_blueprints(media_type, &self.elements, &self.unique_elements)
    }
}

/// One capability with the element chains able to handle it.
///
/// Two chain slots so the sides stay separated after an intersection.
#[derive(Debug, Clone)]
struct CodecCap {
    caps: Caps,
    rtp_caps: Option<Caps>,
    elements1: Vec<String>,
    elements2: Vec<String>,
}

fn klass_contains(klass: &str, needle: &str) -> bool {
    klass.split('/').any(|segment| segment == needle)
}

fn src_caps(element: &DiscoveredElement) -> &[Caps] {
    &element.src_caps
}

fn sink_caps(element: &DiscoveredElement) -> &[Caps] {
    &element.sink_caps
}

fn is_payloader(element: &DiscoveredElement) -> bool {
    klass_contains(&element.klass, "Payloader") && klass_contains(&element.klass, "Network")
}

fn is_depayloader(element: &DiscoveredElement) -> bool {
    klass_contains(&element.klass, "Network")
        && (klass_contains(&element.klass, "Depayloader")
            || klass_contains(&element.klass, "Depayr"))
}

fn is_encoder(element: &DiscoveredElement) -> bool {
    // some sources provide a non-raw stream directly
    klass_contains(&element.klass, "Encoder") || klass_contains(&element.klass, "Source")
}

fn is_decoder(element: &DiscoveredElement) -> bool {
    // some sinks consume encoded data directly
    klass_contains(&element.klass, "Decoder") || klass_contains(&element.klass, "Sink")
}

/// Collects the media-side capabilities of every element passing `filter`.
///
/// With an `rtp_filter`, only elements whose wire side intersects it are
/// kept, and each entry carries that intersection as its RTP capability.
fn collect_codec_caps(
    elements: &[DiscoveredElement],
    filter: fn(&DiscoveredElement) -> bool,
    rtp_filter: Option<&Caps>,
    media_side: fn(&DiscoveredElement) -> &[Caps],
) -> Vec<CodecCap> {
    let mut list: Vec<CodecCap> = vec![];

    for element in elements.iter().filter(|e| filter(e)) {
        let rtp_matches: Vec<Caps> = match rtp_filter {
            Some(filter_caps) => {
                let matches: Vec<Caps> = element
                    .src_caps
                    .iter()
                    .chain(element.sink_caps.iter())
                    .filter_map(|c| c.intersect(filter_caps))
                    .collect();
                if matches.is_empty() {
                    continue;
                }
                matches
            }
            None => vec![],
        };

        for media_caps in media_side(element) {
            // elements like rtpdepay expose the wire format on both sides
            // and describe no decoded media at all
            if media_caps.name() == "application/x-rtp" {
                debug!("skipping {}", element.factory_name);
                continue;
            }

            if rtp_matches.is_empty() {
                add_codec_cap(&mut list, media_caps.clone(), None, &element.factory_name);
            } else {
                for rtp_caps in &rtp_matches {
                    add_codec_cap(
                        &mut list,
                        media_caps.clone(),
                        Some(rtp_caps.clone()),
                        &element.factory_name,
                    );
                }
            }
        }
    }

    list
}

/// The first element in caller order wins for a given capability; later
/// factories with an equivalent entry are duplicates.
fn add_codec_cap(list: &mut Vec<CodecCap>, caps: Caps, rtp_caps: Option<Caps>, factory_name: &str) {
    let duplicate = list.iter().any(|entry| {
        entry.caps.intersects(&caps)
            && match (&entry.rtp_caps, &rtp_caps) {
                (Some(a), Some(b)) => a.intersects(b),
                (None, None) => true,
                _ => false,
            }
    });
    if !duplicate {
        list.push(CodecCap {
            caps,
            rtp_caps,
            elements1: vec![factory_name.to_owned()],
            elements2: vec![],
        });
    }
}

/// Pairs every entry of `list1` with the first compatible entry of `list2`.
fn codec_cap_list_intersect(list1: &[CodecCap], list2: &[CodecCap]) -> Vec<CodecCap> {
    let mut intersection_list = vec![];

    for codec_cap1 in list1 {
        for codec_cap2 in list2 {
            let Some(media_caps) = codec_cap1.caps.intersect(&codec_cap2.caps) else {
                continue;
            };
            let rtp_caps = match (&codec_cap1.rtp_caps, &codec_cap2.rtp_caps) {
                (Some(a), Some(b)) => match a.intersect(b) {
                    Some(joined) => Some(joined),
                    None => continue,
                },
                (Some(a), None) => Some(a.clone()),
                (None, Some(b)) => Some(b.clone()),
                (None, None) => None,
            };

            let mut elements1 = codec_cap1.elements1.clone();
            elements1.extend(codec_cap1.elements2.iter().cloned());
            let mut elements2 = codec_cap2.elements1.clone();
            elements2.extend(codec_cap2.elements2.iter().cloned());

            intersection_list.push(CodecCap {
                caps: media_caps,
                rtp_caps,
                elements1,
                elements2,
            });
            break;
        }
    }

    intersection_list
}

/// Finds all encoder/payloader combinations for the media type.
fn detect_send_codecs(elements: &[DiscoveredElement], rtp_filter: &Caps) -> Vec<CodecCap> {
    let payloaders = collect_codec_caps(elements, is_payloader, Some(rtp_filter), sink_caps);
    if payloaders.is_empty() {
        warn!("no RTP payloaders found");
        return vec![];
    }

    let encoders = collect_codec_caps(elements, is_encoder, None, src_caps);
    if encoders.is_empty() {
        warn!("no encoders found");
        return vec![];
    }

    let send_list = codec_cap_list_intersect(&encoders, &payloaders);
    if send_list.is_empty() {
        warn!("no compatible encoder/payloader pairs found");
    }
    send_list
}

/// Finds all depayloader/decoder combinations for the media type.
fn detect_recv_codecs(elements: &[DiscoveredElement], rtp_filter: &Caps) -> Vec<CodecCap> {
    let depayloaders = collect_codec_caps(elements, is_depayloader, Some(rtp_filter), src_caps);
    if depayloaders.is_empty() {
        warn!("no RTP depayloaders found");
        return vec![];
    }

    let decoders = collect_codec_caps(elements, is_decoder, None, sink_caps);
    if decoders.is_empty() {
        warn!("no decoders found");
        return vec![];
    }

    let recv_list = codec_cap_list_intersect(&depayloaders, &decoders);
    if recv_list.is_empty() {
        warn!("no compatible decoder/depayloader pairs found");
    }
    recv_list
}

fn encoding_name_field(codec_cap: &CodecCap) -> Option<&str> {
    match codec_cap.rtp_caps.as_ref()?.field("encoding-name") {
        Some(CapsValue::Str(name)) => Some(name.as_str()),
        _ => None,
    }
}

fn payload_field(codec_cap: &CodecCap) -> Option<&CapsValue> {
    codec_cap.rtp_caps.as_ref()?.field("payload")
}

/// Removes all dynamic payload types that already have a static payload
/// type in the list.
fn remove_dynamic_duplicates(mut list: Vec<CodecCap>) -> Vec<CodecCap> {
    let mut static_names: Vec<UniCase<String>> = vec![];
    for codec_cap in &list {
        let Some(name) = encoding_name_field(codec_cap) else {
            continue;
        };
        if let Some(CapsValue::Int(pt)) = payload_field(codec_cap)
            && *pt < 96
        {
            static_names.push(UniCase::new(name.to_owned()));
        }
    }

    list.retain(|codec_cap| {
        let Some(name) = encoding_name_field(codec_cap) else {
            return true;
        };
        let dynamic = matches!(payload_field(codec_cap), Some(CapsValue::IntRange(..)));
        !(dynamic && static_names.contains(&UniCase::new(name.to_owned())))
    });

    list
}

/// H.263 media capabilities must agree with the advertised wire encoding
/// name: baseline maps to H263/H263-1998, h263p to H263-1998 and h263pp to
/// H263-2000. No version at all means every variant is handled.
fn validate_h263_codecs(codec_cap: &CodecCap) -> bool {
    if codec_cap.caps.name() != "video/x-h263" {
        return true;
    }
    let Some(CapsValue::Str(h263version)) = codec_cap.caps.field("h263version") else {
        return true;
    };
    let Some(encoding_name) = encoding_name_field(codec_cap) else {
        return true;
    };

    match h263version.as_str() {
        "h263" => encoding_name == "H263" || encoding_name == "H263-1998",
        "h263p" => encoding_name == "H263-1998",
        "h263pp" => encoding_name == "H263-2000",
        _ => true,
    }
}

/// AMR media capabilities must advertise the matching wire encoding name.
fn validate_amr_codecs(codec_cap: &CodecCap) -> bool {
    let encoding_name = encoding_name_field(codec_cap);
    match codec_cap.caps.name() {
        "audio/AMR-WB" => encoding_name == Some("AMR-WB"),
        "audio/AMR" => encoding_name == Some("AMR"),
        _ => true,
    }
}

fn chain_has_klass(chain: &[String], klasses: &HashMap<&str, &str>, needle: &str) -> bool {
    chain
        .iter()
        .any(|name| klasses.get(name.as_str()).is_some_and(|k| k.contains(needle)))
}

fn chain_has_unique(chain: &[String], unique_elements: &[String]) -> bool {
    chain.iter().any(|name| unique_elements.contains(name))
}
