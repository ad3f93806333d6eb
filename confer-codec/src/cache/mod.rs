//! Binary on-disk cache for discovered codec blueprints.
//!
//! Discovery is expensive, so its result is persisted per media type in a
//! small versioned binary file. The cache is only honored while it is newer
//! than the surrounding plugin registry; anything else (missing file, stale
//! file, bad magic, truncated record) makes the loader fail and the caller
//! fall back to a fresh discovery run. A failed save never clobbers an
//! existing cache: the file is written next to the target and renamed into
//! place only on success.


use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::blueprint::CodecBlueprint;
use crate::codec::{Codec, CodecId, MediaType};
use caps::Caps;
use shared::error::{Error, Result};

/// Environment override for the audio cache file location.
pub const AUDIO_CACHE_ENV: &str = "FS_AUDIO_CODECS_CACHE";
/// Environment override for the video cache file location.
pub const VIDEO_CACHE_ENV: &str = "FS_VIDEO_CODECS_CACHE";
/// Environment override for the plugin registry used as staleness reference.
pub const REGISTRY_ENV: &str = "GST_REGISTRY";

const MAGIC_LEN: usize = 8;
// version of the binary format
const CACHE_VERSION: [u8; 2] = [b'1', b'1'];

fn magic_for(media_type: MediaType) -> [u8; MAGIC_LEN] {
    [
        b'F',
        b'S',
        media_type.cache_tag(),
        b'C',
        CACHE_VERSION[0],
        CACHE_VERSION[1],
        0,
        0,
    ]
}

/// Resolves the cache file path for a media type, honoring the
/// per-media-type environment override.
pub fn codecs_cache_path(media_type: MediaType) -> Result<PathBuf> {
    let env_var = match media_type {
        MediaType::Audio => AUDIO_CACHE_ENV,
        MediaType::Video => VIDEO_CACHE_ENV,
    };
    if let Ok(path) = env::var(env_var)
        && !path.is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    let home = dirs::home_dir().ok_or(Error::ErrNoCachePath)?;
    Ok(home.join(".farsight").join(format!(
        "codecs.{}.{}.cache",
        media_type,
        env::consts::ARCH
    )))
}

fn registry_paths() -> Vec<PathBuf> {
    if let Ok(path) = env::var(REGISTRY_ENV)
        && !path.is_empty()
    {
        return vec![PathBuf::from(path)];
    }

    let Some(home) = dirs::home_dir() else {
        return vec![];
    };
    let dir = home.join(".gstreamer-0.10");
    vec![
        dir.join(format!("registry.{}.bin", env::consts::ARCH)),
        dir.join(format!("registry.{}.xml", env::consts::ARCH)),
    ]
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// The cache is only honored while strictly newer than every registry file.
pub(crate) fn cache_is_valid(cache_path: &Path, registry_paths: &[PathBuf]) -> bool {
    let Some(registry_ts) = registry_paths.iter().filter_map(|p| mtime(p)).max() else {
        return false;
    };
    let Some(cache_ts) = mtime(cache_path) else {
        return false;
    };
    cache_ts > registry_ts
}

/// Loads the codec blueprints from the on-disk cache.
///
/// Any failure (no cache, stale cache, corrupt contents) is returned as an
/// error so the caller re-runs discovery; a partial blueprint list is never
/// produced.
pub fn load_codecs_cache(media_type: MediaType) -> Result<Vec<CodecBlueprint>> {
    let cache_path = codecs_cache_path(media_type)?;

    if !cache_is_valid(&cache_path, &registry_paths()) {
        debug!(
            "codecs cache {} is outdated or does not exist",
            cache_path.display()
        );
        return Err(Error::ErrCacheOutdated);
    }

    debug!("loading codecs cache {}", cache_path.display());
    let contents = fs::read(&cache_path)?;
    read_codecs_cache(&contents, media_type)
}

/// Saves the codec blueprints cache for a media type.
///
/// The cache directory is created when missing and the data is written to a
/// temporary file renamed over the target, so a failed save leaves any
/// previous cache intact.
pub fn save_codecs_cache(media_type: MediaType, blueprints: &[CodecBlueprint]) -> Result<()> {
    let cache_path = codecs_cache_path(media_type)?;
    debug!("saving codecs cache to {}", cache_path.display());

    let dir = cache_path.parent().ok_or(Error::ErrNoCachePath)?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    write_codecs_cache(tmp.as_file_mut(), media_type, blueprints)?;
    tmp.persist(&cache_path).map_err(|e| Error::from(e.error))?;

    debug!("wrote binary codecs cache");
    Ok(())
}

/// Parses a complete cache file image.
pub fn read_codecs_cache(contents: &[u8], media_type: MediaType) -> Result<Vec<CodecBlueprint>> {
    let mut reader = BlueprintReader::new(contents);

    let magic = reader.take(MAGIC_LEN)?;
    if magic[..6] != magic_for(media_type)[..6] {
        return Err(Error::ErrCacheBadMagic);
    }

    let count = reader.read_count("blueprint count")?;
    let mut blueprints = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        blueprints.push(read_blueprint(&mut reader, media_type)?);
    }

    Ok(blueprints)
}

/// Serializes a complete cache image for a media type.
pub fn write_codecs_cache<W: Write>(
    out: &mut W,
    media_type: MediaType,
    blueprints: &[CodecBlueprint],
) -> Result<()> {
    let mut writer = BlueprintWriter { out };
    writer.out.write_all(&magic_for(media_type))?;
    writer.write_count(blueprints.len())?;
    for blueprint in blueprints {
        write_blueprint(&mut writer, blueprint)?;
    }
    Ok(())
}

/// Bounds-checked cursor over the raw cache contents.
struct BlueprintReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BlueprintReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        BlueprintReader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::ErrCacheTruncated(len - self.remaining()));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_i32(&mut self) -> Result<i32> {
        let mut bytes = self.take(4)?;
        Ok(bytes.read_i32::<LittleEndian>()?)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = self.take(4)?;
        Ok(bytes.read_u32::<LittleEndian>()?)
    }

    fn read_count(&mut self, what: &str) -> Result<usize> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(Error::ErrCacheCorrupt(format!("negative {what}: {count}")));
        }
        Ok(count as usize)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_count("string length")?;
        let bytes = self.take(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    fn read_caps(&mut self) -> Result<Caps> {
        let text = self.read_string()?;
        text.parse()
            .map_err(|e: Error| Error::ErrCacheCorrupt(e.to_string()))
    }
}

fn read_pipelines(reader: &mut BlueprintReader<'_>) -> Result<Vec<Vec<String>>> {
    let chain_count = reader.read_count("pipeline chain count")?;
    let mut chains = Vec::with_capacity(chain_count.min(16));
    for _ in 0..chain_count {
        let element_count = reader.read_count("pipeline element count")?;
        let mut chain = Vec::with_capacity(element_count.min(16));
        for _ in 0..element_count {
            chain.push(reader.read_string()?);
        }
        chains.push(chain);
    }
    Ok(chains)
}

fn read_blueprint(
    reader: &mut BlueprintReader<'_>,
    media_type: MediaType,
) -> Result<CodecBlueprint> {
    let raw_id = reader.read_i32()?;
    let id = CodecId::from_raw(raw_id)
        .ok_or_else(|| Error::ErrCacheCorrupt(format!("invalid payload id {raw_id}")))?;
    let encoding_name = reader.read_string()?;
    let clock_rate = reader.read_u32()?;
    let channels = reader.read_u32()?;

    let mut codec = Codec::new(id, media_type, encoding_name, clock_rate);
    codec.channels = channels;

    let param_count = reader.read_count("optional parameter count")?;
    for _ in 0..param_count {
        let name = reader.read_string()?;
        let value = reader.read_string()?;
        codec.add_optional_parameter(name, value);
    }

    let media_caps = reader.read_caps()?;
    let rtp_caps = reader.read_caps()?;

    let mut blueprint = CodecBlueprint::new(codec, media_caps, rtp_caps);
    blueprint.send_pipelines = read_pipelines(reader)?;
    blueprint.receive_pipelines = read_pipelines(reader)?;
    // has_sink/has_src and the unique flags are not part of the file format;
    // they stay unset until the next fresh discovery run.

    debug!(
        "loaded cached codec {} with pt {}",
        blueprint.codec.encoding_name, blueprint.codec.id
    );

    Ok(blueprint)
}

struct BlueprintWriter<'w, W: Write> {
    out: &'w mut W,
}

impl<W: Write> BlueprintWriter<'_, W> {
    fn write_i32(&mut self, val: i32) -> Result<()> {
        self.out.write_i32::<LittleEndian>(val)?;
        Ok(())
    }

    fn write_u32(&mut self, val: u32) -> Result<()> {
        self.out.write_u32::<LittleEndian>(val)?;
        Ok(())
    }

    fn write_count(&mut self, count: usize) -> Result<()> {
        if count > i32::MAX as usize {
            return Err(Error::Other(format!("cache count {count} out of range")));
        }
        self.write_i32(count as i32)
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_count(s.len())?;
        self.out.write_all(s.as_bytes())?;
        Ok(())
    }
}

fn write_blueprint<W: Write>(
    writer: &mut BlueprintWriter<'_, W>,
    blueprint: &CodecBlueprint,
) -> Result<()> {
    writer.write_i32(blueprint.codec.id.to_raw())?;
    writer.write_string(&blueprint.codec.encoding_name)?;
    writer.write_u32(blueprint.codec.clock_rate)?;
    writer.write_u32(blueprint.codec.channels)?;

    writer.write_count(blueprint.codec.optional_params.len())?;
    for param in &blueprint.codec.optional_params {
        writer.write_string(&param.name)?;
        writer.write_string(&param.value)?;
    }

    writer.write_string(&blueprint.media_caps.to_string())?;
    writer.write_string(&blueprint.rtp_caps.to_string())?;

    for pipelines in [&blueprint.send_pipelines, &blueprint.receive_pipelines] {
        writer.write_count(pipelines.len())?;
        for chain in pipelines {
            writer.write_count(chain.len())?;
            for factory_name in chain {
                writer.write_string(factory_name)?;
            }
        }
    }

    Ok(())
}
