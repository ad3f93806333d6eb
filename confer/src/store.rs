//! Shared per-media-type blueprint store.
//!
//! Discovery and cache I/O run once per media type: the first `open` loads
//! the cache or falls back to a fresh discovery run, later opens share the
//! same list, and the last `close` drops it. Loading failures of any kind
//! degrade to discovery; a failed cache save is logged and ignored since
//! persistence is an optimization, not a correctness requirement.

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use codec::cache;
use codec::discover::Discoverer;
use codec::{CodecBlueprint, MediaType};
use shared::error::Result;

#[derive(Default)]
struct StoreSlot {
    refs: usize,
    blueprints: Option<Arc<Vec<CodecBlueprint>>>,
}

/// Owns the discovered blueprint list of each media type.
pub struct BlueprintStore {
    discoverer: Box<dyn Discoverer + Send + Sync>,
    cache_enabled: bool,
    slots: Mutex<[StoreSlot; 2]>,
}

impl BlueprintStore {
    pub fn new(discoverer: Box<dyn Discoverer + Send + Sync>) -> Self {
        BlueprintStore {
            discoverer,
            cache_enabled: true,
            slots: Mutex::new([StoreSlot::default(), StoreSlot::default()]),
        }
    }

    /// Disables the on-disk blueprint cache; every first open then runs a
    /// fresh discovery.
    pub fn set_cache_enabled(&mut self, cache_enabled: bool) {
        self.cache_enabled = cache_enabled;
    }

    fn slot_index(media_type: MediaType) -> usize {
        match media_type {
            MediaType::Audio => 0,
            MediaType::Video => 1,
        }
    }

    /// Opens the blueprint list for a media type.
    ///
    /// The first opener triggers load-or-discover; everyone else shares the
    /// in-memory list. Each successful `open` must be paired with a
    /// [`close`](BlueprintStore::close).
    pub fn open(&self, media_type: MediaType) -> Result<Arc<Vec<CodecBlueprint>>> {
        let mut slots = self.slots.lock()?;
        let slot = &mut slots[Self::slot_index(media_type)];

        if let Some(blueprints) = &slot.blueprints {
            slot.refs += 1;
            return Ok(blueprints.clone());
        }

        let blueprints = Arc::new(self.load_or_discover(media_type)?);
        slot.blueprints = Some(blueprints.clone());
        slot.refs = 1;
        Ok(blueprints)
    }

    /// Releases one reference on a media type's blueprint list; the last
    /// release drops the list.
    pub fn close(&self, media_type: MediaType) {
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };
        let slot = &mut slots[Self::slot_index(media_type)];

        if slot.refs == 0 {
            warn!("blueprint store close without matching open for {media_type}");
            return;
        }
        slot.refs -= 1;
        if slot.refs == 0 {
            slot.blueprints = None;
        }
    }

    fn load_or_discover(&self, media_type: MediaType) -> Result<Vec<CodecBlueprint>> {
        if self.cache_enabled {
            match cache::load_codecs_cache(media_type) {
                Ok(blueprints) => {
                    debug!("loaded codec blueprints from cache file");
                    return Ok(blueprints);
                }
                Err(e) => {
                    debug!("codecs cache unusable ({e}), running discovery");
                }
            }
        }

        let blueprints = self.discoverer.discover(media_type)?;

        if self.cache_enabled
            && let Err(e) = cache::save_codecs_cache(media_type, &blueprints)
        {
            // a failed save only costs the next startup a discovery run
            warn!("unable to save codecs cache: {e}");
        }

        Ok(blueprints)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use caps::Caps;
    use codec::{Codec, CodecId};
    use shared::error::Error;

    struct CountingDiscoverer {
        calls: Arc<AtomicUsize>,
    }

    impl Discoverer for CountingDiscoverer {
        fn discover(&self, media_type: MediaType) -> Result<Vec<CodecBlueprint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let codec = Codec::new(CodecId::Pt(0), media_type, "PCMU", 8000);
            let rtp_caps = codec.to_rtp_caps();
            Ok(vec![CodecBlueprint::new(
                codec,
                Caps::new("audio/x-mulaw"),
                rtp_caps,
            )])
        }
    }

    struct FailingDiscoverer;

    impl Discoverer for FailingDiscoverer {
        fn discover(&self, _media_type: MediaType) -> Result<Vec<CodecBlueprint>> {
            Err(Error::ErrNoCodecCapabilities)
        }
    }

    fn counting_store() -> (BlueprintStore, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut store = BlueprintStore::new(Box::new(CountingDiscoverer {
            calls: calls.clone(),
        }));
        store.set_cache_enabled(false);
        (store, calls)
    }

    #[test]
    fn test_openers_share_one_discovery_run() {
        let (store, calls) = counting_store();

        let first = store.open(MediaType::Audio).unwrap();
        let second = store.open(MediaType::Audio).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // media types have separate slots
        store.open(MediaType::Video).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_last_close_drops_the_list() {
        let (store, calls) = counting_store();

        store.open(MediaType::Audio).unwrap();
        store.open(MediaType::Audio).unwrap();

        store.close(MediaType::Audio);
        // one opener left: the list survives
        store.open(MediaType::Audio).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.close(MediaType::Audio);
        store.close(MediaType::Audio);

        // everyone is gone, the next open discovers again
        store.open(MediaType::Audio).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_close_without_open_is_ignored() {
        let (store, calls) = counting_store();
        store.close(MediaType::Audio);
        store.open(MediaType::Audio).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_open_fills_the_cache_for_the_next_process() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry.bin");
        std::fs::write(&registry, b"registry").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&registry)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(60))
            .unwrap();
        // set_var is process-global; this is the only test touching these vars
        unsafe {
            std::env::set_var(cache::VIDEO_CACHE_ENV, dir.path().join("codecs.video.cache"));
            std::env::set_var(cache::REGISTRY_ENV, &registry);
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let store = BlueprintStore::new(Box::new(CountingDiscoverer {
            calls: calls.clone(),
        }));
        let first = store.open(MediaType::Video).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        store.close(MediaType::Video);

        // a second store plays the role of a fresh process: it is served
        // from the cache file without discovering anything
        let other_calls = Arc::new(AtomicUsize::new(0));
        let other_store = BlueprintStore::new(Box::new(CountingDiscoverer {
            calls: other_calls.clone(),
        }));
        let second = other_store.open(MediaType::Video).unwrap();
        assert_eq!(other_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*first, *second);

        unsafe {
            std::env::remove_var(cache::VIDEO_CACHE_ENV);
            std::env::remove_var(cache::REGISTRY_ENV);
        }
    }

    #[test]
    fn test_discovery_failure_propagates_and_open_can_retry() {
        let mut store = BlueprintStore::new(Box::new(FailingDiscoverer));
        store.set_cache_enabled(false);
        assert_eq!(
            store.open(MediaType::Audio).err(),
            Some(Error::ErrNoCodecCapabilities)
        );
        // the failure left no half-open slot behind
        store.close(MediaType::Audio);
        assert_eq!(
            store.open(MediaType::Audio).err(),
            Some(Error::ErrNoCodecCapabilities)
        );
    }
}
