//! Capability handle distributed to callers.
//!
//! [`ArchRandom`] is decided once, at construction: either it wraps a live
//! cache or it is inert. It never changes afterwards, so any number of clones
//! can read it without synchronization.

use std::sync::Arc;

use crate::cache::{CacheStats, EntropyCache};
use crate::drbg::{Amplifier, HashDrbg};
use crate::error::{InitError, TakeError};
use crate::refiller::Refiller;
use crate::source::{SeedSource, detect_seed_source};

/// Which path produced the bytes in [`ArchRandom::fill_or_else`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    Cache,
    Fallback,
}

/// Cheap, cloneable handle to the process entropy cache.
#[derive(Clone, Default)]
pub struct ArchRandom {
    cache: Option<Arc<EntropyCache>>,
}

impl std::fmt::Debug for ArchRandom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchRandom")
            .field("available", &self.is_available())
            .finish()
    }
}

impl ArchRandom {
    /// The inert handle: every take fails with [`TakeError::Unavailable`].
    pub fn unavailable() -> Self {
        Self { cache: None }
    }

    /// Confirm both collaborators, allocate the buffer, start the refiller,
    /// and only then hand out an available handle.
    ///
    /// The buffer starts empty; the first refill runs after the base delay
    /// (or immediately on [`Refiller::kick`]).
    pub fn init(
        source: Box<dyn SeedSource>,
        mut amplifier: Box<dyn Amplifier>,
    ) -> Result<(Self, Refiller), InitError> {
        if !source.is_available() {
            return Err(InitError::SourceUnavailable(source.name()));
        }
        amplifier
            .self_test()
            .map_err(InitError::AmplifierUnavailable)?;

        let cache = Arc::new(EntropyCache::new(source, amplifier)?);
        let refiller = Refiller::spawn(Arc::clone(&cache))?;
        log::info!(
            "entropy cache enabled: {} bytes, source {}",
            cache.capacity(),
            cache.source_name()
        );
        Ok((Self { cache: Some(cache) }, refiller))
    }

    /// Like [`init`](Self::init), but a failure yields the inert handle.
    pub fn init_or_disabled(
        source: Box<dyn SeedSource>,
        amplifier: Box<dyn Amplifier>,
    ) -> (Self, Option<Refiller>) {
        match Self::init(source, amplifier) {
            Ok((handle, refiller)) => (handle, Some(refiller)),
            Err(e) => {
                log::warn!("entropy cache disabled: {e}");
                (Self::unavailable(), None)
            }
        }
    }

    /// Best available seed source amplified by [`HashDrbg`].
    pub fn detect() -> Result<(Self, Refiller), InitError> {
        Self::init(detect_seed_source(), Box::new(HashDrbg::new()))
    }

    /// Cheap capability probe.
    pub fn is_available(&self) -> bool {
        self.cache.is_some()
    }

    /// The underlying cache, if available.
    pub fn cache(&self) -> Option<&Arc<EntropyCache>> {
        self.cache.as_ref()
    }

    /// Non-blocking take of exactly `nbytes`.
    pub fn try_take(&self, nbytes: usize) -> Result<Vec<u8>, TakeError> {
        self.cache
            .as_ref()
            .ok_or(TakeError::Unavailable)?
            .try_take(nbytes)
    }

    /// Non-blocking fill of `buf`.
    pub fn try_fill(&self, buf: &mut [u8]) -> Result<(), TakeError> {
        self.cache
            .as_ref()
            .ok_or(TakeError::Unavailable)?
            .try_fill(buf)
    }

    /// Fill from the cache, or from `fallback` if the cache cannot serve.
    pub fn fill_or_else<F, E>(&self, buf: &mut [u8], fallback: F) -> Result<Served, E>
    where
        F: FnOnce(&mut [u8]) -> Result<(), E>,
    {
        match self.try_fill(buf) {
            Ok(()) => Ok(Served::Cache),
            Err(_) => fallback(buf).map(|()| Served::Fallback),
        }
    }

    /// Total bytes served by the cache; 0 when unavailable.
    pub fn bytes_served(&self) -> u64 {
        self.cache.as_ref().map_or(0, |c| c.bytes_served())
    }

    /// Counter snapshot, if available.
    pub fn stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }
}
