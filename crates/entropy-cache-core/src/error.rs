//! Error types for the cache and its collaborators.
//!
//! Per-call failures ([`TakeError`]) are always local and recoverable: the
//! caller falls back to a slower path. Init failures ([`InitError`]) disable
//! the feature as a whole. Refill failures ([`RefillError`]) never leave the
//! background task; they are logged and counted.

use std::io;

/// Why a non-blocking take did not return bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TakeError {
    /// Request exceeds the buffer capacity. A caller programming error.
    #[error("request of {requested} bytes exceeds cache capacity of {capacity}")]
    RequestTooLarge { requested: usize, capacity: usize },
    /// The buffer lock was held (refill install or another taker).
    #[error("entropy buffer busy")]
    BufferBusy,
    /// Not enough valid bytes cached right now.
    #[error("entropy buffer exhausted")]
    BufferExhausted,
    /// The cache was never initialized on this machine.
    #[error("entropy cache unavailable")]
    Unavailable,
}

impl TakeError {
    /// Whether a later attempt may succeed without any change by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BufferBusy | Self::BufferExhausted)
    }
}

/// The true-random source could not deliver.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("entropy source {0} not present")]
    NotPresent(&'static str),
    #[error("entropy source {name} gave up after {retries} retries")]
    RetriesExhausted { name: &'static str, retries: u32 },
    #[error("os entropy source failed: {0}")]
    Os(getrandom::Error),
}

/// The deterministic bit generator refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DrbgError {
    #[error("drbg used before seeding")]
    Unseeded,
    #[error("empty seed")]
    EmptySeed,
    #[error("drbg request of {requested} bytes exceeds limit of {limit}")]
    RequestTooLarge { requested: usize, limit: usize },
    #[error("drbg reseed interval reached")]
    ReseedRequired,
    #[error("drbg self-test produced repeating output")]
    SelfTestFailed,
}

/// A single background refill cycle failed.
#[derive(Debug, thiserror::Error)]
pub enum RefillError {
    #[error("seed pull failed: {0}")]
    Source(#[from] SourceError),
    #[error("amplifier failed: {0}")]
    Amplifier(#[from] DrbgError),
}

/// Initialization could not confirm or construct the cache.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("entropy source {0} is not available on this machine")]
    SourceUnavailable(&'static str),
    #[error("amplifier self-test failed: {0}")]
    AmplifierUnavailable(DrbgError),
    #[error("could not allocate the entropy buffer")]
    Allocation,
    #[error("could not spawn refill thread: {0}")]
    Spawn(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TakeError::BufferBusy.is_transient());
        assert!(TakeError::BufferExhausted.is_transient());
        assert!(!TakeError::Unavailable.is_transient());
        assert!(
            !TakeError::RequestTooLarge {
                requested: 4096,
                capacity: 2048
            }
            .is_transient()
        );
    }

    #[test]
    fn test_display_mentions_sizes() {
        let e = TakeError::RequestTooLarge {
            requested: 4096,
            capacity: 2048,
        };
        let msg = e.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("2048"));
    }

    #[test]
    fn test_refill_error_from_drbg() {
        let e: RefillError = DrbgError::Unseeded.into();
        assert!(matches!(e, RefillError::Amplifier(DrbgError::Unseeded)));
    }
}
