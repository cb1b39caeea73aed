//! True-random seed sources.
//!
//! A [`SeedSource`] is slow and rate-limited but high quality. The cache only
//! ever asks it for [`SEED_SIZE`](crate::config::SEED_SIZE) bytes at a time and
//! stretches them with the [`Amplifier`](crate::drbg::Amplifier).

use crate::error::SourceError;

/// Trait that every true-random source must implement.
pub trait SeedSource: Send + Sync {
    /// Short identifier (e.g. `"rdseed"`).
    fn name(&self) -> &'static str;

    /// Check if this source can operate on the current machine.
    fn is_available(&self) -> bool;

    /// Fill `out` completely or fail. Never a partial fill.
    fn pull(&self, out: &mut [u8]) -> Result<(), SourceError>;
}

impl<S: SeedSource + ?Sized> SeedSource for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn is_available(&self) -> bool {
        (**self).is_available()
    }
    fn pull(&self, out: &mut [u8]) -> Result<(), SourceError> {
        (**self).pull(out)
    }
}

/// Kernel CSPRNG via the `getrandom` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSource;

impl SeedSource for OsSource {
    fn name(&self) -> &'static str {
        "os"
    }

    fn is_available(&self) -> bool {
        let mut probe = [0u8; 1];
        getrandom::fill(&mut probe).is_ok()
    }

    fn pull(&self, out: &mut [u8]) -> Result<(), SourceError> {
        getrandom::fill(out).map_err(SourceError::Os)
    }
}

/// Attempts per 64-bit word before `RDSEED` is considered drained.
#[cfg(target_arch = "x86_64")]
const RDSEED_RETRIES: u32 = 128;

/// The CPU's `RDSEED` instruction: conditioned output of the on-die noise
/// source. Throughput is low and the instruction may transiently fail, so each
/// word is retried a bounded number of times.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdseedSource;

#[cfg(target_arch = "x86_64")]
impl RdseedSource {
    #[target_feature(enable = "rdseed")]
    #[allow(unused_unsafe)]
    unsafe fn step() -> Option<u64> {
        let mut word = 0u64;
        // SAFETY: caller verified the rdseed feature at runtime.
        if unsafe { core::arch::x86_64::_rdseed64_step(&mut word) } == 1 {
            Some(word)
        } else {
            None
        }
    }

    fn next_word(&self) -> Result<u64, SourceError> {
        for _ in 0..RDSEED_RETRIES {
            // SAFETY: only reachable after is_available() confirmed rdseed.
            if let Some(word) = unsafe { Self::step() } {
                return Ok(word);
            }
            std::hint::spin_loop();
        }
        Err(SourceError::RetriesExhausted {
            name: "rdseed",
            retries: RDSEED_RETRIES,
        })
    }
}

impl SeedSource for RdseedSource {
    fn name(&self) -> &'static str {
        "rdseed"
    }

    fn is_available(&self) -> bool {
        #[cfg(target_arch = "x86_64")]
        {
            std::arch::is_x86_feature_detected!("rdseed")
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            false
        }
    }

    #[cfg(target_arch = "x86_64")]
    fn pull(&self, out: &mut [u8]) -> Result<(), SourceError> {
        if !self.is_available() {
            return Err(SourceError::NotPresent("rdseed"));
        }
        for chunk in out.chunks_mut(8) {
            let word = self.next_word()?.to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        Ok(())
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn pull(&self, _out: &mut [u8]) -> Result<(), SourceError> {
        Err(SourceError::NotPresent("rdseed"))
    }
}

/// Pick the best seed source present on this machine: `RDSEED` if the CPU has
/// it, otherwise the OS CSPRNG.
pub fn detect_seed_source() -> Box<dyn SeedSource> {
    let rdseed = RdseedSource;
    if rdseed.is_available() {
        log::debug!("using rdseed as seed source");
        Box::new(rdseed)
    } else {
        log::debug!("rdseed not present, using os seed source");
        Box::new(OsSource)
    }
}
