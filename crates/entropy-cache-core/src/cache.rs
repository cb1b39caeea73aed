//! Fixed-size entropy cache with fail-fast takes and background refill.
//!
//! Architecture:
//! 1. A `BUFFER_SIZE` byte buffer and a cursor share one mutex
//! 2. `buffer[0..cursor)` is valid; takes consume from the top down
//! 3. Takes only ever *try* the lock and fail instead of waiting
//! 4. `refill` is the only operation that waits, and it is single-flight
//! 5. The slow seed pull and the DRBG expansion run outside the buffer lock
//! 6. Each refill reports how long to wait before the next check

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use serde::Serialize;
use zeroize::{Zeroize, Zeroizing};

use crate::config::{BUFFER_SIZE, REFILL_BASE_DELAY, SEED_SIZE, refill_delay};
use crate::drbg::Amplifier;
use crate::error::{InitError, RefillError, TakeError};
use crate::source::SeedSource;

/// Buffer and cursor, always mutated together.
struct CacheState {
    buffer: Box<[u8]>,
    /// Count of valid bytes at the bottom of `buffer`. Never above `BUFFER_SIZE`.
    cursor: usize,
}

impl Drop for CacheState {
    fn drop(&mut self) {
        self.buffer.zeroize();
    }
}

#[derive(Debug, Default)]
struct Counters {
    bytes_served: AtomicU64,
    takes: AtomicU64,
    busy: AtomicU64,
    exhausted: AtomicU64,
    oversize: AtomicU64,
    refills: AtomicU64,
    refills_skipped: AtomicU64,
    refill_failures: AtomicU64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

fn lock_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe entropy cache.
///
/// Shared by reference (usually inside an `Arc`) between any number of
/// takers and one [`Refiller`](crate::refiller::Refiller).
pub struct EntropyCache {
    state: Mutex<CacheState>,
    source: Box<dyn SeedSource>,
    /// Also serializes refills: held for the whole cycle.
    amplifier: Mutex<Box<dyn Amplifier>>,
    counters: Counters,
}

impl EntropyCache {
    /// Allocate an empty cache (`cursor = 0`). The first refill populates it.
    ///
    /// Does not probe the collaborators; see
    /// [`ArchRandom::init`](crate::handle::ArchRandom::init) for that.
    pub fn new(
        source: Box<dyn SeedSource>,
        amplifier: Box<dyn Amplifier>,
    ) -> Result<Self, InitError> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(BUFFER_SIZE)
            .map_err(|_| InitError::Allocation)?;
        buffer.resize(BUFFER_SIZE, 0);

        Ok(Self {
            state: Mutex::new(CacheState {
                buffer: buffer.into_boxed_slice(),
                cursor: 0,
            }),
            source,
            amplifier: Mutex::new(amplifier),
            counters: Counters::default(),
        })
    }

    /// Total buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        BUFFER_SIZE
    }

    /// Name of the seed source feeding this cache.
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Fill `out` entirely from the cache, or fail without side effects on
    /// the buffer. Never blocks.
    pub fn try_fill(&self, out: &mut [u8]) -> Result<(), TakeError> {
        let nbytes = out.len();
        if nbytes > BUFFER_SIZE {
            bump(&self.counters.oversize, 1);
            return Err(TakeError::RequestTooLarge {
                requested: nbytes,
                capacity: BUFFER_SIZE,
            });
        }

        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                bump(&self.counters.busy, 1);
                return Err(TakeError::BufferBusy);
            }
        };

        if nbytes > state.cursor {
            drop(state);
            bump(&self.counters.exhausted, 1);
            return Err(TakeError::BufferExhausted);
        }

        let end = state.cursor;
        let start = end - nbytes;
        out.copy_from_slice(&state.buffer[start..end]);
        state.buffer[start..end].zeroize();
        state.cursor = start;
        bump(&self.counters.bytes_served, nbytes as u64);
        bump(&self.counters.takes, 1);
        Ok(())
    }

    /// Take exactly `nbytes` fresh bytes, or fail. Never blocks.
    pub fn try_take(&self, nbytes: usize) -> Result<Vec<u8>, TakeError> {
        if nbytes > BUFFER_SIZE {
            bump(&self.counters.oversize, 1);
            return Err(TakeError::RequestTooLarge {
                requested: nbytes,
                capacity: BUFFER_SIZE,
            });
        }
        let mut out = vec![0u8; nbytes];
        self.try_fill(&mut out)?;
        Ok(out)
    }

    /// One background refill cycle. Returns the delay until the next one.
    ///
    /// Regenerates only when no valid bytes remain. A failed seed pull or
    /// expansion abandons the cycle and asks to be retried after the base
    /// delay; it never panics.
    pub fn refill(&self) -> Duration {
        let mut amplifier = lock_recover(&self.amplifier);

        let remaining = lock_recover(&self.state).cursor;
        if remaining > 0 {
            bump(&self.counters.refills_skipped, 1);
            log::debug!("refill skipped: {remaining}/{BUFFER_SIZE} bytes still cached");
            return refill_delay(remaining);
        }

        let t0 = Instant::now();
        let mut staging = Zeroizing::new([0u8; BUFFER_SIZE]);
        if let Err(e) = self.regenerate(&mut **amplifier, &mut staging[..]) {
            bump(&self.counters.refill_failures, 1);
            log::warn!("refill from {} failed: {e}", self.source.name());
            return REFILL_BASE_DELAY;
        }

        let mut state = lock_recover(&self.state);
        state.buffer.copy_from_slice(&staging[..]);
        state.cursor = BUFFER_SIZE;
        let delay = refill_delay(state.cursor);
        drop(state);
        drop(amplifier);

        bump(&self.counters.refills, 1);
        log::debug!(
            "refilled {BUFFER_SIZE} bytes from {} in {:?}",
            self.source.name(),
            t0.elapsed()
        );
        delay
    }

    fn regenerate(
        &self,
        amplifier: &mut dyn Amplifier,
        staging: &mut [u8],
    ) -> Result<(), RefillError> {
        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        self.source.pull(&mut seed[..])?;
        amplifier.seed(&seed[..])?;
        amplifier.generate(staging)?;
        Ok(())
    }

    /// Valid bytes currently cached. Waits briefly for the lock.
    pub fn remaining(&self) -> usize {
        lock_recover(&self.state).cursor
    }

    /// Total bytes ever handed out. Monotonic, never reset.
    pub fn bytes_served(&self) -> u64 {
        self.counters.bytes_served.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters.
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            source: self.source.name(),
            capacity: BUFFER_SIZE,
            remaining: self.remaining(),
            bytes_served: c.bytes_served.load(Ordering::Relaxed),
            takes: c.takes.load(Ordering::Relaxed),
            busy_misses: c.busy.load(Ordering::Relaxed),
            exhausted_misses: c.exhausted.load(Ordering::Relaxed),
            oversize_rejections: c.oversize.load(Ordering::Relaxed),
            refills: c.refills.load(Ordering::Relaxed),
            refills_skipped: c.refills_skipped.load(Ordering::Relaxed),
            refill_failures: c.refill_failures.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    fn hold_lock(&self) -> MutexGuard<'_, CacheState> {
        lock_recover(&self.state)
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Seed source name.
    pub source: &'static str,
    /// Buffer capacity in bytes.
    pub capacity: usize,
    /// Valid bytes cached at snapshot time.
    pub remaining: usize,
    /// Total bytes handed out.
    pub bytes_served: u64,
    /// Successful takes.
    pub takes: u64,
    /// Takes refused because the lock was held.
    pub busy_misses: u64,
    /// Takes refused for lack of cached bytes.
    pub exhausted_misses: u64,
    /// Takes refused for exceeding capacity.
    pub oversize_rejections: u64,
    /// Completed regenerations.
    pub refills: u64,
    /// Refill checks that found bytes remaining.
    pub refills_skipped: u64,
    /// Regenerations abandoned after a source or amplifier error.
    pub refill_failures: u64,
}

impl CacheStats {
    /// Fraction of take attempts that were served, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let misses = self.busy_misses + self.exhausted_misses + self.oversize_rejections;
        let total = self.takes + misses;
        if total == 0 {
            return 0.0;
        }
        self.takes as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drbg::HashDrbg;
    use crate::error::{DrbgError, SourceError};
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    // -----------------------------------------------------------------------
    // Mock collaborators
    // -----------------------------------------------------------------------

    /// Deterministic seed source.
    struct MockSource;

    impl SeedSource for MockSource {
        fn name(&self) -> &'static str {
            "mock"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn pull(&self, out: &mut [u8]) -> Result<(), SourceError> {
            for (i, b) in out.iter_mut().enumerate() {
                *b = i as u8;
            }
            Ok(())
        }
    }

    /// Source that fails while `broken` is set.
    struct FlakySource {
        broken: Arc<AtomicBool>,
    }

    impl SeedSource for FlakySource {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn pull(&self, out: &mut [u8]) -> Result<(), SourceError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(SourceError::NotPresent("flaky"));
            }
            out.fill(0x5a);
            Ok(())
        }
    }

    /// Amplifier that refuses to generate.
    struct BrokenAmplifier;

    impl Amplifier for BrokenAmplifier {
        fn seed(&mut self, _seed: &[u8]) -> Result<(), DrbgError> {
            Ok(())
        }
        fn generate(&mut self, _out: &mut [u8]) -> Result<(), DrbgError> {
            Err(DrbgError::ReseedRequired)
        }
    }

    fn mock_cache() -> EntropyCache {
        EntropyCache::new(Box::new(MockSource), Box::new(HashDrbg::new())).unwrap()
    }

    fn filled_cache() -> EntropyCache {
        let cache = mock_cache();
        cache.refill();
        assert_eq!(cache.remaining(), BUFFER_SIZE);
        cache
    }

    // -----------------------------------------------------------------------
    // Take path
    // -----------------------------------------------------------------------

    #[test]
    fn test_new_cache_is_empty() {
        let cache = mock_cache();
        assert_eq!(cache.remaining(), 0);
        assert_eq!(cache.capacity(), BUFFER_SIZE);
        assert_eq!(cache.try_take(1), Err(TakeError::BufferExhausted));
    }

    #[test]
    fn test_take_returns_requested_length() {
        let cache = filled_cache();
        for size in [1, 16, 32, 100, 256] {
            let bytes = cache.try_take(size).unwrap();
            assert_eq!(bytes.len(), size);
        }
    }

    #[test]
    fn test_take_zero_bytes_succeeds() {
        let cache = mock_cache();
        assert_eq!(cache.try_take(0), Ok(Vec::new()));
    }

    #[test]
    fn test_take_larger_than_capacity_fails() {
        let cache = filled_cache();
        for n in [BUFFER_SIZE + 1, BUFFER_SIZE * 2, usize::MAX] {
            assert_eq!(
                cache.try_take(n),
                Err(TakeError::RequestTooLarge {
                    requested: n,
                    capacity: BUFFER_SIZE
                })
            );
        }
        assert_eq!(cache.remaining(), BUFFER_SIZE, "rejection must not consume");
        assert_eq!(cache.stats().oversize_rejections, 3);
    }

    #[test]
    fn test_take_consumes_from_top() {
        let cache = mock_cache();
        {
            let mut state = cache.hold_lock();
            for (i, b) in state.buffer.iter_mut().enumerate() {
                *b = (i % 251) as u8;
            }
            state.cursor = BUFFER_SIZE;
        }
        let top = cache.try_take(4).unwrap();
        let expected: Vec<u8> = (BUFFER_SIZE - 4..BUFFER_SIZE)
            .map(|i| (i % 251) as u8)
            .collect();
        assert_eq!(top, expected);
        assert_eq!(cache.remaining(), BUFFER_SIZE - 4);
    }

    #[test]
    fn test_consumed_bytes_are_wiped() {
        let cache = filled_cache();
        cache.try_take(64).unwrap();
        let state = cache.hold_lock();
        assert!(state.buffer[BUFFER_SIZE - 64..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_exhaustion_after_partial_takes() {
        let cache = filled_cache();
        let taken: usize = [100, 200, 300, 48].iter().sum();
        for n in [100, 200, 300, 48] {
            cache.try_take(n).unwrap();
        }
        let left = BUFFER_SIZE - taken;
        assert_eq!(cache.remaining(), left);
        assert_eq!(cache.try_take(left + 1), Err(TakeError::BufferExhausted));
        // A failed take leaves the remaining bytes usable.
        assert_eq!(cache.try_take(left).unwrap().len(), left);
        assert_eq!(cache.try_take(1), Err(TakeError::BufferExhausted));
    }

    #[test]
    fn test_busy_while_lock_held() {
        let cache = filled_cache();
        let guard = cache.hold_lock();
        std::thread::scope(|s| {
            let t0 = Instant::now();
            let result = s.spawn(|| cache.try_take(16)).join().unwrap();
            assert_eq!(result, Err(TakeError::BufferBusy));
            assert!(t0.elapsed() < Duration::from_secs(1));
        });
        drop(guard);
        assert_eq!(cache.try_take(16).unwrap().len(), 16);
        assert_eq!(cache.stats().busy_misses, 1);
    }

    #[test]
    fn test_try_fill_into_caller_buffer() {
        let cache = filled_cache();
        let mut buf = [0u8; 48];
        cache.try_fill(&mut buf).unwrap();
        assert!(buf.iter().any(|&b| b != 0));
        assert_eq!(cache.bytes_served(), 48);
    }

    // -----------------------------------------------------------------------
    // Refill path
    // -----------------------------------------------------------------------

    #[test]
    fn test_refill_on_empty_fills_completely() {
        let cache = mock_cache();
        let delay = cache.refill();
        assert_eq!(cache.remaining(), BUFFER_SIZE);
        assert_eq!(delay, refill_delay(BUFFER_SIZE));
        assert_eq!(cache.stats().refills, 1);
    }

    #[test]
    fn test_refill_skips_when_bytes_remain() {
        let cache = filled_cache();
        cache.try_take(BUFFER_SIZE - 48).unwrap();
        let before = cache.hold_lock().buffer.to_vec();
        let delay = cache.refill();
        assert_eq!(cache.remaining(), 48);
        assert_eq!(delay, refill_delay(48));
        assert_eq!(cache.hold_lock().buffer.to_vec(), before);
        assert_eq!(cache.stats().refills_skipped, 1);
    }

    #[test]
    fn test_refill_restores_full_take_once() {
        let cache = filled_cache();
        cache.try_take(BUFFER_SIZE).unwrap();
        assert_eq!(cache.try_take(BUFFER_SIZE), Err(TakeError::BufferExhausted));
        cache.refill();
        assert_eq!(cache.try_take(BUFFER_SIZE).unwrap().len(), BUFFER_SIZE);
        assert_eq!(cache.try_take(BUFFER_SIZE), Err(TakeError::BufferExhausted));
    }

    #[test]
    fn test_successive_generations_differ() {
        let cache = filled_cache();
        let first = cache.try_take(BUFFER_SIZE).unwrap();
        cache.refill();
        let second = cache.try_take(BUFFER_SIZE).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_source_failure_abandons_cycle() {
        let broken = Arc::new(AtomicBool::new(true));
        let cache = EntropyCache::new(
            Box::new(FlakySource {
                broken: Arc::clone(&broken),
            }),
            Box::new(HashDrbg::new()),
        )
        .unwrap();

        assert_eq!(cache.refill(), REFILL_BASE_DELAY);
        assert_eq!(cache.remaining(), 0);
        assert_eq!(cache.stats().refill_failures, 1);
        assert_eq!(cache.try_take(1), Err(TakeError::BufferExhausted));

        broken.store(false, Ordering::SeqCst);
        cache.refill();
        assert_eq!(cache.remaining(), BUFFER_SIZE);
    }

    #[test]
    fn test_amplifier_failure_abandons_cycle() {
        let cache = EntropyCache::new(Box::new(MockSource), Box::new(BrokenAmplifier)).unwrap();
        assert_eq!(cache.refill(), REFILL_BASE_DELAY);
        assert_eq!(cache.remaining(), 0);
        assert_eq!(cache.stats().refill_failures, 1);
        assert_eq!(cache.stats().refills, 0);
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    #[test]
    fn test_stats_empty() {
        let stats = mock_cache().stats();
        assert_eq!(stats.source, "mock");
        assert_eq!(stats.capacity, BUFFER_SIZE);
        assert_eq!(stats.remaining, 0);
        assert_eq!(stats.bytes_served, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = filled_cache();
        cache.try_take(BUFFER_SIZE - 10).unwrap();
        let _ = cache.try_take(11);
        cache.try_take(10).unwrap();
        let stats = cache.stats();
        assert_eq!(stats.takes, 2);
        assert_eq!(stats.exhausted_misses, 1);
        assert_eq!(stats.bytes_served, BUFFER_SIZE as u64);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }
}
