//! Compile-time cache parameters.
//!
//! These are design constants, not a runtime configuration surface. Binaries
//! only configure their own edges (bind address, thread counts, log filter).

use std::time::Duration;

/// Capacity of the entropy buffer in bytes. Also the largest single take.
pub const BUFFER_SIZE: usize = 2048;

/// Bytes pulled from the true-random source to seed each regeneration.
pub const SEED_SIZE: usize = 32;

/// Base interval between refill checks.
///
/// The actual delay is `base + base * remaining / BUFFER_SIZE`, so a full
/// buffer is checked every second and a drained one every half second.
pub const REFILL_BASE_DELAY: Duration = Duration::from_millis(500);

/// Compute the next refill delay from the number of valid bytes left.
///
/// Non-decreasing in `remaining`: the less was drained, the longer the wait.
/// `remaining` above `BUFFER_SIZE` is treated as full.
pub fn refill_delay(remaining: usize) -> Duration {
    let remaining = remaining.min(BUFFER_SIZE) as u32;
    REFILL_BASE_DELAY + REFILL_BASE_DELAY * remaining / BUFFER_SIZE as u32
}
