//! # entropy-cache-core
//!
//! **A small, non-blocking cache of fresh random bytes.**
//!
//! `entropy-cache-core` keeps a fixed 2 KiB buffer of random bytes that any
//! number of threads can drain without ever waiting. A single background
//! thread refills it from a slow true-random source (CPU `RDSEED` or the OS),
//! stretched by a SHA-512 Hash_DRBG.
//!
//! ## Quick Start
//!
//! ```no_run
//! use entropy_cache_core::ArchRandom;
//!
//! let (rng, refiller) = ArchRandom::detect().expect("no entropy source");
//! refiller.kick();
//!
//! let mut key = [0u8; 32];
//! // Cache hit, or fall back to the OS when busy/empty.
//! rng.fill_or_else(&mut key, |buf| getrandom::fill(buf)).unwrap();
//!
//! println!("served {} bytes", rng.bytes_served());
//! refiller.shutdown();
//! ```
//!
//! ## Architecture
//!
//! Seed source → Amplifier (DRBG) → Cache buffer → `try_take`
//!
//! - **Takes** never block. A held lock, an empty buffer, or an oversize
//!   request all fail immediately; the caller owns the fallback.
//! - **Refill** runs on the [`Refiller`] thread, regenerates only once the
//!   buffer is fully drained, and picks its next wake-up from how full the
//!   buffer is: full buffers are checked less often.
//!
//! Every seed source implements [`SeedSource`]; every DRBG implements
//! [`Amplifier`].

pub mod cache;
pub mod config;
pub mod drbg;
pub mod error;
pub mod handle;
pub mod quality;
pub mod refiller;
pub mod source;

pub use cache::{CacheStats, EntropyCache};
pub use config::{BUFFER_SIZE, REFILL_BASE_DELAY, SEED_SIZE, refill_delay};
pub use drbg::{Amplifier, HashDrbg};
pub use error::{DrbgError, InitError, RefillError, SourceError, TakeError};
pub use handle::{ArchRandom, Served};
pub use quality::{quick_min_entropy, quick_shannon};
pub use refiller::Refiller;
pub use source::{OsSource, RdseedSource, SeedSource, detect_seed_source};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
