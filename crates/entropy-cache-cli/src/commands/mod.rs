pub mod bench;
pub mod server;
pub mod status;
pub mod take;
pub mod watch;

use std::thread;
use std::time::{Duration, Instant};

use entropy_cache_core::{
    ArchRandom, BUFFER_SIZE, HashDrbg, OsSource, REFILL_BASE_DELAY, Refiller, SeedSource,
    detect_seed_source,
};

/// How long commands wait for the first fill before giving up.
const FIRST_FILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Global options that affect cache construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    pub os_seed: bool,
}

fn seed_source(init: InitOptions) -> Box<dyn SeedSource> {
    if init.os_seed {
        Box::new(OsSource)
    } else {
        detect_seed_source()
    }
}

/// Build the cache handle and its refiller. With `prime`, trigger the first
/// refill immediately instead of after the base delay.
///
/// Exits the process if no entropy source is usable: every command needs one.
pub fn start(init: InitOptions, prime: bool) -> (ArchRandom, Refiller) {
    match ArchRandom::init(seed_source(init), Box::new(HashDrbg::new())) {
        Ok((rng, refiller)) => {
            log::debug!("cache handle ready (prime: {prime})");
            if prime {
                refiller.kick();
            }
            (rng, refiller)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Block until the cache holds a full buffer, or the timeout expires.
pub fn wait_for_fill(rng: &ArchRandom, timeout: Duration) -> bool {
    let Some(cache) = rng.cache() else {
        return false;
    };
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cache.remaining() == BUFFER_SIZE {
            return true;
        }
        thread::sleep(REFILL_BASE_DELAY / 50);
    }
    false
}

/// `start` + `wait_for_fill`, reporting a timeout on stderr.
pub fn start_filled(init: InitOptions) -> (ArchRandom, Refiller) {
    let (rng, refiller) = start(init, true);
    if !wait_for_fill(&rng, FIRST_FILL_TIMEOUT) {
        eprintln!(
            "Warning: cache not filled after {}s, continuing anyway",
            FIRST_FILL_TIMEOUT.as_secs()
        );
    }
    (rng, refiller)
}

/// Pretty-print `json` to `path`, reporting the outcome on stdout/stderr.
pub fn write_json(json: &serde_json::Value, path: &str, label: &str) {
    match serde_json::to_string_pretty(json) {
        Ok(text) => match std::fs::write(path, text) {
            Ok(()) => println!("{label} written to {path}"),
            Err(e) => eprintln!("Error writing {path}: {e}"),
        },
        Err(e) => eprintln!("Error serializing {label}: {e}"),
    }
}
