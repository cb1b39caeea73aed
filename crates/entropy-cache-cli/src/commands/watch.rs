use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use entropy_cache_core::CacheStats;

use super::InitOptions;

fn format_line(elapsed: Duration, stats: &CacheStats) -> String {
    format!(
        "[{:>7.1}s] remaining {:>4}/{}  served {:>9}  refills {:>4} (skipped {}, failed {})  busy {}  exhausted {}",
        elapsed.as_secs_f64(),
        stats.remaining,
        stats.capacity,
        stats.bytes_served,
        stats.refills,
        stats.refills_skipped,
        stats.refill_failures,
        stats.busy_misses,
        stats.exhausted_misses,
    )
}

pub fn run(init: InitOptions, interval_ms: u64, drain: usize) {
    let (rng, refiller) = super::start(init, true);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    let interval = Duration::from_millis(interval_ms.max(10));
    println!(
        "Watching entropy cache (source: {}), Ctrl+C to stop",
        rng.cache().map_or("none", |c| c.source_name())
    );
    if drain > 0 {
        println!("Draining {drain} bytes per tick");
    }
    println!();

    let start = Instant::now();
    while running.load(Ordering::SeqCst) {
        if drain > 0 {
            // Misses are expected here; they show up in the counters.
            let _ = rng.try_take(drain);
        }
        if let Some(stats) = rng.stats() {
            println!("{}", format_line(start.elapsed(), &stats));
        }
        thread::sleep(interval);
    }

    println!("\nStopping refiller...");
    refiller.shutdown();
}
