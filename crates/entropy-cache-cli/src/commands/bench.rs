use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use entropy_cache_core::{ArchRandom, Served, quick_min_entropy, quick_shannon};
use rand::Rng;

use super::InitOptions;

/// Cache bytes kept per thread for the entropy estimate.
const SAMPLE_LIMIT: usize = 64 * 1024;

pub struct BenchCommandConfig<'a> {
    pub init: InitOptions,
    pub threads: usize,
    pub seconds: f64,
    pub max_size: usize,
    pub output_path: Option<&'a str>,
}

#[derive(Default)]
struct WorkerReport {
    hits: u64,
    fallbacks: u64,
    cache_bytes: u64,
    fallback_bytes: u64,
    errors: u64,
    sample: Vec<u8>,
}

impl WorkerReport {
    fn merge(&mut self, other: WorkerReport) {
        self.hits += other.hits;
        self.fallbacks += other.fallbacks;
        self.cache_bytes += other.cache_bytes;
        self.fallback_bytes += other.fallback_bytes;
        self.errors += other.errors;
        self.sample.extend_from_slice(&other.sample);
    }

    fn served_fraction(&self) -> f64 {
        let total = self.hits + self.fallbacks;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

fn worker(rng: &ArchRandom, max_size: usize, deadline: Instant) -> WorkerReport {
    let mut report = WorkerReport::default();
    let mut sizes = rand::rng();
    let mut buf = vec![0u8; max_size];
    while Instant::now() < deadline {
        let n = sizes.random_range(1..=max_size);
        let out = &mut buf[..n];
        match rng.fill_or_else(out, getrandom::fill) {
            Ok(Served::Cache) => {
                report.hits += 1;
                report.cache_bytes += n as u64;
                if report.sample.len() < SAMPLE_LIMIT {
                    report.sample.extend_from_slice(out);
                }
            }
            Ok(Served::Fallback) => {
                report.fallbacks += 1;
                report.fallback_bytes += n as u64;
            }
            Err(_) => report.errors += 1,
        }
    }
    report
}

/// Bench length from `--seconds`; `None` unless finite, positive and
/// representable.
fn bench_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|d| !d.is_zero())
}

pub fn run(config: BenchCommandConfig<'_>) {
    let BenchCommandConfig {
        init,
        threads,
        seconds,
        max_size,
        output_path,
    } = config;

    let duration = match bench_duration(seconds) {
        Some(d) if threads > 0 && max_size > 0 => d,
        _ => {
            eprintln!("Error: --threads, --max-size and --seconds must be positive and finite");
            std::process::exit(2);
        }
    };

    let (rng, refiller) = super::start_filled(init);
    let rng = Arc::new(rng);

    println!(
        "Benchmarking {threads} threads for {seconds:.1}s, request sizes 1..={max_size} bytes...\n"
    );

    let t0 = Instant::now();
    let Some(deadline) = t0.checked_add(duration) else {
        refiller.shutdown();
        eprintln!("Error: --seconds {seconds} is too large");
        std::process::exit(2);
    };
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let rng = Arc::clone(&rng);
            thread::spawn(move || worker(&rng, max_size, deadline))
        })
        .collect();

    let mut total = WorkerReport::default();
    for handle in handles {
        match handle.join() {
            Ok(report) => total.merge(report),
            Err(_) => eprintln!("Warning: a bench worker panicked"),
        }
    }
    let elapsed = t0.elapsed().as_secs_f64();
    refiller.shutdown();

    let requests = total.hits + total.fallbacks;
    println!("  Requests:        {requests}");
    println!(
        "  Cache hits:      {} ({:.1}%)",
        total.hits,
        total.served_fraction() * 100.0
    );
    println!("  OS fallbacks:    {}", total.fallbacks);
    if total.errors > 0 {
        println!("  Fallback errors: {}", total.errors);
    }
    println!(
        "  Cache bytes:     {} ({:.1} KiB/s)",
        total.cache_bytes,
        total.cache_bytes as f64 / 1024.0 / elapsed
    );
    println!("  Fallback bytes:  {}", total.fallback_bytes);

    if !total.sample.is_empty() {
        println!(
            "  Sample quality:  H={:.3}  H∞={:.3}  ({} bytes)",
            quick_shannon(&total.sample),
            quick_min_entropy(&total.sample),
            total.sample.len()
        );
    }

    let stats = rng.stats();
    if let Some(stats) = &stats {
        println!(
            "  Cache counters:  {} refills, {} skipped, {} failed, hit rate {:.1}%",
            stats.refills,
            stats.refills_skipped,
            stats.refill_failures,
            stats.hit_rate() * 100.0
        );
    }

    if let Some(path) = output_path {
        let json = serde_json::json!({
            "threads": threads,
            "seconds": elapsed,
            "max_size": max_size,
            "requests": requests,
            "cache_hits": total.hits,
            "fallbacks": total.fallbacks,
            "cache_bytes": total.cache_bytes,
            "fallback_bytes": total.fallback_bytes,
            "stats": stats,
        });
        super::write_json(&json, path, "Bench results");
    }
}
