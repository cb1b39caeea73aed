use entropy_cache_core::{ArchRandom, BUFFER_SIZE, Served};
use entropy_cache_server::hex;

use super::InitOptions;

/// Produce `count` hex lines of `bytes` each. Misses (busy, or a tail shorter
/// than `bytes`) are served by the OS CSPRNG, so this never waits on a refill.
fn take_lines(
    rng: &ArchRandom,
    bytes: usize,
    count: usize,
) -> Result<(Vec<String>, usize), getrandom::Error> {
    let mut lines = Vec::with_capacity(count);
    let mut fallbacks = 0;
    let mut buf = vec![0u8; bytes];
    for _ in 0..count {
        if rng.fill_or_else(&mut buf, getrandom::fill)? == Served::Fallback {
            fallbacks += 1;
        }
        lines.push(hex::encode(&buf));
    }
    Ok((lines, fallbacks))
}

pub fn run(init: InitOptions, bytes: usize, count: usize) {
    if bytes > BUFFER_SIZE {
        eprintln!("Error: --bytes {bytes} exceeds cache capacity of {BUFFER_SIZE}");
        std::process::exit(2);
    }

    let (rng, refiller) = super::start_filled(init);
    let result = take_lines(&rng, bytes, count);
    refiller.shutdown();

    match result {
        Ok((lines, fallbacks)) => {
            for line in &lines {
                println!("{line}");
            }
            if fallbacks > 0 {
                log::info!("{fallbacks} of {count} lines served by the OS fallback");
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
