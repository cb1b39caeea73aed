use entropy_cache_core::{BUFFER_SIZE, REFILL_BASE_DELAY, quick_min_entropy, quick_shannon};

use super::InitOptions;

pub fn run(init: InitOptions) {
    let (rng, refiller) = super::start_filled(init);

    println!("entropy-cache v{}", entropy_cache_core::VERSION);
    println!("  Capacity:    {BUFFER_SIZE} bytes");
    println!("  Base delay:  {}ms", REFILL_BASE_DELAY.as_millis());

    let Some(stats) = rng.stats() else {
        println!("  Available:   no");
        refiller.shutdown();
        return;
    };
    println!("  Available:   yes");
    println!("  Seed source: {}", stats.source);
    println!("  Remaining:   {} bytes", stats.remaining);
    println!("  Refills:     {}", stats.refills);

    // Drain the whole buffer once to grade the amplifier output.
    match rng.try_take(stats.remaining) {
        Ok(sample) if !sample.is_empty() => {
            println!(
                "  Quality:     H={:.3}  H∞={:.3}  ({} bytes)",
                quick_shannon(&sample),
                quick_min_entropy(&sample),
                sample.len()
            );
        }
        Ok(_) => println!("  Quality:     no bytes cached yet"),
        Err(e) => println!("  Quality:     unavailable ({e})"),
    }

    refiller.shutdown();
}
