//! CLI for entropy-cache, a non-blocking cache of fresh random bytes.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "entropy-cache")]
#[command(about = "entropy-cache: non-blocking random bytes, refilled in the background")]
#[command(version = entropy_cache_core::VERSION)]
struct Cli {
    /// Use the OS CSPRNG as seed source even if the CPU has RDSEED
    #[arg(long, global = true)]
    os_seed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print random bytes from the cache as hex lines
    Take {
        /// Bytes per line (at most the cache capacity)
        #[arg(long, default_value = "32")]
        bytes: usize,

        /// Number of lines
        #[arg(long, default_value = "1")]
        count: usize,
    },

    /// Hammer the cache from many threads and report hit rate and fallback use
    Bench {
        /// Concurrent consumer threads
        #[arg(long, default_value = "4")]
        threads: usize,

        /// Benchmark duration in seconds
        #[arg(long, default_value = "3.0")]
        seconds: f64,

        /// Largest request size; each take picks a random size in 1..=max
        #[arg(long, default_value = "256")]
        max_size: usize,

        /// Write the final cache counters as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Print cache counters periodically until Ctrl-C
    Watch {
        /// Refresh interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Bytes to take per refresh, to show refills happening
        #[arg(long, default_value = "0")]
        drain: usize,
    },

    /// One-shot cache status after the first fill
    Status,

    /// Start an HTTP entropy server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8042")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let init = commands::InitOptions {
        os_seed: cli.os_seed,
    };

    match cli.command {
        Commands::Take { bytes, count } => commands::take::run(init, bytes, count),
        Commands::Bench {
            threads,
            seconds,
            max_size,
            output,
        } => commands::bench::run(commands::bench::BenchCommandConfig {
            init,
            threads,
            seconds,
            max_size,
            output_path: output.as_deref(),
        }),
        Commands::Watch { interval_ms, drain } => commands::watch::run(init, interval_ms, drain),
        Commands::Status => commands::status::run(init),
        Commands::Serve { port, host } => commands::server::run(init, &host, port),
    }
}
