use super::InitOptions;

pub fn run(init: InitOptions, host: &str, port: u16) {
    let (rng, refiller) = super::start(init, true);

    let base = format!("http://{host}:{port}");
    let source = rng.cache().map_or("none", |c| c.source_name());

    println!("entropy-cache server v{}", entropy_cache_core::VERSION);
    println!("   {base}");
    println!("   seed source: {source}");
    println!();
    println!("   Endpoints:");
    println!("     GET /                 API index (try: curl {base})");
    println!("     GET /api/v1/random    Random bytes (cache first, OS fallback)");
    println!("     GET /health           Cache health check");
    println!("     GET /stats            Cache counters");
    println!();
    println!("   Query params for /api/v1/random:");
    println!(
        "     length=N              Bytes to return (1-{}, default: 32)",
        entropy_cache_server::MAX_LENGTH
    );
    println!("     type=hex|uint8        Output format (default: hex)");
    println!();
    println!("   Examples:");
    println!("     curl {base}/api/v1/random?length=32&type=uint8");
    println!("     curl {base}/stats");
    println!();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };
    let result = rt.block_on(entropy_cache_server::run_server(rng, host, port));
    refiller.shutdown();
    if let Err(e) = result {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}
