//! FutureKV fan-out demo
//!
//! Starts a number of reader threads that all ask for the same missing key
//! through `get_else_set`, then reports how many times the producer ran.
//!
//! Run with: cargo run --example fanout -- --readers 32 --delay-ms 200

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use futurekv::{FutureMap, MapConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// FutureKV fan-out demo
#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(about = "Many readers, one producer")]
#[command(version)]
struct Args {
    /// Number of reader threads
    #[arg(short, long, default_value = "16")]
    readers: usize,

    /// Simulated producer latency in milliseconds
    #[arg(short, long, default_value = "100")]
    delay_ms: u64,

    /// Producer worker pool size (0 spawns a thread per producer)
    #[arg(short, long, default_value = "0")]
    workers: usize,

    /// Disable producer coalescing
    #[arg(long)]
    no_coalesce: bool,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,futurekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .init();

    let args = Args::parse();

    tracing::info!("FutureKV v{} fan-out demo", futurekv::VERSION);

    let mut builder = MapConfig::builder().coalesce_producers(!args.no_coalesce);
    if args.workers > 0 {
        builder = builder.worker_pool(args.workers);
    }

    let map: FutureMap<String, String> = match FutureMap::with_config(builder.build()) {
        Ok(map) => map,
        Err(e) => {
            tracing::error!("Failed to create map: {}", e);
            std::process::exit(1);
        }
    };

    let producer_runs = Arc::new(AtomicUsize::new(0));
    let delay = Duration::from_millis(args.delay_ms);
    let started = Instant::now();

    let readers: Vec<_> = (0..args.readers)
        .map(|id| {
            let map = map.clone();
            let producer_runs = Arc::clone(&producer_runs);
            thread::spawn(move || {
                let promise = map.get_else_set("config".to_string(), move || {
                    producer_runs.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(delay);
                    "loaded".to_string()
                });
                match promise.wait_timeout(delay * 10 + Duration::from_secs(1)) {
                    Ok(value) => tracing::info!("Reader {} got {:?}", id, value),
                    Err(e) => tracing::warn!("Reader {} failed: {}", id, e),
                }
            })
        })
        .collect();

    for reader in readers {
        if reader.join().is_err() {
            tracing::error!("Reader thread panicked");
        }
    }

    tracing::info!(
        "{} readers served in {:?}, producer ran {} time(s)",
        args.readers,
        started.elapsed(),
        producer_runs.load(Ordering::SeqCst)
    );
}
