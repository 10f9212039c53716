//! chunkstore bench driver
//!
//! Creates (or reopens) a database, fills it with ring records, and reports
//! throughput.

use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chunkstore::{Database, Result, Scalar, Shape};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// chunkstore bench
#[derive(Parser, Debug)]
#[command(name = "chunkstore-bench")]
#[command(about = "Allocate and fill ring records in a chunkstore database")]
#[command(version)]
struct Args {
    /// Database directory (created if missing)
    path: PathBuf,

    /// Chunk size in MB for new chunks [default: 64 on create, newest chunk's size on reopen]
    #[arg(short, long)]
    chunk_size_mb: Option<usize>,

    /// Number of ring records to write
    #[arg(short = 'n', long, default_value = "10000")]
    count: usize,

    /// Items per ring
    #[arg(short, long, default_value = "64")]
    ring_len: usize,

    /// Flush on every put instead of once at the end
    #[arg(short, long)]
    durable: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chunkstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("chunkstore-bench v{}", chunkstore::VERSION);
    tracing::info!("Database path: {}", args.path.display());

    if let Err(e) = run(&args) {
        tracing::error!("Bench failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let chunk_size = args.chunk_size_mb.map(|mb| mb * 1024 * 1024);
    let db = if args.path.exists() {
        Database::open(&args.path, chunk_size)?
    } else {
        Database::create(&args.path, chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE))?
    };
    tracing::info!("Chunk size: {} bytes", db.chunk_size());

    let event = Shape::record("Event", [("kind", Scalar::U64), ("timestamp", Scalar::F64)])?;
    let ring = Shape::ring(args.ring_len, &event)?;
    tracing::info!(
        "Ring shape: {} ({} bytes, {} records)",
        ring.name(),
        ring.size(),
        args.count
    );

    let start = Instant::now();
    for n in 0..args.count {
        let view = db.allocate(&ring, false)?;
        let events = view.as_ring()?;
        for i in 0..events.len() {
            let item = events.append()?.as_view()?;
            item.set_uint("kind", (n * events.len() + i) as u64)?;
            item.set_float("timestamp", now())?;
            item.set_used(true)?;
        }
        db.put(None, &view, args.durable)?;
    }
    db.flush_all()?;
    let elapsed = start.elapsed();

    let bytes = (args.count * ring.size()) as f64;
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    tracing::info!(
        "Wrote {} records in {:.3}s ({:.0} records/s, {:.1} MB/s)",
        args.count,
        secs,
        args.count as f64 / secs,
        bytes / secs / (1024.0 * 1024.0)
    );
    tracing::info!("Chunks on disk: {}", db.chunk_count());

    db.close()
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
