use clap::Parser;
use color_eyre::eyre;
use gpucache::config;
use gpucache::replay::{self, CacheKind};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about = "replay a strided access stream against a cache", long_about = None)]
struct Options {
    #[arg(short = 'k', long = "kind", value_enum, default_value = "l1")]
    kind: CacheKind,

    /// YAML cache configuration (defaults to a 16KB 4-way cache)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Number of accesses to issue
    #[arg(short = 'n', long = "accesses", default_value_t = 4096)]
    accesses: u64,

    /// Distance between consecutive addresses in bytes
    #[arg(short = 's', long = "stride", default_value_t = 32)]
    stride: u64,

    /// Addresses wrap around after this many bytes
    #[arg(short = 'f', long = "footprint", default_value_t = 64 * 1024)]
    footprint: u64,

    /// Issue every n-th access as a write (data caches only)
    #[arg(short = 'w', long = "write-every")]
    write_every: Option<u64>,

    /// Memory latency in cycles
    #[arg(short = 'l', long = "latency", default_value_t = 100)]
    latency: u64,

    /// Number of accesses per miss rate window
    #[arg(long = "window", default_value_t = 512)]
    window: u64,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let options = Options::parse();
    let cache_config = match &options.config {
        Some(path) => config::Cache::from_file(path)?,
        None => options.kind.default_config(),
    };
    println!("{:?} cache: {}", options.kind, cache_config);

    let stream = replay::Stream {
        kind: options.kind,
        accesses: options.accesses,
        stride: options.stride,
        footprint: options.footprint,
        write_every: options.write_every,
        latency: options.latency,
        window: options.window,
    };
    let summary = replay::run(&stream, cache_config)?;

    let window = options.window.max(1);
    for (i, miss_rate) in summary.miss_rates.iter().enumerate() {
        println!(
            "window ending at access {:>6}: miss rate {miss_rate:.3}",
            (i as u64 + 1) * window
        );
    }
    println!(
        "finished after {} cycles ({} accesses, {} completed from memory)",
        summary.cycles, summary.issued, summary.completed
    );
    println!("{:#?}", summary.tag_array);
    println!("{:#?}", summary.stats);
    println!(
        "sent: {} reads, {} writes, {} write allocates, {} write-backs",
        summary.reads_sent,
        summary.writes_sent,
        summary.write_allocates_sent,
        summary.write_backs_sent
    );
    println!(
        "memory: {} reads, {} writes",
        summary.memory_reads, summary.memory_writes
    );
    Ok(())
}
