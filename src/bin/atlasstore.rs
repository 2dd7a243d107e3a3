//! AtlasStore CLI
//!
//! Command-line interface for inspecting and editing a store.

use std::path::PathBuf;
use std::process;

use atlasstore::{BlockStore, RawObject, StoreConfig, StoreError};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasStore CLI
#[derive(Parser, Debug)]
#[command(name = "atlasstore")]
#[command(about = "Inspect and edit an AtlasStore object store")]
#[command(version)]
struct Args {
    /// Directory holding the store files
    #[arg(short, long, default_value = "./atlasstore_data")]
    dir: PathBuf,

    /// Base name of the .idx/.dat pair
    #[arg(short, long, default_value = "store")]
    name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show store counters
    Stats,

    /// Store a value under an id
    Put {
        /// Object id (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_id)]
        id: u64,

        /// The value to store
        #[arg(required_unless_present = "file")]
        value: Option<String>,

        /// Read the value from a file instead
        #[arg(short, long, conflicts_with = "value")]
        file: Option<PathBuf>,
    },

    /// Print the value stored under an id
    Get {
        #[arg(value_parser = parse_id)]
        id: u64,
    },

    /// Remove an id
    Remove {
        #[arg(value_parser = parse_id)]
        id: u64,
    },

    /// Repack the store files
    Compact,

    /// List every directory slot
    Dump,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,atlasstore=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), StoreError> {
    let config = StoreConfig::builder()
        .data_dir(&args.dir)
        .name(&args.name)
        .build();
    let store = BlockStore::open_with(config)?;

    match args.command {
        Commands::Stats => {
            let stats = store.stats()?;
            println!("live objects:    {}", stats.live_count);
            println!("directory slots: {}", stats.directory_size);
            println!("free slots:      {}", stats.free_slots);
            println!("used blocks:     {}", stats.used_blocks);
            println!("block extent:    {}", stats.block_extent);
            println!("data file bytes: {}", stats.data_file_len);
        }
        Commands::Put { id, value, file } => {
            let bytes = match file {
                Some(path) => std::fs::read(path)?,
                None => value.unwrap_or_default().into_bytes(),
            };
            store.add(&RawObject::new(id, bytes))?;
        }
        Commands::Get { id } => match store.load_bytes(id)? {
            Some(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
            None => eprintln!("(not found)"),
        },
        Commands::Remove { id } => {
            if !store.remove(id)? {
                eprintln!("(not found)");
            }
        }
        Commands::Compact => {
            let stats = store.compact()?;
            if stats.skipped {
                println!("already compact");
            } else {
                println!(
                    "dropped {} slots, blocks {} -> {}, bytes {} -> {}",
                    stats.slots_dropped,
                    stats.blocks_before,
                    stats.blocks_after,
                    stats.bytes_before,
                    stats.bytes_after
                );
            }
        }
        Commands::Dump => {
            for slot in 0..store.directory_size()? {
                match store.allocation(slot)? {
                    Some(record) => println!(
                        "{:>6}  id={:#018x}  block={:<8} len={}",
                        slot, record.id, record.position, record.length
                    ),
                    None => println!("{:>6}  <empty>", slot),
                }
            }
        }
    }

    store.close()
}

/// Parse an id as decimal or 0x-prefixed hex
fn parse_id(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid id {:?}: {}", s, e))
}
