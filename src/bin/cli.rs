//! chunkstore CLI
//!
//! Command-line access to a collection stored in a directory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chunkstore::txlog::read_chunk;
use chunkstore::{Config, FileRawStore, RawStore, Result, TransactionStore};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "info,chunkstore=debug";

/// chunkstore CLI
#[derive(Parser, Debug)]
#[command(name = "chunkstore-cli")]
#[command(about = "Inspect and edit a chunkstore collection")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./chunkstore_data")]
    data_dir: PathBuf,

    /// Collection name
    #[arg(short, long, default_value = "default")]
    collection: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List all keys
    Keys,

    /// Fold the log into fresh chunk files
    Compact,

    /// Show per-chunk frame statistics
    Inspect,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let dir = args.data_dir.join("collections").join(&args.collection);
    tokio::fs::create_dir_all(&dir).await?;
    let raw: Arc<dyn RawStore> = Arc::new(FileRawStore::new(dir));

    // One-shot process: no debounce, no background polling
    let config = Config::builder()
        .name(args.collection.as_str())
        .write_delay_ms(0)
        .resync_interval_ms(0)
        .build();

    if let Commands::Inspect = args.command {
        return inspect(raw.as_ref()).await;
    }

    let store = TransactionStore::open(Arc::clone(&raw), config).await?;
    match args.command {
        Commands::Get { key } => match store.get(&key) {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            store.set(key, value.into_bytes());
            println!("OK");
        }
        Commands::Del { key } => {
            store.remove(&key);
            println!("OK");
        }
        Commands::Keys => {
            for key in store.keys() {
                println!("{}", key);
            }
        }
        Commands::Compact => {
            let before = store.chunk_files().await?.len();
            store.compact().await?;
            let after = store.chunk_files().await?.len();
            println!("{} chunk files -> {}", before, after);
        }
        Commands::Inspect => {}
    }

    store.close().await
}

async fn inspect(raw: &dyn RawStore) -> Result<()> {
    let mut files: Vec<String> = raw
        .get_keys()
        .await?
        .into_iter()
        .filter(|key| chunkstore::txlog::is_chunk_file(key))
        .collect();
    files.sort();

    println!("{:<48} {:>10} {:>8} {:>8} {:>8}", "FILE", "BYTES", "FRAMES", "BAD", "SKIPPED");
    for file in &files {
        let Some(bytes) = raw.get(file).await? else {
            continue;
        };
        match read_chunk(file, &bytes) {
            Ok(scan) => println!(
                "{:<48} {:>10} {:>8} {:>8} {:>8}",
                file,
                bytes.len(),
                scan.entries.len(),
                scan.bad_frames,
                scan.skipped_bytes
            ),
            Err(e) => println!("{:<48} {:>10} unreadable: {}", file, bytes.len(), e),
        }
    }
    println!("{} chunk files", files.len());
    Ok(())
}
