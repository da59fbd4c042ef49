//! TuneVault CLI - operate on the download ledger, migrations and watch list.
//!
//! Downloading needs a catalog protocol client, which this binary does not
//! ship; everything that only touches local state lives here.

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use tunevault::config::{AppSettings, PathsConfig, TransferConfig};
use tunevault::{DownloadLedger, MigrationRegistry, Quality, WatchedPlaylist};

#[derive(Parser, Debug)]
#[command(name = "tunevault")]
#[command(about = "Manage a TuneVault library", version)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Application directory (defaults to ~/.tunevault)
    #[arg(long, global = true)]
    app_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending library migrations
    Migrate {
        /// Show what would change without touching files or the ledger
        #[arg(long)]
        dry_run: bool,

        /// List migrations and whether they have been applied
        #[arg(long, conflicts_with = "dry_run")]
        status: bool,

        /// Library root (defaults to the configured output directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Manage watched playlists
    Watch {
        #[command(subcommand)]
        action: WatchAction,
    },

    /// Inspect the download ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand, Debug)]
enum WatchAction {
    /// Start watching a playlist
    Add(WatchAddArgs),
    /// List watched playlists
    List,
    /// Stop watching a playlist
    Remove {
        playlist_id: String,
    },
}

#[derive(ClapArgs, Debug)]
struct WatchAddArgs {
    playlist_id: String,

    /// Download quality: mp3_128, mp3_320, flac or best
    #[arg(short, long, default_value = "best")]
    quality: String,

    /// Fetch tempo and key
    #[arg(long)]
    bpm: bool,

    /// Fetch genre
    #[arg(long)]
    genre: bool,

    /// Per-song timeout in seconds
    #[arg(short, long, default_value_t = TransferConfig::DEFAULT_ITEM_TIMEOUT.as_secs())]
    timeout: u64,
}

#[derive(Subcommand, Debug)]
enum LedgerAction {
    /// Print the record of one song
    Show { song_id: String },
}

fn open_ledger(app_dir: &Path) -> Result<DownloadLedger> {
    let path = app_dir.join(PathsConfig::LEDGER_FILE_NAME);
    DownloadLedger::open(&path).with_context(|| format!("failed to open ledger {}", path.display()))
}

fn run_migrate(app_dir: &Path, output_dir: Option<PathBuf>, dry_run: bool, status: bool) -> Result<()> {
    let ledger = open_ledger(app_dir)?;
    let registry = MigrationRegistry::with_defaults();

    if status {
        for migration in registry.status(&ledger)? {
            let state = match migration.applied_at {
                Some(at) => format!("applied {}", at.format("%Y-%m-%d %H:%M:%S")),
                None => "pending".to_string(),
            };
            println!("{:04} {:<28} {}", migration.id, migration.name, state);
            println!("     {}", migration.description);
        }
        return Ok(());
    }

    let output_root = match output_dir {
        Some(dir) => dir,
        None => AppSettings::load(app_dir)?.output_root()?,
    };
    if !output_root.is_dir() {
        bail!("output directory {} does not exist", output_root.display());
    }
    info!("Migrating library at {}", output_root.display());

    let report = registry.run(&ledger, &output_root, dry_run)?;
    for applied in &report.applied {
        println!(
            "{}Migration {} ({}): {} files",
            if report.dry_run { "[DRY RUN] " } else { "" },
            applied.id,
            applied.name,
            applied.moves.len()
        );
        for file_move in &applied.moves {
            println!("    {} -> {}", file_move.from.display(), file_move.to.display());
        }
    }
    if report.applied.is_empty() {
        println!("No pending migrations");
    }
    Ok(())
}

fn run_watch(app_dir: &Path, action: WatchAction) -> Result<()> {
    let ledger = open_ledger(app_dir)?;
    match action {
        WatchAction::Add(args) => {
            let quality: Quality = args.quality.parse()?;
            if args.timeout == 0 {
                bail!("timeout must be greater than zero");
            }
            let playlist = WatchedPlaylist {
                id: args.playlist_id,
                quality,
                bpm: args.bpm,
                genre: args.genre,
                timeout_secs: args.timeout,
            };
            ledger.save_watched(&playlist)?;
            println!("Watching playlist {} ({})", playlist.id, playlist.quality);
        }
        WatchAction::List => {
            let playlists = ledger.list_watched()?;
            if playlists.is_empty() {
                println!("No watched playlists");
            }
            for playlist in playlists {
                println!(
                    "{}  quality={} bpm={} genre={} timeout={}s",
                    playlist.id, playlist.quality, playlist.bpm, playlist.genre, playlist.timeout_secs
                );
            }
        }
        WatchAction::Remove { playlist_id } => {
            if ledger.remove_watched(&playlist_id)? {
                println!("Stopped watching playlist {}", playlist_id);
            } else {
                bail!("playlist {} is not watched", playlist_id);
            }
        }
    }
    Ok(())
}

fn run_ledger(app_dir: &Path, action: LedgerAction) -> Result<()> {
    let ledger = open_ledger(app_dir)?;
    match action {
        LedgerAction::Show { song_id } => match ledger.get(&song_id)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => bail!("song {} has not been downloaded", song_id),
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let app_dir = match args.app_dir {
        Some(dir) => dir,
        None => AppSettings::default_app_dir()?,
    };

    match args.command {
        Command::Migrate {
            dry_run,
            status,
            output_dir,
        } => {
            // Migrations hash and move files synchronously.
            tokio::task::spawn_blocking(move || run_migrate(&app_dir, output_dir, dry_run, status))
                .await??
        }
        Command::Watch { action } => run_watch(&app_dir, action)?,
        Command::Ledger { action } => run_ledger(&app_dir, action)?,
    }

    Ok(())
}
