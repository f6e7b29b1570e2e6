use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "pokehome",
    version,
    about = "Capture, extract and browse a Pokemon HOME collection"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database schema and image directories.
    Init(InitArgs),
    /// Walk the box grid on a connected device and screenshot every Pokemon.
    Capture(CaptureArgs),
    /// Crop per-slot sprites out of captured box screenshots.
    Sprites(SpritesArgs),
    /// Write every captured-but-unparsed record to the parse queue file.
    Queue(QueueArgs),
    /// Run vision extraction over the parse queue.
    Extract(ExtractArgs),
    /// Split the queue into batch files and import finished batches.
    Batch(BatchArgs),
    Status(StatusArgs),
    /// Serve the read API and the built web UI.
    Serve(ServeArgs),
}

/// Paths shared by every command; all defaults live under the collection root. Global, so
/// nested subcommands such as `batch split` accept them after their own name.
#[derive(Args, Debug, Clone)]
pub struct CollectionPaths {
    #[arg(long, global = true, default_value = "collection")]
    pub collection_root: PathBuf,

    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,
}

impl CollectionPaths {
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.collection_root.join("pokemon_home.db"))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.collection_root.join("images")
    }

    pub fn default_queue_path(&self) -> PathBuf {
        self.collection_root.join("parse_queue.json")
    }

    pub fn batch_dir(&self) -> PathBuf {
        self.collection_root.join("batch_results")
    }
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    #[command(flatten)]
    pub paths: CollectionPaths,
}

#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    #[command(flatten)]
    pub paths: CollectionPaths,

    #[arg(long, default_value = "http://127.0.0.1:4723")]
    pub webdriver_url: String,

    /// JSON file with the WebDriver session capabilities.
    #[arg(long)]
    pub capabilities: Option<PathBuf>,

    /// JSON file overriding the calibrated screen layout.
    #[arg(long)]
    pub layout: Option<PathBuf>,

    /// Resume from this box instead of the persisted cursor.
    #[arg(long = "box")]
    pub box_number: Option<u32>,

    /// Resume from this slot instead of the persisted cursor.
    #[arg(long)]
    pub slot: Option<u32>,

    /// Stop after capturing this many Pokemon.
    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value_t = 200)]
    pub max_boxes: u32,

    /// Tap through the launch screen and open the box view before walking.
    #[arg(long, default_value_t = false)]
    pub navigate: bool,

    /// Skip the scrolled-down second detail screenshot.
    #[arg(long, default_value_t = false)]
    pub skip_second_screen: bool,

    /// Walk again from box 0 after a finished walk.
    #[arg(long, default_value_t = false, conflicts_with = "box_number")]
    pub restart: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SpritesArgs {
    #[command(flatten)]
    pub paths: CollectionPaths,

    #[arg(long)]
    pub layout: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct QueueArgs {
    #[command(flatten)]
    pub paths: CollectionPaths,

    #[arg(long)]
    pub queue_path: Option<PathBuf>,

    /// JSON queue/batch files whose keys are already processed elsewhere.
    #[arg(long = "exclude")]
    pub exclude: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub paths: CollectionPaths,

    #[arg(long)]
    pub queue_path: Option<PathBuf>,

    #[arg(long, default_value = "claude-haiku-4-5-20251001")]
    pub model: String,

    #[arg(long, default_value_t = 15)]
    pub concurrency: usize,

    /// Only process the first N queue items.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Re-extract keys that are already parsed.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Log extracted fields without writing to the database.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Extract a single record (requires --slot) instead of reading the queue.
    #[arg(long = "box", requires = "slot")]
    pub box_number: Option<u32>,

    #[arg(long, requires = "box_number")]
    pub slot: Option<u32>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    #[command(flatten)]
    pub paths: CollectionPaths,

    #[command(subcommand)]
    pub command: BatchCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BatchCommand {
    /// Write `input/batch_NNNN.json` files from the parse queue.
    Split {
        #[arg(long, default_value_t = 40)]
        batch_size: usize,

        #[arg(long)]
        queue_path: Option<PathBuf>,

        #[arg(long = "exclude")]
        exclude: Vec<PathBuf>,
    },
    /// Upsert every `output/batch_NNNN.json` file and archive it.
    Import,
    Status,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub paths: CollectionPaths,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub paths: CollectionPaths,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8420)]
    pub port: u16,

    #[arg(long)]
    pub ui_dist: Option<PathBuf>,
}
