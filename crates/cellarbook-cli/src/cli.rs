use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "cellarbook")]
#[command(about = "Catalog a pipe tobacco cellar from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a blend to the catalog
    #[command(alias = "new")]
    Add {
        brand: String,
        blend: String,
        #[command(flatten)]
        fields: ItemFields,
    },
    /// List the collection
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        filter: FilterArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one item with its tins
    Show {
        /// Item id, or text matching exactly one brand + blend
        item: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing item
    Edit {
        /// Item id, or text matching exactly one brand + blend
        item: String,
        /// New brand
        #[arg(long)]
        brand: Option<String>,
        /// New blend name
        #[arg(long)]
        blend: Option<String>,
        #[command(flatten)]
        fields: ItemFields,
        /// Remove the rating
        #[arg(long, conflicts_with = "rating")]
        clear_rating: bool,
    },
    /// Delete an item and its tins
    Delete {
        /// Item id, or text matching exactly one brand + blend
        item: String,
    },
    /// Manage the tins of an item
    Tin {
        #[command(subcommand)]
        command: TinCommands,
    },
    /// Component and flavoring names
    Names {
        #[command(subcommand)]
        command: Option<NamesCommands>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a collection CSV
    Import {
        /// CSV file to read
        path: PathBuf,
        /// Update items that already exist instead of skipping them
        #[arg(long)]
        merge: bool,
    },
    /// Export the collection
    Export {
        /// One row per tin instead of one row per item
        #[arg(long)]
        tins: bool,
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Collection statistics
    Stats {
        #[command(flatten)]
        filter: FilterArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync with the configured remote
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Show or change preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Item fields shared by `add` and `edit`; omitted flags keep their value
#[derive(Args, Debug, Default, Clone)]
pub struct ItemFields {
    /// Blend type, e.g. "Virginia", "English"
    #[arg(long = "type", value_name = "TYPE")]
    pub item_type: Option<String>,
    #[arg(long)]
    pub sub_genre: Option<String>,
    /// Cut, e.g. "Flake", "Ribbon"
    #[arg(long)]
    pub cut: Option<String>,
    /// Number of tins on hand
    #[arg(long)]
    pub quantity: Option<i64>,
    /// Rating from 0 to 5
    #[arg(long)]
    pub rating: Option<f64>,
    #[arg(long)]
    pub notes: Option<String>,
    /// Comma-separated component names (replaces the list)
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub components: Option<Vec<String>>,
    /// Comma-separated flavoring names (replaces the list)
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub flavoring: Option<Vec<String>>,
    #[arg(long, value_name = "BOOL")]
    pub favorite: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    pub disliked: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    pub in_production: Option<bool>,
    /// Include this item in device sync
    #[arg(long, value_name = "BOOL")]
    pub sync: Option<bool>,
}

/// Tin fields shared by `tin add` and `tin edit`
#[derive(Args, Debug, Default, Clone)]
pub struct TinFields {
    /// Container, e.g. "Tin", "Jar", "Bulk"
    #[arg(long)]
    pub container: Option<String>,
    /// Amount with an optional unit, e.g. "1.75 oz" or "50g"
    #[arg(long, value_name = "AMOUNT")]
    pub quantity: Option<String>,
    /// Manufacture date
    #[arg(long, value_name = "DATE")]
    pub manufactured: Option<String>,
    /// Date the tin went into the cellar
    #[arg(long, value_name = "DATE")]
    pub cellared: Option<String>,
    /// Date the tin was opened
    #[arg(long, value_name = "DATE")]
    pub opened: Option<String>,
    #[arg(long, value_name = "BOOL")]
    pub finished: Option<bool>,
}

/// Collection filter and sort flags
#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Only these brands (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub brand: Vec<String>,
    /// Only these types (comma-separated)
    #[arg(long = "type", value_delimiter = ',', value_name = "TYPE")]
    pub types: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    pub sub_genre: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    pub cut: Vec<String>,
    /// Items containing any of these components
    #[arg(long, value_delimiter = ',')]
    pub component: Vec<String>,
    /// Items with any of these flavorings
    #[arg(long, value_delimiter = ',')]
    pub flavoring: Vec<String>,
    #[arg(long)]
    pub favorites: bool,
    #[arg(long)]
    pub hide_disliked: bool,
    #[arg(long, value_enum)]
    pub production: Option<ProductionArg>,
    #[arg(long, value_enum)]
    pub rated: Option<RatingArg>,
    /// Items with at least one tin in this state
    #[arg(long, value_enum)]
    pub tin_state: Option<TinStateArg>,
    /// Free text matched against brand, blend and notes
    #[arg(short, long)]
    pub search: Option<String>,
    /// Sort field (defaults to the saved preference)
    #[arg(long, value_enum)]
    pub sort: Option<SortArg>,
    /// Sort descending
    #[arg(long)]
    pub desc: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProductionArg {
    InProduction,
    Discontinued,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum RatingArg {
    Rated,
    Unrated,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum TinStateArg {
    HasTins,
    Opened,
    Finished,
    Cellared,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SortArg {
    Brand,
    Blend,
    Type,
    Quantity,
    Rating,
    Modified,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub const fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Subcommand)]
pub enum TinCommands {
    /// Add a tin to an item
    Add {
        /// Item id, or text matching exactly one brand + blend
        item: String,
        /// Tin label, unique within the item
        label: String,
        #[command(flatten)]
        fields: TinFields,
    },
    /// List the tins of an item
    List {
        item: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a tin
    Edit {
        /// Tin id
        id: i64,
        /// New label
        #[arg(long)]
        label: Option<String>,
        #[command(flatten)]
        fields: TinFields,
    },
    /// Mark a tin finished
    Finish {
        /// Tin id
        id: i64,
    },
    /// Delete a tin
    Delete {
        /// Tin id
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum NamesCommands {
    /// List components and flavoring with usage counts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete names no item uses
    Prune,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Upload the pending operation queue
    Upload,
    /// Replay batches uploaded by other devices
    Download,
    /// Upload, then download
    Run,
    /// Keep syncing on the configured intervals until interrupted
    Watch,
    /// Show sync settings and queue state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum PrefsCommands {
    /// Print the current preferences
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Turn device sync on or off
    Sync {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Only sync on unmetered networks
    UnmeteredOnly {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Include or exclude one item from sync
    ItemSync {
        /// Item id, or text matching exactly one brand + blend
        item: String,
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Set the default collection sort
    Sort {
        #[arg(value_enum)]
        field: SortArg,
        /// Sort descending
        #[arg(long)]
        desc: bool,
    },
}
