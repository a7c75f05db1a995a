use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "qr", about = concat!("quire v", env!("CARGO_PKG_VERSION"), " - plain-text notes with an index"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different workspace directory
    #[arg(short = 'C', long = "dir", global = true)]
    pub dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create quire.toml in the current directory
    Init(InitArgs),
    /// Manage indexed roots
    Roots(RootsCmd),
    /// Bring the index up to date with the files
    Scan(ScanArgs),
    /// Search documents (lexical, vector, or hybrid)
    Search(SearchArgs),
    /// List items
    Items(ItemsArgs),
    /// Show an item with its detail and children
    Show(IdArg),
    /// Mark an item completed (and its children)
    Done(IdArg),
    /// Mark an item in progress
    Start(IdArg),
    /// Mark an item pending
    Reopen(IdArg),
    /// Toggle an item between completed and pending
    Toggle(IdArg),
    /// Set or clear an item's due date
    Due(DueArgs),
    /// Set or clear an item's priority
    Priority(PriorityArgs),
    /// Delete an item with its detail and children
    Rm(IdArg),
    /// Move an item to the end of another document
    Mv(MvArgs),
    /// Show a document's outgoing links and backlinks
    Links(LinksArgs),
    /// List tags with document and item counts
    Tags,
    /// Show index statistics
    Stats,
    /// Watch roots and re-index changed files
    Watch(WatchArgs),
    /// View or manage the recovery log
    Recovery(RecoveryCmd),
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Roots to index (default: ./notes)
    pub roots: Vec<String>,
}

#[derive(Args)]
pub struct RootsCmd {
    #[command(subcommand)]
    pub action: Option<RootsAction>,
}

#[derive(Subcommand)]
pub enum RootsAction {
    /// List configured roots (default)
    List,
    /// Add a root to quire.toml
    Add(RootsAddArgs),
}

#[derive(Args)]
pub struct RootsAddArgs {
    /// Directory or single file to index
    pub path: String,
    /// Root kind (internal, external, linked)
    #[arg(long)]
    pub kind: Option<String>,
    /// Notebook name (default: directory name)
    #[arg(long)]
    pub notebook: Option<String>,
    /// Only index files directly inside the directory
    #[arg(long)]
    pub no_recursive: bool,
    /// Keep the root out of search results
    #[arg(long)]
    pub exclude: bool,
    /// Never write mutations into this root
    #[arg(long)]
    pub read_only: bool,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Re-extract every file, ignoring fingerprints
    #[arg(long)]
    pub full: bool,
    /// Number of scan workers (default: from quire.toml)
    #[arg(long)]
    pub workers: Option<usize>,
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct SearchArgs {
    /// Query text
    pub query: String,
    /// Retrieval mode (lexical, vector, hybrid)
    #[arg(long)]
    pub mode: Option<String>,
    /// Only this notebook
    #[arg(long)]
    pub notebook: Option<String>,
    /// Only documents with this tag (or a child tag)
    #[arg(long)]
    pub tag: Option<String>,
    /// Documents dated on or after (YYYY-MM-DD or expression)
    #[arg(long)]
    pub from: Option<String>,
    /// Documents dated on or before
    #[arg(long)]
    pub to: Option<String>,
    /// Maximum results
    #[arg(long)]
    pub limit: Option<usize>,
    /// Recency half-life in days
    #[arg(long, value_name = "DAYS")]
    pub recency: Option<f64>,
    /// Drop results scoring below this
    #[arg(long)]
    pub min_score: Option<f32>,
    /// Include roots excluded from retrieval
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct ItemsArgs {
    /// Filter by status (pending, in_progress, completed)
    #[arg(long)]
    pub status: Option<String>,
    /// Filter by tag
    #[arg(long)]
    pub tag: Option<String>,
    /// Filter by notebook
    #[arg(long)]
    pub notebook: Option<String>,
    /// Due on or before (YYYY-MM-DD or expression like "friday")
    #[arg(long)]
    pub due_before: Option<String>,
    /// Only incomplete items past their due date
    #[arg(long)]
    pub overdue: bool,
    /// Text contained in the item
    #[arg(long)]
    pub text: Option<String>,
    /// Maximum results
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct LinksArgs {
    /// Notebook name
    pub notebook: String,
    /// Document path within the notebook
    pub path: String,
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct IdArg {
    /// Item ID
    pub id: String,
}

#[derive(Args)]
pub struct DueArgs {
    /// Item ID
    pub id: String,
    /// Date (YYYY-MM-DD, today, friday, +3d, ...) or "none"
    pub date: String,
}

#[derive(Args)]
pub struct PriorityArgs {
    /// Item ID
    pub id: String,
    /// high, medium, low, or none
    pub level: String,
}

#[derive(Args)]
pub struct MvArgs {
    /// Item ID
    pub id: String,
    /// Target notebook
    pub notebook: String,
    /// Target document path (created if missing)
    pub path: String,
}

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct WatchArgs {
    /// Quiet period before re-indexing, in milliseconds
    #[arg(long, default_value_t = 300)]
    pub debounce_ms: u64,
}

// ---------------------------------------------------------------------------
// Recovery log
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RecoveryCmd {
    #[command(subcommand)]
    pub action: Option<RecoveryAction>,
    /// Maximum number of entries to show (default: 10)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand)]
pub enum RecoveryAction {
    /// Remove old entries
    Prune(RecoveryPruneArgs),
    /// Print the absolute path to the recovery log
    Path,
}

#[derive(Args)]
pub struct RecoveryPruneArgs {
    /// Remove entries older than this timestamp (default: 30 days ago)
    #[arg(long)]
    pub before: Option<String>,
    /// Remove all entries
    #[arg(long)]
    pub all: bool,
}
