//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "articlecraft",
    version,
    about = "Article recommendation, representative sampling and retrieval-augmented writing",
    long_about = "ArticleCraft indexes an article corpus for content-based recommendations, \
                  selects diverse representative samples from large corpora, and drafts new \
                  articles grounded in similar existing ones."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/articlecraft/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build and persist the recommendation and reference indexes
    Build {
        /// JSONL corpus (defaults to the article store, then storage.corpus_file)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Skip the generation reference index
        #[arg(long)]
        skip_reference: bool,
    },

    /// Recommend articles similar to free text
    Recommend {
        /// Query text
        query: String,

        /// Number of recommendations
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recommend articles similar to an existing article
    Similar {
        /// Exact title of an indexed article
        title: String,

        /// Number of recommendations
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate an article for a new title
    Generate {
        /// Title of the article to write
        title: String,

        /// Number of reference segments to retrieve
        #[arg(short = 'n', long)]
        num_similar: Option<usize>,

        /// Save the article as markdown (file, or directory for the default name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Select representative samples from a large JSONL corpus
    Sample {
        /// JSONL corpus (defaults to storage.corpus_file)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory (defaults to sampler.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rows per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Clusters per chunk
        #[arg(long)]
        clusters: Option<usize>,

        /// Samples kept per cluster
        #[arg(long)]
        per_cluster: Option<usize>,
    },

    /// Import a JSONL corpus into the article store
    Import {
        /// JSONL file with title, text and optional clean_text, url, id
        input: PathBuf,
    },

    /// Show which capabilities are available
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve queries over the Unix socket until signalled
    Serve,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
