use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "lecture-rag", about = "Ask questions about the course slides", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings that apply to every command. Each one overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (TOML). Defaults to ./lecture-rag.toml when present
    #[arg(long, short = 'c', global = true, env = "LECTURE_RAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the storage buckets
    #[arg(long, global = true, env = "LECTURE_RAG_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,

    /// Bucket holding documents and index artifacts
    #[arg(long, global = true, env = "LECTURE_RAG_BUCKET")]
    pub bucket: Option<String>,

    /// Storage region
    #[arg(long, global = true, env = "LECTURE_RAG_REGION")]
    pub region: Option<String>,

    /// API key for the completion service
    #[arg(long, global = true, env = "LECTURE_RAG_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API key for a remote embedding backend
    #[arg(long, global = true, env = "LECTURE_RAG_EMBEDDING_API_KEY", hide_env_values = true)]
    pub embedding_api_key: Option<String>,

    /// Completion model
    #[arg(long, global = true, env = "LECTURE_RAG_MODEL")]
    pub model: Option<String>,

    /// Number of chunks retrieved per question
    #[arg(long, global = true)]
    pub top_k: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download the raw PDF documents from storage
    PullDocs,

    /// Build the vector index from the raw documents
    Build {
        /// Directory of PDF files
        #[arg(long)]
        raw_dir: Option<PathBuf>,
        /// Where to write the index
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Upload the built index to storage
    Push {
        /// Index directory to upload
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },

    /// Pull documents, build the index and push it
    Pipeline,

    /// Answer one question
    Ask {
        /// The question
        question: String,
        #[command(flatten)]
        source: IndexSource,
    },

    /// Interactive question session
    Chat {
        #[command(flatten)]
        source: IndexSource,
    },

    /// Run the evaluation questions and write a CSV report
    Eval {
        /// Report path
        #[arg(long)]
        output: Option<PathBuf>,
        /// Questions file, one per line (defaults to the built-in set)
        #[arg(long)]
        questions: Option<PathBuf>,
        #[command(flatten)]
        source: IndexSource,
    },

    /// Show what the configured storage holds
    Storage,
}

#[derive(Args, Debug, Clone, Default)]
pub struct IndexSource {
    /// Read the locally built index instead of fetching it from storage
    #[arg(long)]
    pub local: bool,
}
