//! Command-line argument parsing for ragscope
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use crate::rag::StrategyKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ragscope - Traceable retrieval-augmented answering
#[derive(Parser, Debug)]
#[command(name = "ragscope")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Answer questions from a document index and keep a step-by-step trace of how", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Answer a single question
    Ask {
        /// The question
        #[arg(value_name = "QUERY")]
        query: String,

        /// Override the configured search strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyKind>,

        /// Use the built-in offline providers
        #[arg(long)]
        offline: bool,
    },

    /// Interactive conversation keeping history between questions
    Chat {
        /// Override the configured search strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyKind>,

        /// Use the built-in offline providers
        #[arg(long)]
        offline: bool,
    },

    /// Compare vector, semantic and hybrid search on latency and relevance
    Evaluate {
        /// JSON list of {query, expected_results?, top_k?} cases
        #[arg(value_name = "CASES", required_unless_present = "query")]
        cases: Option<PathBuf>,

        /// Evaluate a single query instead of a case file
        #[arg(long, conflicts_with = "cases")]
        query: Option<String>,

        /// Expected doc id for --query (repeatable)
        #[arg(long = "expected", value_name = "DOC_ID", requires = "query")]
        expected: Vec<String>,

        /// Timed runs per strategy and query
        #[arg(long, default_value_t = 3)]
        runs: usize,

        /// Results per search; defaults to search.top_k
        #[arg(long)]
        top_k: Option<usize>,

        /// Write the JSON report here as well
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Use the built-in offline providers
        #[arg(long)]
        offline: bool,
    },

    /// List exported traces, most recent first
    Traces {
        /// Maximum number of traces
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show one exported trace as JSON
    Trace {
        /// Trace id
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Display effective configuration (secrets masked)
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Log level for this verbosity; `Normal` keeps the configured level
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => configured,
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }
}
