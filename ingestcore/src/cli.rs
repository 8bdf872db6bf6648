//! CLI command definitions (§6.5).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ingestd", about = "Article ingest pipeline worker and operational CLI", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a worker pool consuming from the given queues.
    StartWorker {
        /// Queue names to consume from; defaults to all configured queues.
        #[arg(long, value_delimiter = ',')]
        queues: Vec<String>,
    },

    /// Start the beat scheduler (periodic fetch/sweep/metrics triggers).
    StartBeat,

    /// Re-run the pipeline for previously-written incidents since a cutoff.
    ReprocessIncidents {
        /// ISO-8601 timestamp or epoch milliseconds; only incidents created
        /// at or after this time are reprocessed.
        #[arg(long)]
        since: String,
    },

    /// Recompute `merge_info` for existing incidents without re-running
    /// extraction. Dry-run unless `--apply` is passed.
    BackfillMergeInfo {
        #[arg(long)]
        apply: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_worker_parses_comma_separated_queues() {
        let cli = Cli::parse_from(["ingestd", "start-worker", "--queues", "fetch,extraction"]);
        match cli.command {
            Command::StartWorker { queues } => assert_eq!(queues, vec!["fetch".to_string(), "extraction".to_string()]),
            _ => panic!("expected StartWorker"),
        }
    }

    #[test]
    fn backfill_merge_info_defaults_to_dry_run() {
        let cli = Cli::parse_from(["ingestd", "backfill-merge-info"]);
        match cli.command {
            Command::BackfillMergeInfo { apply } => assert!(!apply),
            _ => panic!("expected BackfillMergeInfo"),
        }
    }

    #[test]
    fn reprocess_incidents_requires_since() {
        let result = Cli::try_parse_from(["ingestd", "reprocess-incidents"]);
        assert!(result.is_err());
    }
}
