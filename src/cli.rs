//! Command-line surface (`spec.md` §6, `SPEC_FULL.md` §10.4).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// H5→DP ingestion engine: discovers HDF5 PV archives under a root directory, extracts
/// timestamped signals, and streams them into the DP ingestion service.
#[derive(Debug, Parser)]
#[command(name = "h5_to_dp", version, about)]
pub struct Cli {
    /// Root directory to scan for `.h5` files. Required unless a subcommand is given.
    pub root: Option<PathBuf>,

    /// Skip files already recorded in the processed-file cache.
    #[arg(long)]
    pub resume: bool,

    /// Use batched client-streaming ingest instead of one unary call per signal.
    #[arg(long)]
    pub streaming: bool,

    /// Records per streaming batch (clamped to 10..=24).
    #[arg(long = "batch-size")]
    pub batch_size: Option<u32>,

    /// Reject files whose root group holds more signal datasets than this.
    #[arg(long = "max-signals")]
    pub max_signals: Option<usize>,

    /// Worker thread count (default: min(8, available parallelism)).
    #[arg(long)]
    pub workers: Option<usize>,

    /// DP ingestion server address, `host:port`.
    #[arg(long)]
    pub server: Option<String>,

    /// Run the query/decode path instead of ingestion.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands sibling to the default ingest behavior.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Queries the DP query service for one or more PVs and prints decoded series summaries.
    Decode {
        /// Explicit PV names to query. Mutually exclusive with `--pattern`.
        pv_names: Vec<String>,

        /// Glob/regex-like pattern used to discover PV names instead of listing them.
        #[arg(long)]
        pattern: Option<String>,

        /// Inclusive query window start, RFC 3339 (defaults to the Unix epoch).
        #[arg(long)]
        begin: Option<String>,

        /// Inclusive query window end, RFC 3339 (defaults to now).
        #[arg(long)]
        end: Option<String>,

        /// DP query server address, `host:port`.
        #[arg(long)]
        server: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ingest_invocation_with_flags() {
        let cli = Cli::parse_from([
            "h5_to_dp",
            "/data/archives",
            "--resume",
            "--streaming",
            "--batch-size",
            "12",
            "--workers",
            "4",
        ]);
        assert_eq!(cli.root, Some(PathBuf::from("/data/archives")));
        assert!(cli.resume);
        assert!(cli.streaming);
        assert_eq!(cli.batch_size, Some(12));
        assert_eq!(cli.workers, Some(4));
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_decode_subcommand_with_pattern() {
        let cli = Cli::parse_from(["h5_to_dp", "decode", "--pattern", "BPMS_*", "--server", "localhost:50052"]);
        match cli.command {
            Some(Command::Decode { pattern, server, .. }) => {
                assert_eq!(pattern, Some("BPMS_*".to_string()));
                assert_eq!(server, Some("localhost:50052".to_string()));
            }
            _ => panic!("expected Decode subcommand"),
        }
    }
}
