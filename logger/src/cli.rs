use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Records topic events into an append-only CSV log.
#[derive(Debug, Parser)]
#[command(name = "mli", version, about, arg_required_else_help = true)]
pub struct Cli {
    /// Configuration file. JSON files are read as written by `template`, other formats get
    /// `APP_` environment overrides. When omitted, the `configuration/` directory is loaded.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for daily rotated log files. Logs go to stderr when omitted.
    #[arg(long, global = true, env = "APP_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a starter JSON configuration to FILE.
    Template { file: PathBuf },

    /// Print the configuration without secrets.
    Show,

    /// Record events read from stdin, one `topic<TAB>payload` per line.
    Run {
        /// Store file, overriding `store.path`.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Serve Prometheus metrics on this address.
        #[arg(long, env = "APP_METRICS_ADDR")]
        metrics_addr: Option<SocketAddr>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_global_config() {
        let cli = Cli::try_parse_from(["mli", "run", "--output", "out.csv", "-c", "mli.json"])
            .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("mli.json")));
        assert!(matches!(
            cli.command,
            Command::Run { output: Some(output), .. } if output == PathBuf::from("out.csv")
        ));
    }

    #[test]
    fn template_requires_a_file() {
        assert!(Cli::try_parse_from(["mli", "template"]).is_err());
    }
}
