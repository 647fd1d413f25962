//! CLI argument parsing for Refit

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Output format for analysis reports
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "refit")]
#[command(version)]
#[command(about = "Trace-driven Dockerfile analysis and repair", long_about = None)]
pub struct Cli {
    /// Workspace to analyze; its Dockerfile doubles as the build context
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Seconds to let the traced container run before reading the log
    #[arg(short = 't', long = "time", value_name = "SECONDS", default_value = "5")]
    pub time: u64,

    /// Service start command, overriding the Dockerfile's CMD/ENTRYPOINT
    #[arg(long = "command", value_name = "CMD")]
    pub command: Option<String>,

    /// Re-trace a running container instead of building a fresh image
    #[arg(long = "container", value_name = "NAME")]
    pub container: Option<String>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Run static rules only, without building or tracing anything
    #[arg(long = "static-only")]
    pub static_only: bool,

    /// Write the repaired Dockerfile back in place
    #[arg(long = "fix")]
    pub fix: bool,

    /// Write the synthesized alternative next to the original as Dockerfile.refit
    #[arg(long = "dump-alternative")]
    pub dump_alternative: bool,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["refit"]);
        assert_eq!(cli.path, PathBuf::from("."));
        assert_eq!(cli.time, 5);
        assert!(cli.command.is_none());
        assert!(cli.container.is_none());
        assert!(!cli.static_only);
        assert!(!cli.fix);
        assert!(!cli.dump_alternative);
    }

    #[test]
    fn test_cli_parses_path() {
        let cli = Cli::parse_from(["refit", "services/api"]);
        assert_eq!(cli.path, PathBuf::from("services/api"));
    }

    #[test]
    fn test_cli_custom_time() {
        let cli = Cli::parse_from(["refit", "-t", "30"]);
        assert_eq!(cli.time, 30);
    }

    #[test]
    fn test_cli_start_command() {
        let cli = Cli::parse_from(["refit", "--command", "python worker.py"]);
        assert_eq!(cli.command.as_deref(), Some("python worker.py"));
    }

    #[test]
    fn test_cli_live_container() {
        let cli = Cli::parse_from(["refit", "--container", "api-1"]);
        assert_eq!(cli.container.as_deref(), Some("api-1"));
    }

    #[test]
    fn test_cli_static_only_flag() {
        let cli = Cli::parse_from(["refit", "--static-only"]);
        assert!(cli.static_only);
    }

    #[test]
    fn test_cli_fix_flag() {
        let cli = Cli::parse_from(["refit", "--fix", "--static-only"]);
        assert!(cli.fix);
        assert!(cli.static_only);
    }

    #[test]
    fn test_cli_json_format() {
        let cli = Cli::parse_from(["refit", "--format", "json"]);
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
