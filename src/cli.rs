//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the relay worker.

use clap::{Parser, Subcommand};

/// Relay Worker - peer relay with per-peer compute fan-out
///
/// Accepts WebSocket peers, validates each inbound message, and sends every
/// other open peer its own element-wise difference result.
#[derive(Parser, Debug)]
#[command(name = "relay-worker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay (listen for peers and dial configured upstreams)
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "RELAY_CONFIG")]
        config: Option<String>,

        /// Override the listen address (e.g. 127.0.0.1:9300)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Compute a - b once, locally, and print the result as JSON
    Compute {
        /// Left operand, comma separated
        #[arg(short, long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
        a: Vec<f64>,

        /// Right operand, comma separated
        #[arg(short, long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
        b: Vec<f64>,

        /// Backend to use (cpu, mock)
        #[arg(long, default_value = "cpu")]
        backend: String,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["relay-worker", "run"]);
        match cli.command {
            Commands::Run { config, listen } => {
                assert!(config.is_none());
                assert!(listen.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_overrides() {
        let cli = Cli::parse_from([
            "relay-worker",
            "run",
            "--config",
            "/path/to/relay.toml",
            "--listen",
            "127.0.0.1:9400",
        ]);
        match cli.command {
            Commands::Run { config, listen } => {
                assert_eq!(config, Some("/path/to/relay.toml".to_string()));
                assert_eq!(listen, Some("127.0.0.1:9400".to_string()));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_compute_command() {
        let cli = Cli::parse_from(["relay-worker", "compute", "-a", "1,2,3", "-b", "3,-2,1"]);
        match cli.command {
            Commands::Compute { a, b, backend } => {
                assert_eq!(a, vec![1.0, 2.0, 3.0]);
                assert_eq!(b, vec![3.0, -2.0, 1.0]);
                assert_eq!(backend, "cpu");
            }
            _ => panic!("Expected Compute command"),
        }
    }

    #[test]
    fn test_compute_requires_both_operands() {
        assert!(Cli::try_parse_from(["relay-worker", "compute", "-a", "1"]).is_err());
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["relay-worker", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_quiet_flag() {
        let cli = Cli::parse_from(["relay-worker", "--quiet", "version"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["relay-worker", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_config_validate_with_path() {
        let cli = Cli::parse_from(["relay-worker", "config", "validate", "-c", "relay.toml"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Validate { config },
            } => {
                assert_eq!(config, Some("relay.toml".to_string()));
            }
            _ => panic!("Expected Config Validate command"),
        }
    }
}
