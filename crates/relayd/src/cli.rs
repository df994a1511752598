//! Command-line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bounded-latency answer relay
#[derive(Parser)]
#[command(name = "relayd")]
#[command(about = "Answers within a deadline, delivers the rest by callback", long_about = None)]
#[command(version = relay_shared::VERSION)]
pub struct Cli {
    /// Config file (overrides /etc/relayd/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay daemon
    Serve,

    /// Run a stand-in callback receiver
    Sink {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// Send a test message to the configured callback endpoint
    PingCallback {
        /// Recipient to address the test message to
        #[arg(long, default_value = "relayd-ping")]
        user: String,
    },

    /// Inspect or change runtime settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommands,
    },

    /// Per-user totals and popular questions from the ledger
    Stats {
        #[arg(long)]
        user: Option<String>,

        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Write a default config file
    InitConfig {
        #[arg(default_value = crate::config::DEFAULT_CONFIG_PATH)]
        path: PathBuf,
    },

    /// Show version and build info
    #[command(hide = true)]
    Version,
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// List every setting with its description
    Show,
    /// Persist a new value
    Set { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["relayd"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_settings_set() {
        let cli = Cli::try_parse_from(["relayd", "--config", "/tmp/r.toml", "settings", "set", "response_timeout", "0"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/r.toml")));
        match cli.command {
            Some(Commands::Settings {
                action: SettingsCommands::Set { key, value },
            }) => {
                assert_eq!(key, "response_timeout");
                assert_eq!(value, "0");
            }
            _ => panic!("expected settings set"),
        }
    }
}
