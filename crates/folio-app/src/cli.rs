//! CLI argument definitions for the folio binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Folio: a conversational book recommendation agent.
#[derive(Parser, Debug)]
#[command(name = "folio", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the session database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Use the offline heuristic model instead of a remote API.
    #[arg(long = "offline", global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive conversation.
    Chat {
        /// Resume an existing session.
        #[arg(short = 's', long = "session")]
        session: Option<String>,
    },
    /// Send a single message and print the reply.
    Ask {
        message: String,
        #[arg(short = 's', long = "session")]
        session: Option<String>,
    },
    /// Inspect and manage stored sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    /// List sessions, most recent first.
    List,
    /// Print one session as JSON.
    Show { id: String },
    /// Permanently delete a session.
    Delete { id: String },
    /// Totals across all sessions.
    Stats,
    /// Delete sessions idle longer than the configured TTL.
    Purge,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > FOLIO_CONFIG env var > ~/.folio/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("FOLIO_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > FOLIO_DATA_DIR env var.
    /// Returns `None` if neither is set (use the config value).
    pub fn resolve_data_dir(&self) -> Option<String> {
        if let Some(ref p) = self.data_dir {
            return Some(p.to_string_lossy().to_string());
        }
        std::env::var("FOLIO_DATA_DIR").ok().filter(|v| !v.is_empty())
    }

    /// Resolve the log filter.
    ///
    /// Priority: --log-level flag > FOLIO_LOG env var > config value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(level) = std::env::var("FOLIO_LOG") {
            if !level.is_empty() {
                return level;
            }
        }
        config_level.to_string()
    }
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".folio").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_chat_with_session() {
        let args = parse(&["folio", "chat", "--session", "abc"]);
        match args.command {
            Command::Chat { session } => assert_eq!(session.as_deref(), Some("abc")),
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(!args.offline);
    }

    #[test]
    fn test_parse_ask_with_global_flags() {
        let args = parse(&["folio", "ask", "I like horror", "--offline", "-l", "debug"]);
        match args.command {
            Command::Ask { message, session } => {
                assert_eq!(message, "I like horror");
                assert!(session.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(args.offline);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_parse_sessions_subcommands() {
        let args = parse(&["folio", "sessions", "delete", "s1"]);
        assert!(matches!(
            args.command,
            Command::Sessions { action: SessionsCommand::Delete { ref id } } if id == "s1"
        ));
        let args = parse(&["folio", "sessions", "stats"]);
        assert!(matches!(
            args.command,
            Command::Sessions { action: SessionsCommand::Stats }
        ));
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(CliArgs::try_parse_from(["folio"]).is_err());
    }

    #[test]
    fn test_flags_take_priority() {
        let args = parse(&[
            "folio",
            "--config",
            "/tmp/folio.toml",
            "--data-dir",
            "/tmp/folio-data",
            "--log-level",
            "warn",
            "sessions",
            "list",
        ]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/folio.toml"));
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/tmp/folio-data"));
        assert_eq!(args.resolve_log_level("info"), "warn");
    }

    #[test]
    fn test_default_config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.file_name().unwrap(), "config.toml");
    }
}
