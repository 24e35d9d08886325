//! Subcommand implementations.

use std::path::{Path, PathBuf};

use llamaskill_config::{AppConfig, ConfigError};

pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod run;

/// The config file in use: `--config` if given, else the default location.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load the config file with environment overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    AppConfig::load_with_env(&config_file(path))
}

/// Words that end an interactive session.
pub fn is_exit_command(line: &str) -> bool {
    matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("/etc/llamaskill.toml");
        assert_eq!(config_file(Some(path)), PathBuf::from("/etc/llamaskill.toml"));
    }

    #[test]
    fn default_path_is_under_config_dir() {
        let path = config_file(None);
        assert!(path.ends_with(".llamaskill/config.toml"));
    }

    #[test]
    fn exit_commands() {
        assert!(is_exit_command("quit"));
        assert!(is_exit_command(":q"));
        assert!(!is_exit_command("hoi"));
    }
}
