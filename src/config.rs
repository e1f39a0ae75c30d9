//! TOML-based application configuration.
//!
//! Every field has a default, so a missing file or a partial file both work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Result;

/// Narration voices offered by the speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Voice {
    #[default]
    Zephyr,
    Puck,
    Charon,
    Kore,
    Fenrir,
}

impl Voice {
    pub const ALL: [Voice; 5] = [
        Voice::Zephyr,
        Voice::Puck,
        Voice::Charon,
        Voice::Kore,
        Voice::Fenrir,
    ];
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Voice::ALL
            .into_iter()
            .find(|v| v.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown voice '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub voice: Voice,
    #[serde(default)]
    pub conversational_mode: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_weak_point_card_count")]
    pub weak_point_card_count: u32,
    #[serde(default = "default_true")]
    pub seed_sample_decks: bool,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("echo_cards.sqlite3")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_weak_point_card_count() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            voice: Voice::default(),
            conversational_mode: false,
            log_level: default_log_level(),
            weak_point_card_count: default_weak_point_card_count(),
            seed_sample_decks: true,
        }
    }
}

impl Config {
    /// Loads the config at `path`, falling back to defaults when the file is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.weak_point_card_count, 3);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse("voice = \"Kore\"\nconversational_mode = true\n").unwrap();

        assert_eq!(config.voice, Voice::Kore);
        assert!(config.conversational_mode);
        assert_eq!(config.database_path, PathBuf::from("echo_cards.sqlite3"));
        assert!(config.seed_sample_decks);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(Config::parse("voice = [").is_err());
        assert!(Config::parse("voice = \"Robot\"").is_err());
    }

    #[test]
    fn test_voice_from_str() {
        assert_eq!("fenrir".parse::<Voice>(), Ok(Voice::Fenrir));
        assert!("nobody".parse::<Voice>().is_err());
    }
}
