//! Crate-wide error type
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Assistant failed: {0}")]
    Assistant(String),

    #[error("Recording failed: {0}")]
    Recording(String),
}

pub type Result<T> = std::result::Result<T, Error>;
