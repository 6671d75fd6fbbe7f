//! Error types for the moderation engine
//!
//! Every outbound call made by the engine reports failure through
//! [`ModerationError`]. Handlers classify these into the expected-absent,
//! transient and unexpected cases and log them; none of them is fatal.

use ::serenity::http::HttpError;
use poise::serenity_prelude as serenity;
use thiserror::Error;

/// Discord JSON error code for "Unknown Message"
pub const UNKNOWN_MESSAGE_CODE: isize = 10008;

/// Errors that can occur while reacting to gateway events
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<serenity::Error>),

    /// The message was already gone when we tried to delete it
    #[error("Unknown message")]
    UnknownMessage,

    /// The denylist could not be downloaded
    #[error("Failed to fetch denylist: {0}")]
    DenylistFetch(#[from] reqwest::Error),

    /// The denylist payload was not a JSON array of strings
    #[error("Failed to parse denylist: {0}")]
    DenylistParse(#[from] serde_json::Error),

    /// Reading or writing persisted state failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error
    #[error("Moderation error: {0}")]
    Other(String),
}

impl From<serenity::Error> for ModerationError {
    fn from(error: serenity::Error) -> Self {
        if is_unknown_message(&error) {
            Self::UnknownMessage
        } else {
            Self::DiscordApi(Box::new(error))
        }
    }
}

impl From<String> for ModerationError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

impl ModerationError {
    /// Whether this error means the target was already absent
    #[must_use]
    pub fn is_unknown_message(&self) -> bool {
        matches!(self, Self::UnknownMessage)
    }
}

/// Check whether a serenity error is Discord's "Unknown Message" response
fn is_unknown_message(error: &serenity::Error) -> bool {
    match error {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            response.error.code == UNKNOWN_MESSAGE_CODE
        }
        _ => false,
    }
}

/// Result type for moderation operations
pub type ModerationResult<T> = Result<T, ModerationError>;
