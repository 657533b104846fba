// ABOUTME: Typed errors for the bot pipeline (store, bus, listener, shell).
// ABOUTME: Distinguishes protocol, configuration, payload and store failures.

use thiserror::Error;

/// Errors raised by the pipeline components.
///
/// Protocol errors (`UnknownEvent`, `MissingHandler`, `InvalidEventName`)
/// indicate wiring bugs and are raised at subscribe/dispatch time.
/// Configuration errors separate a missing key from a rejected value.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    #[error("Invalid value for '{path}': {reason}")]
    Validation { path: String, reason: String },

    #[error("Event '{0}' has not been declared")]
    UnknownEvent(String),

    #[error("Subscriber cannot handle event '{0}'")]
    MissingHandler(String),

    #[error("Invalid event name: {0:?}")]
    InvalidEventName(String),

    #[error("Malformed inbound payload: {0}")]
    MalformedPayload(String),

    #[error("Expected a {expected} event, got {actual}")]
    WrongEventKind {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Worker interrupted")]
    Interrupted,

    #[error("No work channel for queued command '{0}'")]
    NoWorkChannel(String),

    #[error("The {0} channel is closed")]
    ChannelClosed(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command '{verb}' failed: {source}")]
    Command {
        verb: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    /// True for errors that should stop a worker loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::Interrupted)
    }
}
