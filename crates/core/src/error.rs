use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures a poll cycle can hit. None of these are fatal to the poller;
/// a failed cycle is skipped and the table keeps its previous rows.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum PollError {
    /// Network-level failure or non-success HTTP status.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Response body could not be parsed into a fragment.
    #[error("parse failed: {0}")]
    Parse(String),

    /// The fragment parsed, but its root element is not a table.
    #[error("unexpected root element <{0}>, expected <table>")]
    UnexpectedRoot(String),

    /// The target table holds no rows, so there is no header to anchor on.
    #[error("target table has no header row")]
    MissingHeader,

    /// No element with the configured id exists in the page.
    #[error("no element with id \"{0}\" in page")]
    TargetMissing(String),
}

impl PollError {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}
