// src/feed/error.rs
use thiserror::Error;

use crate::feed::types::SourceKind;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    /// A subscription could not be established or dropped mid-stream.
    #[error("source {source_kind} unavailable: {reason}")]
    SourceUnavailable {
        source_kind: SourceKind,
        reason: String,
    },

    /// A raw record could not be converted into an activity item.
    #[error("cannot map {source_kind} record {id}: {reason}")]
    Mapping {
        source_kind: SourceKind,
        id: String,
        reason: String,
    },

    #[error("feed session is already running")]
    AlreadyRunning,

    #[error("feed session is closed")]
    Closed,
}

impl FeedError {
    pub fn unavailable(source_kind: SourceKind, reason: impl Into<String>) -> Self {
        FeedError::SourceUnavailable {
            source_kind,
            reason: reason.into(),
        }
    }
}
