// src/processing/error_record.rs

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Persisted diagnostic of a failed processing: a message plus the chain of
/// causes that led to it.
///
/// The record is itself an error whose `source()` walks the chain, so it can
/// be wrapped by another error and flattened again without losing depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorRecord>>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap `inner` with a new outer message.
    pub fn wrap(message: impl Into<String>, inner: ErrorRecord) -> Self {
        Self {
            message: message.into(),
            cause: Some(Box::new(inner)),
        }
    }

    /// Flatten an error and its `source()` chain.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let messages = std::iter::successors(Some(err), |&e| e.source()).map(|e| e.to_string());
        Self::from_messages(messages)
    }

    /// Flatten an `anyhow` error and its context chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::from_messages(err.chain().map(|e| e.to_string()))
    }

    fn from_messages(messages: impl Iterator<Item = String>) -> Self {
        let messages: Vec<String> = messages.collect();
        let mut record: Option<ErrorRecord> = None;
        for message in messages.into_iter().rev() {
            record = Some(match record {
                Some(inner) => ErrorRecord::wrap(message, inner),
                None => ErrorRecord::new(message),
            });
        }
        record.unwrap_or_else(|| ErrorRecord::new("unknown error"))
    }

    /// Messages from outermost to innermost, this record included.
    pub fn chain(&self) -> impl Iterator<Item = &str> {
        std::iter::successors(Some(self), |r| r.cause.as_deref()).map(|r| r.message.as_str())
    }

    /// Number of records in the chain.
    pub fn depth(&self) -> usize {
        self.chain().count()
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.chain().any(|m| m.contains(needle))
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if f.alternate() {
            for cause in self.chain().skip(1) {
                write!(f, ": {cause}")?;
            }
        }
        Ok(())
    }
}

impl StdError for ErrorRecord {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
    }
}
