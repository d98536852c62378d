use std::{fmt, io};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::{sync::mpsc::error::SendError as TokioSendError, task::JoinError};

use crate::event::KometEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum KometError {
    #[error("Commit failed: {0}")]
    Commit(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("Data integrity error: {0}")]
    Integrity(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Operation cancelled")]
    OperationCancelled,
    #[error("Reasoner failure: {0}")]
    Reasoner(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Task failure: {0}")]
    Task(String),
}

impl KometError {
    /// Configuration errors are fatal to the calling operation; everything else may be reported
    /// per item by batch callers.
    pub fn is_configuration(&self) -> bool {
        matches!(self, KometError::Configuration(_))
    }
}

impl From<toml::de::Error> for KometError {
    fn from(src: toml::de::Error) -> KometError {
        KometError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for KometError {
    fn from(src: toml::ser::Error) -> KometError {
        KometError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for KometError {
    fn from(src: JsonError) -> KometError {
        KometError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<uuid::Error> for KometError {
    fn from(src: uuid::Error) -> KometError {
        KometError::Serialization(format!("UUID conversion failed: {src}"))
    }
}

impl From<io::Error> for KometError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => KometError::NotFound(format!("{x}")),
            _ => KometError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for KometError {
    fn from(x: fmt::Error) -> Self {
        KometError::Serialization(format!("{x}"))
    }
}

impl From<RegexError> for KometError {
    fn from(x: RegexError) -> Self {
        KometError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<TokioSendError<KometEvent>> for KometError {
    fn from(x: TokioSendError<KometEvent>) -> Self {
        KometError::Io(format!(
            "Channel update send Error, could not transmit event {}",
            x.0
        ))
    }
}

impl From<JoinError> for KometError {
    fn from(x: JoinError) -> Self {
        if x.is_cancelled() {
            KometError::OperationCancelled
        } else {
            KometError::Task(format!("worker panicked: {x}"))
        }
    }
}
