//! Error types for the snippet catalog.

use crate::subscriptions::DropReason;
use crate::types::DocumentId;
use std::fmt;
use thiserror::Error;

/// The store operation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOperation {
    Open,
    Create,
    Get,
    Delete,
    Increment,
    Subscribe,
    Count,
    Compact,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOperation::Open => "open",
            StoreOperation::Create => "create",
            StoreOperation::Get => "get",
            StoreOperation::Delete => "delete",
            StoreOperation::Increment => "increment",
            StoreOperation::Subscribe => "subscribe",
            StoreOperation::Count => "count",
            StoreOperation::Compact => "compact",
        };
        f.write_str(name)
    }
}

/// Main error type for document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation}: document {collection}/{id} not found")]
    NotFound {
        operation: StoreOperation,
        collection: String,
        id: DocumentId,
    },

    #[error("{operation}: permission denied on collection {collection}")]
    PermissionDenied {
        operation: StoreOperation,
        collection: String,
    },

    #[error("{operation}: store unavailable: {reason}")]
    Unavailable {
        operation: StoreOperation,
        reason: String,
    },

    #[error("{operation}: invalid operation: {reason}")]
    InvalidOperation {
        operation: StoreOperation,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,
}

impl StoreError {
    /// The operation that failed, when the error describes a store-side refusal.
    pub fn operation(&self) -> Option<StoreOperation> {
        match self {
            StoreError::NotFound { operation, .. }
            | StoreError::PermissionDenied { operation, .. }
            | StoreError::Unavailable { operation, .. }
            | StoreError::InvalidOperation { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// A form was rejected before reaching the store.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Unsupported code file: {0} (expected a .js file)")]
    UnsupportedFile(String),

    #[error("Could not read {path}: {reason}")]
    UnreadableFile { path: String, reason: String },
}

/// Terminal failure of a live subscription.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SubscriptionError {
    #[error("Could not subscribe to {collection}: {message}")]
    Subscribe { collection: String, message: String },

    #[error("Subscription to {collection} dropped: {reason}")]
    Dropped {
        collection: String,
        reason: DropReason,
    },
}

/// Errors from the admin mutation workflow.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Sign in required")]
    Unauthenticated,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
