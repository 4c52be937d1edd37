//! Error types for the sticky engine pool.
//!
//! This module defines the central [`Error`] enum, which captures every
//! recoverable and reportable failure in the pool. Per-job failures
//! ([`Error::Unavailable`], [`Error::MissingField`], [`Error::InvalidField`],
//! [`Error::Engine`]) never cross a worker slot boundary: the
//! [`JobProcessor`](crate::JobProcessor) folds them into an error-tagged
//! [`ResultRecord`](crate::ResultRecord). The remaining variants surface from
//! pool construction or submission.
//!
//! ## Error Cases
//! - `Unavailable`: More distinct worker identities than engine slots.
//! - `SlotBusy`: A bound engine was presented to two call sites at once.
//! - `MissingField` / `InvalidField`: The job description lacks a field or
//!   carries it with the wrong shape.
//! - `Engine`: The engine failed or panicked mid-call.
//! - `EngineConstruction`: An engine could not be built at pool creation.
//! - `InvalidPoolSize`: A pool of zero slots was requested.
//! - `InvalidQueueDepth`: A queue depth limit of zero was requested.
//! - `WorkerSpawn`: A worker thread could not be started.
//! - `QueueFull`: Admission control rejected the job.
//! - `PoolShutdown`: A job arrived while the pool was draining.
//! - `ChannelError`: An internal handoff between caller and worker failed.

use crate::SlotToken;
use serde::{Deserialize, Serialize};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the sticky engine pool.
#[derive(Clone, thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// Every engine slot is already bound to another worker identity.
    #[error("No engine available for worker {token}: all {capacity} slots are bound")]
    Unavailable { token: SlotToken, capacity: usize },

    /// The engine bound to this identity is already lent out.
    #[error("Engine slot {slot} is already in use")]
    SlotBusy { slot: usize },

    /// The job description lacks a field the processor or engine needs.
    #[error("Missing field: {field}")]
    MissingField { field: String },

    /// The job description carries a field with an unexpected value type.
    #[error("Invalid field {field}: expected {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },

    /// The engine failed while processing a job.
    #[error("Engine error: {reason}")]
    Engine { reason: String },

    /// An engine could not be constructed while building the pool.
    #[error("Failed to construct engine for slot {slot}: {reason}")]
    EngineConstruction { slot: usize, reason: String },

    /// A pool must have at least one slot.
    #[error("Pool size must be greater than 0")]
    InvalidPoolSize,

    /// A queue depth limit must allow at least one waiting job.
    #[error("Queue depth must be greater than 0")]
    InvalidQueueDepth,

    /// A worker thread could not be started.
    #[error("Failed to spawn worker {worker}: {reason}")]
    WorkerSpawn { worker: usize, reason: String },

    /// The configured queue depth is exhausted.
    #[error("Queue is full ({depth} jobs waiting)")]
    QueueFull { depth: usize },

    /// The pool is draining or already drained.
    #[error("Pool is shutting down")]
    PoolShutdown,

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

impl Error {
    /// Classifies this error for the error marker of a result record.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable { .. } => ErrorKind::Capacity,
            Self::MissingField { .. } => ErrorKind::MissingField,
            Self::InvalidField { .. } => ErrorKind::InvalidField,
            Self::Engine { .. } => ErrorKind::Engine,
            Self::QueueFull { .. } | Self::PoolShutdown => ErrorKind::Rejected,
            Self::SlotBusy { .. }
            | Self::EngineConstruction { .. }
            | Self::InvalidPoolSize
            | Self::InvalidQueueDepth
            | Self::WorkerSpawn { .. }
            | Self::ChannelError { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, expected: &'static str) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            expected,
        }
    }
}

/// Error marker categories reported in a [`ResultRecord`](crate::ResultRecord).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The job ran on a worker with no engine slot left to bind.
    Capacity,
    /// A required job field was absent.
    MissingField,
    /// A job field had the wrong value type.
    InvalidField,
    /// The engine failed or panicked.
    Engine,
    /// The job was refused before reaching a worker.
    Rejected,
    /// The pool itself failed, or an engine was presented by two call sites
    /// at once.
    Internal,
}

impl ErrorKind {
    /// The kind's wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Capacity => "capacity",
            Self::MissingField => "missing_field",
            Self::InvalidField => "invalid_field",
            Self::Engine => "engine",
            Self::Rejected => "rejected",
            Self::Internal => "internal",
        }
    }
}
