//! Error types for the transfer bridge

use thiserror::Error;

/// Which named primitive an operation was acting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    TransferMutex,
    HostReadyEvent,
    SchedulerReadyEvent,
}

impl std::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveKind::TransferMutex => write!(f, "transfer mutex"),
            PrimitiveKind::HostReadyEvent => write!(f, "host-ready event"),
            PrimitiveKind::SchedulerReadyEvent => write!(f, "scheduler-ready event"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Shared memory error: {0}")]
    SharedMemory(String),

    #[error("Failed to set up {kind} '{name}': {reason}")]
    Sync {
        kind: PrimitiveKind,
        name: String,
        reason: String,
    },

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to launch scheduler: {0}")]
    LaunchFailed(String),

    #[error("Failed to save plugin state: {0}")]
    StateSave(String),

    #[error("Failed to restore plugin state: {0}")]
    StateRestore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
