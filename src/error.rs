//! Engine error types
//!
//! Error codes:
//! - XTREE_FORMAT_CORRUPTION (FATAL)
//! - XTREE_INVALID_NODE (ERROR)
//! - XTREE_LOCATION_NOT_FOUND (ERROR)
//! - XTREE_INVALID_LOCATION (ERROR)
//! - XTREE_CAPACITY_VIOLATION (FATAL)
//! - XTREE_INCONSISTENT (FATAL)
//! - XTREE_CONFIG_ERROR (ERROR)
//! - XTREE_IO_ERROR (ERROR)
//! - container errors keep their own code

use std::fmt;
use std::io;

use thiserror::Error;

use crate::container::ContainerError;

/// Severity of an engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation failed, the tree is still usable
    Error,
    /// The stored structure can no longer be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Errors raised by the codec, the splitter, the tree engine and the loader.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Record bytes could not be decoded
    #[error("format corruption: {0}")]
    FormatCorruption(String),

    /// A node cannot be encoded or attached as requested
    #[error("invalid node: {0}")]
    InvalidNode(String),

    /// The location does not resolve to an element
    #[error("location not found: {0}")]
    LocationNotFound(String),

    /// The location expression is malformed
    #[error("invalid location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    /// A node does not fit into one page even on its own
    #[error("capacity violation: {size} bytes exceeds page capacity of {capacity} bytes ({reason})")]
    CapacityViolation {
        size: usize,
        capacity: usize,
        reason: String,
    },

    /// The stored tree violates a structural invariant
    #[error("inconsistent tree: {0}")]
    Inconsistent(String),

    /// Configuration could not be loaded or is out of range
    #[error("configuration error: {0}")]
    Config(String),

    /// The underlying container failed
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Writing exported output failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Shorthand for a corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        EngineError::FormatCorruption(message.into())
    }

    /// Shorthand for an invalid node error
    pub fn invalid_node(message: impl Into<String>) -> Self {
        EngineError::InvalidNode(message.into())
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::FormatCorruption(_) => "XTREE_FORMAT_CORRUPTION",
            EngineError::InvalidNode(_) => "XTREE_INVALID_NODE",
            EngineError::LocationNotFound(_) => "XTREE_LOCATION_NOT_FOUND",
            EngineError::InvalidLocation { .. } => "XTREE_INVALID_LOCATION",
            EngineError::CapacityViolation { .. } => "XTREE_CAPACITY_VIOLATION",
            EngineError::Inconsistent(_) => "XTREE_INCONSISTENT",
            EngineError::Config(_) => "XTREE_CONFIG_ERROR",
            EngineError::Container(e) => e.code().code(),
            EngineError::Io(_) => "XTREE_IO_ERROR",
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        match self {
            EngineError::FormatCorruption(_)
            | EngineError::CapacityViolation { .. }
            | EngineError::Inconsistent(_) => Severity::Fatal,
            EngineError::Container(e) if e.is_fatal() => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns whether the error means the stored tree must not be used further
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
