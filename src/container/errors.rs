//! Container error types
//!
//! Error codes:
//! - XTREE_CONTAINER_IO_ERROR (ERROR severity)
//! - XTREE_CONTAINER_NOT_FOUND (ERROR severity)
//! - XTREE_CONTAINER_CLOSED (ERROR severity)
//! - XTREE_CONTAINER_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

use crate::error::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerErrorCode {
    /// Disk I/O failure
    XtreeContainerIoError,
    /// No live record under the requested id
    XtreeContainerNotFound,
    /// Container used after `close`
    XtreeContainerClosed,
    /// Stored bytes failed verification
    XtreeContainerCorruption,
}

impl ContainerErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ContainerErrorCode::XtreeContainerIoError => "XTREE_CONTAINER_IO_ERROR",
            ContainerErrorCode::XtreeContainerNotFound => "XTREE_CONTAINER_NOT_FOUND",
            ContainerErrorCode::XtreeContainerClosed => "XTREE_CONTAINER_CLOSED",
            ContainerErrorCode::XtreeContainerCorruption => "XTREE_CONTAINER_CORRUPTION",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ContainerErrorCode::XtreeContainerCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ContainerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error reported by a `Container` implementation.
#[derive(Debug)]
pub struct ContainerError {
    code: ContainerErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl ContainerError {
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: ContainerErrorCode::XtreeContainerIoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    pub fn not_found(id: impl fmt::Display) -> Self {
        Self {
            code: ContainerErrorCode::XtreeContainerNotFound,
            message: "no record under id".to_string(),
            details: Some(format!("record_id: {}", id)),
            source: None,
        }
    }

    pub fn closed() -> Self {
        Self {
            code: ContainerErrorCode::XtreeContainerClosed,
            message: "container is closed".to_string(),
            details: None,
            source: None,
        }
    }

    /// Create a new data corruption error (FATAL)
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self {
            code: ContainerErrorCode::XtreeContainerCorruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a data corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: ContainerErrorCode::XtreeContainerCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    pub fn code(&self) -> ContainerErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether the container contents can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for ContainerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

pub type ContainerResult<T> = Result<T, ContainerError>;
