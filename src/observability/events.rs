//! Observable engine events
//!
//! Events are explicit and typed; the string forms are stable.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    ConfigLoaded,
    TreeCreated,
    TreeOpened,
    TreeCleared,
    ContainerOpened,
    ContainerClosed,

    // Page fitting
    GroupPersisted,
    RecordPromoted,
    GroupCollapsed,

    // Structural mutation
    NodeInserted,
    SubtreeRemoved,
    OperationRolledBack,
    RollbackFailed,

    // Inspection
    ConsistencyOk,
    ConsistencyViolation,
    FormatCorruption,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::TreeCreated => "TREE_CREATED",
            Event::TreeOpened => "TREE_OPENED",
            Event::TreeCleared => "TREE_CLEARED",
            Event::ContainerOpened => "CONTAINER_OPENED",
            Event::ContainerClosed => "CONTAINER_CLOSED",

            Event::GroupPersisted => "GROUP_PERSISTED",
            Event::RecordPromoted => "RECORD_PROMOTED",
            Event::GroupCollapsed => "GROUP_COLLAPSED",

            Event::NodeInserted => "NODE_INSERTED",
            Event::SubtreeRemoved => "SUBTREE_REMOVED",
            Event::OperationRolledBack => "OPERATION_ROLLED_BACK",
            Event::RollbackFailed => "ROLLBACK_FAILED",

            Event::ConsistencyOk => "CONSISTENCY_OK",
            Event::ConsistencyViolation => "CONSISTENCY_VIOLATION",
            Event::FormatCorruption => "FORMAT_CORRUPTION",
        }
    }

    /// Returns true if this event indicates the stored tree is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::FormatCorruption | Event::RollbackFailed)
    }

    /// Severity this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::FormatCorruption | Event::RollbackFailed => Severity::Fatal,
            Event::ConsistencyViolation => Severity::Error,
            Event::OperationRolledBack => Severity::Warn,
            Event::GroupPersisted
            | Event::RecordPromoted
            | Event::GroupCollapsed
            | Event::NodeInserted
            | Event::SubtreeRemoved => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_strings_are_upper_snake() {
        for event in [
            Event::ConfigLoaded,
            Event::TreeOpened,
            Event::RecordPromoted,
            Event::GroupCollapsed,
            Event::ConsistencyViolation,
            Event::FormatCorruption,
        ] {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_severities() {
        assert!(Event::FormatCorruption.is_fatal());
        assert_eq!(Event::FormatCorruption.severity(), Severity::Fatal);
        assert_eq!(Event::GroupPersisted.severity(), Severity::Trace);
        assert_eq!(Event::TreeOpened.severity(), Severity::Info);
        assert!(!Event::ConsistencyViolation.is_fatal());
        assert!(Event::RollbackFailed.is_fatal());
        assert_eq!(Event::OperationRolledBack.severity(), Severity::Warn);
    }
}
