//! Observability
//!
//! - Structured logging (JSON lines)
//! - Counter metrics
//! - Typed lifecycle events
//!
//! Observability is read-only: nothing here changes what the engine stores.
//!
//! ```ignore
//! use extree::observability::{log_event_with_fields, Event, Logger};
//!
//! Logger::info("TREE_OPENED", &[("root_id", "1")]);
//! log_event_with_fields(Event::RecordPromoted, &[("from", "7"), ("into", "2")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::TreeCreated);
        log_event_with_fields(Event::TreeOpened, &[("root_id", "3")]);
    }
}
