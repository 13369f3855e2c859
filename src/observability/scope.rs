//! ObservationScope for begin/complete logging
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` or `{name}_FAILED` when finished
//! - Logs `{name}_INCOMPLETE` if dropped without either

use std::cell::Cell;
use std::time::Instant;

use super::logger::{Logger, Severity};

/// A scope that logs begin and end events around one operation
///
/// ```ignore
/// let scope = ObservationScope::new("BULK_LOAD");
/// // ... do work ...
/// scope.complete_with_fields(&[("nodes", "42")]);
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    severity: Severity,
    completed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
}

impl<'a> ObservationScope<'a> {
    /// Logs `{name}_BEGIN` at INFO
    pub fn new(name: &'a str) -> Self {
        Self::at(Severity::Info, name, &[])
    }

    /// Logs `{name}_BEGIN` at the given severity; completion uses the same one
    pub fn at(severity: Severity, name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Logger::log(severity, &format!("{}_BEGIN", name), fields);
        Self {
            name,
            severity,
            completed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        }
    }

    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Self::at(Severity::Info, name, fields)
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.completed.set(true);
        let mut all_fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all_fields.extend(extra_fields.iter().copied());
        Logger::log(
            self.severity,
            &format!("{}_COMPLETE", self.name),
            &all_fields,
        );
    }

    /// Logs `{name}_FAILED` at ERROR, or FATAL when `fatal` is set
    pub fn fail(self, reason: &str, fatal: bool) {
        self.completed.set(true);
        let severity = if fatal { Severity::Fatal } else { Severity::Error };
        Logger::log(
            severity,
            &format!("{}_FAILED", self.name),
            &[("reason", reason)],
        );
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// Elapsed-time helper for log fields
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> String {
        self.start.elapsed().as_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_lifecycle() {
        let scope = ObservationScope::new("TEST");
        assert!(!scope.is_completed());
        scope.complete();
    }

    #[test]
    fn test_scope_with_fields_and_failure() {
        let scope = ObservationScope::with_fields("TEST", &[("root_id", "1")]);
        scope.fail("capacity violation", true);

        let scope = ObservationScope::at(Severity::Trace, "TEST", &[]);
        scope.complete_with_fields(&[("groups", "3")]);
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let scope = ObservationScope::new("TEST");
        drop(scope);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let ms: u64 = timer.elapsed_ms().parse().unwrap();
        assert!(ms >= 5);
    }
}
