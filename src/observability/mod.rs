//! Observability subsystem for accdb
//!
//! Structured JSON logging of typed lifecycle events. Logging is
//! synchronous, has no side effects on the operation being logged, and
//! never fails the caller.
//!
//! # Usage
//!
//! ```ignore
//! use accdb::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::StoreOpen, &[("path", "records.db")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a lifecycle event with fields at its default severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::ConfigLoaded, &[("data_dir", "/tmp/test")]);
    }
}
