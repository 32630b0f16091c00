//! Diagnostic event messages and the sink boundary.
//!
//! The directory engine reports every notable step (binds, connection
//! checks, group searches, membership decisions, failures) as a named event
//! with key/value details. The sink is injected into the engine rather than
//! reached through process-wide state, so hosts decide where events go.
//!
//! Events must never contain credentials; detail values are limited to DNs,
//! group names, filters, and native error text.

use serde::{Deserialize, Serialize};

/// A named diagnostic event with ordered key/value details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    name: String,
    description: String,
    details: Vec<(String, String)>,
}

impl EventMessage {
    /// Creates an event with a name and human-readable description.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            details: Vec::new(),
        }
    }

    /// Appends a key/value detail pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Event name, e.g. `ldap.bind`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Ordered detail pairs.
    #[must_use]
    pub fn details(&self) -> &[(String, String)] {
        &self.details
    }

    /// Looks up the first detail value recorded under `key`.
    #[must_use]
    pub fn detail_value(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Receiver for engine diagnostic events.
pub trait EventSink: Send + Sync {
    /// Delivers one event. Implementations must not block on slow consumers.
    fn emit(&self, event: EventMessage);
}

/// Sink that forwards events to [`tracing`].
///
/// Failure events (`exception`) are logged at warn level, everything else at
/// info.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: EventMessage) {
        let details = event
            .details()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");

        if event.name() == "exception" {
            tracing::warn!(
                event = event.name(),
                %details,
                "{}",
                event.description()
            );
        } else {
            tracing::info!(
                event = event.name(),
                %details,
                "{}",
                event.description()
            );
        }
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: EventMessage) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_pairs_keep_insertion_order() {
        let event = EventMessage::new("ldap.check.group", "Group membership verified")
            .detail("User", "cn=jdoe,dc=example,dc=com")
            .detail("Group", "Admins");

        assert_eq!(event.name(), "ldap.check.group");
        assert_eq!(
            event.details(),
            &[
                (
                    "User".to_string(),
                    "cn=jdoe,dc=example,dc=com".to_string()
                ),
                ("Group".to_string(), "Admins".to_string()),
            ]
        );
        assert_eq!(event.detail_value("Group"), Some("Admins"));
        assert_eq!(event.detail_value("Password"), None);
    }

    #[test]
    fn serialization_round_trip() {
        let event = EventMessage::new("ldap.bind", "Bind succeeded")
            .detail("DN", "cn=reader,dc=example,dc=com");
        let json = serde_json::to_string(&event).unwrap();
        let back: EventMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn null_sink_accepts_events() {
        NullEventSink.emit(EventMessage::new("ldap.bind", "ok"));
    }
}
