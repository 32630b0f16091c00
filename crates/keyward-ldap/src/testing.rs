//! Shared test fixtures.

use crate::params::{DirectoryConfig, DirectoryType, LdapParams};
use keyward_core::{EventMessage, EventSink};
use secrecy::SecretString;
use std::sync::{Arc, Mutex};

/// Event sink that records everything for assertions.
pub(crate) struct RecordingEventSink {
    events: Mutex<Vec<EventMessage>>,
}

impl RecordingEventSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn find(&self, name: &str) -> Option<EventMessage> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|event| event.name() == name)
            .cloned()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: EventMessage) {
        self.events.lock().unwrap().push(event);
    }
}

/// Standard-schema parameters against an example directory.
pub(crate) fn sample_params() -> LdapParams {
    let config = DirectoryConfig {
        server: "directory.example.com".to_string(),
        directory_type: DirectoryType::Standard,
        bind_dn: "cn=reader,dc=example,dc=com".to_string(),
        bind_pass: SecretString::from("hunter2".to_string()),
        search_base: "dc=example,dc=com".to_string(),
        group: String::new(),
        tls_enabled: false,
        tls_verify: true,
        user_object_filter: None,
        group_object_filter: None,
        user_attributes: Vec::new(),
        group_attributes: Vec::new(),
    };
    LdapParams::from_config(&config).unwrap()
}
