// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test support: a reporter that records the raw event stream so
//! integration tests can assert on ordering rather than just final results.

use dream_test::{Reporter, ReporterEvent};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<ReporterEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReporterEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Reporter for EventRecorder {
    fn handle_event(&mut self, event: &ReporterEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
