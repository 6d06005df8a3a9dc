//! Caller-side message log
//!
//! The link only ever emits events; this is the append-only list a terminal
//! view renders from.

use crate::domain::models::{ConnectionState, LinkEvent, LinkMessage};
use tokio::sync::mpsc;

#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    entries: Vec<LinkMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: LinkMessage) {
        self.entries.push(message);
    }

    pub fn entries(&self) -> &[LinkMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append every pending message event without waiting.
    ///
    /// Returns the most recent state change seen, if any.
    pub fn drain_events(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Option<ConnectionState> {
        let mut last_state = None;
        while let Ok(event) = events.try_recv() {
            match event {
                LinkEvent::Message(message) => self.push(message),
                LinkEvent::State(state) => last_state = Some(state),
            }
        }
        last_state
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}
