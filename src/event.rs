//! Event accumulation: turns a sequence of [`Field`]s into dispatchable [`Event`]s.

use std::time::Duration;

use crate::parser::Field;

/// An immutable Server-Sent Event, produced on a dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event type, or the empty string for an unnamed ("message") event.
    pub event_type: String,
    /// Concatenation of this block's `data` field values, joined by `\n`,
    /// with no trailing newline.
    pub data: String,
    /// The stream-global last-event-id as of this event's block. Empty
    /// string means "none observed yet" (never `None`, per the wire model).
    pub last_event_id: String,
}

/// Accumulates fields into a partially-built event; persists `last_event_id`
/// and `reconnection_time` across dispatches and across reconnections within
/// one logical connection.
#[derive(Debug)]
pub struct EventBuilder {
    data_buffer: String,
    current_type: String,
    last_event_id: String,
    reconnection_time: Duration,
}

impl EventBuilder {
    /// Creates a builder seeded with the configured default reconnection time.
    pub fn new(default_reconnection_time: Duration) -> Self {
        Self {
            data_buffer: String::new(),
            current_type: String::new(),
            last_event_id: String::new(),
            reconnection_time: default_reconnection_time,
        }
    }

    /// Applies one parsed field to the in-progress block.
    pub fn handle_field(&mut self, field: Field) {
        match field.name.as_str() {
            "comment" => {}
            "event" => {
                self.current_type = String::from_utf8_lossy(&field.value).into_owned();
            }
            "data" => {
                self.data_buffer.push_str(&String::from_utf8_lossy(&field.value));
                self.data_buffer.push('\n');
            }
            "id" => {
                // NUL-containing ids are ignored outright, per the wire spec.
                if !field.value.contains(&0) {
                    self.last_event_id = String::from_utf8_lossy(&field.value).into_owned();
                }
            }
            "retry" => {
                if let Ok(text) = std::str::from_utf8(&field.value) {
                    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
                        if let Ok(millis) = text.parse::<u64>() {
                            self.reconnection_time = Duration::from_millis(millis);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Emits the accumulated event if `data` was seen, resetting per-block
    /// state. Used both for a normal dispatch boundary and for an explicit
    /// dirty flush requested by the read loop on a clean mid-block close.
    pub fn dispatch(&mut self) -> Option<Event> {
        let event_type = std::mem::take(&mut self.current_type);
        if self.data_buffer.is_empty() {
            return None;
        }
        let mut data = std::mem::take(&mut self.data_buffer);
        if data.ends_with('\n') {
            data.pop();
        }
        Some(Event { event_type, data, last_event_id: self.last_event_id.clone() })
    }

    /// The current server-suggested reconnection delay.
    pub fn reconnection_time(&self) -> Duration {
        self.reconnection_time
    }

    /// The stream-global last-event-id observed so far.
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{FieldParser, Line};

    fn builder_from(stream: &str) -> (EventBuilder, Vec<Event>) {
        let mut parser = FieldParser::new();
        let mut builder = EventBuilder::new(Duration::from_secs(3));
        let mut events = Vec::new();
        parser.feed(stream.as_bytes(), |line| match line {
            Line::Field(field) => builder.handle_field(field),
            Line::Dispatch => {
                if let Some(event) = builder.dispatch() {
                    events.push(event);
                }
            }
        });
        (builder, events)
    }

    #[test]
    fn block_without_data_produces_no_event() {
        let (_, events) = builder_from("event: test\nid: 1\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn comment_only_block_produces_no_event() {
        let (_, events) = builder_from(": keep-alive\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn multi_line_data_is_newline_joined() {
        let (_, events) = builder_from("data: foo\ndata: bar\ndata: baz\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "foo\nbar\nbaz");
    }

    #[test]
    fn retry_updates_reconnection_time_only_for_well_formed_integers() {
        let (builder, _) = builder_from("retry: 2500\n\nretry: abc\n\nretry: \n\ndata: x\n\n");
        assert_eq!(builder.reconnection_time(), Duration::from_millis(2500));
    }

    #[test]
    fn id_with_nul_byte_is_ignored() {
        let (builder, _) = builder_from("id: 1\n\nid: a\u{0}b\n\ndata: x\n\n");
        assert_eq!(builder.last_event_id(), "1");
    }

    #[test]
    fn empty_id_clears_last_event_id() {
        let (builder, _) = builder_from("id: 1\n\ndata: x\nid:\n\n");
        assert_eq!(builder.last_event_id(), "");
    }

    #[test]
    fn last_event_id_is_not_reset_by_a_block_without_id() {
        let (builder, _) = builder_from("id: 7\n\ndata: x\n\n");
        assert_eq!(builder.last_event_id(), "7");
    }
}
