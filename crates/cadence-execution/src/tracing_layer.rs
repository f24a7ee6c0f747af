//! Tracing layer that forwards diagnostics to the UI.
//!
//! Events at or above the configured level are captured with their fields
//! and sent over an unbounded channel, where the desktop host turns them into
//! `diagnostic` events for the frontend.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Event data sent to the frontend
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEvent {
    /// Event target (e.g., "cadence_application::session::agent_session")
    pub target: String,
    /// Log level (WARN, ERROR)
    pub level: String,
    /// Human-readable message
    pub message: String,
    /// Structured fields from the event
    pub fields: HashMap<String, Value>,
    pub timestamp: String,
}

/// A tracing layer that sends events at or above a level to a channel.
pub struct DiagnosticsLayer {
    sender: mpsc::UnboundedSender<DiagnosticEvent>,
    min_level: Level,
}

impl DiagnosticsLayer {
    /// Forwards WARN and ERROR events.
    pub fn new(sender: mpsc::UnboundedSender<DiagnosticEvent>) -> Self {
        Self::with_level(sender, Level::WARN)
    }

    pub fn with_level(sender: mpsc::UnboundedSender<DiagnosticEvent>, min_level: Level) -> Self {
        Self { sender, min_level }
    }
}

impl<S> Layer<S> for DiagnosticsLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // Level ordering: ERROR < WARN < INFO in `tracing`.
        if *event.metadata().level() > self.min_level {
            return;
        }

        let mut fields = HashMap::new();
        let mut visitor = FieldVisitor(&mut fields);
        event.record(&mut visitor);

        let message = fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let diagnostic = DiagnosticEvent {
            target: event.metadata().target().to_string(),
            level: event.metadata().level().to_string(),
            message,
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // A closed receiver means nobody is listening any more.
        let _ = self.sender.send(diagnostic);
    }
}

/// Field visitor that extracts tracing event fields into a HashMap
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(
            field.name().to_string(),
            serde_json::json!(format!("{:?}", value)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(min_level: Level, f: impl FnOnce()) -> Vec<DiagnosticEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber =
            tracing_subscriber::registry().with(DiagnosticsLayer::with_level(tx, min_level));
        tracing::subscriber::with_default(subscriber, f);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn only_warnings_and_errors_are_forwarded() {
        let events = capture(Level::WARN, || {
            tracing::info!("[Queue] queued");
            tracing::warn!(session_id = "s1", "[Agent] skipped malformed output");
            tracing::error!("[Storage] write failed");
        });

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, "WARN");
        assert_eq!(events[0].message, "[Agent] skipped malformed output");
        assert_eq!(events[0].fields["session_id"], "s1");
        assert_eq!(events[1].level, "ERROR");
    }

    #[test]
    fn lower_threshold_includes_info() {
        let events = capture(Level::INFO, || {
            tracing::debug!("noise");
            tracing::info!(count = 3u64, "[Queue] restored");
        });

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fields["count"], 3);
        assert!(!events[0].fields.contains_key("message"));
    }
}
