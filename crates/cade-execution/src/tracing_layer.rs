//! Custom tracing layer for streaming dispatch events to an observer.
//!
//! Captures events emitted by the dispatch crates and forwards them over a
//! tokio channel, e.g. to the CLI's `--events` view.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// Event data sent to the observer
#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatchEvent {
    /// Event target (e.g., "cade_execution::pattern_executor")
    pub target: String,
    /// Log level (INFO, DEBUG, WARN, ERROR)
    pub level: String,
    /// Human-readable message
    pub message: String,
    /// Structured fields from the event
    pub fields: HashMap<String, Value>,
    /// Fields of the enclosing spans (e.g., session_id)
    pub span: HashMap<String, Value>,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

/// Span fields stored in the registry's span extensions.
struct SpanFields(HashMap<String, Value>);

/// A tracing layer that sends dispatch events to a channel
pub struct DispatchEventLayer {
    sender: mpsc::UnboundedSender<DispatchEvent>,
    target_prefix: &'static str,
}

impl DispatchEventLayer {
    /// Forwards events whose target starts with `cade`.
    pub fn new(sender: mpsc::UnboundedSender<DispatchEvent>) -> Self {
        Self::with_target_prefix(sender, "cade")
    }

    pub fn with_target_prefix(
        sender: mpsc::UnboundedSender<DispatchEvent>,
        target_prefix: &'static str,
    ) -> Self {
        Self {
            sender,
            target_prefix,
        }
    }
}

impl<S> Layer<S> for DispatchEventLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = HashMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            values.record(&mut FieldVisitor(fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if !event.metadata().target().starts_with(self.target_prefix) {
            return;
        }

        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));

        // Outer spans first so inner spans win on name clashes
        let mut span_fields = HashMap::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(stored)) = span.extensions().get::<SpanFields>() {
                    span_fields.extend(stored.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }

        let message = fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let dispatch_event = DispatchEvent {
            target: event.metadata().target().to_string(),
            level: event.metadata().level().to_string(),
            message,
            fields,
            span: span_fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // Receiver may be gone; events are best-effort
        let _ = self.sender.send(dispatch_event);
    }
}

/// Field visitor that extracts tracing fields into a HashMap
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

    #[test]
    fn test_forwards_cade_events_with_span_fields() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(DispatchEventLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("handle_turn", session_id = "s-1");
            let _guard = span.enter();
            tracing::info!(
                target: "cade_execution::pattern_executor",
                tools = 2u64,
                "Executing pattern"
            );
            tracing::info!(target: "hyper::client", "ignored");
        });

        let event = rx.try_recv().expect("one event expected");
        assert_eq!(event.target, "cade_execution::pattern_executor");
        assert_eq!(event.level, "INFO");
        assert_eq!(event.message, "Executing pattern");
        assert_eq!(event.fields["tools"], serde_json::json!(2));
        assert_eq!(event.span["session_id"], serde_json::json!("s-1"));
        assert!(rx.try_recv().is_err());
    }
}
