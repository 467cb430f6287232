//! Tracing layer for JSONL output.
//!
//! Writes one JSON object per event on stderr so stdout stays reserved for
//! forecast tables.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::Level;

/// Correlation fields recorded on a span and inherited by its events.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    run_id: Option<String>,
    host_id: Option<String>,
    stage: Option<String>,
    attempt: Option<u64>,
}

impl SpanContext {
    /// Fill unset fields from an enclosing span.
    fn inherit(&mut self, outer: &SpanContext) {
        if self.run_id.is_none() {
            self.run_id.clone_from(&outer.run_id);
        }
        if self.host_id.is_none() {
            self.host_id.clone_from(&outer.host_id);
        }
        if self.stage.is_none() {
            self.stage.clone_from(&outer.stage);
        }
        if self.attempt.is_none() {
            self.attempt = outer.attempt;
        }
    }
}

impl Visit for SpanContext {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "run_id" => self.run_id = Some(value.to_string()),
            "host_id" => self.host_id = Some(value.to_string()),
            "stage" => self.stage = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `%stage` arrives here through its Display impl.
        let text = format!("{:?}", value);
        match field.name() {
            "run_id" => self.run_id = Some(text),
            "host_id" => self.host_id = Some(text),
            "stage" => self.stage = Some(text),
            _ => {}
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "attempt" {
            self.attempt = Some(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "attempt" && value >= 0 {
            self.attempt = Some(value as u64);
        }
    }
}

/// Collects an event's message and remaining fields.
struct JsonFieldVisitor {
    context: SpanContext,
    fields: serde_json::Map<String, serde_json::Value>,
    message: Option<String>,
}

impl JsonFieldVisitor {
    fn new() -> Self {
        JsonFieldVisitor {
            context: SpanContext::default(),
            fields: serde_json::Map::new(),
            message: None,
        }
    }

    fn is_context_field(name: &str) -> bool {
        matches!(name, "run_id" | "host_id" | "stage" | "attempt")
    }
}

impl Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else if Self::is_context_field(field.name()) {
            self.context.record_str(field, value);
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else if Self::is_context_field(field.name()) {
            self.context.record_debug(field, value);
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(format!("{:?}", value)),
            );
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if Self::is_context_field(field.name()) {
            self.context.record_i64(field, value);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::from(value));
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if Self::is_context_field(field.name()) {
            self.context.record_u64(field, value);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::from(value));
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON form; keep them readable.
        let json = serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(value.to_string()));
        self.fields.insert(field.name().to_string(), json);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

/// JSONL tracing layer.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        JsonlLayer {
            writer: Mutex::new(io::stderr()),
        }
    }
}

impl<W: Write> JsonlLayer<W> {
    /// A layer writing to a custom sink.
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut context = SpanContext::default();
        attrs.record(&mut context);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(context);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let ts = Utc::now();

        let mut visitor = JsonFieldVisitor::new();
        event.record(&mut visitor);

        // Innermost span wins, then outward.
        let mut context = visitor.context;
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_ctx) = span.extensions().get::<SpanContext>() {
                    context.inherit(span_ctx);
                }
            }
        }

        let level: Level = (*event.metadata().level()).into();
        let mut obj = serde_json::Map::new();
        obj.insert("ts".to_string(), serde_json::json!(ts.to_rfc3339()));
        obj.insert("level".to_string(), serde_json::json!(level));
        obj.insert(
            "event".to_string(),
            serde_json::json!(event.metadata().target()),
        );
        if let Some(id) = context.run_id {
            obj.insert("run_id".to_string(), serde_json::json!(id));
        }
        if let Some(id) = context.host_id {
            obj.insert("host_id".to_string(), serde_json::json!(id));
        }
        if let Some(stage) = context.stage {
            obj.insert("stage".to_string(), serde_json::json!(stage));
        }
        if let Some(attempt) = context.attempt {
            obj.insert("attempt".to_string(), serde_json::json!(attempt));
        }
        if let Some(msg) = visitor.message {
            obj.insert("message".to_string(), serde_json::json!(msg));
        }
        if !visitor.fields.is_empty() {
            obj.insert(
                "fields".to_string(),
                serde_json::Value::Object(visitor.fields),
            );
        }

        let json = serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_default();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", json);
        }
    }
}

/// JSONL capture of the events emitted on the current thread.
#[cfg(test)]
pub(crate) mod capture {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct BufWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for BufWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn capture(f: impl FnOnce()) -> Vec<serde_json::Value> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = JsonlLayer::new(BufWriter(buffer.clone()));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);

        let output = buffer.lock().unwrap();
        String::from_utf8_lossy(&output)
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid JSON line"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::capture::capture;

    #[test]
    fn layer_writes_level_message_and_target() {
        let lines = capture(|| {
            tracing::warn!(target: "ranging.failed", message = "no bins survive");
        });
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "warn");
        assert_eq!(lines[0]["event"], "ranging.failed");
        assert_eq!(lines[0]["message"], "no bins survive");
        assert!(lines[0]["ts"].is_string());
    }

    #[test]
    fn layer_lifts_context_fields() {
        let lines = capture(|| {
            tracing::info!(
                target: "ranging.attempt_started",
                run_id = "run-1",
                stage = "ranging",
                attempt = 3u32,
                mag_min_sim = 2.5,
                message = "go"
            );
        });
        assert_eq!(lines[0]["run_id"], "run-1");
        assert_eq!(lines[0]["stage"], "ranging");
        assert_eq!(lines[0]["attempt"], 3);
        assert_eq!(lines[0]["fields"]["mag_min_sim"], 2.5);
        assert!(lines[0]["fields"].get("attempt").is_none());
    }

    #[test]
    fn events_inherit_span_context() {
        let lines = capture(|| {
            let span = tracing::info_span!("ranging", run_id = "run-9", attempt = 2u32);
            let _guard = span.enter();
            tracing::info!(target: "ranging.adjusted", ratio = 0.5, message = "adjusted");
        });
        assert_eq!(lines[0]["run_id"], "run-9");
        assert_eq!(lines[0]["attempt"], 2);
        assert_eq!(lines[0]["fields"]["ratio"], 0.5);
    }

    #[test]
    fn non_finite_floats_stay_valid_json() {
        let lines = capture(|| {
            tracing::info!(target: "simulate.finished", ratio = f64::NAN, message = "x");
        });
        assert_eq!(lines[0]["fields"]["ratio"], "NaN");
    }
}
