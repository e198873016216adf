use async_trait::async_trait;
use greentic_telemetry::init::TelemetryConfig;
use greentic_telemetry::init_telemetry;
use greentic_telemetry::{TelemetryCtx, set_current_telemetry_ctx};
use serde::{Deserialize, Serialize};
use tracing::info;

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record_event(&self, event: TelemetryEvent);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event_type: String,
    pub path: String,
    pub timestamp_ms: i64,
    pub metadata: serde_json::Value,
}

impl TelemetryEvent {
    pub fn now(
        event_type: impl Into<String>,
        path: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            path: path.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            metadata,
        }
    }
}

/// Sink that only logs; used when telemetry export is not wanted.
#[derive(Clone, Default)]
pub struct NullTelemetrySink;

#[async_trait]
impl TelemetrySink for NullTelemetrySink {
    async fn record_event(&self, event: TelemetryEvent) {
        tracing::debug!(?event, "telemetry event (discarded)");
    }
}

pub struct GreenticTelemetrySink;

impl GreenticTelemetrySink {
    pub fn init() {
        let _ = init_telemetry(TelemetryConfig {
            service_name: "greentic-chat-widget".into(),
        });
    }
}

#[async_trait]
impl TelemetrySink for GreenticTelemetrySink {
    async fn record_event(&self, event: TelemetryEvent) {
        info!(
            target: "greentic_chat_widget.telemetry",
            event_type = %event.event_type,
            path = %event.path,
            timestamp = event.timestamp_ms,
            metadata = %event.metadata,
            "widget telemetry event"
        );
    }
}

/// Attach the widget session to telemetry emitted by the current task.
pub fn set_request_telemetry_ctx(service: &str, session: Option<&str>) {
    let mut ctx = TelemetryCtx::new(service.to_string());
    if let Some(sess) = session {
        ctx = ctx.with_session(sess.to_string());
    }
    set_current_telemetry_ctx(ctx);
}
