use crate::api;
use crate::config::AppConfig;
use crate::telemetry::TelemetrySink;
use crate::transport::WebhookClient;
use crate::widget::ChatWidget;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct MountedWidget {
    widget: Arc<ChatWidget>,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub webhook: WebhookClient,
    pub telemetry: Arc<dyn TelemetrySink>,
    widgets: Arc<RwLock<HashMap<String, MountedWidget>>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        webhook: WebhookClient,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            webhook,
            telemetry,
            widgets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a fresh widget session with its welcome message.
    pub async fn mount(&self) -> Arc<ChatWidget> {
        self.evict_idle().await;
        let id = uuid::Uuid::new_v4().to_string();
        let widget = Arc::new(ChatWidget::new(
            id.clone(),
            &self.config.widget.welcome,
            self.config.widget.features,
            self.webhook.clone(),
        ));
        self.widgets.write().await.insert(
            id.clone(),
            MountedWidget {
                widget: widget.clone(),
                last_seen: Instant::now(),
            },
        );
        info!(widget = %id, "widget mounted");
        widget
    }

    /// Look up a mounted widget and mark it active. Idle widgets past the
    /// session TTL are dropped instead.
    pub async fn widget(&self, id: &str) -> Option<Arc<ChatWidget>> {
        let mut widgets = self.widgets.write().await;
        let entry = widgets.get_mut(id)?;
        if self.is_expired(entry.last_seen) {
            widgets.remove(id);
            info!(widget = %id, "widget expired");
            return None;
        }
        entry.last_seen = Instant::now();
        Some(entry.widget.clone())
    }

    /// Drop every widget idle for longer than the session TTL.
    pub async fn evict_idle(&self) -> usize {
        let mut widgets = self.widgets.write().await;
        let before = widgets.len();
        widgets.retain(|_, entry| !self.is_expired(entry.last_seen));
        let evicted = before - widgets.len();
        if evicted > 0 {
            info!(evicted, remaining = widgets.len(), "idle widgets evicted");
        }
        evicted
    }

    fn is_expired(&self, last_seen: Instant) -> bool {
        let ttl = self.config.session_ttl;
        !ttl.is_zero() && last_seen.elapsed() >= ttl
    }

    pub async fn unmount(&self, id: &str) -> bool {
        let removed = self.widgets.write().await.remove(id).is_some();
        if removed {
            info!(widget = %id, "widget unmounted");
        }
        removed
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_add(UPLOAD_OVERHEAD_BYTES);
    let enable_cors = state.config.enable_cors;

    let mut app = Router::new()
        .route("/widget.js", get(api::serve_widget_script))
        .route("/api/widget/config", get(api::get_widget_config))
        .route(
            "/api/widget/session",
            post(api::mount_session)
                .get(api::get_session)
                .delete(api::unmount_session),
        )
        .route("/api/widget/input", post(api::update_input))
        .route("/api/widget/popup/toggle", post(api::toggle_popup))
        .route("/api/widget/popup/close", post(api::close_popup))
        .route("/api/widget/message", post(api::post_message))
        .route("/api/widget/file", post(api::post_file))
        .route("/api/widget/auth", post(api::post_credentials))
        .route("/api/widget/auth/cancel", post(api::cancel_auth))
        .route("/api/widget/events", post(api::post_events))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

pub async fn run(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    spawn_idle_sweeper(state.clone());
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn spawn_idle_sweeper(state: AppState) {
    let ttl = state.config.session_ttl;
    if ttl.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(ttl.min(MAX_SWEEP_INTERVAL));
        loop {
            tick.tick().await;
            state.evict_idle().await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NullTelemetrySink;
    use crate::transport::EchoWebhookBackend;

    fn state_with_ttl(ttl: Duration) -> AppState {
        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.session_ttl = ttl;
        AppState::new(
            config,
            WebhookClient::new(Arc::new(EchoWebhookBackend)),
            Arc::new(NullTelemetrySink),
        )
    }

    #[tokio::test]
    async fn idle_widgets_are_evicted() {
        let state = state_with_ttl(Duration::from_millis(50));
        let idle = state.mount().await.id().to_string();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let fresh = state.mount().await.id().to_string();

        assert!(state.widget(&idle).await.is_none());
        assert!(state.widget(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn lookups_keep_a_widget_alive() {
        let state = state_with_ttl(Duration::from_millis(200));
        let id = state.mount().await.id().to_string();
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(80)).await;
            assert!(state.widget(&id).await.is_some());
        }
        assert_eq!(state.evict_idle().await, 0);
    }

    #[tokio::test]
    async fn zero_ttl_never_expires() {
        let state = state_with_ttl(Duration::ZERO);
        let id = state.mount().await.id().to_string();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.evict_idle().await, 0);
        assert!(state.widget(&id).await.is_some());
    }
}
