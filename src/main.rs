mod api;
mod auth;
mod config;
mod format;
mod sdk;
mod server;
mod session;
mod telemetry;
mod transport;
mod widget;

use crate::config::AppConfig;
use crate::server::AppState;
use crate::telemetry::{GreenticTelemetrySink, NullTelemetrySink, TelemetrySink};
use crate::transport::{
    EchoWebhookBackend, HttpWebhookBackend, WebhookBackend, WebhookClient, WebhookConfig,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Chat widget gateway: mounts widget sessions and relays them to a webhook.
#[derive(Debug, Parser)]
#[command(name = "greentic-chat-widget", version, about)]
struct Cli {
    /// TOML file layered over the environment configuration.
    #[arg(long, env = "CHAT_WIDGET_CONFIG")]
    config: Option<PathBuf>,
    /// Address to listen on (overrides BIND_ADDR).
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Answer locally instead of calling the webhooks.
    #[arg(long)]
    echo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    if config.enable_telemetry {
        GreenticTelemetrySink::init();
    }

    let backend: Arc<dyn WebhookBackend> = if config.echo {
        tracing::info!("echo mode; webhook calls are answered locally");
        Arc::new(EchoWebhookBackend)
    } else {
        if config.chat_webhook_url.is_none() {
            tracing::warn!(
                "CHAT_WEBHOOK_URL not set; chat messages will report a configuration error"
            );
        }
        if config.upload_webhook_url.is_none() {
            tracing::warn!(
                "UPLOAD_WEBHOOK_URL not set; uploads will report a configuration error"
            );
        }
        Arc::new(HttpWebhookBackend::new(WebhookConfig {
            chat_url: config.chat_webhook_url.clone(),
            upload_url: config.upload_webhook_url.clone(),
        })?)
    };
    let telemetry: Arc<dyn TelemetrySink> = if config.enable_telemetry {
        Arc::new(GreenticTelemetrySink)
    } else {
        Arc::new(NullTelemetrySink)
    };
    let state = AppState::new(config.clone(), WebhookClient::new(backend), telemetry);

    let addr: SocketAddr = config.bind_addr;
    tracing::info!(%addr, "starting greentic-chat-widget server");
    server::run(addr, state).await?;
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::from_env()?;
    if let Some(path) = &cli.config {
        config.merge_file(path)?;
    }
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if cli.echo {
        config.echo = true;
    }
    Ok(config)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
