use crate::session::{DEFAULT_WELCOME, WidgetFeatures};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Runtime configuration for the widget gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub chat_webhook_url: Option<Url>,
    pub upload_webhook_url: Option<Url>,
    pub enable_cors: bool,
    pub enable_telemetry: bool,
    pub max_upload_bytes: usize,
    /// Idle time after which a mounted widget is dropped. Zero keeps widgets
    /// until they are unmounted.
    pub session_ttl: Duration,
    /// Answer from the local echo backend instead of calling webhooks.
    pub echo: bool,
    pub widget: WidgetConfig,
}

/// Presentation settings shipped to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub title: String,
    pub welcome: String,
    pub features: WidgetFeatures,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            title: "Support Chat".to_string(),
            welcome: DEFAULT_WELCOME.to_string(),
            features: WidgetFeatures::default(),
        }
    }
}

/// Optional TOML overlay. Every key is optional; present keys win over env.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind_addr: Option<SocketAddr>,
    pub chat_webhook_url: Option<Url>,
    pub upload_webhook_url: Option<Url>,
    pub enable_cors: Option<bool>,
    pub enable_telemetry: Option<bool>,
    pub max_upload_bytes: Option<usize>,
    pub session_ttl_secs: Option<u64>,
    pub echo: Option<bool>,
    #[serde(default)]
    pub widget: FileWidgetConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileWidgetConfig {
    pub title: Option<String>,
    pub welcome: Option<String>,
    pub send_history: Option<bool>,
    pub format_replies: Option<bool>,
    pub uploads: Option<bool>,
    pub auth_gate: Option<bool>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("failed to parse BIND_ADDR")?;

        let chat_webhook_url = parse_url(lookup("CHAT_WEBHOOK_URL"), "CHAT_WEBHOOK_URL")?;
        let upload_webhook_url = parse_url(lookup("UPLOAD_WEBHOOK_URL"), "UPLOAD_WEBHOOK_URL")?;

        let enable_cors = lookup("ENABLE_CORS").map(|v| truthy(&v)).unwrap_or(false);
        let enable_telemetry = lookup("ENABLE_TELEMETRY").map(|v| truthy(&v)).unwrap_or(true);
        let echo = lookup("WEBHOOK_ECHO").map(|v| truthy(&v)).unwrap_or(false);

        let max_upload_bytes = lookup("MAX_UPLOAD_BYTES")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let session_ttl = lookup("SESSION_TTL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SESSION_TTL);

        let defaults = WidgetConfig::default();
        let flag = |key: &str, default: bool| lookup(key).map(|v| truthy(&v)).unwrap_or(default);
        let widget = WidgetConfig {
            title: lookup("WIDGET_TITLE").unwrap_or(defaults.title),
            welcome: lookup("WIDGET_WELCOME").unwrap_or(defaults.welcome),
            features: WidgetFeatures {
                send_history: flag("WIDGET_SEND_HISTORY", defaults.features.send_history),
                format_replies: flag("WIDGET_FORMAT_REPLIES", defaults.features.format_replies),
                uploads: flag("WIDGET_UPLOADS", defaults.features.uploads),
                auth_gate: flag("WIDGET_AUTH_GATE", defaults.features.auth_gate),
            },
        };

        Ok(Self {
            bind_addr,
            chat_webhook_url,
            upload_webhook_url,
            enable_cors,
            enable_telemetry,
            max_upload_bytes,
            session_ttl,
            echo,
            widget,
        })
    }

    pub fn merge_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let file: FileConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        self.apply(file);
        Ok(())
    }

    pub fn apply(&mut self, file: FileConfig) {
        if let Some(addr) = file.bind_addr {
            self.bind_addr = addr;
        }
        if file.chat_webhook_url.is_some() {
            self.chat_webhook_url = file.chat_webhook_url;
        }
        if file.upload_webhook_url.is_some() {
            self.upload_webhook_url = file.upload_webhook_url;
        }
        if let Some(cors) = file.enable_cors {
            self.enable_cors = cors;
        }
        if let Some(telemetry) = file.enable_telemetry {
            self.enable_telemetry = telemetry;
        }
        if let Some(max) = file.max_upload_bytes {
            self.max_upload_bytes = max;
        }
        if let Some(secs) = file.session_ttl_secs {
            self.session_ttl = Duration::from_secs(secs);
        }
        if let Some(echo) = file.echo {
            self.echo = echo;
        }
        let widget = file.widget;
        if let Some(title) = widget.title {
            self.widget.title = title;
        }
        if let Some(welcome) = widget.welcome {
            self.widget.welcome = welcome;
        }
        let features = &mut self.widget.features;
        features.send_history = widget.send_history.unwrap_or(features.send_history);
        features.format_replies = widget.format_replies.unwrap_or(features.format_replies);
        features.uploads = widget.uploads.unwrap_or(features.uploads);
        features.auth_gate = widget.auth_gate.unwrap_or(features.auth_gate);
    }
}

fn truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_url(value: Option<String>, key: &str) -> anyhow::Result<Option<Url>> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => {
            let url = raw
                .parse::<Url>()
                .with_context(|| format!("failed to parse {key}"))?;
            Ok(Some(url))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let cfg = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:8080");
        assert!(cfg.chat_webhook_url.is_none());
        assert!(cfg.upload_webhook_url.is_none());
        assert!(!cfg.enable_cors);
        assert!(cfg.enable_telemetry);
        assert_eq!(cfg.widget.features, WidgetFeatures::default());
        assert_eq!(cfg.widget.welcome, DEFAULT_WELCOME);
        assert_eq!(cfg.session_ttl, Duration::from_secs(1800));
    }

    #[test]
    fn reads_env_overrides() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("CHAT_WEBHOOK_URL", "https://hooks.example.com/chat"),
            ("UPLOAD_WEBHOOK_URL", " "),
            ("ENABLE_CORS", "TRUE"),
            ("WIDGET_AUTH_GATE", "0"),
            ("MAX_UPLOAD_BYTES", "1024"),
            ("SESSION_TTL_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(
            cfg.chat_webhook_url.as_ref().map(Url::as_str),
            Some("https://hooks.example.com/chat")
        );
        assert!(cfg.upload_webhook_url.is_none());
        assert!(cfg.enable_cors);
        assert!(!cfg.widget.features.auth_gate);
        assert!(cfg.widget.features.uploads);
        assert_eq!(cfg.max_upload_bytes, 1024);
        assert!(cfg.session_ttl.is_zero());
    }

    #[test]
    fn rejects_invalid_url() {
        let err = AppConfig::from_lookup(lookup_from(&[("CHAT_WEBHOOK_URL", "not a url")]))
            .unwrap_err();
        assert!(err.to_string().contains("CHAT_WEBHOOK_URL"));
    }

    #[test]
    fn file_overlay_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
upload_webhook_url = "https://hooks.example.com/upload"
echo = true
session_ttl_secs = 90

[widget]
title = "Docs Bot"
format_replies = false
"#
        )
        .unwrap();
        let mut cfg = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        cfg.merge_file(file.path()).unwrap();
        assert!(cfg.echo);
        assert_eq!(cfg.session_ttl, Duration::from_secs(90));
        assert_eq!(cfg.widget.title, "Docs Bot");
        assert!(!cfg.widget.features.format_replies);
        assert!(cfg.widget.features.send_history);
        assert_eq!(
            cfg.upload_webhook_url.as_ref().map(Url::as_str),
            Some("https://hooks.example.com/upload")
        );
    }

    #[test]
    fn unknown_file_keys_are_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pack_root = \"packs\"").unwrap();
        let mut cfg = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(cfg.merge_file(file.path()).is_err());
    }
}
