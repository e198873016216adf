use crate::session::{Message, PDF_CONTENT_TYPE, PendingFile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, info, warn};
use url::Url;

pub const NO_RESPONSE_TEXT: &str = "No response";
const FAILURE_PREFIX: &str = "⚠️ Something went wrong";

/// Settled result of one webhook call, ready to become a bot message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotReply {
    Text(String),
    Failed(String),
}

impl BotReply {
    fn from_result(result: Result<String, TransportError>) -> Self {
        match result {
            Ok(text) => BotReply::Text(text),
            Err(err) => BotReply::Failed(format!("{FAILURE_PREFIX}: {err}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0} webhook URL is not configured")]
    NotConfigured(&'static str),
    #[error("webhook returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("webhook request failed: {0}")]
    Network(String),
    #[error("webhook response could not be read: {0}")]
    Malformed(String),
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<&'a [Message]>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookResponse {
    #[serde(default)]
    pub output: Option<String>,
}

impl WebhookResponse {
    /// Blank output counts as no output.
    fn into_text(self) -> String {
        self.output
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| NO_RESPONSE_TEXT.to_string())
    }
}

/// Pluggable backend for the external webhook.
#[async_trait]
pub trait WebhookBackend: Send + Sync {
    async fn send_text(
        &self,
        message: &str,
        history: Option<&[Message]>,
    ) -> Result<String, TransportError>;

    async fn send_file(&self, file: &PendingFile) -> Result<String, TransportError>;
}

#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    pub chat_url: Option<Url>,
    pub upload_url: Option<Url>,
}

/// HTTP backend posting JSON chat requests and multipart uploads.
#[derive(Clone)]
pub struct HttpWebhookBackend {
    cfg: WebhookConfig,
    client: reqwest::Client,
}

impl HttpWebhookBackend {
    pub fn new(cfg: WebhookConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { cfg, client })
    }
}

#[async_trait]
impl WebhookBackend for HttpWebhookBackend {
    async fn send_text(
        &self,
        message: &str,
        history: Option<&[Message]>,
    ) -> Result<String, TransportError> {
        let url = self
            .cfg
            .chat_url
            .clone()
            .ok_or(TransportError::NotConfigured("chat"))?;
        let body = ChatRequest { message, history };
        let resp = self.client.post(url).json(&body).send().await;
        read_reply(resp).await
    }

    async fn send_file(&self, file: &PendingFile) -> Result<String, TransportError> {
        let url = self
            .cfg
            .upload_url
            .clone()
            .ok_or(TransportError::NotConfigured("upload"))?;
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(PDF_CONTENT_TYPE)
            .map_err(|e| TransportError::Network(format!("invalid upload part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("filename", file.filename.clone());
        let resp = self.client.post(url).multipart(form).send().await;
        read_reply(resp).await
    }
}

async fn read_reply(
    resp: Result<reqwest::Response, reqwest::Error>,
) -> Result<String, TransportError> {
    let resp = resp.map_err(|e| TransportError::Network(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(TransportError::Status(status));
    }
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(NO_RESPONSE_TEXT.to_string());
    }
    let payload: WebhookResponse =
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Malformed(e.to_string()))?;
    Ok(payload.into_text())
}

/// Offline backend for local development; echoes what it receives.
#[derive(Clone, Default)]
pub struct EchoWebhookBackend;

#[async_trait]
impl WebhookBackend for EchoWebhookBackend {
    async fn send_text(
        &self,
        message: &str,
        history: Option<&[Message]>,
    ) -> Result<String, TransportError> {
        let seen = history.map(<[Message]>::len).unwrap_or(0);
        Ok(format!("Echo: {message} ({seen} earlier messages)"))
    }

    async fn send_file(&self, file: &PendingFile) -> Result<String, TransportError> {
        Ok(format!(
            "Received {} ({} bytes)",
            file.filename,
            file.bytes.len()
        ))
    }
}

/// Wrapper that turns backend results into bot replies and logs failures.
#[derive(Clone)]
pub struct WebhookClient {
    backend: Arc<dyn WebhookBackend>,
}

impl WebhookClient {
    pub fn new(backend: Arc<dyn WebhookBackend>) -> Self {
        Self { backend }
    }

    pub async fn send_text(&self, message: &str, history: Option<&[Message]>) -> BotReply {
        let span = tracing::info_span!(
            "webhook_chat",
            len = message.len(),
            history = history.map(<[Message]>::len).unwrap_or(0)
        );
        let result = self
            .backend
            .send_text(message, history)
            .instrument(span)
            .await;
        log_result("chat", &result);
        BotReply::from_result(result)
    }

    pub async fn send_file(&self, file: &PendingFile) -> BotReply {
        let span = tracing::info_span!(
            "webhook_upload",
            filename = %file.filename,
            bytes = file.bytes.len()
        );
        let result = self.backend.send_file(file).instrument(span).await;
        log_result("upload", &result);
        BotReply::from_result(result)
    }
}

fn log_result(kind: &str, result: &Result<String, TransportError>) {
    match result {
        Ok(text) => info!(%kind, reply_len = text.len(), "webhook replied"),
        Err(TransportError::NotConfigured(_)) => {
            warn!(%kind, "webhook URL missing; reporting configuration error")
        }
        Err(err) => warn!(%kind, %err, "webhook call failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    async fn spawn_webhook(app: Router) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/hook").parse().unwrap()
    }

    fn client_for(chat_url: Option<Url>, upload_url: Option<Url>) -> WebhookClient {
        let backend = HttpWebhookBackend::new(WebhookConfig {
            chat_url,
            upload_url,
        })
        .unwrap();
        WebhookClient::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn chat_reply_uses_output_field() {
        let app = Router::new().route(
            "/hook",
            post(|Json(body): Json<Value>| async move {
                let count = body["history"].as_array().map(Vec::len).unwrap_or(0);
                Json(json!({ "output": format!("{} / {count}", body["message"].as_str().unwrap()) }))
            }),
        );
        let url = spawn_webhook(app).await;
        let client = client_for(Some(url), None);
        let history = vec![Message::bot("welcome")];
        let reply = client.send_text("ping", Some(&history)).await;
        assert_eq!(reply, BotReply::Text("ping / 1".into()));
    }

    #[tokio::test]
    async fn missing_output_defaults_to_placeholder() {
        let app = Router::new().route("/hook", post(|| async { Json(json!({})) }));
        let url = spawn_webhook(app).await;
        let reply = client_for(Some(url), None).send_text("ping", None).await;
        assert_eq!(reply, BotReply::Text(NO_RESPONSE_TEXT.into()));
    }

    #[tokio::test]
    async fn blank_output_defaults_to_placeholder() {
        for output in ["", "  \n"] {
            let app = Router::new().route(
                "/hook",
                post(move || async move { Json(json!({ "output": output })) }),
            );
            let url = spawn_webhook(app).await;
            let reply = client_for(Some(url), None).send_text("ping", None).await;
            assert_eq!(reply, BotReply::Text(NO_RESPONSE_TEXT.into()), "{output:?}");
        }
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let app = Router::new().route(
            "/hook",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let url = spawn_webhook(app).await;
        let reply = client_for(Some(url), None).send_text("ping", None).await;
        let BotReply::Failed(text) = reply else {
            panic!("expected failure");
        };
        assert!(text.contains("500"), "{text}");
    }

    #[tokio::test]
    async fn malformed_body_is_a_failure() {
        let app = Router::new().route("/hook", post(|| async { "not json" }));
        let url = spawn_webhook(app).await;
        let reply = client_for(Some(url), None).send_text("ping", None).await;
        assert!(matches!(reply, BotReply::Failed(text) if text.contains("could not be read")));
    }

    #[tokio::test]
    async fn refused_connection_carries_reason() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url: Url = format!("http://{addr}/hook").parse().unwrap();
        let reply = client_for(Some(url), None).send_text("ping", None).await;
        assert!(matches!(reply, BotReply::Failed(text) if text.contains("request failed")));
    }

    #[tokio::test]
    async fn missing_upload_url_is_reported() {
        let client = client_for(None, None);
        let file = PendingFile {
            filename: "a.pdf".into(),
            content_type: PDF_CONTENT_TYPE.into(),
            bytes: vec![1, 2, 3],
        };
        let reply = client.send_file(&file).await;
        assert_eq!(
            reply,
            BotReply::Failed(
                "⚠️ Something went wrong: upload webhook URL is not configured".into()
            )
        );
    }

    #[tokio::test]
    async fn upload_sends_file_and_filename_parts() {
        let app = Router::new().route(
            "/hook",
            post(|mut multipart: Multipart| async move {
                let mut file_len = 0;
                let mut file_name = String::new();
                let mut filename_field = String::new();
                while let Some(field) = multipart.next_field().await.unwrap() {
                    let name = field.name().map(str::to_string);
                    match name.as_deref() {
                        Some("file") => {
                            file_name = field.file_name().unwrap_or_default().to_string();
                            file_len = field.bytes().await.unwrap().len();
                        }
                        Some("filename") => filename_field = field.text().await.unwrap(),
                        _ => {}
                    }
                }
                Json(json!({ "output": format!("{file_name}|{filename_field}|{file_len}") }))
            }),
        );
        let url = spawn_webhook(app).await;
        let client = client_for(None, Some(url));
        let file = PendingFile {
            filename: "report.pdf".into(),
            content_type: PDF_CONTENT_TYPE.into(),
            bytes: b"%PDF-1.4 body".to_vec(),
        };
        let reply = client.send_file(&file).await;
        assert_eq!(reply, BotReply::Text("report.pdf|report.pdf|13".into()));
    }
}
