use crate::auth::{expired_session_cookie, make_session_cookie, session_id_from_headers};
use crate::server::AppState;
use crate::session::{PDF_CONTENT_TYPE, PendingFile, WidgetError};
use crate::telemetry::{TelemetryEvent, set_request_telemetry_ctx};
use crate::widget::ChatWidget;
use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const SERVICE: &str = "greentic-chat-widget";

pub async fn serve_widget_script(State(_state): State<AppState>) -> impl IntoResponse {
    let script = match tokio::fs::read_to_string("assets/chat-widget.js").await {
        Ok(script) => script,
        Err(_) => crate::sdk::widget_script(),
    };
    let mut resp = Response::new(script);
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/javascript"),
    );
    resp
}

pub async fn get_widget_config(State(state): State<AppState>) -> impl IntoResponse {
    let widget = &state.config.widget;
    Json(json!({
        "title": widget.title,
        "welcome": widget.welcome,
        "features": widget.features,
        "accept": PDF_CONTENT_TYPE,
    }))
}

pub async fn mount_session(State(state): State<AppState>) -> impl IntoResponse {
    let widget = state.mount().await;
    set_request_telemetry_ctx(SERVICE, Some(widget.id()));
    state
        .telemetry
        .record_event(TelemetryEvent::now(
            "widget_mounted",
            "/api/widget/session",
            serde_json::Value::Null,
        ))
        .await;
    let view = widget.view().await;
    (
        StatusCode::CREATED,
        [(header::SET_COOKIE, make_session_cookie(widget.id(), state.config.session_ttl))],
        Json(json!({
            "session_id": widget.id(),
            "view": view,
        })),
    )
        .into_response()
}

pub async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match current_widget(&state, &headers).await {
        Ok(widget) => Json(widget.view().await).into_response(),
        Err(resp) => resp,
    }
}

pub async fn unmount_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(id) = session_id_from_headers(&headers) else {
        return missing_session();
    };
    if !state.unmount(&id).await {
        return unknown_session();
    }
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, expired_session_cookie(&id))],
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: String,
}

pub async fn update_input(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TextRequest>,
) -> Response {
    match current_widget(&state, &headers).await {
        Ok(widget) => Json(widget.update_input(&body.text).await).into_response(),
        Err(resp) => resp,
    }
}

pub async fn toggle_popup(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match current_widget(&state, &headers).await {
        Ok(widget) => Json(widget.toggle_popup().await).into_response(),
        Err(resp) => resp,
    }
}

pub async fn close_popup(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match current_widget(&state, &headers).await {
        Ok(widget) => Json(widget.close_popup().await).into_response(),
        Err(resp) => resp,
    }
}

pub async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TextRequest>,
) -> Response {
    let widget = match current_widget(&state, &headers).await {
        Ok(widget) => widget,
        Err(resp) => return resp,
    };
    set_request_telemetry_ctx(SERVICE, Some(widget.id()));
    match widget.submit_text(&body.text).await {
        Some(view) => {
            state
                .telemetry
                .record_event(TelemetryEvent::now(
                    "message_sent",
                    "/api/widget/message",
                    json!({ "chars": body.text.chars().count() }),
                ))
                .await;
            Json(view).into_response()
        }
        None => Json(widget.view().await).into_response(),
    }
}

pub async fn post_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let widget = match current_widget(&state, &headers).await {
        Ok(widget) => widget,
        Err(resp) => return resp,
    };
    let file = match read_file_field(&mut multipart).await {
        Ok(Some(file)) => file,
        Ok(None) => return (StatusCode::BAD_REQUEST, "missing `file` field").into_response(),
        Err(resp) => return resp,
    };
    if file.bytes.len() > state.config.max_upload_bytes {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({ "alert": "The selected file is too large." })),
        )
            .into_response();
    }
    let filename = file.filename.clone();
    match widget.select_file(file).await {
        Ok(view) => {
            set_request_telemetry_ctx(SERVICE, Some(widget.id()));
            state
                .telemetry
                .record_event(TelemetryEvent::now(
                    "file_selected",
                    "/api/widget/file",
                    json!({ "filename": filename }),
                ))
                .await;
            Json(view).into_response()
        }
        Err(err) => widget_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub password: String,
}

pub async fn post_credentials(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CredentialsRequest>,
) -> Response {
    let widget = match current_widget(&state, &headers).await {
        Ok(widget) => widget,
        Err(resp) => return resp,
    };
    match widget.submit_credentials(&body.user_id, &body.password).await {
        Ok(view) => Json(view).into_response(),
        Err(err) => widget_error(err),
    }
}

pub async fn cancel_auth(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match current_widget(&state, &headers).await {
        Ok(widget) => Json(widget.cancel_auth().await).into_response(),
        Err(resp) => resp,
    }
}

#[derive(Debug, Deserialize)]
pub struct TelemetryRequest {
    pub event_type: String,
    pub path: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

pub async fn post_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TelemetryRequest>,
) -> impl IntoResponse {
    let session = session_id_from_headers(&headers);
    set_request_telemetry_ctx(SERVICE, session.as_deref());
    let event = TelemetryEvent::now(body.event_type, body.path, body.metadata);
    state.telemetry.record_event(event).await;
    StatusCode::ACCEPTED
}

async fn current_widget(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<ChatWidget>, Response> {
    let Some(id) = session_id_from_headers(headers) else {
        return Err(missing_session());
    };
    state.widget(&id).await.ok_or_else(unknown_session)
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<PendingFile>, Response> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()).into_response())?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("document.pdf")
            .to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()).into_response())?;
        return Ok(Some(PendingFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

fn widget_error(err: WidgetError) -> Response {
    let status = match err {
        WidgetError::NotPdf { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        WidgetError::UploadsDisabled => StatusCode::FORBIDDEN,
        WidgetError::NoPendingFile => StatusCode::CONFLICT,
    };
    (status, Json(json!({ "alert": err.to_string() }))).into_response()
}

fn missing_session() -> Response {
    (StatusCode::BAD_REQUEST, "missing widget session").into_response()
}

fn unknown_session() -> Response {
    (StatusCode::NOT_FOUND, "unknown widget session").into_response()
}
