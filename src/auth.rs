use axum::http::{HeaderMap, header};
use std::time::Duration;

/// Upload gate user id. Placeholder credential shipped with the widget; it
/// is visible to every browser that loads the script and protects nothing.
pub const UPLOAD_GATE_USER_ID: &str = "admin";
/// Upload gate password. Same caveat as [`UPLOAD_GATE_USER_ID`].
pub const UPLOAD_GATE_PASSWORD: &str = "admin123";

pub const SESSION_COOKIE: &str = "chat_widget_session";
pub const SESSION_HEADER: &str = "x-chat-widget-session";

/// Literal comparison guarding the upload path.
pub fn check_credentials(user_id: &str, password: &str) -> bool {
    user_id == UPLOAD_GATE_USER_ID && password == UPLOAD_GATE_PASSWORD
}

pub fn make_session_cookie(session_id: &str, ttl: Duration) -> String {
    let mut cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax");
    if !ttl.is_zero() {
        cookie.push_str(&format!("; Max-Age={}", ttl.as_secs()));
    }
    cookie
}

pub fn expired_session_cookie(session_id: &str) -> String {
    format!(
        "{SESSION_COOKIE}={session_id}; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Lax"
    )
}

/// Session id from the explicit header, falling back to the cookie.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(id) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(id.to_string());
    }
    session_cookie(headers)
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{SESSION_COOKIE}=");
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .map(|c| c.trim())
        .find_map(|c| c.strip_prefix(prefix.as_str()))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn accepts_only_the_literal_pair() {
        assert!(check_credentials("admin", "admin123"));
        assert!(!check_credentials("admin", "wrong"));
        assert!(!check_credentials("Admin", "admin123"));
        assert!(!check_credentials("", ""));
    }

    #[test]
    fn session_cookie_carries_ttl() {
        let cookie = make_session_cookie("abc", Duration::from_secs(600));
        assert!(cookie.starts_with("chat_widget_session=abc;"));
        assert!(cookie.ends_with("; Max-Age=600"));
        assert!(!make_session_cookie("abc", Duration::ZERO).contains("Max-Age"));
    }

    #[test]
    fn reads_session_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; chat_widget_session=abc-123"),
        );
        assert_eq!(session_id_from_headers(&headers).as_deref(), Some("abc-123"));
    }

    #[test]
    fn header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("chat_widget_session=from-cookie"),
        );
        headers.insert(SESSION_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(
            session_id_from_headers(&headers).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn missing_session_is_none() {
        assert!(session_id_from_headers(&HeaderMap::new()).is_none());
    }
}
