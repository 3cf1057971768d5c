use super::{sse::SseStreams, DevServerState};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub const HOT_RELOAD_PATH: &str = "/hot-reload";

/// Browser side of the live reload loop.
pub const HOT_RELOAD_JS: &str = include_str!("hot-reload.js");

/// Inserts the reload script right before the last `</body>`. Documents without one are
/// returned as is.
pub fn inject_hot_reload_javascript(html: &str) -> String {
    match html.rfind("</body>") {
        Some(index) => {
            let mut injected = String::with_capacity(html.len() + HOT_RELOAD_JS.len() + 20);
            injected.push_str(&html[..index]);
            injected.push_str("<script>\n");
            injected.push_str(HOT_RELOAD_JS);
            injected.push_str("</script>\n");
            injected.push_str(&html[index..]);
            injected
        }
        None => html.to_string(),
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().to_ascii_lowercase().starts_with("text/html"))
}

/// Middleware adding the reload script to every HTML response.
pub async fn inject_hot_reload(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if !is_html(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("[HotReload] could not buffer HTML response: {}", e);
            return (StatusCode::BAD_GATEWAY, "Bad gateway").into_response();
        }
    };
    let body = match std::str::from_utf8(&bytes) {
        Ok(html) => Body::from(inject_hot_reload_javascript(html)),
        Err(_) => Body::from(bytes),
    };
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, body)
}

/// `GET /hot-reload`: a never ending `text/event-stream` of change notifications.
pub async fn hot_reload_handler(State(state): State<DevServerState>) -> Response {
    event_stream_response(&state.streams)
}

pub fn event_stream_response(streams: &SseStreams) -> Response {
    let mut response = Response::new(Body::from_stream(streams.subscribe()));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}
