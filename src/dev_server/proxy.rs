use super::DevServerState;
use crate::error::ThemeSyncError;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::time::Duration;
use url::Url;

const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Forwards storefront requests to the shop, rendering the development theme.
#[derive(Debug, Clone)]
pub struct StorefrontProxy {
    client: reqwest::Client,
    base_url: Url,
    theme_id: String,
    local_origin: String,
}

impl StorefrontProxy {
    /// `local_origin` is what the browser talks to, e.g. `http://127.0.0.1:9292`.
    pub fn new(shop: &str, theme_id: &str, local_origin: &str) -> Result<Self, ThemeSyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(StorefrontProxy {
            client,
            base_url: Url::parse(&format!("https://{shop}/"))?,
            theme_id: theme_id.to_string(),
            local_origin: local_origin.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Upstream URL for `path` and the browser's query, plus the preview parameters.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Result<Url, ThemeSyncError> {
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        url.set_query(query.filter(|q| !q.is_empty()));
        url.query_pairs_mut()
            .append_pair("_fd", "0")
            .append_pair("pb", "0")
            .append_pair("preview_theme_id", &self.theme_id);
        Ok(url)
    }

    pub async fn forward(&self, request: Request) -> Result<Response, ThemeSyncError> {
        let (parts, body) = request.into_parts();
        let url = self.upstream_url(parts.uri.path(), parts.uri.query())?;
        let body = to_bytes(body, MAX_REQUEST_BODY)
            .await
            .map_err(|e| ThemeSyncError::Http(format!("could not read request body: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in parts.headers.iter() {
            if is_hop_by_hop(name)
                || name == header::HOST
                || name == header::CONTENT_LENGTH
                || name == header::ACCEPT_ENCODING
            {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        tracing::debug!("[Proxy] {} {}", parts.method, url);
        let upstream = self
            .client
            .request(parts.method.clone(), url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let upstream_headers = upstream.headers().clone();
        let bytes = upstream.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        let response_headers = response.headers_mut();
        for (name, value) in upstream_headers.iter() {
            if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
                continue;
            }
            let value = if name == header::SET_COOKIE {
                self.rewrite_cookie(value)
            } else if name == header::LOCATION {
                self.rewrite_location(value)
            } else {
                value.clone()
            };
            response_headers.append(name.clone(), value);
        }
        Ok(response)
    }

    /// Drops `Domain` and `Secure` so the browser keeps the cookie on the local host.
    fn rewrite_cookie(&self, value: &HeaderValue) -> HeaderValue {
        let Ok(cookie) = value.to_str() else {
            return value.clone();
        };
        let rewritten = cookie
            .split(';')
            .map(str::trim)
            .filter(|attribute| {
                let lower = attribute.to_ascii_lowercase();
                !(lower.starts_with("domain=") || lower == "secure")
            })
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&rewritten).unwrap_or_else(|_| value.clone())
    }

    fn rewrite_location(&self, value: &HeaderValue) -> HeaderValue {
        let Ok(location) = value.to_str() else {
            return value.clone();
        };
        let upstream_origin = self.base_url.as_str().trim_end_matches('/');
        match location.strip_prefix(upstream_origin) {
            Some(rest) => HeaderValue::from_str(&format!("{}{}", self.local_origin, rest))
                .unwrap_or_else(|_| value.clone()),
            None => value.clone(),
        }
    }
}

/// Everything not served locally: proxied, then CDN asset URLs pointed back at this server.
pub async fn proxy_handler(State(state): State<DevServerState>, request: Request) -> Response {
    let response = match state.proxy.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("[Proxy] upstream request failed: {}", e);
            return (StatusCode::BAD_GATEWAY, "Bad gateway").into_response();
        }
    };

    let (parts, body) = response.into_parts();
    let bytes: Bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("[Proxy] could not read upstream body: {}", e);
            return (StatusCode::BAD_GATEWAY, "Bad gateway").into_response();
        }
    };
    let body = match std::str::from_utf8(&bytes) {
        Ok(text) => Body::from(state.rewriter.rewrite(text, &state.theme.asset_paths())),
        Err(_) => Body::from(bytes),
    };
    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> StorefrontProxy {
        StorefrontProxy::new("dev-store.myshopify.com", "123456789", "http://127.0.0.1:9292")
            .unwrap()
    }

    #[test]
    fn upstream_url_carries_preview_parameters() {
        let url = proxy().upstream_url("/products/shirt", Some("variant=1")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://dev-store.myshopify.com/products/shirt?variant=1&_fd=0&pb=0&preview_theme_id=123456789"
        );
        let root = proxy().upstream_url("/", None).unwrap();
        assert_eq!(
            root.as_str(),
            "https://dev-store.myshopify.com/?_fd=0&pb=0&preview_theme_id=123456789"
        );
    }

    #[test]
    fn cookies_and_redirects_point_back_at_the_local_server() {
        let proxy = proxy();
        let cookie = HeaderValue::from_static("_s=abc; Domain=dev-store.myshopify.com; Path=/; Secure");
        assert_eq!(proxy.rewrite_cookie(&cookie), "_s=abc; Path=/");

        let location = HeaderValue::from_static("https://dev-store.myshopify.com/cart?step=1");
        assert_eq!(
            proxy.rewrite_location(&location),
            "http://127.0.0.1:9292/cart?step=1"
        );
    }
}
