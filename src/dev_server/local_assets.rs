use super::DevServerState;
use crate::{
    error::ThemeSyncError,
    theme::{MimeType, Theme},
};
use axum::{
    body::Body,
    extract::{Path as UrlPath, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use regex::{Captures, Regex};
use std::{
    collections::BTreeSet,
    path::{Component, Path},
};

/// A CDN asset URL ends at the first quote, whitespace, bracket or parenthesis.
const ASSET_URL_PATTERN: &str =
    r#"//cdn\.shopify\.com/s/[^"'\s()<>]*?/(assets/[^"'\s()<>?#]+?\.(?:css|js))"#;

pub fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        "Not found",
    )
        .into_response()
}

/// Rejects anything that could leave the assets directory.
fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// Reads `root/assets/<path>` for `GET /assets/<path>`.
pub async fn serve_local_asset(theme: &Theme, path: &str) -> Response {
    if !is_safe_relative(path) {
        return not_found();
    }
    let file = theme.root().join("assets").join(path);
    let content = match tokio::fs::read(&file).await {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("[LocalAssets] {}: {}", file.display(), e);
            return not_found();
        }
    };
    let mime = MimeType::by_filename(&file);
    let length = content.len();
    let mut response = Response::new(Body::from(content));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime.name()));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    response
}

pub async fn local_asset_handler(
    State(state): State<DevServerState>,
    UrlPath(path): UrlPath<String>,
) -> Response {
    serve_local_asset(&state.theme, &path).await
}

/// Points CDN URLs of assets that exist locally at `/assets/<name>`.
#[derive(Debug, Clone)]
pub struct AssetUrlRewriter {
    regex: Regex,
}

impl AssetUrlRewriter {
    pub fn new() -> Result<Self, ThemeSyncError> {
        Ok(AssetUrlRewriter {
            regex: Regex::new(ASSET_URL_PATTERN)?,
        })
    }

    pub fn rewrite(&self, body: &str, asset_paths: &BTreeSet<String>) -> String {
        self.regex
            .replace_all(body, |captures: &Captures| {
                let path = &captures[1];
                if asset_paths.contains(path) {
                    format!("/{path}")
                } else {
                    captures[0].to_string()
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_only_known_assets() {
        let assets: BTreeSet<String> = ["assets/theme.css".to_string()].into_iter().collect();
        let body = r#"<link href="//cdn.shopify.com/s/files/1/0001/t/2/assets/theme.css?v=123">
<script src="//cdn.shopify.com/s/files/1/0001/t/2/assets/vendor.js"></script>"#;
        let rewritten = AssetUrlRewriter::new().unwrap().rewrite(body, &assets);
        assert!(rewritten.contains(r#"href="/assets/theme.css?v=123""#));
        assert!(rewritten.contains("//cdn.shopify.com/s/files/1/0001/t/2/assets/vendor.js"));
    }

    #[test]
    fn keeps_other_urls_on_the_same_line() {
        let assets: BTreeSet<String> = ["assets/theme.css".to_string()].into_iter().collect();
        let body = r#"<img src="//cdn.shopify.com/s/files/1/0001/files/logo.png"><link href="//cdn.shopify.com/s/files/1/0001/t/2/assets/theme.css">"#;
        let rewritten = AssetUrlRewriter::new().unwrap().rewrite(body, &assets);
        assert_eq!(
            rewritten,
            r#"<img src="//cdn.shopify.com/s/files/1/0001/files/logo.png"><link href="/assets/theme.css">"#
        );
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(is_safe_relative("theme.css"));
        assert!(!is_safe_relative("../secret.txt"));
        assert!(!is_safe_relative("/etc/passwd"));
        assert!(!is_safe_relative(""));
    }
}
