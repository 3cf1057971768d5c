//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::TempDir;
use themesync::{
    api::{AdminApi, ApiResponse, CallLimit, HeaderMap, Method, RestRequest, CALL_LIMIT_HEADER},
    config::SyncConfig,
    theme::content_checksum,
    ThemeSyncError,
};

pub const SHOP: &str = "dev-store.myshopify.com";
pub const THEME_ID: &str = "123456789";

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn write_file<C: AsRef<[u8]>>(root: &Path, relative: &str, content: C) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Two liquid files, three JSON files (settings included) and two assets.
pub fn create_test_theme(temp_dir: &TempDir) -> PathBuf {
    init_logging();
    let root = temp_dir.path().join("theme");
    write_file(&root, "layout/theme.liquid", "<html><body>{{ content_for_layout }}</body></html>");
    write_file(&root, "sections/header.liquid", "<header>{{ shop.name }}</header>");
    write_file(&root, "templates/index.json", r#"{ "sections": {}, "order": [] }"#);
    write_file(&root, "config/settings_schema.json", r#"[{"name": "theme_info"}]"#);
    write_file(&root, "config/settings_data.json", r#"{"current": "Default"}"#);
    write_file(&root, "assets/theme.css", ".body { color: red }");
    write_file(&root, "assets/logo.png", [0x89u8, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a]);
    root
}

pub fn test_config(root: &Path) -> SyncConfig {
    let mut config = SyncConfig::with_root(root);
    config.shop = Some(SHOP.to_string());
    config.theme_id = Some(THEME_ID.to_string());
    config.upload.backoff_interval_ms = 100;
    config
}

pub fn assets_path() -> String {
    format!("themes/{THEME_ID}/assets.json")
}

pub fn asset_put(key: &str, value: &str) -> RestRequest {
    RestRequest::new(Method::PUT, SHOP, &assets_path(), "unstable")
        .with_body(json!({ "asset": { "key": key, "value": value } }).to_string())
}

/// The `asset` object of a single-asset request body.
pub fn request_asset(request: &RestRequest) -> Value {
    request
        .body
        .as_deref()
        .and_then(|body| serde_json::from_str::<Value>(body).ok())
        .and_then(|body| body.get("asset").cloned())
        .unwrap_or(Value::Null)
}

/// What the backend would report for an uploaded asset.
pub fn stored_asset(asset: &Value) -> Value {
    let key = asset["key"].as_str().unwrap_or_default().to_string();
    let content = match (asset.get("value"), asset.get("attachment")) {
        (Some(Value::String(value)), _) => value.as_bytes().to_vec(),
        (_, Some(Value::String(attachment))) => BASE64.decode(attachment).unwrap_or_default(),
        _ => Vec::new(),
    };
    let checksum = content_checksum(&content, key.ends_with(".json"));
    json!({ "key": key, "checksum": checksum })
}

/// Admin API stand-in that records every request and answers like the real backend.
#[derive(Default)]
pub struct MockAdminApi {
    requests: Mutex<Vec<RestRequest>>,
    remote_assets: Mutex<Vec<Value>>,
    themes: Mutex<Vec<Value>>,
    failures: Mutex<HashMap<String, (u16, Value)>>,
    call_limit: Mutex<Option<String>>,
    bulk_status: Mutex<Option<u16>>,
    latency: Mutex<Option<Duration>>,
}

impl MockAdminApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assets listed by `GET themes/:id/assets.json`.
    pub fn with_remote_assets(self, assets: Vec<Value>) -> Self {
        *self.remote_assets.lock() = assets;
        self
    }

    /// Themes listed by `GET themes.json` and served by `themes/:id.json`.
    pub fn with_themes(self, themes: Vec<Value>) -> Self {
        *self.themes.lock() = themes;
        self
    }

    /// Writes to `key` fail with `status` and `body`, in single and bulk requests alike.
    pub fn fail_key(self, key: &str, status: u16, body: Value) -> Self {
        self.failures.lock().insert(key.to_string(), (status, body));
        self
    }

    /// Every response carries `x-shopify-shop-api-call-limit: <limit>`.
    pub fn with_call_limit(self, limit: &str) -> Self {
        *self.call_limit.lock() = Some(limit.to_string());
        self
    }

    /// Bulk requests answer with this status and no results.
    pub fn with_bulk_status(self, status: u16) -> Self {
        *self.bulk_status.lock() = Some(status);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = Some(latency);
        self
    }

    pub fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<RestRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method && request.path == path)
            .collect()
    }

    /// Keys of single-asset requests with `method`, in the order they were sent.
    pub fn asset_keys(&self, method: Method) -> Vec<String> {
        self.requests_to(method, &assets_path())
            .iter()
            .map(|request| request_asset(request)["key"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn bulk_requests(&self) -> Vec<RestRequest> {
        self.requests_to(Method::PUT, &format!("themes/{THEME_ID}/assets/bulk.json"))
    }

    /// Asset keys of every bulk request, one `Vec` per request.
    pub fn bulk_batches(&self) -> Vec<Vec<String>> {
        self.bulk_requests()
            .iter()
            .map(|request| {
                let body: Value = serde_json::from_str(request.body.as_deref().unwrap_or("{}")).unwrap();
                body["assets"]
                    .as_array()
                    .map(|assets| {
                        assets
                            .iter()
                            .map(|asset| asset["key"].as_str().unwrap_or_default().to_string())
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(limit) = self.call_limit.lock().as_deref() {
            headers.insert(CALL_LIMIT_HEADER, limit.parse().unwrap());
        }
        headers
    }

    fn call_limit(&self) -> Option<CallLimit> {
        self.call_limit.lock().as_deref().and_then(|limit| limit.parse().ok())
    }

    fn theme_request(&self, request: &RestRequest, id: &str) -> Result<ApiResponse, ThemeSyncError> {
        let mut themes = self.themes.lock();
        let Some(index) = themes.iter().position(|theme| theme["id"].to_string() == id) else {
            return Err(ThemeSyncError::Api {
                status: 404,
                body: r#"{"errors":"Not Found"}"#.to_string(),
                call_limit: None,
            });
        };
        if request.method == Method::DELETE {
            let removed = themes.remove(index);
            return self.respond(200, json!({ "theme": removed }));
        }
        if request.method == Method::PUT {
            let body: Value = serde_json::from_str(request.body.as_deref().unwrap_or("{}"))?;
            if let Some(role) = body["theme"]["role"].as_str() {
                themes[index]["role"] = json!(role);
            }
        }
        let theme = themes[index].clone();
        self.respond(200, json!({ "theme": theme }))
    }

    fn failure(&self, asset: &Value) -> Option<(u16, Value)> {
        let key = asset["key"].as_str()?;
        self.failures.lock().get(key).cloned()
    }

    fn respond(&self, status: u16, body: Value) -> Result<ApiResponse, ThemeSyncError> {
        Ok(ApiResponse {
            status,
            body,
            headers: self.headers(),
        })
    }
}

impl AdminApi for MockAdminApi {
    fn rest_request(&self, request: &RestRequest) -> Result<ApiResponse, ThemeSyncError> {
        self.requests.lock().push(request.clone());
        if let Some(latency) = *self.latency.lock() {
            std::thread::sleep(latency);
        }

        if request.path.ends_with("/bulk.json") {
            if let Some(status) = *self.bulk_status.lock() {
                return Err(ThemeSyncError::Api {
                    status,
                    body: r#"{"message":"bulk unavailable"}"#.to_string(),
                    call_limit: self.call_limit(),
                });
            }
            let body: Value = serde_json::from_str(request.body.as_deref().unwrap_or("{}"))?;
            let results: Vec<Value> = body["assets"]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .iter()
                .map(|asset| match self.failure(asset) {
                    Some((code, body)) => json!({ "code": code, "body": body }),
                    None => json!({ "code": 200, "body": { "asset": stored_asset(asset) } }),
                })
                .collect();
            return self.respond(207, json!({ "results": results }));
        }

        if request.path == "themes.json" {
            let themes = self.themes.lock().clone();
            return self.respond(200, json!({ "themes": themes }));
        }
        if let Some(id) = request
            .path
            .strip_prefix("themes/")
            .and_then(|rest| rest.strip_suffix(".json"))
            .filter(|id| !id.contains('/'))
        {
            return self.theme_request(request, id);
        }

        if request.method == Method::GET {
            let assets = self.remote_assets.lock().clone();
            return self.respond(200, json!({ "assets": assets }));
        }

        let asset = request_asset(request);
        if let Some((status, body)) = self.failure(&asset) {
            return Err(ThemeSyncError::Api {
                status,
                body: body.to_string(),
                call_limit: self.call_limit(),
            });
        }
        if request.method == Method::DELETE {
            return self.respond(200, json!({ "message": "deleted" }));
        }
        self.respond(200, json!({ "asset": stored_asset(&asset) }))
    }
}
