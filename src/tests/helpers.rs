//! Shared test utilities for theme, upload and throttler tests

use crate::{
    api::{Method, RestRequest},
    config::SyncConfig,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SHOP: &str = "dev-store.myshopify.com";
pub const THEME_ID: &str = "123456789";

/// Initialize logging for tests
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

/// A small theme: two liquid files, three JSON files, a stylesheet, an image and a few
/// files that are not part of the theme.
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
    write_file(&root, "README.md", "# not a theme file");
    write_file(&root, ".git/config.liquid", "hidden");
    root
}

pub fn test_config(root: &Path) -> SyncConfig {
    let mut config = SyncConfig::with_root(root);
    config.shop = Some(SHOP.to_string());
    config.theme_id = Some(THEME_ID.to_string());
    config
}

pub fn asset_put(key: &str, value: &str) -> RestRequest {
    RestRequest::new(
        Method::PUT,
        SHOP,
        &format!("themes/{THEME_ID}/assets.json"),
        "unstable",
    )
    .with_body(json!({ "asset": { "key": key, "value": value } }).to_string())
}
