//! # themesync
//!
//! Keeps a local theme directory synchronized with a store's theme assets while you edit,
//! and serves a live-reloading preview of the storefront.
//!
//! ## Overview
//!
//! Every changed file is one small, failure-prone request against a rate-limited Admin API.
//! themesync decides which files actually need a write, runs those writes on a small worker
//! pool that backs off near the rate limit, and can fold them into bulk requests.
//!
//! ## Architecture
//!
//! - **[`theme`]**: the local asset catalog: file listings, classification, checksums,
//!   ignore rules and the remote checksum cache
//! - **[`upload`]**: the [`upload::UploadQueue`] worker pool with dedup, skip-if-unchanged
//!   and rate-limit backoff
//! - **[`throttler`]**: batches asset writes into bulk requests
//! - **[`api`]**: the Admin API contract and its reqwest implementation
//! - **[`dev_server`]** (feature `service`): hot reload over SSE, local assets, storefront
//!   proxy and the file watcher
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use themesync::{
//!     api::HttpAdminApi,
//!     config::{ConfigProvider, TomlConfigProvider},
//!     theme::Theme,
//!     upload::{UploadOptions, UploadQueue},
//! };
//!
//! let mut config = TomlConfigProvider::for_root("./my-theme").load()?;
//! config.apply_env();
//! let api = Arc::new(HttpAdminApi::new(config.access_token.clone().unwrap_or_default())?);
//! let theme = Arc::new(Theme::new(&config)?);
//!
//! let queue = UploadQueue::new(theme, api, &config);
//! queue.start()?;
//! queue.upload_theme_with_progress_bar(UploadOptions::default())?;
//! queue.shutdown();
//! # Ok::<(), themesync::ThemeSyncError>(())
//! ```
//!
//! ## Features
//!
//! - **default**: `service`
//! - **service**: the development server (`axum`, `notify`)
//! - **bin**: the `themesync` command line tool

pub mod api;
pub mod config;
#[cfg(all(feature = "service", not(target_arch = "wasm32")))]
pub mod dev_server;
pub mod error;
pub mod theme;
pub mod throttler;
pub mod upload;

#[cfg(test)]
mod tests;

pub use error::*;
