//! Development server with live reload for theme development
//!
//! Serves a local preview of the storefront:
//! - `/hot-reload` streams change notifications to the browser (Server-Sent Events)
//! - `/assets/*` is served straight from the theme directory
//! - everything else is proxied to the shop, rendering the development theme, with CDN
//!   asset URLs rewritten to the local copies
//! - HTML responses get the hot reload script injected before `</body>`
//!
//! A filesystem watcher uploads changed files and broadcasts `{"modified": [...]}` to every
//! connected browser.

pub mod hot_reload;
pub mod local_assets;
pub mod proxy;
pub mod sse;
pub mod watcher;

pub use hot_reload::{inject_hot_reload, inject_hot_reload_javascript, HOT_RELOAD_JS, HOT_RELOAD_PATH};
pub use local_assets::{serve_local_asset, AssetUrlRewriter};
pub use proxy::StorefrontProxy;
pub use sse::{SseMessage, SseStreams};
pub use watcher::{dispatch_changes, ThemeWatcher};

use crate::{
    api::AdminApi,
    config::SyncConfig,
    error::ThemeSyncError,
    theme::Theme,
    throttler::ThemeAdminApiThrottler,
    upload::{UploadOptions, UploadQueue},
};
use axum::{middleware, routing::get, Router};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;

/// Shared state for the request handlers
#[derive(Clone)]
pub struct DevServerState {
    pub theme: Arc<Theme>,
    pub streams: SseStreams,
    pub proxy: Arc<StorefrontProxy>,
    pub rewriter: AssetUrlRewriter,
}

impl DevServerState {
    pub fn new(theme: Arc<Theme>, proxy: StorefrontProxy) -> Result<Self, ThemeSyncError> {
        Ok(DevServerState {
            theme,
            streams: SseStreams::default(),
            proxy: Arc::new(proxy),
            rewriter: AssetUrlRewriter::new()?,
        })
    }
}

/// Hot reload wraps local assets, which wrap the proxy.
pub fn router(state: DevServerState) -> Router {
    Router::new()
        .route(HOT_RELOAD_PATH, get(hot_reload::hot_reload_handler))
        .route("/assets/*path", get(local_assets::local_asset_handler))
        .fallback(proxy::proxy_handler)
        .layer(middleware::from_fn(inject_hot_reload))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct DevServer {
    config: SyncConfig,
    state: DevServerState,
    throttler: Arc<ThemeAdminApiThrottler>,
    uploader: Arc<UploadQueue>,
}

impl DevServer {
    /// Build outside of an async context when `api` is a blocking client.
    pub fn new(config: SyncConfig, api: Arc<dyn AdminApi>) -> Result<Self, ThemeSyncError> {
        let mut theme = Theme::new(&config)?;
        if let Err(e) = theme.load_info(api.as_ref()) {
            tracing::warn!("[DevServer] could not load theme info: {}", e);
        }
        let theme = Arc::new(theme);
        let throttler = Arc::new(ThemeAdminApiThrottler::from_config(api, &config.throttler));
        let uploader = Arc::new(UploadQueue::new(theme.clone(), throttler.clone(), &config));
        let proxy = StorefrontProxy::new(
            config.shop()?,
            config.theme_id()?,
            &format!("http://{}:{}", config.server.host, config.server.port),
        )?;
        Ok(DevServer {
            state: DevServerState::new(theme, proxy)?,
            config,
            throttler,
            uploader,
        })
    }

    pub fn address(&self) -> Result<SocketAddr, ThemeSyncError> {
        format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .map_err(|e| ThemeSyncError::Config(format!("invalid server address: {e}")))
    }

    pub fn streams(&self) -> &SseStreams {
        &self.state.streams
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Uploads the theme, then serves until `shutdown_signal` resolves.
    ///
    /// Liquid and JSON files are uploaded before the server binds since the storefront
    /// renders them remotely; assets keep uploading in the background.
    pub async fn serve(
        self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ThemeSyncError> {
        let addr = self.address()?;
        let DevServer {
            config,
            state,
            throttler,
            uploader,
        } = self;

        let upload = uploader.clone();
        let uploaded = tokio::task::spawn_blocking(move || {
            upload.start()?;
            upload.upload_theme(UploadOptions {
                delay_low_priority_files: true,
                delete: true,
            })
        })
        .await
        .map_err(|e| ThemeSyncError::Custom(format!("upload task failed: {e}")))
        .and_then(|result| result);
        if let Err(e) = uploaded {
            shutdown_workers(None, uploader, throttler).await;
            return Err(e);
        }

        let watcher = match ThemeWatcher::start(
            state.theme.clone(),
            uploader.clone(),
            state.streams.clone(),
            Duration::from_millis(config.server.debounce_ms),
        ) {
            Ok(watcher) => watcher,
            Err(e) => {
                shutdown_workers(None, uploader, throttler).await;
                return Err(e);
            }
        };

        let streams = state.streams.clone();
        let app = router(state.clone());
        let served = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!("Dev server running at http://{}", addr);
                if let Ok(preview) = state.theme.preview_url() {
                    tracing::info!("Previewing theme at {}", preview);
                }
                let wrapped_shutdown = async move {
                    shutdown_signal.await;
                    streams.close();
                };
                axum::serve(listener, app.into_make_service())
                    .with_graceful_shutdown(wrapped_shutdown)
                    .await
            }
            Err(e) => Err(e),
        };

        shutdown_workers(Some(watcher), uploader, throttler).await;
        served?;
        tracing::info!("Dev server shut down");
        Ok(())
    }
}

/// The uploader owns blocking HTTP clients; stop and drop it away from the runtime.
async fn shutdown_workers(
    watcher: Option<ThemeWatcher>,
    uploader: Arc<UploadQueue>,
    throttler: Arc<ThemeAdminApiThrottler>,
) {
    let stopped = tokio::task::spawn_blocking(move || {
        if let Some(watcher) = watcher {
            watcher.stop();
        }
        uploader.shutdown();
        throttler.shutdown();
        drop(uploader);
        drop(throttler);
    })
    .await;
    if let Err(e) = stopped {
        tracing::error!("Dev server shutdown task failed: {}", e);
    }
}
