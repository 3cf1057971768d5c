//! Batches single-asset writes into bulk Admin API requests.
//!
//! [`ThemeAdminApiThrottler`] is itself an [`AdminApi`]: while active, every `PUT` it
//! receives is handed to a [`Bulk`] and the calling thread waits for its slice of the
//! multi-status response. Everything else goes straight to the wrapped client.

pub mod bulk;
pub mod request_parser;
pub mod response_parser;

pub use bulk::{BatchAccumulator, Bulk, BulkOptions, PutCallback, PutRequest, MULTI_STATUS};
pub use request_parser::{bulk_path, RequestParser};
pub use response_parser::ResponseParser;

use crate::{
    api::{AdminApi, ApiResponse, Method, RestRequest},
    config::ThrottlerConfig,
    error::ThemeSyncError,
};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError},
        Arc,
    },
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlerOptions {
    pub bulk: BulkOptions,
    pub wait_retries: u32,
    pub wait_interval: Duration,
}

impl Default for ThrottlerOptions {
    fn default() -> Self {
        ThrottlerOptions::from(&ThrottlerConfig::default())
    }
}

impl From<&ThrottlerConfig> for ThrottlerOptions {
    fn from(config: &ThrottlerConfig) -> Self {
        ThrottlerOptions {
            bulk: BulkOptions::from(config),
            wait_retries: config.wait_retries.max(1),
            wait_interval: Duration::from_millis(config.wait_interval_ms.max(1)),
        }
    }
}

type BatchResult = (u16, Value, ApiResponse);

pub struct ThemeAdminApiThrottler {
    api: Arc<dyn AdminApi>,
    options: ThrottlerOptions,
    active: AtomicBool,
    bulk: OnceCell<Bulk>,
}

impl ThemeAdminApiThrottler {
    pub fn new(api: Arc<dyn AdminApi>, options: ThrottlerOptions) -> Self {
        ThemeAdminApiThrottler {
            api,
            options,
            active: AtomicBool::new(false),
            bulk: OnceCell::new(),
        }
    }

    /// Builds a throttler from config, already active when `enabled` is set.
    pub fn from_config(api: Arc<dyn AdminApi>, config: &ThrottlerConfig) -> Self {
        let throttler = ThemeAdminApiThrottler::new(api, ThrottlerOptions::from(config));
        if config.enabled {
            throttler.activate();
        }
        throttler
    }

    pub fn options(&self) -> &ThrottlerOptions {
        &self.options
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn get(&self, request: &RestRequest) -> Result<ApiResponse, ThemeSyncError> {
        self.api.rest_request(request)
    }

    pub fn delete(&self, request: &RestRequest) -> Result<ApiResponse, ThemeSyncError> {
        self.api.rest_request(request)
    }

    pub fn post(&self, request: &RestRequest) -> Result<ApiResponse, ThemeSyncError> {
        self.api.rest_request(request)
    }

    pub fn put(&self, request: &RestRequest) -> Result<ApiResponse, ThemeSyncError> {
        if !self.is_active() {
            return self.api.rest_request(request);
        }
        if request.body_size() > self.options.bulk.max_bytes {
            tracing::debug!(
                "[Throttler] {} bytes exceed the batch limit, sending {} individually",
                request.body_size(),
                request.path
            );
            return self.api.rest_request(request);
        }
        match self.batch_request(request) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!("[Throttler] falling back to a single request: {}", e);
                self.api.rest_request(request)
            }
        }
    }

    /// Outer error: the batch never answered for this request. Inner: the per-asset
    /// outcome reported inside the bulk response.
    fn batch_request(
        &self,
        request: &RestRequest,
    ) -> Result<Result<ApiResponse, ThemeSyncError>, ThemeSyncError> {
        let (tx, rx) = mpsc::channel::<BatchResult>();
        let callback: PutCallback = Box::new(move |status, body, bulk_response| {
            let _ = tx.send((status, body, bulk_response.clone()));
        });
        self.bulk()?
            .enqueue(PutRequest::new(request.clone(), callback))?;

        let (status, body, bulk_response) = self.wait_for_batch(&rx)?;
        if status == 200 {
            Ok(Ok(ApiResponse {
                status,
                body,
                headers: bulk_response.headers,
            }))
        } else {
            Ok(Err(ThemeSyncError::Api {
                status,
                body: body.to_string(),
                call_limit: bulk_response.call_limit(),
            }))
        }
    }

    fn wait_for_batch(&self, rx: &Receiver<BatchResult>) -> Result<BatchResult, ThemeSyncError> {
        for _ in 0..self.options.wait_retries {
            match rx.recv_timeout(self.options.wait_interval) {
                Ok(result) => return Ok(result),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ThemeSyncError::BulkFailed(
                        "batch completed without a result for this request".to_string(),
                    ))
                }
            }
        }
        Err(ThemeSyncError::BatchTimeout(format!(
            "no result after {} x {:?}",
            self.options.wait_retries, self.options.wait_interval
        )))
    }

    fn bulk(&self) -> Result<&Bulk, ThemeSyncError> {
        self.bulk
            .get_or_try_init(|| Bulk::new(self.api.clone(), self.options.bulk))
    }

    /// Stops the bulk thread, if one was started. Later puts go out individually.
    pub fn shutdown(&self) {
        self.deactivate();
        if let Some(bulk) = self.bulk.get() {
            bulk.shutdown();
        }
    }
}

impl AdminApi for ThemeAdminApiThrottler {
    fn rest_request(&self, request: &RestRequest) -> Result<ApiResponse, ThemeSyncError> {
        if request.method == Method::PUT {
            self.put(request)
        } else if request.method == Method::DELETE {
            self.delete(request)
        } else if request.method == Method::POST {
            self.post(request)
        } else {
            self.get(request)
        }
    }
}
