use super::{request_parser::RequestParser, response_parser::ResponseParser};
use crate::{
    api::{AdminApi, ApiResponse, RestRequest},
    config::ThrottlerConfig,
    error::ThemeSyncError,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde_json::Value;
use std::{
    collections::VecDeque,
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

pub const MULTI_STATUS: u16 = 207;

/// Receives `(status, body, raw bulk response)` for one batched write.
pub type PutCallback = Box<dyn FnOnce(u16, Value, &ApiResponse) + Send>;

pub struct PutRequest {
    request: RestRequest,
    callback: Option<PutCallback>,
}

impl PutRequest {
    pub fn new(request: RestRequest, callback: PutCallback) -> Self {
        PutRequest {
            request,
            callback: Some(callback),
        }
    }

    pub fn request(&self) -> &RestRequest {
        &self.request
    }

    pub fn size(&self) -> usize {
        self.request.body_size()
    }

    fn complete(mut self, status: u16, body: Value, bulk_response: &ApiResponse) {
        if let Some(callback) = self.callback.take() {
            callback(status, body, bulk_response);
        }
    }
}

impl std::fmt::Debug for PutRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutRequest")
            .field("path", &self.request.path)
            .field("size", &self.size())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    pub max_files: usize,
    pub max_bytes: usize,
    pub flush_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for BulkOptions {
    fn default() -> Self {
        BulkOptions::from(&ThrottlerConfig::default())
    }
}

impl From<&ThrottlerConfig> for BulkOptions {
    fn from(config: &ThrottlerConfig) -> Self {
        BulkOptions {
            max_files: config.max_files.max(1),
            max_bytes: config.max_bytes,
            flush_timeout: Duration::from_millis(config.flush_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }
}

/// Pending writes of the batch being built.
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    requests: Vec<PutRequest>,
    size: usize,
    last_enqueued_at: Option<Instant>,
}

impl BatchAccumulator {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Adding `incoming` bytes would break one of the limits.
    pub fn would_overflow(&self, incoming: usize, options: &BulkOptions) -> bool {
        !self.is_empty()
            && (self.len() + 1 > options.max_files || self.size + incoming > options.max_bytes)
    }

    pub fn is_full(&self, options: &BulkOptions) -> bool {
        self.len() >= options.max_files || self.size >= options.max_bytes
    }

    pub fn is_ready(&self, options: &BulkOptions, now: Instant) -> bool {
        if self.is_empty() {
            return false;
        }
        if self.is_full(options) {
            return true;
        }
        self.last_enqueued_at
            .is_some_and(|at| now.saturating_duration_since(at) >= options.flush_timeout)
    }

    pub fn push(&mut self, request: PutRequest) {
        self.size += request.size();
        self.requests.push(request);
        self.last_enqueued_at = Some(Instant::now());
    }

    /// Drains the accumulator, keeping submission order.
    pub fn consume(&mut self) -> Vec<PutRequest> {
        self.size = 0;
        self.last_enqueued_at = None;
        std::mem::take(&mut self.requests)
    }
}

#[derive(Default)]
struct BulkState {
    accumulator: BatchAccumulator,
    sealed: VecDeque<Vec<PutRequest>>,
    shutdown: bool,
}

struct BulkShared {
    api: Arc<dyn AdminApi>,
    options: BulkOptions,
    state: Mutex<BulkState>,
    signal: Condvar,
}

/// Groups asset writes into bulk requests, flushed by a single background thread.
pub struct Bulk {
    shared: Arc<BulkShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Bulk {
    pub fn new(api: Arc<dyn AdminApi>, options: BulkOptions) -> Result<Bulk, ThemeSyncError> {
        let shared = Arc::new(BulkShared {
            api,
            options,
            state: Mutex::new(BulkState::default()),
            signal: Condvar::new(),
        });
        let loop_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("themesync-bulk".to_string())
            .spawn(move || bulk_loop(loop_shared))?;
        Ok(Bulk {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn options(&self) -> &BulkOptions {
        &self.shared.options
    }

    pub fn enqueue(&self, request: PutRequest) -> Result<(), ThemeSyncError> {
        let options = &self.shared.options;
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(ThemeSyncError::BulkFailed("bulk queue is shut down".to_string()));
        }
        if state.accumulator.would_overflow(request.size(), options) {
            let batch = state.accumulator.consume();
            tracing::debug!("[Bulk] sealing batch of {} requests", batch.len());
            state.sealed.push_back(batch);
        }
        state.accumulator.push(request);
        let flush_now = !state.sealed.is_empty() || state.accumulator.is_full(options);
        drop(state);
        if flush_now {
            self.shared.signal.notify_one();
        }
        Ok(())
    }

    /// Requests accepted but not yet sent.
    pub fn pending(&self) -> usize {
        let state = self.shared.state.lock();
        state.accumulator.len() + state.sealed.iter().map(Vec::len).sum::<usize>()
    }

    /// Lets the current flush finish, then drops everything still queued.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
        }
        self.shared.signal.notify_all();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("[Bulk] background thread panicked");
            }
        }
    }
}

impl Drop for Bulk {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bulk_loop(shared: Arc<BulkShared>) {
    tracing::debug!("[Bulk] starting background loop");
    let options = shared.options;
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let batch = match state.sealed.pop_front() {
            Some(batch) => Some(batch),
            None if state.accumulator.is_ready(&options, Instant::now()) => {
                Some(state.accumulator.consume())
            }
            None => None,
        };
        match batch {
            Some(batch) => {
                MutexGuard::unlocked(&mut state, || perform(shared.api.as_ref(), batch));
            }
            None => {
                shared.signal.wait_for(&mut state, options.poll_interval);
            }
        }
    }
    let dropped = state.accumulator.len() + state.sealed.iter().map(Vec::len).sum::<usize>();
    if dropped > 0 {
        tracing::debug!("[Bulk] shut down with {} unsent requests", dropped);
    }
    state.accumulator.consume();
    state.sealed.clear();
}

/// Sends one batch. Failures of the batch as a whole are logged once; the callbacks are
/// dropped, which callers observe as a disconnected batch.
fn perform(api: &dyn AdminApi, batch: Vec<PutRequest>) {
    let count = batch.len();
    let request = match RequestParser::new(batch.iter().map(PutRequest::request)).parse() {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("[Bulk] could not build bulk request: {}", e);
            return;
        }
    };
    tracing::debug!("[Bulk] {} {} ({} assets)", request.method, request.path, count);

    let response = match api.rest_request(&request) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("[Bulk] bulk request error: {}", e);
            return;
        }
    };
    if response.status != MULTI_STATUS {
        tracing::error!(
            "[Bulk] bulk request returned status {} instead of {}",
            response.status,
            MULTI_STATUS
        );
        return;
    }
    let results = match ResponseParser::new(&response.body).parse() {
        Ok(results) if results.len() == count => results,
        Ok(results) => {
            tracing::error!(
                "[Bulk] bulk response has {} results for {} submitted assets",
                results.len(),
                count
            );
            return;
        }
        Err(e) => {
            tracing::error!("[Bulk] malformed bulk response: {}", e);
            return;
        }
    };
    for (put, (status, body)) in batch.into_iter().zip(results) {
        put.complete(status, body, &response);
    }
}
