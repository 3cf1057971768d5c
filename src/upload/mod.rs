//! # Upload queue
//!
//! [`UploadQueue`] turns changed theme files into Admin API writes. Operations are
//! deduplicated while pending, skipped when the remote checksum already matches, and run by
//! a fixed pool of OS threads. A worker that sees the rate-limit header close to its limit
//! engages the shared [`BackoffGate`], pausing the whole pool.
//!
//! Failures never stop the queue: each one is formatted, recorded in
//! [`UploadQueue::failures`] and logged (or held back until
//! [`UploadQueue::report_errors`]).

pub mod backoff;
pub mod errors;
pub mod operation;
pub mod work_queue;

pub use backoff::BackoffGate;
pub use errors::{failure_summary, format_operation_error, ErrorReporter, UploadFailure};
pub use operation::{Operation, OperationKind};
pub use work_queue::WorkQueue;

use crate::{
    api::{AdminApi, ApiResponse, Method, RestRequest},
    config::SyncConfig,
    error::ThemeSyncError,
    theme::{Theme, ThemeFile, SETTINGS_DATA, SETTINGS_SCHEMA},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde_json::{json, Map, Value};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Receives `(remaining, total)` while [`UploadQueue::wait`] drains the queue.
pub trait UploadProgress {
    fn progress(&mut self, remaining: usize, total: usize);
}

impl<F: FnMut(usize, usize)> UploadProgress for F {
    fn progress(&mut self, remaining: usize, total: usize) {
        self(remaining, total);
    }
}

impl UploadProgress for () {
    fn progress(&mut self, _remaining: usize, _total: usize) {}
}

impl UploadProgress for ProgressBar {
    fn progress(&mut self, remaining: usize, total: usize) {
        self.set_length(total as u64);
        self.set_position(total.saturating_sub(remaining) as u64);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Wait for liquid and JSON files before enqueuing `assets/*`.
    pub delay_low_priority_files: bool,
    /// Delete remote files that have no local counterpart.
    pub delete: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        UploadOptions {
            delay_low_priority_files: false,
            delete: true,
        }
    }
}

struct UploadShared {
    theme: Arc<Theme>,
    api: Arc<dyn AdminApi>,
    api_version: String,
    backoff_interval: Duration,
    queue: WorkQueue<Operation>,
    pending: Mutex<Vec<Operation>>,
    pending_changed: Condvar,
    backoff: BackoffGate,
    errors: ErrorReporter,
    worker_count: AtomicUsize,
}

pub struct UploadQueue {
    shared: Arc<UploadShared>,
    default_workers: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl UploadQueue {
    pub fn new(theme: Arc<Theme>, api: Arc<dyn AdminApi>, config: &SyncConfig) -> Self {
        UploadQueue {
            shared: Arc::new(UploadShared {
                theme,
                api,
                api_version: config.api_version.clone(),
                backoff_interval: config.upload.backoff_interval(),
                queue: WorkQueue::new(),
                pending: Mutex::new(Vec::new()),
                pending_changed: Condvar::new(),
                backoff: BackoffGate::new(),
                errors: ErrorReporter::new(),
                worker_count: AtomicUsize::new(0),
            }),
            default_workers: config.upload.workers.max(1),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn theme(&self) -> &Arc<Theme> {
        &self.shared.theme
    }

    pub fn enqueue_updates<I>(&self, files: I)
    where
        I: IntoIterator<Item = ThemeFile>,
    {
        for file in files {
            self.shared.enqueue(Operation::update(file));
        }
    }

    /// `paths` are absolute or root-relative; they need not exist on disk.
    pub fn enqueue_deletes<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            let file = self.shared.theme.file(path);
            self.shared.enqueue(Operation::delete(file));
        }
    }

    /// Operations pending or in flight.
    pub fn len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.pending.lock().is_empty()
    }

    pub fn pending_updates(&self) -> Vec<ThemeFile> {
        self.shared
            .pending
            .lock()
            .iter()
            .filter(|op| op.kind == OperationKind::Update)
            .map(|op| op.file.clone())
            .collect()
    }

    pub fn is_remote_file(&self, file: &ThemeFile) -> bool {
        self.shared.theme.checksums().contains(&file.key())
    }

    pub fn failures(&self) -> Vec<UploadFailure> {
        self.shared.errors.failures()
    }

    pub fn delay_errors(&self) {
        self.shared.errors.delay_errors();
    }

    pub fn report_errors(&self) {
        self.shared.errors.report_errors();
    }

    pub fn delayed_errors(&self) -> Vec<String> {
        self.shared.errors.delayed_errors()
    }

    /// Starts the configured number of workers.
    pub fn start(&self) -> Result<(), ThemeSyncError> {
        self.start_workers(self.default_workers)
    }

    pub fn start_workers(&self, count: usize) -> Result<(), ThemeSyncError> {
        let mut workers = self.workers.lock();
        for _ in 0..count {
            let shared = self.shared.clone();
            let index = workers.len();
            let handle = std::thread::Builder::new()
                .name(format!("themesync-upload-{index}"))
                .spawn(move || {
                    while let Some(operation) = shared.queue.pop() {
                        shared.perform(operation);
                    }
                    tracing::debug!("upload worker {} stopped", index);
                })?;
            workers.push(handle);
            self.shared.worker_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn wait(&self) -> Result<(), ThemeSyncError> {
        self.wait_with_progress(&mut ())
    }

    /// Blocks until every pending operation finished or the queue was shut down.
    pub fn wait_with_progress(&self, progress: &mut dyn UploadProgress) -> Result<(), ThemeSyncError> {
        if self.shared.worker_count.load(Ordering::SeqCst) == 0 {
            return Err(ThemeSyncError::NoWorkers);
        }
        let mut pending = self.shared.pending.lock();
        let total = pending.len();
        let mut last_size = total;
        loop {
            if pending.is_empty() || self.shared.queue.is_closed() {
                return Ok(());
            }
            let size = pending.len();
            if size != last_size {
                last_size = size;
                MutexGuard::unlocked(&mut pending, || progress.progress(size, total));
                continue;
            }
            self.shared
                .pending_changed
                .wait_for(&mut pending, WAIT_POLL_INTERVAL);
        }
    }

    /// `GET themes/:id/assets.json` and refresh the remote checksum cache.
    pub fn fetch_checksums(&self) -> Result<(), ThemeSyncError> {
        let theme = &self.shared.theme;
        let request = RestRequest::new(
            Method::GET,
            theme.shop()?,
            &theme.assets_api_path()?,
            &self.shared.api_version,
        );
        let response = self.shared.api.rest_request(&request)?;
        theme.checksums().update_from_response(&response.body);
        tracing::debug!("fetched {} remote checksums", theme.checksums().len());
        Ok(())
    }

    pub fn upload_theme(&self, options: UploadOptions) -> Result<(), ThemeSyncError> {
        self.upload_theme_with_progress(options, &mut ())
    }

    /// Full sync. Liquid goes first, then JSON with the settings files last, then assets.
    pub fn upload_theme_with_progress(
        &self,
        options: UploadOptions,
        progress: &mut dyn UploadProgress,
    ) -> Result<(), ThemeSyncError> {
        self.fetch_checksums()?;
        let theme = self.shared.theme.clone();

        if options.delete {
            let removed = theme.delete_set();
            tracing::debug!("{} remote files are gone locally", removed.len());
            self.enqueue_deletes(removed);
        }

        let delayed_config_files = [theme.file(SETTINGS_SCHEMA), theme.file(SETTINGS_DATA)];
        self.enqueue_updates(theme.liquid_files());
        self.enqueue_updates(
            theme
                .json_files()
                .iter()
                .filter(|file| !delayed_config_files.contains(file)),
        );
        self.enqueue_updates(delayed_config_files.into_iter().filter(ThemeFile::exists));

        if options.delay_low_priority_files {
            self.wait_with_progress(progress)?;
        }

        // Assets are served locally by the dev server, so they can trail behind.
        self.enqueue_updates(theme.asset_files());

        if !options.delay_low_priority_files {
            self.wait_with_progress(progress)?;
        }
        Ok(())
    }

    pub fn upload_theme_with_progress_bar(&self, options: UploadOptions) -> Result<(), ThemeSyncError> {
        self.delay_errors();
        let mut bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} files") {
            bar.set_style(style);
        }
        let result = self.upload_theme_with_progress(options, &mut bar);
        bar.finish_and_clear();
        self.report_errors();
        result
    }

    /// Closes the queue and joins the workers. Queued operations are dropped; in-flight
    /// ones finish.
    pub fn shutdown(&self) {
        self.shared.queue.close();
        self.shared.pending_changed.notify_all();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("upload worker panicked");
            }
        }
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl UploadShared {
    fn enqueue(&self, operation: Operation) {
        if self.pending.lock().contains(&operation) {
            return;
        }
        if self.theme.ignore(&operation.file) {
            tracing::debug!("ignore {}", operation.file.key());
            return;
        }
        if operation.kind == OperationKind::Update
            && operation.file.exists()
            && !self.theme.file_has_changed(&operation.file)
        {
            tracing::debug!("skip {}", operation);
            return;
        }

        let mut pending = self.pending.lock();
        if pending.contains(&operation) {
            return;
        }
        if self.queue.push(operation.clone()) {
            pending.push(operation);
        }
    }

    fn finish(&self, operation: &Operation) {
        let mut pending = self.pending.lock();
        if let Some(index) = pending.iter().position(|op| op == operation) {
            pending.remove(index);
        }
        drop(pending);
        self.pending_changed.notify_all();
    }

    fn perform(&self, operation: Operation) {
        if self.queue.is_closed() {
            self.finish(&operation);
            return;
        }
        self.backoff.wait();
        tracing::debug!("{}", operation);

        let result = match operation.kind {
            OperationKind::Update => self.update(&operation.file),
            OperationKind::Delete => self.delete(&operation.file),
        };
        let call_limit = match &result {
            Ok(response) => response.call_limit(),
            Err(e) => {
                self.errors.report_operation(&operation, e);
                e.call_limit()
            }
        };
        if let Some(limit) = call_limit {
            let workers = self.worker_count.load(Ordering::SeqCst);
            self.backoff
                .backoff_if_near_limit(limit, workers, self.backoff_interval);
        }
        self.finish(&operation);
    }

    fn asset_request(&self, method: Method, asset: Map<String, Value>) -> Result<RestRequest, ThemeSyncError> {
        Ok(RestRequest::new(
            method,
            self.theme.shop()?,
            &self.theme.assets_api_path()?,
            &self.api_version,
        )
        .with_body(json!({ "asset": asset }).to_string()))
    }

    fn update(&self, file: &ThemeFile) -> Result<ApiResponse, ThemeSyncError> {
        let content = file.read()?;
        let mut asset = Map::new();
        asset.insert("key".to_string(), Value::String(file.key()));
        if file.is_text() {
            match String::from_utf8(content) {
                Ok(text) => {
                    asset.insert("value".to_string(), Value::String(text));
                }
                Err(e) => {
                    asset.insert(
                        "attachment".to_string(),
                        Value::String(BASE64.encode(e.into_bytes())),
                    );
                }
            }
        } else {
            asset.insert("attachment".to_string(), Value::String(BASE64.encode(content)));
        }

        let response = self.api.rest_request(&self.asset_request(Method::PUT, asset)?)?;
        self.theme.checksums().update_from_response(&response.body);
        Ok(response)
    }

    fn delete(&self, file: &ThemeFile) -> Result<ApiResponse, ThemeSyncError> {
        let mut asset = Map::new();
        asset.insert("key".to_string(), Value::String(file.key()));
        let response = self.api.rest_request(&self.asset_request(Method::DELETE, asset)?)?;
        self.theme.checksums().remove(&file.key());
        Ok(response)
    }
}
