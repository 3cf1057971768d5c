use super::operation::Operation;
use crate::error::ThemeSyncError;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    pub operation: String,
    pub path: String,
    pub message: String,
}

/// Collects per-operation failures. Output can be held back (e.g. while a progress bar
/// owns the terminal) and flushed later with [`ErrorReporter::report_errors`].
#[derive(Debug, Default)]
pub struct ErrorReporter {
    delay: AtomicBool,
    delayed: Mutex<Vec<String>>,
    failures: Mutex<Vec<UploadFailure>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay_errors(&self) {
        self.delay.store(true, Ordering::SeqCst);
    }

    /// Stops delaying and emits everything held back so far.
    pub fn report_errors(&self) {
        self.delay.store(false, Ordering::SeqCst);
        let delayed = std::mem::take(&mut *self.delayed.lock());
        for message in delayed {
            tracing::error!("{}", message);
        }
    }

    pub fn delayed_errors(&self) -> Vec<String> {
        self.delayed.lock().clone()
    }

    pub fn failures(&self) -> Vec<UploadFailure> {
        self.failures.lock().clone()
    }

    pub fn report_operation(&self, operation: &Operation, error: &ThemeSyncError) {
        let message = format_operation_error(operation, error);
        tracing::debug!("{} failed: {:?}", operation, error);
        self.failures.lock().push(UploadFailure {
            operation: operation.to_string(),
            path: operation.file.key(),
            message: message.clone(),
        });
        self.report(message);
    }

    pub fn report(&self, message: String) {
        if self.delay.load(Ordering::SeqCst) {
            self.delayed.lock().push(message);
        } else {
            tracing::error!("{}", message);
        }
    }
}

/// `ERROR update sections/header.liquid: <message>`; API errors list the messages from the
/// response body, one per line.
pub fn format_operation_error(operation: &Operation, error: &ThemeSyncError) -> String {
    match error {
        ThemeSyncError::Api { .. } => {
            format!("ERROR {operation}:\n  {}", error.api_messages().join("\n  "))
        }
        other => format!("ERROR {operation}: {other}"),
    }
}

/// One line per failed path followed by the server's messages, for end-of-run output.
pub fn failure_summary(failures: &[UploadFailure]) -> String {
    let mut summary = format!("{} file(s) failed to upload:", failures.len());
    for failure in failures {
        let detail = match failure.message.split_once('\n') {
            Some((_, messages)) => messages.trim().replace("\n  ", "; "),
            None => failure
                .message
                .split_once(": ")
                .map_or_else(|| failure.message.clone(), |(_, message)| message.to_string()),
        };
        summary.push_str(&format!("\n  {}: {}", failure.path, detail));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn summary_lists_each_path_with_its_messages() {
        let failures = vec![
            UploadFailure {
                operation: "update sections/header.liquid".to_string(),
                path: "sections/header.liquid".to_string(),
                message: "ERROR update sections/header.liquid:\n  Liquid syntax error\n  Unknown tag 'foo'"
                    .to_string(),
            },
            UploadFailure {
                operation: "delete assets/old.css".to_string(),
                path: "assets/old.css".to_string(),
                message: "ERROR delete assets/old.css: File System error: IOError: other".to_string(),
            },
        ];

        assert_eq!(
            failure_summary(&failures),
            "2 file(s) failed to upload:\n  sections/header.liquid: Liquid syntax error; Unknown tag 'foo'\n  assets/old.css: File System error: IOError: other"
        );
    }
}
