use std::{io, path::StripPrefixError};

use crate::api::CallLimit;
use http::status::StatusCode;
use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ThemeSyncError {
    /// `call_limit` is the rate-limit header of the failed response, when it had one.
    #[error("Admin API error ({status}): {body}")]
    Api {
        status: u16,
        body: String,
        call_limit: Option<CallLimit>,
    },
    #[error("Bulk request failed: {0}")]
    BulkFailed(String),
    #[error("Timed out waiting for batched request: {0}")]
    BatchTimeout(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("HTTP transport error: {0}")]
    Http(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("No uploader worker threads were started")]
    NoWorkers,
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("{0}")]
    RequestParser(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("File watcher error: {0}")]
    Watch(String),
}

impl ThemeSyncError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ThemeSyncError::Api { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ThemeSyncError::BulkFailed(_) => StatusCode::BAD_GATEWAY,
            ThemeSyncError::BatchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ThemeSyncError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ThemeSyncError::Custom(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ThemeSyncError::Http(_) => StatusCode::BAD_GATEWAY,
            ThemeSyncError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ThemeSyncError::NoWorkers => StatusCode::SERVICE_UNAVAILABLE,
            ThemeSyncError::NotFound(_) => StatusCode::NOT_FOUND,
            ThemeSyncError::PermissionDenied => StatusCode::FORBIDDEN,
            ThemeSyncError::RequestParser(_) => StatusCode::BAD_REQUEST,
            ThemeSyncError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ThemeSyncError::Watch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rate-limit usage reported along with an API error.
    pub fn call_limit(&self) -> Option<CallLimit> {
        match self {
            ThemeSyncError::Api { call_limit, .. } => *call_limit,
            _ => None,
        }
    }

    /// Human readable messages reported by the Admin API for a failed asset request.
    ///
    /// Prefers `errors.asset`, then `message`, and keeps only the first line of each.
    pub fn api_messages(&self) -> Vec<String> {
        let ThemeSyncError::Api { body, .. } = self else {
            return vec![self.to_string()];
        };
        let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) else {
            return vec![self.to_string()];
        };
        let picked = parsed
            .get("errors")
            .and_then(|errors| errors.get("asset"))
            .or_else(|| parsed.get("message"))
            .cloned();
        let messages: Vec<String> = match picked {
            Some(serde_json::Value::String(message)) => vec![message],
            Some(serde_json::Value::Array(values)) => values
                .into_iter()
                .map(|value| match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
            Some(other) => vec![other.to_string()],
            None => vec![self.to_string()],
        };
        messages
            .into_iter()
            .map(|message| message.lines().next().unwrap_or_default().to_string())
            .collect()
    }
}

impl From<StripPrefixError> for ThemeSyncError {
    fn from(src: StripPrefixError) -> ThemeSyncError {
        ThemeSyncError::NotFound(format!("Path is outside of the theme root. Error: {src}"))
    }
}

impl From<toml::de::Error> for ThemeSyncError {
    fn from(src: toml::de::Error) -> ThemeSyncError {
        ThemeSyncError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for ThemeSyncError {
    fn from(src: JsonError) -> ThemeSyncError {
        ThemeSyncError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for ThemeSyncError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => ThemeSyncError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => ThemeSyncError::PermissionDenied,
            _ => ThemeSyncError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<RegexError> for ThemeSyncError {
    fn from(x: RegexError) -> Self {
        ThemeSyncError::Config(format!("Regex parse failed: {x}"))
    }
}

impl From<globset::Error> for ThemeSyncError {
    fn from(x: globset::Error) -> Self {
        ThemeSyncError::Config(format!("Glob pattern parse failed: {x}"))
    }
}

impl From<reqwest::Error> for ThemeSyncError {
    fn from(x: reqwest::Error) -> Self {
        match x.status() {
            Some(status) => ThemeSyncError::Api {
                status: status.as_u16(),
                body: format!("{x}"),
                call_limit: None,
            },
            None => ThemeSyncError::Http(format!("{x}")),
        }
    }
}

impl From<url::ParseError> for ThemeSyncError {
    fn from(src: url::ParseError) -> ThemeSyncError {
        ThemeSyncError::Config(format!("Invalid URL: {src}"))
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for ThemeSyncError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => ThemeSyncError::Watch(format!(
                "notify-debouncer: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => ThemeSyncError::Watch(format!(
                "notify-debouncer: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => ThemeSyncError::NotFound(format!(
                "notify-debouncer: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => ThemeSyncError::NotFound(format!(
                "notify-debouncer: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                ThemeSyncError::Watch("notify-debouncer invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => {
                ThemeSyncError::Watch("notify-debouncer max file watch limit reached".to_string())
            }
        }
    }
}
