//! The Admin API contract consumed by the upload queue and the request batcher.
//!
//! Credentials and shop discovery happen elsewhere; an [`AdminApi`] is handed in already
//! able to talk to the store. [`HttpAdminApi`] is the reqwest-backed implementation.

pub mod client;
pub mod rate_limit;

pub use client::HttpAdminApi;
pub use http::{HeaderMap, Method};
pub use rate_limit::{CallLimit, CALL_LIMIT_HEADER};

use crate::error::ThemeSyncError;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRequest {
    pub shop: String,
    pub path: String,
    pub method: Method,
    /// JSON text.
    pub body: Option<String>,
    pub api_version: String,
}

impl RestRequest {
    pub fn new(method: Method, shop: &str, path: &str, api_version: &str) -> Self {
        RestRequest {
            shop: shop.to_string(),
            path: path.to_string(),
            method,
            body: None,
            api_version: api_version.to_string(),
        }
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    pub fn body_size(&self) -> usize {
        self.body.as_ref().map(String::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub headers: HeaderMap,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        ApiResponse {
            status,
            body,
            headers: HeaderMap::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn call_limit(&self) -> Option<CallLimit> {
        self.header(CALL_LIMIT_HEADER)
            .and_then(|value| value.parse().ok())
    }
}

pub trait AdminApi: Send + Sync {
    fn rest_request(&self, request: &RestRequest) -> Result<ApiResponse, ThemeSyncError>;
}

impl<T: AdminApi + ?Sized> AdminApi for Arc<T> {
    fn rest_request(&self, request: &RestRequest) -> Result<ApiResponse, ThemeSyncError> {
        (**self).rest_request(request)
    }
}
