use super::{AdminApi, ApiResponse, RestRequest, CALL_LIMIT_HEADER};
use crate::error::ThemeSyncError;
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Blocking Admin API client for the upload workers and the bulk thread.
///
/// Build it outside of an async context: the blocking client owns its own runtime.
pub struct HttpAdminApi {
    client: Client,
    access_token: String,
    base_url: Option<Url>,
}

impl HttpAdminApi {
    pub fn new(access_token: String) -> Result<Self, ThemeSyncError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("themesync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpAdminApi {
            client,
            access_token,
            base_url: None,
        })
    }

    /// Sends every request to `base_url` instead of `https://<shop>/`.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn url(&self, request: &RestRequest) -> Result<Url, ThemeSyncError> {
        let base = match &self.base_url {
            Some(base) => base.clone(),
            None => Url::parse(&format!("https://{}/", request.shop))?,
        };
        Ok(base.join(&format!(
            "admin/api/{}/{}",
            request.api_version,
            request.path.trim_start_matches('/')
        ))?)
    }
}

impl AdminApi for HttpAdminApi {
    fn rest_request(&self, request: &RestRequest) -> Result<ApiResponse, ThemeSyncError> {
        let url = self.url(request)?;
        tracing::debug!("{} {}", request.method, url);
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }
        let response = builder.send()?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text()?;

        if !status.is_success() {
            return Err(ThemeSyncError::Api {
                status: status.as_u16(),
                body: text,
                call_limit: headers
                    .get(CALL_LIMIT_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse().ok()),
            });
        }

        let body = if text.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&text)?
        };
        Ok(ApiResponse {
            status: status.as_u16(),
            body,
            headers,
        })
    }
}
