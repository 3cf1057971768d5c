use crate::{
    api::{Method, RestRequest},
    error::ThemeSyncError,
};
use serde_json::{json, Value};

/// `themes/1/assets.json` -> `themes/1/assets/bulk.json`
pub fn bulk_path(path: &str) -> String {
    match path.strip_suffix(".json") {
        Some(stem) => format!("{stem}/bulk.json"),
        None => path.to_string(),
    }
}

/// Folds single-asset requests into one bulk request, keeping submission order.
pub struct RequestParser<'a> {
    requests: Vec<&'a RestRequest>,
}

impl<'a> RequestParser<'a> {
    pub fn new<I: IntoIterator<Item = &'a RestRequest>>(requests: I) -> Self {
        RequestParser {
            requests: requests.into_iter().collect(),
        }
    }

    pub fn parse(&self) -> Result<RestRequest, ThemeSyncError> {
        let shop: String = self.fetch("shop", |r| r.shop.clone())?;
        let path: String = self.fetch("path", |r| r.path.clone())?;
        let method: Method = self.fetch("method", |r| r.method.clone())?;
        let api_version: String = self.fetch("api_version", |r| r.api_version.clone())?;
        let body = json!({ "assets": self.assets()? });

        Ok(RestRequest {
            shop,
            path: bulk_path(&path),
            method,
            body: Some(body.to_string()),
            api_version,
        })
    }

    fn assets(&self) -> Result<Vec<Value>, ThemeSyncError> {
        self.requests
            .iter()
            .map(|request| {
                let body = request.body.as_deref().unwrap_or("{}");
                let mut parsed: Value = serde_json::from_str(body)?;
                parsed
                    .get_mut("asset")
                    .map(Value::take)
                    .ok_or_else(|| {
                        ThemeSyncError::RequestParser(format!(
                            "request to '{}' has no asset to batch",
                            request.path
                        ))
                    })
            })
            .collect()
    }

    fn fetch<T: PartialEq>(
        &self,
        key: &str,
        value: impl Fn(&RestRequest) -> T,
    ) -> Result<T, ThemeSyncError> {
        let mut values: Vec<T> = Vec::new();
        for request in &self.requests {
            let v = value(request);
            if !values.contains(&v) {
                values.push(v);
            }
        }
        if values.len() == 1 {
            if let Some(v) = values.pop() {
                return Ok(v);
            }
        }
        Err(ThemeSyncError::RequestParser(format!(
            "requests with multiple values for '{key}' cannot be parsed"
        )))
    }
}
