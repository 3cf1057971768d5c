use crate::error::ThemeSyncError;
use serde_json::Value;

/// Splits a multi-status bulk body into `(status, body)` pairs, in submission order.
///
/// Expected shape: `{"results": [{"code": 200, "body": {"asset": {...}}}, ...]}`. A body
/// may also arrive as a JSON encoded string.
pub struct ResponseParser<'a> {
    body: &'a Value,
}

impl<'a> ResponseParser<'a> {
    pub fn new(body: &'a Value) -> Self {
        ResponseParser { body }
    }

    pub fn parse(&self) -> Result<Vec<(u16, Value)>, ThemeSyncError> {
        let results = self
            .body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ThemeSyncError::BulkFailed("bulk response has no 'results' array".to_string())
            })?;

        results
            .iter()
            .enumerate()
            .map(|(index, result)| {
                let status = result
                    .get("code")
                    .and_then(Value::as_u64)
                    .and_then(|code| u16::try_from(code).ok())
                    .ok_or_else(|| {
                        ThemeSyncError::BulkFailed(format!("bulk result {index} has no status code"))
                    })?;
                let body = match result.get("body") {
                    Some(Value::String(text)) => {
                        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
                    }
                    Some(other) => other.clone(),
                    None => Value::Null,
                };
                Ok((status, body))
            })
            .collect()
    }
}
