use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Server-reported checksums keyed by asset key.
#[derive(Debug, Default)]
pub struct RemoteChecksums {
    inner: Mutex<HashMap<String, String>>,
}

impl RemoteChecksums {
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn insert(&self, key: String, checksum: String) {
        self.inner.lock().insert(key, checksum);
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.inner.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Records every `{key, checksum}` asset found in an Admin API response body.
    ///
    /// Accepts `{"asset": {...}}`, `{"assets": [...]}` and any mix of the two. Generated
    /// assets are reported twice (`X` and `X.liquid`); only the `.liquid` key is kept since
    /// that is the file on disk.
    pub fn update_from_response(&self, body: &Value) {
        let Some(object) = body.as_object() else {
            return;
        };
        let mut checksums = self.inner.lock();
        for value in object.values() {
            let assets: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for asset in assets {
                let key = asset.get("key").and_then(Value::as_str);
                let checksum = asset.get("checksum").and_then(Value::as_str);
                if let (Some(key), Some(checksum)) = (key, checksum) {
                    checksums.insert(key.to_string(), checksum.to_string());
                }
            }
        }
        let generated: Vec<String> = checksums
            .keys()
            .filter(|key| checksums.contains_key(&format!("{key}.liquid")))
            .cloned()
            .collect();
        for key in generated {
            checksums.remove(&key);
        }
    }

    /// Remote keys absent from `local_keys`.
    pub fn delete_set<'a, I>(&self, local_keys: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let local: BTreeSet<&str> = local_keys.into_iter().collect();
        self.inner
            .lock()
            .keys()
            .filter(|key| !local.contains(key.as_str()))
            .cloned()
            .collect()
    }
}
