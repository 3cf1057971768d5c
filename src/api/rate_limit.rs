use crate::error::ThemeSyncError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const CALL_LIMIT_HEADER: &str = "x-shopify-shop-api-call-limit";

/// `used/total` calls as reported by the rate-limit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLimit {
    pub used: u32,
    pub total: u32,
}

impl CallLimit {
    /// Remaining headroom is smaller than the number of requests that may be in flight.
    pub fn is_near_limit(&self, active_workers: usize) -> bool {
        i64::from(self.used) > i64::from(self.total) - active_workers as i64
    }
}

impl FromStr for CallLimit {
    type Err = ThemeSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ThemeSyncError::Serialization(format!("invalid call limit header: {s:?}"));
        let (used, total) = s.trim().split_once('/').ok_or_else(invalid)?;
        Ok(CallLimit {
            used: used.trim().parse().map_err(|_| invalid())?,
            total: total.trim().parse().map_err(|_| invalid())?,
        })
    }
}
