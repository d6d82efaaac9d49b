use serde_json::Value;
use tracing::warn;

use crate::errors::{PromError, Result};

/// Marker text of the warning a federated store gateway emits when some of its
/// stores could not be reached. Data returned alongside it is incomplete.
pub const NO_STORE_API_WARNING: &str = "No StoreAPIs matched for this query";

pub fn is_no_store_api_warning(warning: &str) -> bool {
    warning.contains(NO_STORE_API_WARNING)
}

/// Extracts the top level `warnings` array from a decoded response body.
/// Non-string entries are skipped.
pub fn warnings_from(body: &Value) -> Vec<String> {
    body.get("warnings")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|w| w.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Promotes a store partial failure warning to an error and logs every other warning.
pub(crate) fn classify_warnings(query: &str, body: &[u8], warnings: &[String]) -> Result<()> {
    for w in warnings {
        if is_no_store_api_warning(w) {
            return Err(PromError::StorePartialFailure {
                warning: w.clone(),
                body: String::from_utf8_lossy(body).into_owned(),
                query: query.to_string(),
            });
        }

        warn!("fetching query '{}': {}", query, w);
    }
    Ok(())
}
