//! Bitbucket Cloud API payload shapes.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// One decoded response body of a cursor-paginated endpoint.
///
/// `next`, when present, carries the absolute URL of the subsequent page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Extract a required string field from a raw API object.
pub(crate) fn str_field(value: &Value, name: &str) -> Result<String> {
    value
        .get(name)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| Error::schema(name))
}

/// Walk a nested path of object keys, `None` if any hop is missing.
pub(crate) fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}
