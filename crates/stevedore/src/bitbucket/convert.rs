//! Projection of raw Bitbucket API objects into normalized documents.

use chrono::Utc;
use serde_json::Value;

use super::types::nested;
use crate::error::{Error, Result};
use crate::source::Document;

/// A fixed mapping from output field names to source field names.
///
/// Projection is total and order-preserving: every declared output key is
/// produced for every record, or the mapping fails.
pub type Schema = &'static [(&'static str, &'static str)];

pub const COMMIT_SCHEMA: Schema = &[
    ("_id", "hash"),
    ("_timestamp", "date"),
    ("type", "type"),
    ("message", "message"),
];

pub const PULL_REQUEST_SCHEMA: Schema = &[
    ("_id", "id"),
    ("_timestamp", "updated_on"),
    ("type", "type"),
    ("title", "title"),
    ("description", "description"),
];

/// Project a raw API object through a schema, copying values verbatim.
pub fn project(schema: Schema, value: &Value) -> Result<Document> {
    let mut document = Document::new();
    for (output, source) in schema {
        let field = value.get(*source).ok_or_else(|| Error::schema(*source))?;
        document.insert((*output).to_string(), field.clone());
    }
    Ok(document)
}

/// Build a commit document: schema fields plus the derived repository name
/// and author display name (null when the nested path is absent).
pub fn commit_document(commit: &Value) -> Result<Document> {
    let mut document = project(COMMIT_SCHEMA, commit)?;
    document.insert(
        "repository_name".to_string(),
        nested(commit, &["repository", "full_name"])
            .cloned()
            .unwrap_or(Value::Null),
    );
    document.insert(
        "display_name".to_string(),
        nested(commit, &["author", "user", "display_name"])
            .cloned()
            .unwrap_or(Value::Null),
    );
    Ok(document)
}

pub fn pull_request_document(pull_request: &Value) -> Result<Document> {
    project(PULL_REQUEST_SCHEMA, pull_request)
}

/// Build a file document. Source trees carry no timestamps, so the
/// `_timestamp` is generated at projection time.
pub fn file_document(entry: &Value) -> Document {
    let mut document = Document::new();
    document.insert(
        "_id".to_string(),
        entry.get("path").cloned().unwrap_or(Value::Null),
    );
    document.insert(
        "_timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    document.insert(
        "type".to_string(),
        entry.get("type").cloned().unwrap_or(Value::Null),
    );
    document
}
