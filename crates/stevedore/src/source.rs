//! The seam between the connector and its host framework.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// A normalized document ready for the indexing pipeline.
///
/// Keys appear in schema-declaration order (`serde_json` is built with
/// `preserve_order`).
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Attachment payload paired with each document.
///
/// Always `None` in the current scope; kept in the output shape for
/// host-pipeline compatibility.
pub type Attachment = serde_json::Value;

/// A data source the connector host can schedule syncs against.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Stable identifier used by the host to route configuration.
    fn service_type(&self) -> &'static str;

    /// Liveness probe: one authenticated call, errors propagate.
    async fn ping(&self) -> Result<()>;

    /// Validate the configuration against the remote service.
    async fn validate(&self) -> Result<()>;

    /// Lazy sequence of `(document, attachment)` pairs for one sync.
    fn get_docs(&self) -> BoxStream<'_, Result<(Document, Option<Attachment>)>>;
}
