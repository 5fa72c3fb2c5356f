//! Stevedore - a Bitbucket Cloud connector for search indexing.
//!
//! This library pulls repository, commit, pull-request and file metadata
//! from the Bitbucket Cloud REST API and emits normalized documents for
//! ingestion into a search index. The surrounding connector host supplies
//! configuration and scheduling and consumes the document stream.
//!
//! # Example
//!
//! ```ignore
//! use futures::TryStreamExt;
//! use stevedore::{BitbucketDataSource, ConnectorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let source = BitbucketDataSource::new(config, CancellationToken::new())?;
//! source.ping().await?;
//! source.validate().await?;
//!
//! let mut docs = source.get_docs();
//! while let Some((document, _attachment)) = docs.try_next().await? {
//!     index(document);
//! }
//! ```

pub mod bitbucket;
pub mod config;
pub mod error;
pub mod http;
pub mod retry;
pub mod source;

pub use bitbucket::{BASE_URL, BitbucketClient, BitbucketDataSource, PING_URL, Page};
pub use config::{ConnectorConfig, DataSourceKind, WILDCARD};
pub use error::{Error, Result};
pub use retry::RetryConfig;
pub use source::{Attachment, DataSource, Document};
