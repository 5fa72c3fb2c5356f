//! The Bitbucket data source adapter: entity streams over the paginated
//! client, plus the liveness and configuration checks.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::client::{BASE_URL, BitbucketClient, PAGE_SIZE, PING_URL};
use super::convert::{commit_document, file_document, pull_request_document};
use super::types::{nested, str_field};
use crate::config::ConnectorConfig;
use crate::error::{Error, Result};
use crate::source::{Attachment, DataSource, Document};

/// Bitbucket Cloud data source.
///
/// Every stream is restartable and lazy; nothing is fetched until the
/// caller polls. All streams share the one client created at construction.
pub struct BitbucketDataSource {
    config: ConnectorConfig,
    client: BitbucketClient,
}

impl BitbucketDataSource {
    pub fn new(config: ConnectorConfig, cancel: CancellationToken) -> Result<Self> {
        let client = BitbucketClient::new(&config, cancel)?;
        Ok(Self { config, client })
    }

    pub fn with_client(config: ConnectorConfig, client: BitbucketClient) -> Self {
        Self { config, client }
    }

    pub fn client(&self) -> &BitbucketClient {
        &self.client
    }

    /// Slugs of every workspace the credentials can see.
    pub fn workspaces(&self) -> BoxStream<'_, Result<String>> {
        self.client
            .page_items(format!("{BASE_URL}/workspaces?pagelen={PAGE_SIZE}"))
            .map(|workspace| str_field(&workspace, "slug"))
            .boxed()
    }

    /// Raw repository objects discovered through workspace iteration.
    pub fn repositories(&self) -> BoxStream<'_, Result<Value>> {
        self.workspaces()
            .map_ok(move |slug| {
                self.client
                    .page_items(format!("{BASE_URL}/repositories/{slug}?pagelen={PAGE_SIZE}"))
                    .map(Ok::<_, Error>)
            })
            .try_flatten()
            .boxed()
    }

    /// Repository full names to sync: discovered via the API under the
    /// wildcard, otherwise exactly the configured list with no discovery.
    fn repository_full_names(&self) -> BoxStream<'_, Result<String>> {
        if self.config.is_wildcard() {
            self.repositories()
                .map(|repository| repository.and_then(|value| str_field(&value, "full_name")))
                .boxed()
        } else {
            stream::iter(self.config.repositories.clone().into_iter().map(Ok::<_, Error>)).boxed()
        }
    }

    /// Commit documents for every selected repository.
    pub fn commits(&self) -> BoxStream<'_, Result<Document>> {
        self.repository_full_names()
            .map_ok(move |full_name| {
                self.client
                    .page_items(format!("{BASE_URL}/repositories/{full_name}/commits"))
                    .map(|commit| commit_document(&commit))
            })
            .try_flatten()
            .boxed()
    }

    /// Pull-request documents for every selected repository.
    pub fn pull_requests(&self) -> BoxStream<'_, Result<Document>> {
        self.repository_full_names()
            .map_ok(move |full_name| {
                self.client
                    .page_items(format!("{BASE_URL}/repositories/{full_name}/pullrequests"))
                    .map(|pull_request| pull_request_document(&pull_request))
            })
            .try_flatten()
            .boxed()
    }

    /// File documents, descending into nested directories.
    ///
    /// Under the wildcard the roots are the discovered workspaces' source
    /// trees; otherwise the configured repositories' source trees.
    pub fn files(&self) -> BoxStream<'_, Result<Document>> {
        if self.config.is_wildcard() {
            self.workspaces()
                .map_ok(move |slug| {
                    self.folder_documents(format!("{BASE_URL}/repositories/{slug}/src"))
                })
                .try_flatten()
                .boxed()
        } else {
            stream::iter(self.config.repositories.clone())
                .map(move |full_name| {
                    self.folder_documents(format!("{BASE_URL}/repositories/{full_name}/src"))
                })
                .flatten()
                .boxed()
        }
    }

    /// Documents for one source-tree listing, recursing into
    /// `commit_directory` entries. Depth is bounded only by the actual tree.
    fn folder_documents<'a>(&'a self, url: String) -> BoxStream<'a, Result<Document>> {
        self.client
            .page_items(url)
            .map(move |entry| -> BoxStream<'a, Result<Document>> {
                if entry.get("type").and_then(Value::as_str) == Some("commit_directory") {
                    match nested(&entry, &["links", "self", "href"]).and_then(Value::as_str) {
                        Some(href) => self.folder_documents(href.to_string()),
                        None => stream::iter([Err(Error::schema("links.self.href"))]).boxed(),
                    }
                } else {
                    stream::iter([Ok(file_document(&entry))]).boxed()
                }
            })
            .flatten()
            .boxed()
    }

    /// One authenticated call against the user endpoint; any failure is
    /// surfaced to the caller.
    pub async fn ping(&self) -> Result<()> {
        match self.client.get(PING_URL).await {
            Ok(_) => {
                tracing::info!("successfully connected to Bitbucket");
                Ok(())
            }
            Err(e) => {
                tracing::error!("error while connecting to Bitbucket: {e}");
                Err(e)
            }
        }
    }

    /// Check that every configured repository is accessible.
    ///
    /// The wildcard selection always validates without issuing a request.
    pub async fn validate(&self) -> Result<()> {
        if self.config.is_wildcard() {
            return Ok(());
        }

        let mut available = Vec::new();
        {
            let mut entries = self
                .client
                .page_items(format!("{BASE_URL}/user/permissions/repositories"));
            while let Some(entry) = entries.next().await {
                if let Some(full_name) =
                    nested(&entry, &["repository", "full_name"]).and_then(Value::as_str)
                {
                    available.push(full_name.to_string());
                }
            }
        }

        let missing: Vec<String> = self
            .config
            .repositories
            .iter()
            .filter(|name| !available.contains(name))
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        Err(Error::Config(format!(
            "Repositories '{}' are not available. Available repositories are: '{}'",
            missing.join(", "),
            available.join(", ")
        )))
    }

    /// The outbound document sequence: commits, then pull requests, then
    /// files. Attachments are not fetched in the current scope.
    pub fn get_docs(&self) -> BoxStream<'_, Result<(Document, Option<Attachment>)>> {
        self.commits()
            .chain(self.pull_requests())
            .chain(self.files())
            .map_ok(|document| (document, None))
            .boxed()
    }
}

#[async_trait]
impl DataSource for BitbucketDataSource {
    fn service_type(&self) -> &'static str {
        "bitbucket"
    }

    async fn ping(&self) -> Result<()> {
        BitbucketDataSource::ping(self).await
    }

    async fn validate(&self) -> Result<()> {
        BitbucketDataSource::validate(self).await
    }

    fn get_docs(&self) -> BoxStream<'_, Result<(Document, Option<Attachment>)>> {
        BitbucketDataSource::get_docs(self)
    }
}
