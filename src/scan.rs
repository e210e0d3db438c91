//! Scan orchestration.
//!
//! A [`ScanContext`] owns everything one scan needs. [`ScanContext::scan`]
//! spawns the scan onto the tokio runtime and hands back a
//! [`ProgressStream`]:
//!
//! ```text
//! fetch manifests ─► DISCOVERING × files
//!                 ─► parse + normalize ─► PARSING × files
//!                 ─► bounded query pool ─► QUERYING × packages
//!                 ─► DONE (or ERROR)
//! ```
//!
//! Queries complete in any order and are folded into the [`Aggregator`] by the
//! scan task alone. Once the stream is dropped no further queries are
//! submitted; queries already in flight are allowed to finish.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::aggregate::Aggregator;
use crate::checker::{OsvDatabase, QueryClient};
use crate::config::{Config, IgnoreConfig};
use crate::error::ScanError;
use crate::model::PackageQuery;
use crate::normalize::normalize;
use crate::parser::ManifestKind;
use crate::progress::{ProgressEvent, ProgressStream};
use crate::source::{FileSource, ManifestFiles};

const DEFAULT_CONCURRENCY: usize = 8;
const EVENT_BUFFER: usize = 64;

pub struct ScanContext {
    source: Arc<dyn FileSource>,
    client: QueryClient,
    concurrency: usize,
    ignore: IgnoreConfig,
}

impl ScanContext {
    pub fn new(source: Arc<dyn FileSource>, client: QueryClient) -> Self {
        Self {
            source,
            client,
            concurrency: DEFAULT_CONCURRENCY,
            ignore: IgnoreConfig::default(),
        }
    }

    /// Builds an OSV-backed context from loaded configuration.
    pub fn from_config(config: &Config, source: Arc<dyn FileSource>) -> Self {
        let database = OsvDatabase::with_endpoint(config.osv_endpoint.clone());
        let client = QueryClient::new(Arc::new(database))
            .with_timeout(config.query_timeout())
            .with_retry_backoff(config.retry_backoff());

        Self::new(source, client)
            .with_concurrency(config.concurrency)
            .with_ignore(config.ignore.clone())
    }

    /// Maximum number of queries in flight. Values below 1 are raised to 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreConfig) -> Self {
        self.ignore = ignore;
        self
    }

    /// Starts scanning `repository` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn scan(self, repository: impl Into<String>) -> ProgressStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let repository = repository.into();
        tokio::spawn(self.run(repository, tx));
        ProgressStream::new(rx)
    }

    async fn run(self, repository: String, tx: mpsc::Sender<ProgressEvent>) {
        info!(repository = %repository, source = self.source.name(), "starting scan");

        let files = match self.source.fetch_manifests(&repository).await {
            Ok(files) => files,
            Err(err) => {
                let err = ScanError::from(err);
                warn!(repository = %repository, error = %err, "scan aborted");
                let _ = tx.send(ProgressEvent::failed(err)).await;
                return;
            }
        };

        let manifests = discover(files);
        let file_count = manifests.len();

        for (index, manifest) in manifests.iter().enumerate() {
            if tx
                .send(ProgressEvent::discovering(&manifest.path, index + 1, file_count))
                .await
                .is_err()
            {
                info!("consumer detached during discovery");
                return;
            }
        }

        let mut aggregator = Aggregator::new(repository.clone())
            .with_ignored_vulnerabilities(self.ignore.vulnerabilities.clone());
        let mut queries = BTreeSet::new();

        for (index, manifest) in manifests.into_iter().enumerate() {
            let (entries, issue) = match manifest.kind.parse(&manifest.content) {
                Ok(entries) => (entries, None),
                Err(err) => {
                    warn!(path = %manifest.path, error = %err, skipped = err.skipped, "malformed manifest");
                    let issue = (err.reason.clone(), err.skipped);
                    (err.partial, Some(issue))
                }
            };
            debug!(path = %manifest.path, entries = entries.len(), "parsed manifest");

            queries.extend(
                entries
                    .iter()
                    .filter(|entry| !self.ignore.should_ignore_package(&entry.name))
                    .map(normalize),
            );

            let event = ProgressEvent::parsing(&manifest.path, index + 1, file_count);
            aggregator.add_manifest(manifest.path, entries, issue);
            if tx.send(event).await.is_err() {
                info!("consumer detached during parsing");
                return;
            }
        }

        let total = queries.len();
        let unpinned = queries.iter().filter(|query| !query.is_pinned()).count();
        info!(
            packages = total,
            unpinned,
            concurrency = self.concurrency,
            database = self.client.database_name(),
            "querying vulnerability database"
        );

        let client = self.client.clone();
        let mut completions = stream::iter(queries)
            .take_while(|_| futures::future::ready(!tx.is_closed()))
            .map(|query: PackageQuery| {
                let client = client.clone();
                async move {
                    let outcome = client.query(&query).await;
                    (query, outcome)
                }
            })
            .buffer_unordered(self.concurrency);

        let mut processed = 0;
        let mut detached = false;
        while let Some((query, outcome)) = completions.next().await {
            processed += 1;
            aggregator.add_outcome(&query, outcome);

            if !detached
                && tx
                    .send(ProgressEvent::querying(query.to_string(), processed, total))
                    .await
                    .is_err()
            {
                info!(processed, total, "consumer detached, draining in-flight queries");
                detached = true;
            }
        }
        drop(completions);

        if detached || tx.is_closed() {
            return;
        }

        let result = aggregator.finish();
        info!(
            repository = %result.repository,
            packages = result.summary.total_packages,
            vulnerabilities = result.summary.total_vulnerabilities,
            failed = result.summary.failed_queries,
            "scan complete"
        );
        let _ = tx.send(ProgressEvent::done(result)).await;
    }
}

struct Manifest {
    path: String,
    kind: ManifestKind,
    content: String,
}

/// Keeps recognised manifests, shallowest first, then by path.
fn discover(files: ManifestFiles) -> Vec<Manifest> {
    let mut manifests: Vec<Manifest> = files
        .into_iter()
        .filter_map(|(path, content)| {
            let kind = ManifestKind::from_path(&path)?;
            Some(Manifest { path, kind, content })
        })
        .collect();

    manifests.sort_by(|a, b| {
        depth(&a.path)
            .cmp(&depth(&b.path))
            .then_with(|| a.path.cmp(&b.path))
    });
    manifests
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_orders_shallow_first() {
        let files: ManifestFiles = [
            ("web/package.json", "{}"),
            ("requirements.txt", ""),
            ("README.md", "# hi"),
            ("api/v2/go.mod", "module x"),
            ("Gemfile.lock", ""),
        ]
        .into_iter()
        .map(|(p, c)| (p.to_string(), c.to_string()))
        .collect();

        let paths: Vec<_> = discover(files).into_iter().map(|m| m.path).collect();
        assert_eq!(
            paths,
            vec!["Gemfile.lock", "requirements.txt", "web/package.json", "api/v2/go.mod"]
        );
    }

    #[test]
    fn test_concurrency_floor() {
        let source = Arc::new(crate::source::MemorySource::new());
        let client = QueryClient::new(Arc::new(OsvDatabase::new()));
        let ctx = ScanContext::new(source, client).with_concurrency(0);
        assert_eq!(ctx.concurrency, 1);
    }
}
