use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Advisory, VulnerabilityDatabase};
use crate::error::QueryError;
use crate::model::{PackageQuery, Vulnerability};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);
/// Ceiling for a server-requested `Retry-After` delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// What one package query produced. A failure is soft: it carries no
/// vulnerabilities but never aborts the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub vulnerabilities: Vec<Vulnerability>,
    pub failure: Option<QueryError>,
}

impl QueryOutcome {
    pub fn found(vulnerabilities: Vec<Vulnerability>) -> Self {
        Self {
            vulnerabilities,
            failure: None,
        }
    }

    pub fn failed(error: QueryError) -> Self {
        Self {
            vulnerabilities: Vec::new(),
            failure: Some(error),
        }
    }
}

/// Applies the timeout and retry policy around a [`VulnerabilityDatabase`].
///
/// Cloning is cheap; clones share the underlying database handle.
#[derive(Clone)]
pub struct QueryClient {
    database: Arc<dyn VulnerabilityDatabase>,
    timeout: Duration,
    retry_backoff: Duration,
}

impl QueryClient {
    pub fn new(database: Arc<dyn VulnerabilityDatabase>) -> Self {
        Self {
            database,
            timeout: DEFAULT_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn database_name(&self) -> &'static str {
        self.database.name()
    }

    /// Queries one package. A rate-limit response is retried once after a
    /// backoff; any remaining error becomes a soft failure.
    pub async fn query(&self, package: &PackageQuery) -> QueryOutcome {
        let result = match self.attempt(package).await {
            Err(QueryError::RateLimited { retry_after }) => {
                let delay = retry_after.unwrap_or(self.retry_backoff).min(MAX_RETRY_DELAY);
                info!(package = %package, delay_ms = delay.as_millis() as u64, "rate limited, retrying once");
                tokio::time::sleep(delay).await;
                self.attempt(package).await
            }
            other => other,
        };

        match result {
            Ok(advisories) => {
                debug!(package = %package, count = advisories.len(), "query complete");
                QueryOutcome::found(
                    advisories
                        .into_iter()
                        .map(|advisory| advisory.into_vulnerability(package))
                        .collect(),
                )
            }
            Err(err) => {
                warn!(package = %package, error = %err, "vulnerability query failed");
                QueryOutcome::failed(err)
            }
        }
    }

    async fn attempt(&self, package: &PackageQuery) -> Result<Vec<Advisory>, QueryError> {
        match tokio::time::timeout(self.timeout, self.database.query(package)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout),
        }
    }
}
