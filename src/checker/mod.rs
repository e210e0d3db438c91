//! Vulnerability database access.
//!
//! [`VulnerabilityDatabase`] is the network seam: one call per package, returning
//! raw [`Advisory`] records. [`QueryClient`] wraps a database with the per-query
//! timeout and rate-limit retry policy and maps advisories to
//! [`Vulnerability`](crate::model::Vulnerability) records.

mod client;
pub mod cvss;
mod osv;

pub use client::{QueryClient, QueryOutcome};
pub use cvss::parse_cvss_score;
pub use osv::{
    Advisory, AdvisoryAffected, AdvisoryEvent, AdvisoryRange, AdvisoryReference,
    AdvisorySeverity, OsvDatabase, DEFAULT_OSV_ENDPOINT,
};

use crate::error::QueryError;
use crate::model::PackageQuery;
use async_trait::async_trait;

#[async_trait]
pub trait VulnerabilityDatabase: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns every advisory affecting `package`. An empty vector means the
    /// package has no known vulnerabilities.
    async fn query(&self, package: &PackageQuery) -> Result<Vec<Advisory>, QueryError>;
}
