use crate::error::QueryError;
use crate::model::{PackageQuery, Severity, Vulnerability};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::cvss::parse_cvss_score;

pub const DEFAULT_OSV_ENDPOINT: &str = "https://api.osv.dev/v1/query";

/// Upper bound on result pages followed for a single package.
const MAX_PAGES: usize = 10;

const SUMMARY_MAX_CHARS: usize = 200;

pub struct OsvDatabase {
    client: reqwest::Client,
    endpoint: String,
}

impl OsvDatabase {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_OSV_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

}

impl Default for OsvDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct OsvPackage<'a> {
    name: &'a str,
    ecosystem: &'static str,
}

#[derive(Serialize)]
struct OsvQuery<'a> {
    package: OsvPackage<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

impl<'a> OsvQuery<'a> {
    fn new(package: &'a PackageQuery, page_token: Option<String>) -> Self {
        Self {
            package: OsvPackage {
                name: &package.name,
                ecosystem: package.ecosystem.osv_name(),
            },
            version: package.version.as_deref(),
            page_token,
        }
    }
}

#[derive(Deserialize)]
struct OsvQueryResponse {
    vulns: Option<Vec<Advisory>>,
    next_page_token: Option<String>,
}

/// An advisory record in the OSV schema, as returned by the database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Advisory {
    pub id: String,
    pub summary: Option<String>,
    pub details: Option<String>,
    pub aliases: Option<Vec<String>>,
    pub published: Option<String>,
    pub severity: Option<Vec<AdvisorySeverity>>,
    pub affected: Option<Vec<AdvisoryAffected>>,
    pub references: Option<Vec<AdvisoryReference>>,
    pub database_specific: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvisorySeverity {
    #[serde(rename = "type")]
    pub severity_type: Option<String>,
    pub score: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvisoryAffected {
    pub ranges: Option<Vec<AdvisoryRange>>,
    pub ecosystem_specific: Option<Value>,
    pub database_specific: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvisoryRange {
    pub events: Option<Vec<AdvisoryEvent>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvisoryEvent {
    pub introduced: Option<String>,
    pub fixed: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvisoryReference {
    #[serde(rename = "type")]
    pub reference_type: Option<String>,
    pub url: Option<String>,
}

impl Advisory {
    /// Highest CVSS score across the reported severity entries and any
    /// database-specific score.
    pub fn best_cvss_score(&self) -> Option<f64> {
        let reported = self
            .severity
            .iter()
            .flatten()
            .filter_map(|s| s.score.as_deref())
            .filter_map(parse_cvss_score);

        let database = self
            .database_specific
            .as_ref()
            .and_then(|d| d.get("cvss"))
            .and_then(|cvss| cvss.get("score"))
            .and_then(|score| match score {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => parse_cvss_score(s),
                _ => None,
            });

        reported.chain(database).reduce(f64::max)
    }

    /// Highest severity from database labels and the CVSS band of the best score.
    pub fn highest_severity(&self, cvss_score: Option<f64>) -> Severity {
        let top_label = self.database_specific.as_ref();
        let affected_labels = self.affected.iter().flatten().flat_map(|affected| {
            [
                affected.ecosystem_specific.as_ref(),
                affected.database_specific.as_ref(),
            ]
        });

        let from_labels = std::iter::once(top_label)
            .chain(affected_labels)
            .flatten()
            .filter_map(|v| v.get("severity").and_then(Value::as_str))
            .map(Severity::from_label);

        let from_score = cvss_score.map(Severity::from_score);

        from_labels
            .chain(from_score)
            .max()
            .unwrap_or(Severity::Unknown)
    }

    pub fn fixed_version(&self) -> Option<String> {
        self.affected.as_ref()?.iter().find_map(|affected| {
            affected.ranges.as_ref()?.iter().find_map(|range| {
                range
                    .events
                    .as_ref()?
                    .iter()
                    .find_map(|event| event.fixed.clone())
            })
        })
    }

    /// Maps the raw record onto a [`Vulnerability`] affecting `package`.
    pub fn into_vulnerability(self, package: &PackageQuery) -> Vulnerability {
        let cvss_score = self.best_cvss_score();
        let severity = self.highest_severity(cvss_score);
        let fixed_version = self.fixed_version();
        let aliases = self.aliases.unwrap_or_default();
        let cve = if self.id.starts_with("CVE-") {
            Some(self.id.clone())
        } else {
            aliases.iter().find(|a| a.starts_with("CVE-")).cloned()
        };

        let summary = self
            .summary
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                self.details
                    .filter(|d| !d.trim().is_empty())
                    .map(|d| d.chars().take(SUMMARY_MAX_CHARS).collect())
            })
            .unwrap_or_else(|| "No description available".to_string());

        let references = self
            .references
            .into_iter()
            .flatten()
            .filter_map(|r| r.url)
            .collect();

        Vulnerability {
            id: self.id,
            aliases,
            cve,
            summary,
            severity,
            cvss_score,
            references,
            published: self.published,
            fixed_version,
            affected_package: package.clone(),
        }
    }
}

fn transport_error(err: reqwest::Error) -> QueryError {
    if err.is_timeout() {
        QueryError::Timeout
    } else {
        QueryError::Transport(err.to_string())
    }
}

/// Reads a `Retry-After` header given in seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl super::VulnerabilityDatabase for OsvDatabase {
    fn name(&self) -> &'static str {
        "OSV.dev"
    }

    async fn query(&self, package: &PackageQuery) -> Result<Vec<Advisory>, QueryError> {
        let (advisories, truncated) =
            collect_pages(|page_token| self.fetch_page(package, page_token)).await?;
        if truncated {
            warn!(
                package = %package,
                pages = MAX_PAGES,
                advisories = advisories.len(),
                "OSV results truncated at page limit"
            );
        }
        Ok(advisories)
    }
}

impl OsvDatabase {
    async fn fetch_page(
        &self,
        package: &PackageQuery,
        page_token: Option<String>,
    ) -> Result<OsvQueryResponse, QueryError> {
        if page_token.is_some() {
            debug!(package = %package, "following OSV result page");
        }
        let response = self
            .client
            .post(&self.endpoint)
            .header(USER_AGENT, concat!("depshield/", env!("CARGO_PKG_VERSION")))
            .json(&OsvQuery::new(package, page_token))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(QueryError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            return Err(QueryError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| QueryError::Decode(e.to_string()))
    }
}

/// Follows `next_page_token` links for at most [`MAX_PAGES`] pages. The flag
/// is set when the database still had pages left at the cap.
async fn collect_pages<F, Fut>(mut fetch: F) -> Result<(Vec<Advisory>, bool), QueryError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<OsvQueryResponse, QueryError>>,
{
    let mut advisories = Vec::new();
    let mut page_token = None;

    for _ in 0..MAX_PAGES {
        let body = fetch(page_token.take()).await?;
        advisories.extend(body.vulns.unwrap_or_default());

        match body.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => return Ok((advisories, false)),
        }
    }

    Ok((advisories, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::VulnerabilityDatabase;
    use crate::model::Ecosystem;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn advisory(value: Value) -> Advisory {
        serde_json::from_value(value).unwrap()
    }

    fn lodash() -> PackageQuery {
        PackageQuery::new(Ecosystem::Npm, "lodash", Some("4.17.15".to_string()))
    }

    #[test]
    fn test_query_body_with_version() {
        let package = lodash();
        let body = serde_json::to_value(OsvQuery::new(&package, None)).unwrap();
        assert_eq!(
            body,
            json!({"package": {"name": "lodash", "ecosystem": "npm"}, "version": "4.17.15"})
        );
    }

    #[test]
    fn test_query_body_unpinned_uses_osv_ecosystem_name() {
        let package = PackageQuery::new(Ecosystem::Pypi, "Django", None);
        let body = serde_json::to_value(OsvQuery::new(&package, Some("tok".into()))).unwrap();
        assert_eq!(
            body,
            json!({"package": {"name": "Django", "ecosystem": "PyPI"}, "page_token": "tok"})
        );
    }

    #[test]
    fn test_response_without_vulns() {
        let body: OsvQueryResponse = serde_json::from_str("{}").unwrap();
        assert!(body.vulns.is_none());
        assert!(body.next_page_token.is_none());
    }

    #[test]
    fn test_into_vulnerability_maps_fields() {
        let raw = advisory(json!({
            "id": "GHSA-35jh-r3h4-6jhm",
            "summary": "Command Injection in lodash",
            "aliases": ["CVE-2021-23337"],
            "published": "2021-02-15T11:51:00Z",
            "severity": [
                {"type": "CVSS_V3", "score": "CVSS:3.1/AV:N/AC:L/PR:H/UI:N/S:U/C:H/I:H/A:H"}
            ],
            "affected": [{
                "ranges": [{"type": "SEMVER", "events": [{"introduced": "0"}, {"fixed": "4.17.21"}]}],
                "database_specific": {"source": "x"}
            }],
            "references": [
                {"type": "ADVISORY", "url": "https://nvd.nist.gov/vuln/detail/CVE-2021-23337"},
                {"type": "WEB"},
                {"type": "PACKAGE", "url": "https://github.com/lodash/lodash"}
            ],
            "database_specific": {"severity": "HIGH"}
        }));
        let vuln = raw.into_vulnerability(&lodash());

        assert_eq!(vuln.id, "GHSA-35jh-r3h4-6jhm");
        assert_eq!(vuln.cve.as_deref(), Some("CVE-2021-23337"));
        assert_eq!(vuln.cvss_score, Some(7.2));
        assert_eq!(vuln.severity, Severity::High);
        assert_eq!(vuln.fixed_version.as_deref(), Some("4.17.21"));
        assert_eq!(vuln.references.len(), 2);
        assert_eq!(vuln.affected_package, lodash());
    }

    #[test]
    fn test_highest_score_across_vectors() {
        let raw = advisory(json!({
            "id": "OSV-1",
            "severity": [
                {"type": "CVSS_V3", "score": "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:L/I:L/A:N"},
                {"type": "CVSS_V3", "score": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"},
                {"type": "CVSS_V4", "score": "CVSS:4.0/AV:N/AC:L/AT:N/PR:N/UI:N/VC:H/VI:H/VA:H/SC:N/SI:N/SA:N"}
            ]
        }));
        assert_eq!(raw.best_cvss_score(), Some(9.8));
        assert_eq!(raw.into_vulnerability(&lodash()).severity, Severity::Critical);
    }

    #[test]
    fn test_label_outranks_lower_score() {
        let raw = advisory(json!({
            "id": "GHSA-x",
            "severity": [{"type": "CVSS_V3", "score": "5.0"}],
            "database_specific": {"severity": "CRITICAL"}
        }));
        let vuln = raw.into_vulnerability(&lodash());
        assert_eq!(vuln.severity, Severity::Critical);
        assert_eq!(vuln.cvss_score, Some(5.0));
    }

    #[test]
    fn test_moderate_label_and_ecosystem_specific() {
        let raw = advisory(json!({
            "id": "PYSEC-1",
            "affected": [{"ecosystem_specific": {"severity": "MODERATE"}}]
        }));
        let vuln = raw.into_vulnerability(&lodash());
        assert_eq!(vuln.severity, Severity::Medium);
        assert_eq!(vuln.cvss_score, None);
    }

    #[test]
    fn test_database_specific_numeric_cvss() {
        let raw = advisory(json!({"id": "X", "database_specific": {"cvss": {"score": 8.1}}}));
        assert_eq!(raw.best_cvss_score(), Some(8.1));
    }

    #[test]
    fn test_summary_fallbacks() {
        let long_details = "d".repeat(500);
        let from_details = advisory(json!({"id": "A", "details": long_details}))
            .into_vulnerability(&lodash());
        assert_eq!(from_details.summary.chars().count(), SUMMARY_MAX_CHARS);

        let empty = advisory(json!({"id": "B", "summary": "  "})).into_vulnerability(&lodash());
        assert_eq!(empty.summary, "No description available");
        assert_eq!(empty.severity, Severity::Unknown);
        assert!(empty.references.is_empty());
    }

    #[test]
    fn test_cve_id_used_directly() {
        let vuln = advisory(json!({"id": "CVE-2020-8203"})).into_vulnerability(&lodash());
        assert_eq!(vuln.cve.as_deref(), Some("CVE-2020-8203"));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_osv_database_defaults() {
        let db = OsvDatabase::default();
        assert_eq!(db.name(), "OSV.dev");
        assert_eq!(db.endpoint, DEFAULT_OSV_ENDPOINT);
    }

    fn page(id: &str, next: Option<&str>) -> OsvQueryResponse {
        OsvQueryResponse {
            vulns: Some(vec![advisory(json!({"id": id}))]),
            next_page_token: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_pages_followed_until_token_runs_out() {
        let mut tokens = Vec::new();
        let (advisories, truncated) = collect_pages(|token| {
            tokens.push(token.clone());
            let next = (tokens.len() < 3).then(|| format!("t{}", tokens.len()));
            let id = format!("V-{}", tokens.len());
            async move { Ok(page(&id, next.as_deref())) }
        })
        .await
        .unwrap();

        assert!(!truncated);
        assert_eq!(tokens, vec![None, Some("t1".to_string()), Some("t2".to_string())]);
        let ids: Vec<_> = advisories.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["V-1", "V-2", "V-3"]);
    }

    #[tokio::test]
    async fn test_page_cap_reports_truncation() {
        let mut calls = 0;
        let (advisories, truncated) = collect_pages(|_| {
            calls += 1;
            async { Ok(page("V-LOOP", Some("again"))) }
        })
        .await
        .unwrap();

        assert!(truncated);
        assert_eq!(calls, MAX_PAGES);
        assert_eq!(advisories.len(), MAX_PAGES);
    }

    #[tokio::test]
    async fn test_empty_page_token_ends_paging() {
        let (advisories, truncated) =
            collect_pages(|_| async { Ok(page("V-1", Some(""))) }).await.unwrap();
        assert!(!truncated);
        assert_eq!(advisories.len(), 1);
    }

    #[tokio::test]
    async fn test_page_error_propagates() {
        let err = collect_pages(|_| async { Err(QueryError::Status(500)) })
            .await
            .unwrap_err();
        assert_eq!(err, QueryError::Status(500));
    }
}
