//! Folds per-package query outcomes into a [`ScanResult`].
//!
//! The [`Aggregator`] is the single mutation point of a scan: workers return
//! outcomes, and one consumer feeds them in here as they complete. Results are
//! independent of arrival order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use tracing::debug;

use crate::checker::QueryOutcome;
use crate::model::{
    Ecosystem, FailedQuery, ManifestEntry, ManifestIssue, PackageQuery, ScanResult, ScanSummary,
    Vulnerability,
};

/// Advisory id plus affected package name and ecosystem.
type FindingKey = (String, Ecosystem, String);

pub struct Aggregator {
    repository: String,
    files_scanned: Vec<String>,
    malformed: Vec<ManifestIssue>,
    dependencies: Vec<ManifestEntry>,
    findings: HashMap<FindingKey, Vulnerability>,
    packages: HashSet<PackageQuery>,
    failed: Vec<FailedQuery>,
    ignored_vulnerabilities: Vec<String>,
}

impl Aggregator {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            files_scanned: Vec::new(),
            malformed: Vec::new(),
            dependencies: Vec::new(),
            findings: HashMap::new(),
            packages: HashSet::new(),
            failed: Vec::new(),
            ignored_vulnerabilities: Vec::new(),
        }
    }

    /// Advisory ids (or aliases) that are dropped instead of reported.
    pub fn with_ignored_vulnerabilities(mut self, ids: Vec<String>) -> Self {
        self.ignored_vulnerabilities = ids;
        self
    }

    /// Records a parsed manifest and the entries recovered from it.
    pub fn add_manifest(
        &mut self,
        path: impl Into<String>,
        entries: Vec<ManifestEntry>,
        issue: Option<(String, usize)>,
    ) {
        let path = path.into();
        if let Some((reason, skipped)) = issue {
            self.malformed.push(ManifestIssue {
                path: path.clone(),
                reason,
                skipped,
            });
        }
        self.files_scanned.push(path);
        self.dependencies.extend(entries);
    }

    /// Folds in one package's query outcome.
    pub fn add_outcome(&mut self, package: &PackageQuery, outcome: QueryOutcome) {
        self.packages.insert(package.clone());

        if let Some(error) = outcome.failure {
            self.failed.push(FailedQuery {
                package: package.clone(),
                reason: error.to_string(),
            });
        }

        for vulnerability in outcome.vulnerabilities {
            if self.is_ignored(&vulnerability) {
                debug!(id = %vulnerability.id, "ignoring vulnerability");
                continue;
            }
            self.insert(vulnerability);
        }
    }

    fn is_ignored(&self, vulnerability: &Vulnerability) -> bool {
        self.ignored_vulnerabilities
            .iter()
            .any(|id| vulnerability.matches_id(id))
    }

    fn insert(&mut self, vulnerability: Vulnerability) {
        let key = (
            vulnerability.id.clone(),
            vulnerability.affected_package.ecosystem,
            vulnerability.affected_package.name.clone(),
        );

        match self.findings.get_mut(&key) {
            // the more severe record wins; report order settles the rest
            Some(existing) if vulnerability.report_order(existing) == Ordering::Less => {
                *existing = vulnerability;
            }
            Some(_) => {}
            None => {
                self.findings.insert(key, vulnerability);
            }
        }
    }

    /// Produces the final, sorted result.
    pub fn finish(self) -> ScanResult {
        let mut vulnerabilities: Vec<Vulnerability> = self.findings.into_values().collect();
        vulnerabilities.sort_by(|a, b| a.report_order(b));

        let mut failed_packages = self.failed;
        failed_packages.sort_by(|a, b| a.package.cmp(&b.package));

        let mut ecosystems = BTreeMap::new();
        for package in &self.packages {
            *ecosystems.entry(package.ecosystem).or_insert(0) += 1;
        }

        let vulnerable_packages: HashSet<(Ecosystem, &str)> = vulnerabilities
            .iter()
            .map(|v| (v.affected_package.ecosystem, v.affected_package.name.as_str()))
            .collect();

        let mut summary = ScanSummary {
            total_packages: self.packages.len(),
            vulnerable_packages: vulnerable_packages.len(),
            total_vulnerabilities: vulnerabilities.len(),
            failed_queries: failed_packages.len(),
            ..ScanSummary::default()
        };
        for vulnerability in &vulnerabilities {
            summary.bump(vulnerability.severity);
        }

        ScanResult {
            repository: self.repository,
            scan_time: Utc::now(),
            files_scanned: self.files_scanned,
            malformed_manifests: self.malformed,
            dependencies: self.dependencies,
            vulnerabilities,
            failed_packages,
            ecosystems,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::model::Severity;

    fn query(name: &str, version: &str) -> PackageQuery {
        PackageQuery::new(Ecosystem::Npm, name, Some(version.to_string()))
    }

    fn vuln(id: &str, package: &PackageQuery, severity: Severity, score: Option<f64>) -> Vulnerability {
        Vulnerability {
            id: id.to_string(),
            aliases: Vec::new(),
            cve: None,
            summary: format!("{id} summary"),
            severity,
            cvss_score: score,
            references: Vec::new(),
            published: None,
            fixed_version: None,
            affected_package: package.clone(),
        }
    }

    #[test]
    fn test_duplicate_advisory_collapses_to_one() {
        let pkg = query("lodash", "4.17.15");
        let mut agg = Aggregator::new("repo");
        agg.add_outcome(
            &pkg,
            QueryOutcome::found(vec![
                vuln("GHSA-1", &pkg, Severity::High, Some(7.5)),
                vuln("GHSA-1", &pkg, Severity::High, Some(7.5)),
            ]),
        );

        let result = agg.finish();
        assert_eq!(result.vulnerabilities.len(), 1);
        assert_eq!(result.summary.high, 1);
    }

    #[test]
    fn test_same_advisory_across_versions_is_one_finding() {
        let old = query("lodash", "4.17.15");
        let new = query("lodash", "4.17.19");
        let mut agg = Aggregator::new("repo");
        agg.add_outcome(&old, QueryOutcome::found(vec![vuln("GHSA-1", &old, Severity::High, None)]));
        agg.add_outcome(&new, QueryOutcome::found(vec![vuln("GHSA-1", &new, Severity::High, None)]));

        let result = agg.finish();
        assert_eq!(result.vulnerabilities.len(), 1);
        assert_eq!(result.summary.total_packages, 2);
        assert_eq!(result.summary.vulnerable_packages, 1);
    }

    #[test]
    fn test_sorted_by_severity_then_score_then_id() {
        let a = query("a", "1.0.0");
        let mut agg = Aggregator::new("repo");
        agg.add_outcome(
            &a,
            QueryOutcome::found(vec![
                vuln("V-LOW", &a, Severity::Low, Some(2.0)),
                vuln("V-CRIT-LOW", &a, Severity::Critical, Some(9.1)),
                vuln("V-HIGH", &a, Severity::High, Some(7.0)),
                vuln("V-CRIT-HIGH", &a, Severity::Critical, Some(9.9)),
            ]),
        );

        let result = agg.finish();
        let ids: Vec<_> = result.vulnerabilities.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["V-CRIT-HIGH", "V-CRIT-LOW", "V-HIGH", "V-LOW"]);
    }

    #[test]
    fn test_arrival_order_does_not_change_result() {
        let a = query("a", "1.0.0");
        let b = query("b", "2.0.0");
        let outcomes = vec![
            (a.clone(), QueryOutcome::found(vec![
                vuln("X-1", &a, Severity::Medium, Some(5.0)),
                vuln("X-2", &a, Severity::Medium, Some(5.0)),
            ])),
            (b.clone(), QueryOutcome::found(vec![vuln("X-1", &b, Severity::Critical, None)])),
            (b.clone(), QueryOutcome::found(vec![vuln("X-1", &b, Severity::High, None)])),
        ];

        let mut forward = Aggregator::new("repo");
        for (pkg, outcome) in outcomes.clone() {
            forward.add_outcome(&pkg, outcome);
        }
        let mut backward = Aggregator::new("repo");
        for (pkg, outcome) in outcomes.into_iter().rev() {
            backward.add_outcome(&pkg, outcome);
        }

        let forward = forward.finish();
        let backward = backward.finish();
        assert_eq!(forward.vulnerabilities, backward.vulnerabilities);
        assert_eq!(forward.summary, backward.summary);
        assert_eq!(forward.vulnerabilities[0].severity, Severity::Critical);
    }

    #[test]
    fn test_soft_failure_counted_without_losing_others() {
        let pkgs: Vec<_> = (0..5).map(|i| query(&format!("pkg{i}"), "1.0.0")).collect();
        let mut agg = Aggregator::new("repo");
        for (i, pkg) in pkgs.iter().enumerate() {
            let outcome = if i == 2 {
                QueryOutcome::failed(QueryError::Timeout)
            } else {
                QueryOutcome::found(vec![vuln(&format!("V-{i}"), pkg, Severity::Low, None)])
            };
            agg.add_outcome(pkg, outcome);
        }

        let result = agg.finish();
        assert_eq!(result.summary.total_packages, 5);
        assert_eq!(result.summary.failed_queries, 1);
        assert_eq!(result.vulnerabilities.len(), 4);
        assert_eq!(result.failed_packages[0].package.name, "pkg2");
        assert!(!result.is_complete());
    }

    #[test]
    fn test_counts_sum_to_total() {
        let a = query("a", "1.0.0");
        let mut agg = Aggregator::new("repo");
        agg.add_outcome(
            &a,
            QueryOutcome::found(vec![
                vuln("1", &a, Severity::Critical, None),
                vuln("2", &a, Severity::Unknown, None),
                vuln("3", &a, Severity::Medium, None),
                vuln("3", &a, Severity::Medium, None),
            ]),
        );

        let s = agg.finish().summary;
        let sum: usize = Severity::DESCENDING.iter().map(|sev| s.count(*sev)).sum();
        assert_eq!(sum, s.total_vulnerabilities);
        assert_eq!(s.total_vulnerabilities, 3);
    }

    #[test]
    fn test_ignored_vulnerabilities_are_dropped() {
        let a = query("a", "1.0.0");
        let mut aliased = vuln("GHSA-9", &a, Severity::High, None);
        aliased.aliases = vec!["CVE-2022-0001".to_string()];

        let mut agg = Aggregator::new("repo")
            .with_ignored_vulnerabilities(vec!["CVE-2022-0001".to_string()]);
        agg.add_outcome(&a, QueryOutcome::found(vec![aliased, vuln("GHSA-8", &a, Severity::Low, None)]));

        let result = agg.finish();
        assert_eq!(result.vulnerabilities.len(), 1);
        assert_eq!(result.vulnerabilities[0].id, "GHSA-8");
    }

    #[test]
    fn test_manifest_bookkeeping() {
        let entry = ManifestEntry::new(Ecosystem::Npm, "lodash", Some("4.17.15")).unwrap();
        let mut agg = Aggregator::new("repo");
        agg.add_manifest("package.json", vec![entry.clone()], None);
        agg.add_manifest("requirements.txt", Vec::new(), Some(("invalid requirement".into(), 1)));

        let result = agg.finish();
        assert_eq!(result.files_scanned, vec!["package.json", "requirements.txt"]);
        assert_eq!(result.dependencies, vec![entry]);
        assert_eq!(result.malformed_manifests.len(), 1);
        assert_eq!(result.malformed_manifests[0].path, "requirements.txt");
    }
}
