use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Ecosystem, ManifestEntry, PackageQuery, Severity, Vulnerability};

/// A manifest that could only be partially read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestIssue {
    pub path: String,
    pub reason: String,
    /// Lines or entries dropped from the manifest.
    pub skipped: usize,
}

/// A package whose database query failed softly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedQuery {
    pub package: PackageQuery,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_packages: usize,
    pub vulnerable_packages: usize,
    pub total_vulnerabilities: usize,
    pub failed_queries: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
}

impl ScanSummary {
    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Unknown => self.unknown,
        }
    }

    pub(crate) fn bump(&mut self, severity: Severity) {
        let slot = match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Unknown => &mut self.unknown,
        };
        *slot += 1;
    }
}

/// The finished output of one repository scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub repository: String,
    pub scan_time: DateTime<Utc>,
    pub files_scanned: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub malformed_manifests: Vec<ManifestIssue>,
    pub dependencies: Vec<ManifestEntry>,
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_packages: Vec<FailedQuery>,
    pub ecosystems: BTreeMap<Ecosystem, usize>,
    pub summary: ScanSummary,
}

impl ScanResult {
    /// An empty result, used when a repository has no supported manifests.
    pub fn empty(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            scan_time: Utc::now(),
            files_scanned: Vec::new(),
            malformed_manifests: Vec::new(),
            dependencies: Vec::new(),
            vulnerabilities: Vec::new(),
            failed_packages: Vec::new(),
            ecosystems: BTreeMap::new(),
            summary: ScanSummary::default(),
        }
    }

    /// Highest severity among the reported vulnerabilities.
    pub fn max_severity(&self) -> Option<Severity> {
        self.vulnerabilities.iter().map(|v| v.severity).max()
    }

    /// True when every package query completed and no manifest was damaged.
    pub fn is_complete(&self) -> bool {
        self.failed_packages.is_empty() && self.malformed_manifests.is_empty()
    }
}
