use serde::{Deserialize, Serialize};

/// Package ecosystems depshield can parse and query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Pypi,
    Rubygems,
    Go,
    Packagist,
}

impl Ecosystem {
    /// Ecosystem name as the OSV database spells it.
    pub fn osv_name(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "PyPI",
            Ecosystem::Rubygems => "RubyGems",
            Ecosystem::Go => "Go",
            Ecosystem::Packagist => "Packagist",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "PyPI",
            Ecosystem::Rubygems => "RubyGems",
            Ecosystem::Go => "Go",
            Ecosystem::Packagist => "Packagist",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A direct dependency exactly as a manifest declares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version_spec: Option<String>,
}

impl ManifestEntry {
    /// Builds an entry, returning `None` when the trimmed name is empty.
    ///
    /// An empty or whitespace-only version spec is stored as `None`.
    pub fn new(
        ecosystem: Ecosystem,
        name: impl AsRef<str>,
        version_spec: Option<impl AsRef<str>>,
    ) -> Option<Self> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return None;
        }

        let version_spec = version_spec
            .map(|v| v.as_ref().trim().to_string())
            .filter(|v| !v.is_empty());

        Some(Self {
            ecosystem,
            name: name.to_string(),
            version_spec,
        })
    }
}

/// Normalized form of a [`ManifestEntry`] sent to the vulnerability database.
///
/// `version` is `None` when the declared spec could not be pinned, in which case
/// the database is asked about every version of the package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageQuery {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: Option<String>,
}

impl PackageQuery {
    pub fn new(ecosystem: Ecosystem, name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            ecosystem,
            name: name.into(),
            version,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.version.is_some()
    }
}

impl std::fmt::Display for PackageQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_entry_rejects_empty_name() {
        assert!(ManifestEntry::new(Ecosystem::Npm, "  ", Some("1.0.0")).is_none());
        assert!(ManifestEntry::new(Ecosystem::Npm, "", None::<&str>).is_none());
    }

    #[test]
    fn test_manifest_entry_trims_and_drops_blank_spec() {
        let entry = ManifestEntry::new(Ecosystem::Pypi, " flask ", Some("  ")).unwrap();
        assert_eq!(entry.name, "flask");
        assert_eq!(entry.version_spec, None);
    }

    #[test]
    fn test_ecosystem_osv_names() {
        let names: Vec<_> = [
            Ecosystem::Npm,
            Ecosystem::Pypi,
            Ecosystem::Rubygems,
            Ecosystem::Go,
            Ecosystem::Packagist,
        ]
        .iter()
        .map(|e| e.osv_name())
        .collect();
        assert_eq!(names, vec!["npm", "PyPI", "RubyGems", "Go", "Packagist"]);
    }

    #[test]
    fn test_package_query_display() {
        let pinned = PackageQuery::new(Ecosystem::Npm, "lodash", Some("4.17.15".to_string()));
        let unpinned = PackageQuery::new(Ecosystem::Npm, "lodash", None);
        assert_eq!(pinned.to_string(), "lodash@4.17.15");
        assert_eq!(unpinned.to_string(), "lodash");
        assert!(pinned.is_pinned());
        assert!(!unpinned.is_pinned());
    }
}
