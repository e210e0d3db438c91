//! Manifest parsers.
//!
//! Every supported manifest format is a [`ManifestKind`] variant. Dispatch from a
//! file name to a parser is an exhaustive `match`, so adding a format means adding
//! a variant and the compiler points at every place that needs handling.
//!
//! | Kind | File | Ecosystem |
//! |------|------|-----------|
//! | [`ManifestKind::PackageJson`] | `package.json` | npm |
//! | [`ManifestKind::RequirementsTxt`] | `requirements.txt`, `requirements-*.txt` | PyPI |
//! | [`ManifestKind::Pipfile`] | `Pipfile` | PyPI |
//! | [`ManifestKind::PyprojectToml`] | `pyproject.toml` | PyPI |
//! | [`ManifestKind::GemfileLock`] | `Gemfile.lock` | RubyGems |
//! | [`ManifestKind::GoMod`] | `go.mod` | Go |
//! | [`ManifestKind::ComposerJson`] | `composer.json` | Packagist |
//!
//! Parsing is pure. A manifest that is damaged in places yields
//! [`MalformedManifest`] carrying every entry that could still be read.
//!
//! # Example
//!
//! ```
//! use depshield::parser::ManifestKind;
//!
//! let kind = ManifestKind::from_path("web/package.json").unwrap();
//! let entries = kind.parse(r#"{"dependencies": {"lodash": "4.17.15"}}"#).unwrap();
//!
//! assert_eq!(entries.len(), 1);
//! assert_eq!(entries[0].name, "lodash");
//! ```

mod go;
mod json;
mod python;
mod ruby;

pub use go::parse_go_mod;
pub use json::{parse_composer_json, parse_package_json};
pub use python::{parse_pipfile, parse_pyproject_toml, parse_requirement, parse_requirements_txt};
pub use ruby::parse_gemfile_lock;

use crate::error::MalformedManifest;
use crate::model::{Ecosystem, ManifestEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    PackageJson,
    RequirementsTxt,
    Pipfile,
    PyprojectToml,
    GemfileLock,
    GoMod,
    ComposerJson,
}

impl ManifestKind {
    /// Recognises a manifest by the final component of `path`.
    pub fn from_path(path: &str) -> Option<Self> {
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);

        match file_name {
            "package.json" => Some(ManifestKind::PackageJson),
            "Pipfile" => Some(ManifestKind::Pipfile),
            "pyproject.toml" => Some(ManifestKind::PyprojectToml),
            "Gemfile.lock" => Some(ManifestKind::GemfileLock),
            "go.mod" => Some(ManifestKind::GoMod),
            "composer.json" => Some(ManifestKind::ComposerJson),
            name if name.starts_with("requirements") && name.ends_with(".txt") => {
                Some(ManifestKind::RequirementsTxt)
            }
            _ => None,
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        match self {
            ManifestKind::PackageJson => Ecosystem::Npm,
            ManifestKind::RequirementsTxt
            | ManifestKind::Pipfile
            | ManifestKind::PyprojectToml => Ecosystem::Pypi,
            ManifestKind::GemfileLock => Ecosystem::Rubygems,
            ManifestKind::GoMod => Ecosystem::Go,
            ManifestKind::ComposerJson => Ecosystem::Packagist,
        }
    }

    pub fn parse(&self, content: &str) -> Result<Vec<ManifestEntry>, MalformedManifest> {
        match self {
            ManifestKind::PackageJson => parse_package_json(content),
            ManifestKind::RequirementsTxt => parse_requirements_txt(content),
            ManifestKind::Pipfile => parse_pipfile(content),
            ManifestKind::PyprojectToml => parse_pyproject_toml(content),
            ManifestKind::GemfileLock => parse_gemfile_lock(content),
            ManifestKind::GoMod => parse_go_mod(content),
            ManifestKind::ComposerJson => parse_composer_json(content),
        }
    }
}

/// Accumulates entries for one manifest and remembers what had to be skipped.
pub(crate) struct EntryCollector {
    ecosystem: Ecosystem,
    entries: Vec<ManifestEntry>,
    first_problem: Option<(String, Option<usize>)>,
    skipped: usize,
}

impl EntryCollector {
    pub(crate) fn new(ecosystem: Ecosystem) -> Self {
        Self {
            ecosystem,
            entries: Vec::new(),
            first_problem: None,
            skipped: 0,
        }
    }

    pub(crate) fn push(&mut self, name: &str, version_spec: Option<&str>) {
        match ManifestEntry::new(self.ecosystem, name, version_spec) {
            Some(entry) => self.entries.push(entry),
            None => self.reject("empty package name", None),
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub(crate) fn reject(&mut self, reason: impl Into<String>, line: Option<usize>) {
        self.skipped += 1;
        if self.first_problem.is_none() {
            self.first_problem = Some((reason.into(), line));
        }
    }

    pub(crate) fn finish(self) -> Result<Vec<ManifestEntry>, MalformedManifest> {
        match self.first_problem {
            None => Ok(self.entries),
            Some((reason, line)) => Err(MalformedManifest {
                reason,
                line,
                skipped: self.skipped,
                partial: self.entries,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_recognises_manifests() {
        assert_eq!(ManifestKind::from_path("package.json"), Some(ManifestKind::PackageJson));
        assert_eq!(
            ManifestKind::from_path("backend/requirements-dev.txt"),
            Some(ManifestKind::RequirementsTxt)
        );
        assert_eq!(ManifestKind::from_path("a/b/go.mod"), Some(ManifestKind::GoMod));
        assert_eq!(ManifestKind::from_path("Gemfile.lock"), Some(ManifestKind::GemfileLock));
        assert_eq!(ManifestKind::from_path("Pipfile"), Some(ManifestKind::Pipfile));
        assert_eq!(ManifestKind::from_path("pyproject.toml"), Some(ManifestKind::PyprojectToml));
        assert_eq!(ManifestKind::from_path("composer.json"), Some(ManifestKind::ComposerJson));
    }

    #[test]
    fn test_from_path_rejects_others() {
        assert_eq!(ManifestKind::from_path("package-lock.json"), None);
        assert_eq!(ManifestKind::from_path("Gemfile"), None);
        assert_eq!(ManifestKind::from_path("src/main.rs"), None);
        assert_eq!(ManifestKind::from_path(""), None);
    }

    #[test]
    fn test_ecosystem_mapping() {
        assert_eq!(ManifestKind::PackageJson.ecosystem(), Ecosystem::Npm);
        assert_eq!(ManifestKind::Pipfile.ecosystem(), Ecosystem::Pypi);
        assert_eq!(ManifestKind::GemfileLock.ecosystem(), Ecosystem::Rubygems);
        assert_eq!(ManifestKind::GoMod.ecosystem(), Ecosystem::Go);
        assert_eq!(ManifestKind::ComposerJson.ecosystem(), Ecosystem::Packagist);
    }

    #[test]
    fn test_collector_reports_first_problem_and_keeps_entries() {
        let mut collector = EntryCollector::new(Ecosystem::Pypi);
        collector.push("flask", Some("==2.0.0"));
        collector.reject("bad line", Some(2));
        collector.push("requests", None);
        collector.reject("another bad line", Some(4));

        let err = collector.finish().unwrap_err();
        assert_eq!(err.reason, "bad line");
        assert_eq!(err.line, Some(2));
        assert_eq!(err.skipped, 2);
        assert_eq!(err.partial.len(), 2);
    }
}
