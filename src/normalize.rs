//! Turns manifest version specs into database lookup keys.
//!
//! A spec is pinned only when it names one concrete version as the floor of
//! what the manifest accepts:
//!
//! | Spec | Pinned |
//! |------|--------|
//! | `1.2.3`, `=1.2.3`, `==1.2.3`, `===1.2.3` | `1.2.3` |
//! | `^1.2.3`, `~1.2.3`, `~=1.2.3`, `~>1.2.3` | `1.2.3` |
//! | `>=1.0`, `>1.0`, `<2.0`, `<=2.0`, `!=1.5` | unpinned |
//! | `>=1.0,<2.0`, `^1 \|\| ^2`, `>=1.0 <2.0`, `1.0 - 2.0` | unpinned |
//! | `*`, `1.x`, `2.*`, `latest`, `git+https://…`, `dev-main` | unpinned |
//!
//! Ecosystem rules on top of that: npm versions must be full semver, Go and
//! Packagist/npm versions lose a leading `v`, Packagist stability flags
//! (`@beta`) are dropped, and RubyGems platform suffixes
//! (`1.13.10-x86_64-linux`) are cut. Names are never altered.

use crate::model::{Ecosystem, ManifestEntry, PackageQuery};

/// Operators that keep the written version as the lower bound.
const PINNING: &[&str] = &["===", "==", "~=", "~>", "^", "~", "="];
/// Operators that only bound a range.
const RANGING: &[&str] = &[">=", "<=", "!=", ">", "<"];

pub fn normalize(entry: &ManifestEntry) -> PackageQuery {
    let version = entry
        .version_spec
        .as_deref()
        .and_then(|spec| pin_version(entry.ecosystem, spec));

    PackageQuery::new(entry.ecosystem, entry.name.clone(), version)
}

/// Resolves `spec` to a single concrete version, or `None` when it names a range.
pub fn pin_version(ecosystem: Ecosystem, spec: &str) -> Option<String> {
    let spec = spec.trim();
    if spec.contains(',') || spec.contains("||") {
        return None;
    }

    let version = strip_pinning_operator(spec)?.trim();
    if version.contains(char::is_whitespace) {
        return None;
    }

    let version = match ecosystem {
        Ecosystem::Go => version.strip_prefix('v').unwrap_or(version),
        Ecosystem::Npm => version.trim_start_matches(['=', 'v']),
        Ecosystem::Packagist => {
            let version = version.split('@').next().unwrap_or_default();
            version.strip_prefix('v').unwrap_or(version)
        }
        Ecosystem::Rubygems => version.split('-').next().unwrap_or_default(),
        Ecosystem::Pypi => version,
    };

    if !is_concrete(version) {
        return None;
    }

    if ecosystem == Ecosystem::Npm && semver::Version::parse(version).is_err() {
        return None;
    }

    Some(version.to_string())
}

fn strip_pinning_operator(spec: &str) -> Option<&str> {
    for op in RANGING.iter().chain(PINNING) {
        if let Some(rest) = spec.strip_prefix(op) {
            return if PINNING.contains(op) { Some(rest) } else { None };
        }
    }
    Some(spec)
}

fn is_concrete(version: &str) -> bool {
    let starts_with_digit = version.chars().next().is_some_and(|c| c.is_ascii_digit());
    let allowed = version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'));
    let wildcard = version
        .split('.')
        .any(|part| matches!(part, "x" | "X" | "*"));

    starts_with_digit && allowed && !wildcard
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(ecosystem: Ecosystem, spec: &str) -> Option<String> {
        pin_version(ecosystem, spec)
    }

    #[test]
    fn test_exact_and_caret_tilde_pin() {
        assert_eq!(pin(Ecosystem::Npm, "4.17.15").as_deref(), Some("4.17.15"));
        assert_eq!(pin(Ecosystem::Npm, "^1.2.3").as_deref(), Some("1.2.3"));
        assert_eq!(pin(Ecosystem::Npm, "~1.2.3").as_deref(), Some("1.2.3"));
        assert_eq!(pin(Ecosystem::Npm, "=v1.2.3").as_deref(), Some("1.2.3"));
        assert_eq!(pin(Ecosystem::Pypi, "==2.0.0").as_deref(), Some("2.0.0"));
        assert_eq!(pin(Ecosystem::Pypi, "~=1.4").as_deref(), Some("1.4"));
        assert_eq!(pin(Ecosystem::Pypi, "===1.0").as_deref(), Some("1.0"));
    }

    #[test]
    fn test_ranges_are_unpinned() {
        assert_eq!(pin(Ecosystem::Pypi, ">=1.0,<2.0"), None);
        assert_eq!(pin(Ecosystem::Pypi, ">=1.0"), None);
        assert_eq!(pin(Ecosystem::Pypi, "<2"), None);
        assert_eq!(pin(Ecosystem::Pypi, "!=1.5"), None);
        assert_eq!(pin(Ecosystem::Npm, ">=1.0.0 <2.0.0"), None);
        assert_eq!(pin(Ecosystem::Npm, "1.0.0 - 2.0.0"), None);
        assert_eq!(pin(Ecosystem::Npm, "^1.0.0 || ^2.0.0"), None);
        assert_eq!(pin(Ecosystem::Packagist, "^7.4 || ^8.0"), None);
    }

    #[test]
    fn test_wildcards_tags_and_references_are_unpinned() {
        assert_eq!(pin(Ecosystem::Npm, "*"), None);
        assert_eq!(pin(Ecosystem::Npm, "1.x"), None);
        assert_eq!(pin(Ecosystem::Npm, "latest"), None);
        assert_eq!(pin(Ecosystem::Npm, "git+https://github.com/a/b.git"), None);
        assert_eq!(pin(Ecosystem::Npm, "file:../local"), None);
        assert_eq!(pin(Ecosystem::Npm, "workspace:*"), None);
        assert_eq!(pin(Ecosystem::Pypi, "2.*"), None);
        assert_eq!(pin(Ecosystem::Packagist, "dev-main"), None);
        assert_eq!(pin(Ecosystem::Pypi, ""), None);
    }

    #[test]
    fn test_npm_requires_full_semver() {
        assert_eq!(pin(Ecosystem::Npm, "^4"), None);
        assert_eq!(pin(Ecosystem::Npm, "~1.2"), None);
        assert_eq!(pin(Ecosystem::Npm, "1.0.0-beta.1").as_deref(), Some("1.0.0-beta.1"));
    }

    #[test]
    fn test_ecosystem_specific_cleanup() {
        assert_eq!(pin(Ecosystem::Go, "v1.9.1").as_deref(), Some("1.9.1"));
        assert_eq!(
            pin(Ecosystem::Go, "v0.0.0-20230101120000-abcdef123456").as_deref(),
            Some("0.0.0-20230101120000-abcdef123456")
        );
        assert_eq!(pin(Ecosystem::Packagist, "^2.0").as_deref(), Some("2.0"));
        assert_eq!(pin(Ecosystem::Packagist, "v5.4.0").as_deref(), Some("5.4.0"));
        assert_eq!(pin(Ecosystem::Packagist, "^1.0@beta").as_deref(), Some("1.0"));
        assert_eq!(
            pin(Ecosystem::Rubygems, "1.13.10-x86_64-linux").as_deref(),
            Some("1.13.10")
        );
    }

    #[test]
    fn test_normalize_preserves_name_case() {
        let entry = ManifestEntry::new(Ecosystem::Pypi, "Django", Some("==4.2.1")).unwrap();
        let query = normalize(&entry);

        assert_eq!(query.name, "Django");
        assert_eq!(query.ecosystem, Ecosystem::Pypi);
        assert_eq!(query.version.as_deref(), Some("4.2.1"));
    }

    #[test]
    fn test_normalize_without_spec() {
        let entry = ManifestEntry::new(Ecosystem::Pypi, "requests", None::<&str>).unwrap();
        assert_eq!(normalize(&entry).version, None);
    }
}
