//! `package.json` and `composer.json`.
//!
//! Both formats keep dependencies in JSON objects mapping a package name to a
//! version constraint. Object order is preserved and the first occurrence of a
//! name wins when it appears in more than one section.

use serde_json::Value;

use super::EntryCollector;
use crate::error::MalformedManifest;
use crate::model::{Ecosystem, ManifestEntry};

const NPM_SECTIONS: &[&str] = &["dependencies", "devDependencies"];
const COMPOSER_SECTIONS: &[&str] = &["require", "require-dev"];

pub fn parse_package_json(content: &str) -> Result<Vec<ManifestEntry>, MalformedManifest> {
    parse_dependency_objects(content, Ecosystem::Npm, NPM_SECTIONS, |_| true)
}

/// Platform requirements (`php`, `ext-*`, `lib-*`, `composer-plugin-api`) have no
/// vendor prefix and are not Packagist packages.
pub fn parse_composer_json(content: &str) -> Result<Vec<ManifestEntry>, MalformedManifest> {
    parse_dependency_objects(content, Ecosystem::Packagist, COMPOSER_SECTIONS, |name| {
        name.contains('/')
    })
}

fn parse_dependency_objects(
    content: &str,
    ecosystem: Ecosystem,
    sections: &[&str],
    is_package: impl Fn(&str) -> bool,
) -> Result<Vec<ManifestEntry>, MalformedManifest> {
    let document: Value = serde_json::from_str(content).map_err(MalformedManifest::syntax)?;
    let root = document
        .as_object()
        .ok_or_else(|| MalformedManifest::syntax("top-level value is not an object"))?;

    let mut collector = EntryCollector::new(ecosystem);

    for section in sections {
        let deps = match root.get(*section) {
            None | Some(Value::Null) => continue,
            Some(Value::Object(deps)) => deps,
            Some(_) => {
                collector.reject(format!("`{section}` is not an object"), None);
                continue;
            }
        };

        for (name, spec) in deps {
            if !is_package(name) || collector.contains(name) {
                continue;
            }
            match spec {
                Value::String(spec) => collector.push(name, Some(spec)),
                other => collector.reject(
                    format!("`{section}.{name}` has a non-string version: {other}"),
                    None,
                ),
            }
        }
    }

    collector.finish()
}
