//! PyPI manifests: `requirements.txt`, `pyproject.toml` and `Pipfile`.

use toml::Value;

use super::EntryCollector;
use crate::error::MalformedManifest;
use crate::model::{Ecosystem, ManifestEntry};

/// Comparison operators, longest first so `==` is not read as `=`.
const OPERATORS: &[&str] = &["===", "==", ">=", "<=", "~=", "!=", ">", "<"];

/// Splits one PEP 508 requirement into a name and an optional version spec.
///
/// The spec keeps its operator (`==2.0.0`, `>=1.0,<2.0`). Extras and
/// environment markers are dropped. Returns `Ok(None)` for blank lines,
/// comments and pip options.
pub fn parse_requirement(line: &str) -> Result<Option<(String, Option<String>)>, String> {
    let line = strip_comment(line).trim();
    if line.is_empty() || line.starts_with('-') {
        return Ok(None);
    }
    let line = strip_options(line);
    if line.is_empty() {
        return Ok(None);
    }

    let requirement = line.split(';').next().unwrap_or_default().trim();
    let operator_at = find_operator(requirement);

    let (name, spec) = match (requirement.find('@'), operator_at) {
        // `name @ https://...` direct references carry no version
        (Some(at), op) if op.is_none_or(|op| at < op) => (&requirement[..at], None),
        (_, Some(op)) => {
            let spec: String = requirement[op..].split_whitespace().collect();
            (&requirement[..op], Some(spec))
        }
        (_, None) => (requirement, None),
    };

    let name = strip_extras(name)?.trim();
    if !is_valid_name(name) {
        return Err(format!("invalid requirement `{line}`"));
    }

    if let Some(spec) = &spec {
        let version_part = spec.trim_start_matches(['=', '<', '>', '~', '!']);
        if version_part.is_empty() {
            return Err(format!("missing version in `{line}`"));
        }
    }

    Ok(Some((name.to_string(), spec)))
}

pub fn parse_requirements_txt(content: &str) -> Result<Vec<ManifestEntry>, MalformedManifest> {
    let mut collector = EntryCollector::new(Ecosystem::Pypi);

    for (idx, line) in content.lines().enumerate() {
        match parse_requirement(line) {
            Ok(Some((name, spec))) => collector.push(&name, spec.as_deref()),
            Ok(None) => {}
            Err(reason) => collector.reject(reason, Some(idx + 1)),
        }
    }

    collector.finish()
}

/// Reads PEP 621 `[project]` dependencies and optional dependencies,
/// `[build-system].requires`, and Poetry's dependency tables.
pub fn parse_pyproject_toml(content: &str) -> Result<Vec<ManifestEntry>, MalformedManifest> {
    let document: Value = toml::from_str(content).map_err(MalformedManifest::syntax)?;
    let mut collector = EntryCollector::new(Ecosystem::Pypi);

    if let Some(project) = document.get("project") {
        if let Some(deps) = project.get("dependencies") {
            collect_requirement_array(&mut collector, "project.dependencies", deps);
        }
        if let Some(groups) = project.get("optional-dependencies").and_then(Value::as_table) {
            for (group, deps) in groups {
                let section = format!("project.optional-dependencies.{group}");
                collect_requirement_array(&mut collector, &section, deps);
            }
        }
    }

    if let Some(requires) = document.get("build-system").and_then(|b| b.get("requires")) {
        collect_requirement_array(&mut collector, "build-system.requires", requires);
    }

    if let Some(poetry) = document.get("tool").and_then(|t| t.get("poetry")) {
        for section in ["dependencies", "dev-dependencies"] {
            if let Some(deps) = poetry.get(section) {
                collect_version_table(&mut collector, &format!("tool.poetry.{section}"), deps);
            }
        }
    }

    collector.finish()
}

pub fn parse_pipfile(content: &str) -> Result<Vec<ManifestEntry>, MalformedManifest> {
    let document: Value = toml::from_str(content).map_err(MalformedManifest::syntax)?;
    let mut collector = EntryCollector::new(Ecosystem::Pypi);

    for section in ["packages", "dev-packages"] {
        if let Some(deps) = document.get(section) {
            collect_version_table(&mut collector, section, deps);
        }
    }

    collector.finish()
}

fn collect_requirement_array(collector: &mut EntryCollector, section: &str, value: &Value) {
    let Some(items) = value.as_array() else {
        collector.reject(format!("`{section}` is not an array"), None);
        return;
    };

    for item in items {
        let Some(text) = item.as_str() else {
            collector.reject(format!("`{section}` contains a non-string entry"), None);
            continue;
        };
        match parse_requirement(text) {
            Ok(Some((name, spec))) => collector.push(&name, spec.as_deref()),
            Ok(None) => {}
            Err(reason) => collector.reject(reason, None),
        }
    }
}

/// `name = "spec"` or `name = { version = "spec", ... }` tables.
fn collect_version_table(collector: &mut EntryCollector, section: &str, value: &Value) {
    let Some(table) = value.as_table() else {
        collector.reject(format!("`{section}` is not a table"), None);
        return;
    };

    for (name, spec) in table {
        if name.eq_ignore_ascii_case("python") {
            continue;
        }
        match spec {
            Value::String(spec) => collector.push(name, Some(spec)),
            // git/path dependencies have no version key
            Value::Table(details) => {
                collector.push(name, details.get("version").and_then(Value::as_str))
            }
            _ => collector.reject(format!("`{section}.{name}` has an unsupported value"), None),
        }
    }
}

fn strip_comment(line: &str) -> &str {
    let mut previous = ' ';
    for (idx, ch) in line.char_indices() {
        if ch == '#' && previous.is_whitespace() {
            return &line[..idx];
        }
        previous = ch;
    }
    line
}

/// Drops a trailing `\\` continuation and per-requirement options such as
/// `--hash=sha256:...`.
fn strip_options(line: &str) -> &str {
    let line = line.strip_suffix('\\').unwrap_or(line).trim_end();
    let cut = line
        .char_indices()
        .find(|&(idx, ch)| ch.is_whitespace() && line[idx + ch.len_utf8()..].starts_with("--"))
        .map_or(line.len(), |(idx, _)| idx);
    line[..cut].trim_end()
}

fn find_operator(requirement: &str) -> Option<usize> {
    (0..requirement.len())
        .filter(|&idx| requirement.is_char_boundary(idx))
        .find(|&idx| OPERATORS.iter().any(|op| requirement[idx..].starts_with(op)))
}

fn strip_extras(name: &str) -> Result<&str, String> {
    match name.find('[') {
        Some(open) if name.trim_end().ends_with(']') => Ok(&name[..open]),
        Some(_) => Err(format!("unterminated extras in `{name}`")),
        None => Ok(name),
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        }
        _ => false,
    }
}
