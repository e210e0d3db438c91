use super::EntryCollector;
use crate::error::MalformedManifest;
use crate::model::{Ecosystem, ManifestEntry};

/// Indentation of a top-level gem inside `specs:`. Deeper lines are the gem's
/// own dependencies.
const GEM_INDENT: usize = 4;

/// Reads the pinned gems listed under `GEM` / `specs:` in a `Gemfile.lock`.
///
/// ```text
/// GEM
///   remote: https://rubygems.org/
///   specs:
///     rack (2.2.6)
///     rails (7.0.4)
///       actionpack (= 7.0.4)
/// ```
pub fn parse_gemfile_lock(content: &str) -> Result<Vec<ManifestEntry>, MalformedManifest> {
    let mut collector = EntryCollector::new(Ecosystem::Rubygems);
    let mut section = "";
    let mut in_specs = false;

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            in_specs = false;
            continue;
        }

        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent == 0 {
            section = line.trim();
            in_specs = false;
            continue;
        }

        if section != "GEM" {
            continue;
        }

        if !in_specs {
            in_specs = line.trim() == "specs:";
            continue;
        }

        match indent {
            GEM_INDENT => match parse_spec_line(line.trim()) {
                Some((name, version)) => collector.push(name, Some(version)),
                None => collector.reject(format!("invalid gem spec `{}`", line.trim()), Some(idx + 1)),
            },
            i if i > GEM_INDENT => {}
            _ => in_specs = false,
        }
    }

    collector.finish()
}

/// `name (version)`
fn parse_spec_line(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = line.split_once(" (")?;
    let version = rest.strip_suffix(')')?.trim();

    if name.is_empty() || name.contains(char::is_whitespace) || version.is_empty() {
        return None;
    }
    Some((name, version))
}
