use super::EntryCollector;
use crate::error::MalformedManifest;
use crate::model::{Ecosystem, ManifestEntry};

/// Reads `require` directives from a `go.mod`, in both the single-line and the
/// block form. Requirements marked `// indirect` are transitive and skipped;
/// `replace`, `exclude` and other blocks are ignored.
pub fn parse_go_mod(content: &str) -> Result<Vec<ManifestEntry>, MalformedManifest> {
    let mut collector = EntryCollector::new(Ecosystem::Go);
    let mut block = Block::None;

    for (idx, raw) in content.lines().enumerate() {
        let indirect = raw.contains("// indirect");
        let line = raw.split("//").next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        match block {
            Block::Require | Block::Other if line == ")" => block = Block::None,
            Block::Require => {
                if !indirect {
                    push_requirement(&mut collector, line, idx + 1);
                }
            }
            Block::Other => {}
            Block::None => {
                let mut words = line.splitn(2, char::is_whitespace);
                let directive = words.next().unwrap_or_default();
                let rest = words.next().unwrap_or_default().trim();

                if let Some(directive) = directive.strip_suffix('(') {
                    // `require(` with no space before the paren
                    block = if directive == "require" { Block::Require } else { Block::Other };
                } else if rest == "(" {
                    block = if directive == "require" { Block::Require } else { Block::Other };
                } else if directive == "require" && !indirect {
                    push_requirement(&mut collector, rest, idx + 1);
                }
            }
        }
    }

    collector.finish()
}

#[derive(Clone, Copy)]
enum Block {
    None,
    Require,
    Other,
}

fn push_requirement(collector: &mut EntryCollector, line: &str, line_no: usize) {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [module, version] => collector.push(module, Some(version)),
        _ => collector.reject(format!("invalid require `{line}`"), Some(line_no)),
    }
}
