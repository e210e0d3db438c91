use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::{FileSource, ManifestFiles};
use crate::config::DEFAULT_SKIP_DIRECTORIES;
use crate::error::SourceError;
use crate::parser::ManifestKind;

const MAX_DEPTH: usize = 12;

/// Reads manifests from a local checkout. The repository identifier is a
/// directory path.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    skip_directories: Vec<String>,
}

impl Default for DirectorySource {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_DIRECTORIES.iter().map(|d| d.to_string()).collect())
    }
}

impl DirectorySource {
    /// `skip_directories` are prefixes such as `"node_modules/"`; a directory
    /// is skipped when its name followed by `/` matches one.
    pub fn new(skip_directories: Vec<String>) -> Self {
        Self { skip_directories }
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        let Some(name) = entry.file_name().to_str() else {
            return true;
        };
        let name = format!("{name}/");
        self.skip_directories.iter().any(|skip| *skip == name)
    }

    fn collect(&self, root: &Path) -> Result<ManifestFiles, SourceError> {
        let mut files = ManifestFiles::new();

        let walker = WalkDir::new(root)
            .max_depth(MAX_DEPTH)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !self.is_skipped(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative) = relative_path(root, entry.path()) else {
                continue;
            };
            if ManifestKind::from_path(&relative).is_none() {
                continue;
            }

            let bytes = fs::read(entry.path()).map_err(|source| SourceError::Io {
                path: entry.path().display().to_string(),
                source,
            })?;
            let Some(content) = decode_manifest(&bytes) else {
                warn!(path = %relative, "skipping manifest with unsupported encoding");
                continue;
            };
            debug!(path = %relative, "found manifest");
            files.insert(relative, content);
        }

        Ok(files)
    }
}

/// Decodes UTF-8 (with or without a BOM) and BOM-marked UTF-16.
fn decode_manifest(bytes: &[u8]) -> Option<String> {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8(rest.to_vec()).ok();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    String::from_utf8(bytes.to_vec()).ok()
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// Forward-slash path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.iter().map(|part| part.to_str()).collect();
    Some(parts?.join("/"))
}

#[async_trait]
impl FileSource for DirectorySource {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn fetch_manifests(&self, repository: &str) -> Result<ManifestFiles, SourceError> {
        let root = PathBuf::from(repository);
        if !root.is_dir() {
            return Err(SourceError::RepositoryNotFound(repository.to_string()));
        }

        let source = self.clone();
        tokio::task::spawn_blocking(move || source.collect(&root))
            .await
            .map_err(|err| SourceError::Io {
                path: repository.to_string(),
                source: std::io::Error::other(err.to_string()),
            })?
    }
}
