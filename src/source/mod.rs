//! Manifest file sources.
//!
//! A [`FileSource`] resolves a repository identifier to the raw text of its
//! manifest files, keyed by repository-relative path.
//!
//! | Source | Backing store |
//! |--------|---------------|
//! | [`MemorySource`] | In-memory map, for embedding and tests |
//! | [`DirectorySource`] | A local checkout, walked on disk |

mod directory;
mod memory;

pub use directory::DirectorySource;
pub use memory::MemorySource;

use crate::error::SourceError;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Path to file content for every manifest in a repository.
pub type ManifestFiles = BTreeMap<String, String>;

/// Fetches the manifest files of a repository.
///
/// An empty map means no supported manifest exists; it is not an error.
///
/// # Example
///
/// ```
/// use depshield::source::{FileSource, MemorySource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let source = MemorySource::new()
///     .with_file("acme/web", "package.json", r#"{"dependencies":{}}"#);
/// let files = source.fetch_manifests("acme/web").await.unwrap();
/// assert!(files.contains_key("package.json"));
/// # }
/// ```
#[async_trait]
pub trait FileSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_manifests(&self, repository: &str) -> Result<ManifestFiles, SourceError>;
}
