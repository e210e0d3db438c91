use std::collections::HashMap;

use async_trait::async_trait;

use super::{FileSource, ManifestFiles};
use crate::error::SourceError;

/// Serves manifests from memory. Unknown repositories are
/// [`SourceError::RepositoryNotFound`].
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    repositories: HashMap<String, ManifestFiles>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a repository with no files.
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repositories.entry(repository.into()).or_default();
        self
    }

    pub fn with_file(
        mut self,
        repository: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.repositories
            .entry(repository.into())
            .or_default()
            .insert(path.into(), content.into());
        self
    }
}

#[async_trait]
impl FileSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_manifests(&self, repository: &str) -> Result<ManifestFiles, SourceError> {
        self.repositories
            .get(repository)
            .cloned()
            .ok_or_else(|| SourceError::RepositoryNotFound(repository.to_string()))
    }
}
