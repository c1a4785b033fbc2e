//! In-memory artifact workspace.
//!
//! Used by tests and simulations where nothing should touch the real test
//! tree.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ArtifactWorkspace;

/// Workspace that keeps artifacts in a map. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkspace {
    files: Arc<RwLock<BTreeMap<PathBuf, String>>>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored artifact.
    pub async fn files(&self) -> BTreeMap<PathBuf, String> {
        self.files.read().await.clone()
    }
}

#[async_trait]
impl ArtifactWorkspace for InMemoryWorkspace {
    async fn read(&self, relative: &Path) -> io::Result<Option<String>> {
        Ok(self.files.read().await.get(relative).cloned())
    }

    async fn write(&self, relative: &Path, contents: &str) -> io::Result<()> {
        self.files
            .write()
            .await
            .insert(relative.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn remove(&self, relative: &Path) -> io::Result<()> {
        self.files.write().await.remove(relative);
        Ok(())
    }
}
