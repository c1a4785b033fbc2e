//! Artifact workspace port - where accepted test files live.

use std::io;
use std::path::Path;

use async_trait::async_trait;

/// File storage for test artifacts, addressed by paths relative to the test root.
#[async_trait]
pub trait ArtifactWorkspace: Send + Sync {
    /// Read an artifact; `None` if it does not exist.
    async fn read(&self, relative: &Path) -> io::Result<Option<String>>;

    /// Write an artifact atomically, creating parent directories.
    async fn write(&self, relative: &Path, contents: &str) -> io::Result<()>;

    /// Remove an artifact; removing a missing artifact is not an error.
    async fn remove(&self, relative: &Path) -> io::Result<()>;
}
