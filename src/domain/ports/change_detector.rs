//! Change detector port.

use async_trait::async_trait;

use crate::domain::errors::DetectionError;
use crate::domain::models::SourceUnit;

/// Supplies the source units a run targets. Queried once per run.
#[async_trait]
pub trait ChangeDetector: Send + Sync {
    async fn detect(&self) -> Result<Vec<SourceUnit>, DetectionError>;
}
