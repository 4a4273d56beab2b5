// cd_engine/src/logging/upload.rs
use async_trait::async_trait;
use std::path::Path;

/// Remote sink for finished log files (blob storage or similar).
///
/// Called with `<log_prefix>/<file>` after the init phase, after every step and after
/// the completion phase. A returned error is logged and otherwise ignored.
#[async_trait]
pub trait LogUploader: Send + Sync {
  async fn upload(&self, path: &Path) -> anyhow::Result<()>;
}
