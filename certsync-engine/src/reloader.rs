use async_trait::async_trait;
use certsync_core::DesiredState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ReloadError {
    #[error("reload failed: {0}")]
    Failed(String),

    #[error("reload timed out after {0:?}")]
    Timeout(Duration),

    #[error("reload I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Regenerates and applies the static proxy configuration.
///
/// Only called for structural changes. Implementations may be slow; the
/// engine bounds every call with the configured reload timeout.
#[async_trait]
pub trait ConfigReloader: Send + Sync {
    async fn reload(&self, desired: &DesiredState) -> Result<(), ReloadError>;

    fn name(&self) -> &'static str;
}

/// Standalone mode: there is no external proxy, so reloads always succeed.
#[derive(Debug, Default, Clone)]
pub struct NoopReloader;

#[async_trait]
impl ConfigReloader for NoopReloader {
    async fn reload(&self, _desired: &DesiredState) -> Result<(), ReloadError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Renders the snapshot as JSON and runs an external reload command.
///
/// The file is written to a sibling temp path and renamed into place so the
/// command never reads a partial file. A non-zero exit status is a failure.
/// The child is killed if the engine gives up waiting.
#[derive(Debug, Clone)]
pub struct CommandReloader {
    rendered_path: PathBuf,
    command: Vec<String>,
}

impl CommandReloader {
    pub fn new(rendered_path: impl Into<PathBuf>, command: Vec<String>) -> Self {
        Self {
            rendered_path: rendered_path.into(),
            command,
        }
    }

    async fn render(&self, desired: &DesiredState) -> Result<(), ReloadError> {
        let json = serde_json::to_vec_pretty(desired)
            .map_err(|e| ReloadError::Failed(format!("rendering snapshot: {e}")))?;
        if let Some(dir) = self.rendered_path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.rendered_path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.rendered_path).await?;
        debug!(path = %self.rendered_path.display(), "Rendered desired state");
        Ok(())
    }
}

#[async_trait]
impl ConfigReloader for CommandReloader {
    async fn reload(&self, desired: &DesiredState) -> Result<(), ReloadError> {
        self.render(desired).await?;

        let Some((program, args)) = self.command.split_first() else {
            return Ok(());
        };

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReloadError::Failed(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        info!(command = %program, "Reload command completed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
