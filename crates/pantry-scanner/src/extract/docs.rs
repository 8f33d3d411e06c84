//! Documentation rendering

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::DocError;

/// Renders the API documentation of an unpacked module
#[async_trait]
pub trait DocRenderer: Send + Sync {
    async fn render(&self, module_root: &Path) -> Result<String, DocError>;
}

/// Runs an external command (`go doc -all` by default) inside the module root
/// and returns its standard output
#[derive(Debug, Clone)]
pub struct CommandDocRenderer {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandDocRenderer {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl DocRenderer for CommandDocRenderer {
    async fn render(&self, module_root: &Path) -> Result<String, DocError> {
        let (program, args) = self.command.split_first().ok_or(DocError::NotConfigured)?;
        debug!(program = %program, dir = %module_root.display(), "Rendering documentation");

        let mut command = Command::new(program);
        command.args(args).current_dir(module_root).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| DocError::Timeout {
                program: program.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| DocError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DocError::Failed {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
