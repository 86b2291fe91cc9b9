//! Renderer that shells out to an external program.

use crate::{PageRenderer, SnapshotError, SnapshotResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

const ARTIFACT_PLACEHOLDER: &str = "{artifact}";
const PAGE_PLACEHOLDER: &str = "{page}";

/// Runs `program args...` and treats its stdout as the raster image.
///
/// `{artifact}` and `{page}` inside any argument are replaced with the
/// artifact path and page id before the program is spawned.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> SnapshotResult<Self> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(SnapshotError::InvalidConfig(
                "Render program cannot be empty".to_string(),
            ));
        }
        Ok(Self { program, args })
    }

    fn expand_args(&self, artifact: &Path, page_id: &str) -> Vec<String> {
        let artifact = artifact.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(ARTIFACT_PLACEHOLDER, &artifact)
                    .replace(PAGE_PLACEHOLDER, page_id)
            })
            .collect()
    }
}

#[async_trait]
impl PageRenderer for CommandRenderer {
    async fn render(&self, artifact: &Path, page_id: &str) -> SnapshotResult<Vec<u8>> {
        let args = self.expand_args(artifact, page_id);
        debug!("Rendering snapshot: {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await?;

        let fail = |message: String| SnapshotError::RenderFailed {
            artifact: artifact.to_path_buf(),
            page_id: page_id.to_string(),
            message,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Renderer exited with {}: {}", output.status, stderr.trim());
            return Err(fail(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(fail(format!("{} produced no output", self.program)));
        }

        Ok(output.stdout)
    }
}
