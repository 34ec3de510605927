//! Transient script artifacts.
//!
//! An artifact is the file holding one invocation's composed script. Each
//! artifact gets a unique name, so concurrent invocations never share a file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::sandbox::script::ComposedScript;

const ARTIFACT_PREFIX: &str = "gas-sandbox-";

/// The file backing one invocation.
///
/// Call [`ExecutionArtifact::remove`] when the invocation ends. If the
/// artifact is dropped without it (e.g. the invocation future was dropped),
/// the file is removed synchronously in `Drop`.
#[derive(Debug)]
pub struct ExecutionArtifact {
    path: PathBuf,
    removed: bool,
}

impl ExecutionArtifact {
    /// Reserve a unique artifact path inside `dir`. Nothing is written yet.
    pub fn reserve(dir: &Path, extension: &str) -> Self {
        let name = format!("{ARTIFACT_PREFIX}{}.{extension}", Uuid::new_v4().simple());
        Self {
            path: dir.join(name),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the script and wait until it is flushed to disk.
    pub async fn write(&self, script: &ComposedScript) -> Result<()> {
        let mut file = tokio::fs::File::create(&self.path).await?;
        file.write_all(script.render().as_bytes()).await?;
        file.sync_all().await?;
        debug!(path = %self.path.display(), "artifact written");
        Ok(())
    }

    /// Delete the artifact. Failures are logged and never returned.
    pub async fn remove(mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "artifact removed"),
            // nothing was written
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove artifact"),
        }
    }
}

impl Drop for ExecutionArtifact {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove artifact");
            }
        }
    }
}
