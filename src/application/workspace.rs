//! Per-job scratch space and staged publication of the final artifact.
//!
//! Both types release their files on drop, so every exit path of a job
//! (success, typed failure, panic or a dropped future) leaves nothing behind.

use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};
use tracing::warn;

/// Private directory for one job's segments, manifest and intermediates.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Creates `<temp_root>/job-<job_id>-XXXXXX`.
    pub fn create(temp_root: &Path, job_id: &str) -> Result<Self> {
        std::fs::create_dir_all(temp_root).map_err(|e| {
            PipelineError::workspace(format!("creating {}", temp_root.display()), e)
        })?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job_id))
            .tempdir_in(temp_root)
            .map_err(|e| PipelineError::workspace("creating job workspace", e))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the workspace now, reporting failures instead of ignoring them.
    pub fn close(self) -> Result<()> {
        self.dir
            .close()
            .map_err(|e| PipelineError::workspace("removing job workspace", e))
    }
}

/// The final artifact while it is being produced. It lives next to the
/// destination under a hidden name and only appears at the destination
/// through an atomic rename in [`StagedOutput::publish`].
#[derive(Debug)]
pub struct StagedOutput {
    staged: TempPath,
    target: PathBuf,
    dir: PathBuf,
}

impl StagedOutput {
    pub fn new(target: &Path, job_id: &str) -> Result<Self> {
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| {
            PipelineError::workspace(format!("creating {}", parent.display()), e)
        })?;

        let stem = target
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("output"));
        let extension = target
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("wav"));
        // Keep the real extension last; ffmpeg and the processor pick the
        // container from it.
        let staged = parent.join(format!(".{}.{}.partial.{}", stem, job_id, extension));

        Ok(Self {
            staged: TempPath::from_path(staged),
            target: target.to_path_buf(),
            dir: parent,
        })
    }

    pub fn path(&self) -> &Path {
        &self.staged
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flushes the staged file to disk, renames it onto the target and
    /// flushes the directory so the rename survives a crash.
    pub async fn publish(self) -> Result<PathBuf> {
        let file = tokio::fs::File::open(self.path())
            .await
            .map_err(|e| PipelineError::workspace("opening staged output", e))?;
        file.sync_all()
            .await
            .map_err(|e| PipelineError::workspace("flushing staged output", e))?;
        drop(file);

        let StagedOutput {
            staged,
            target,
            dir,
        } = self;
        staged
            .persist(&target)
            .map_err(|e| PipelineError::workspace("publishing output", e.error))?;

        // The output is already in place; a failed directory flush only
        // weakens durability.
        if let Err(e) = sync_dir(&dir).await {
            warn!(dir = %dir.display(), "could not flush output directory: {}", e);
        }
        Ok(target)
    }
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn workspaces_are_unique_and_removed_on_drop() {
        let root = tempdir().unwrap();
        let a = JobWorkspace::create(root.path(), "same").unwrap();
        let b = JobWorkspace::create(root.path(), "same").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));

        std::fs::write(a.path().join("raw_000.wav"), b"x").unwrap();
        drop(a);
        b.close().unwrap();

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn workspace_root_is_created() {
        let root = tempdir().unwrap();
        let nested = root.path().join("temp").join("jobs");
        let workspace = JobWorkspace::create(&nested, "j1").unwrap();
        assert!(workspace.path().is_dir());
    }

    #[test]
    fn staged_output_is_hidden_and_keeps_extension() {
        let root = tempdir().unwrap();
        let target = root.path().join("processed_show.wav");
        let staged = StagedOutput::new(&target, "abc").unwrap();

        let name = staged.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with('.'));
        assert!(name.ends_with(".wav"));
        assert_eq!(staged.path().parent(), Some(root.path()));
        assert_eq!(staged.target(), target.as_path());
    }

    #[test]
    fn unpublished_output_is_removed_on_drop() {
        let root = tempdir().unwrap();
        let target = root.path().join("out.wav");
        let staged = StagedOutput::new(&target, "abc").unwrap();
        std::fs::write(staged.path(), b"partial").unwrap();
        let staged_path = staged.path().to_path_buf();

        drop(staged);

        assert!(!staged_path.exists());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn publish_moves_file_onto_target() {
        let root = tempdir().unwrap();
        let target = root.path().join("out.wav");
        let staged = StagedOutput::new(&target, "abc").unwrap();
        std::fs::write(staged.path(), b"complete").unwrap();

        let published = staged.publish().await.unwrap();

        assert_eq!(published, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"complete");
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn output_directory_can_be_flushed() {
        let root = tempdir().unwrap();
        sync_dir(root.path()).await.unwrap();
    }

    #[tokio::test]
    async fn publish_into_nested_target_directory() {
        let root = tempdir().unwrap();
        let target = root.path().join("nested").join("out.wav");
        let staged = StagedOutput::new(&target, "abc").unwrap();
        assert_eq!(staged.dir, root.path().join("nested"));
        std::fs::write(staged.path(), b"complete").unwrap();

        staged.publish().await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"complete");
    }

    #[tokio::test]
    async fn publish_without_file_fails() {
        let root = tempdir().unwrap();
        let target = root.path().join("out.wav");
        let staged = StagedOutput::new(&target, "abc").unwrap();

        let err = staged.publish().await.unwrap_err();
        assert_eq!(err.kind(), "workspace_error");
        assert!(!target.exists());
    }
}
