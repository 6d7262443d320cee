//! Request-scoped working directories
//!
//! Every request stages its uploads in a private directory with a unique
//! name, so concurrent requests never share files and no locking is needed.
//! The directory is removed when the [`RequestWorkspace`] is dropped, on
//! every exit path. On success the output video moves into an
//! [`OutputArtifact`] that keeps the directory alive until the response
//! layer is done with it.

use crate::error::{LipSyncError, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

/// Longest file extension carried over from an upload name
const MAX_EXTENSION_LEN: usize = 10;

/// Private working directory for one request
#[derive(Debug)]
pub struct RequestWorkspace {
    dir: TempDir,
    request_id: Uuid,
}

impl RequestWorkspace {
    /// Create a fresh directory under `root`
    pub fn create(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .map_err(|e| LipSyncError::file_io_error("create work root", root, &e))?;

        let request_id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("wav2lip-{}-", request_id.simple()))
            .tempdir_in(root)
            .map_err(|e| LipSyncError::file_io_error("create request directory", root, &e))?;

        tracing::debug!(request_id = %request_id, dir = %dir.path().display(), "Created request workspace");
        Ok(Self { dir, request_id })
    }

    /// Directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Path the inference process should write the video to
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.dir
            .path()
            .join(format!("output_{}.mp4", self.request_id.simple()))
    }

    /// Write uploaded bytes under a unique name, keeping a sane extension
    pub async fn stage_bytes(
        &self,
        role: &str,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.unique_path(role, original_name.map(Path::new));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| LipSyncError::file_io_error("write staged upload", &path, &e))?;
        tracing::debug!(role, path = %path.display(), bytes = bytes.len(), "Staged upload");
        Ok(path)
    }

    /// Copy an existing file into the workspace under a unique name
    pub async fn stage_file(&self, role: &str, source: &Path) -> Result<PathBuf> {
        let path = self.unique_path(role, Some(source));
        tokio::fs::copy(source, &path)
            .await
            .map_err(|e| LipSyncError::file_io_error("copy input into workspace", source, &e))?;
        Ok(path)
    }

    /// Purge everything but `output` and hand the directory to the artifact
    pub fn into_artifact(self, output: &Path) -> Result<OutputArtifact> {
        if output.parent() != Some(self.dir.path()) {
            return Err(LipSyncError::internal(format!(
                "Output '{}' is not inside the request workspace",
                output.display()
            )));
        }

        let entries = std::fs::read_dir(self.dir.path())
            .map_err(|e| LipSyncError::file_io_error("list request directory", self.dir.path(), &e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path == output {
                continue;
            }
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = removed {
                // the directory itself goes when the artifact is dropped
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove intermediate file");
            }
        }

        Ok(OutputArtifact {
            path: output.to_path_buf(),
            dir: self.dir,
        })
    }

    fn unique_path(&self, role: &str, original: Option<&Path>) -> PathBuf {
        let extension = original
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .filter(|ext| {
                !ext.is_empty()
                    && ext.len() <= MAX_EXTENSION_LEN
                    && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_default();
        self.dir
            .path()
            .join(format!("{}_{}{}", role, Uuid::new_v4().simple(), extension))
    }
}

/// Generated video waiting to be delivered.
///
/// Dropping the artifact deletes the file and its request directory.
#[derive(Debug)]
pub struct OutputArtifact {
    path: PathBuf,
    dir: TempDir,
}

impl OutputArtifact {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Request directory that will be removed with the artifact
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.dir.path()
    }

    /// Size of the video in bytes
    pub async fn len(&self) -> Result<u64> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| LipSyncError::file_io_error("stat output video", &self.path, &e))?;
        Ok(meta.len())
    }

    /// Open the video for streaming
    pub async fn open(&self) -> Result<tokio::fs::File> {
        tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| LipSyncError::file_io_error("open output video", &self.path, &e))
    }

    /// Move the video to `destination`, consuming the artifact
    pub async fn persist_to(self, destination: &Path) -> Result<PathBuf> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LipSyncError::file_io_error("create output directory", parent, &e))?;
        }
        if tokio::fs::rename(&self.path, destination).await.is_err() {
            // rename fails across filesystems
            tokio::fs::copy(&self.path, destination)
                .await
                .map_err(|e| LipSyncError::file_io_error("copy output video", destination, &e))?;
        }
        Ok(destination.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|it| it.flatten().map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_workspace_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(root.path()).unwrap();
        let dir = workspace.path().to_path_buf();
        workspace.stage_bytes("face", Some("me.png"), b"png").await.unwrap();
        assert!(dir.exists());

        drop(workspace);
        assert!(!dir.exists());
        assert!(entries(root.path()).is_empty());
    }

    #[tokio::test]
    async fn test_staged_names_are_unique_and_sanitized() {
        let root = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(root.path()).unwrap();

        let a = workspace.stage_bytes("face", Some("photo.JPG"), b"1").await.unwrap();
        let b = workspace.stage_bytes("face", Some("photo.JPG"), b"2").await.unwrap();
        let c = workspace
            .stage_bytes("audio", Some("../../etc/passwd.w/a v"), b"3")
            .await
            .unwrap();
        let d = workspace.stage_bytes("audio", None, b"4").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(a.extension().unwrap(), "jpg");
        assert_eq!(c.parent().unwrap(), workspace.path());
        assert!(c.extension().is_none());
        assert!(d.file_name().unwrap().to_string_lossy().starts_with("audio_"));
    }

    #[tokio::test]
    async fn test_into_artifact_keeps_only_output() {
        let root = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(root.path()).unwrap();
        let face = workspace.stage_bytes("face", Some("f.png"), b"png").await.unwrap();
        let audio = workspace.stage_bytes("audio", Some("a.wav"), b"wav").await.unwrap();
        std::fs::create_dir(workspace.path().join("temp")).unwrap();
        let output = workspace.output_path();
        std::fs::write(&output, b"mp4").unwrap();

        let artifact = workspace.into_artifact(&output).unwrap();
        assert!(!face.exists());
        assert!(!audio.exists());
        assert_eq!(entries(artifact.directory()), vec![output.clone()]);
        assert_eq!(artifact.len().await.unwrap(), 3);

        let dir = artifact.directory().to_path_buf();
        drop(artifact);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_into_artifact_rejects_foreign_output() {
        let root = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(root.path()).unwrap();
        let dir = workspace.path().to_path_buf();

        let err = workspace
            .into_artifact(Path::new("/tmp/elsewhere.mp4"))
            .unwrap_err();
        assert!(matches!(err, LipSyncError::Internal(_)));
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_persist_to_moves_video() {
        let root = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(root.path()).unwrap();
        let output = workspace.output_path();
        std::fs::write(&output, b"mp4").unwrap();

        let artifact = workspace.into_artifact(&output).unwrap();
        let dest = out_dir.path().join("nested").join("clip_Easy-Wav2Lip.mp4");
        let saved = artifact.persist_to(&dest).await.unwrap();

        assert_eq!(std::fs::read(saved).unwrap(), b"mp4");
        assert!(entries(root.path()).is_empty());
    }
}
