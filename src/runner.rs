//! External inference process runner
//!
//! The lip-sync model runs in its own process: the argument list goes in, an
//! exit code and an output file come out. [`InferenceEngine`] is the handle
//! the service owns for the lifetime of the server; [`SubprocessEngine`] is
//! the implementation that launches the Python inference script.

use crate::config::ModelVersion;
use crate::error::{LipSyncError, Result};
use crate::invocation::Invocation;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Bytes of process output kept as diagnostics
const DIAGNOSTICS_TAIL_BYTES: usize = 4096;

/// Trait for inference engines
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Run one inference and return the path of the produced video
    ///
    /// # Errors
    /// - `InferenceProcess` when the run fails or leaves no output behind
    async fn run(&self, invocation: &Invocation) -> Result<PathBuf>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Launches the inference script as a child process
#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    program: PathBuf,
    entry_args: Vec<OsString>,
    working_dir: Option<PathBuf>,
}

impl SubprocessEngine {
    /// Create an engine that runs `program` with no leading arguments
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            entry_args: Vec::new(),
            working_dir: None,
        }
    }

    /// Arguments placed before the invocation (e.g. `-m wav2lip.inference`)
    #[must_use]
    pub fn with_entry_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.entry_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Directory the process is started in
    #[must_use]
    pub fn with_working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Full command line, program first
    #[must_use]
    pub fn command_line(&self, invocation: &Invocation) -> Vec<OsString> {
        std::iter::once(self.program.clone().into_os_string())
            .chain(self.entry_args.iter().cloned())
            .chain(invocation.args().iter().cloned())
            .collect()
    }

    /// Log what is missing before the first request arrives
    pub fn preflight(&self, checkpoints_dir: &Path) {
        if let Some(dir) = &self.working_dir {
            if !dir.is_dir() {
                tracing::warn!(working_dir = %dir.display(), "Inference working directory does not exist");
            }
        }
        for version in [ModelVersion::Wav2Lip, ModelVersion::Wav2LipGan] {
            let checkpoint = checkpoints_dir.join(version.checkpoint_file_name());
            if checkpoint.is_file() {
                tracing::info!(checkpoint = %checkpoint.display(), "Found checkpoint");
            } else {
                tracing::warn!(
                    checkpoint = %checkpoint.display(),
                    "Checkpoint missing; requests selecting {} will fail",
                    version.as_str()
                );
            }
        }
    }
}

#[async_trait]
impl InferenceEngine for SubprocessEngine {
    async fn run(&self, invocation: &Invocation) -> Result<PathBuf> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.entry_args)
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        tracing::info!(
            program = %self.program.display(),
            output = %invocation.output_path().display(),
            "🚀 Launching inference process"
        );
        tracing::debug!(command_line = ?self.command_line(invocation), "Inference command line");

        let started = Instant::now();
        let output = command.output().await.map_err(|e| {
            LipSyncError::inference_process(
                None,
                format!("Failed to launch '{}': {}", self.program.display(), e),
            )
        })?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(stdout = %stdout, stderr = %stderr, "Inference process output");

        if !output.status.success() {
            tracing::warn!(
                exit_code = ?output.status.code(),
                elapsed_ms,
                "Inference process exited with failure"
            );
            return Err(LipSyncError::inference_process(
                output.status.code(),
                diagnostics_tail(&stderr, &stdout),
            ));
        }

        verify_output(invocation.output_path()).await.map_err(|reason| {
            LipSyncError::inference_process(
                output.status.code(),
                format!("{}\n{}", reason, diagnostics_tail(&stderr, &stdout)),
            )
        })?;

        tracing::info!(elapsed_ms, "Inference process finished");
        Ok(invocation.output_path().to_path_buf())
    }

    fn name(&self) -> &str {
        "subprocess"
    }
}

/// Check that `path` is a non-empty file
///
/// Returns a description of what is wrong otherwise.
pub async fn verify_output(path: &Path) -> std::result::Result<(), String> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(format!("Output file '{}' is empty", path.display())),
        Err(_) => Err(format!("Output file '{}' was not created", path.display())),
    }
}

/// Last few KiB of stderr, or of stdout when stderr is empty
fn diagnostics_tail(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() {
        stdout
    } else {
        stderr
    };
    let trimmed = source.trim_end();
    if trimmed.len() <= DIAGNOSTICS_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - DIAGNOSTICS_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed.get(start..).unwrap_or_default().to_string()
}
