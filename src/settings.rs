//! Server-level settings
//!
//! Everything the process needs to know that is not part of a per-request
//! [`Wav2LipConfig`](crate::config::Wav2LipConfig): where to listen, where
//! checkpoints live, where request directories go and how the inference
//! script is launched.

use crate::error::{LipSyncError, Result};
use crate::runner::SubprocessEngine;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;

/// Default interpreter used for the inference script
pub const DEFAULT_PYTHON: &str = "python3";

/// Default arguments placed between the interpreter and the invocation
pub const DEFAULT_ENTRY_ARGS: [&str; 2] = ["-m", "wav2lip.inference"];

/// Default upload size limit for one multipart request (100 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Process-wide settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Address to bind the HTTP listener to
    pub bind_address: IpAddr,
    /// HTTP port
    pub port: u16,
    /// Directory the inference process runs in
    pub work_root: PathBuf,
    /// Directory holding `Wav2Lip.pth` and `Wav2Lip_GAN.pth`
    pub checkpoints_dir: PathBuf,
    /// Parent of the per-request working directories
    pub temp_dir: PathBuf,
    /// Interpreter executable
    pub python_executable: PathBuf,
    /// Arguments placed before the invocation arguments
    pub entry_args: Vec<String>,
    /// Maximum accepted request body in bytes
    pub max_upload_bytes: usize,
}

impl ServerSettings {
    #[must_use]
    pub fn builder() -> ServerSettingsBuilder {
        ServerSettingsBuilder::new()
    }

    /// Socket address to listen on
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Check invariants that the type system does not
    ///
    /// # Errors
    /// - `Validation` naming the offending setting
    pub fn validate(&self) -> Result<()> {
        if self.python_executable.as_os_str().is_empty() {
            return Err(LipSyncError::validation(
                "python_executable",
                "must not be empty",
            ));
        }
        if self.checkpoints_dir.as_os_str().is_empty() {
            return Err(LipSyncError::validation("checkpoints_dir", "must not be empty"));
        }
        if self.temp_dir.as_os_str().is_empty() {
            return Err(LipSyncError::validation("temp_dir", "must not be empty"));
        }
        if self.max_upload_bytes == 0 {
            return Err(LipSyncError::validation(
                "max_upload_bytes",
                "must be greater than 0",
            ));
        }
        if self.entry_args.iter().any(String::is_empty) {
            return Err(LipSyncError::validation(
                "entry_args",
                "must not contain empty arguments",
            ));
        }
        Ok(())
    }

    /// Anchor a relative `checkpoints_dir` at `work_root`, where the
    /// inference process resolves it
    fn anchor_checkpoints_dir(&mut self) -> Result<()> {
        if self.checkpoints_dir.is_relative() {
            let mut anchored = self.work_root.join(&self.checkpoints_dir);
            if anchored.is_relative() {
                anchored = std::env::current_dir()?.join(anchored);
            }
            self.checkpoints_dir = anchored;
        }
        Ok(())
    }

    /// Engine that launches the configured inference command
    #[must_use]
    pub fn subprocess_engine(&self) -> SubprocessEngine {
        SubprocessEngine::new(self.python_executable.clone())
            .with_entry_args(self.entry_args.iter().cloned())
            .with_working_dir(self.work_root.clone())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            work_root: PathBuf::from("."),
            checkpoints_dir: PathBuf::from("checkpoints"),
            temp_dir: std::env::temp_dir().join("wav2lip-requests"),
            python_executable: PathBuf::from(DEFAULT_PYTHON),
            entry_args: DEFAULT_ENTRY_ARGS.iter().map(|s| (*s).to_string()).collect(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Builder for [`ServerSettings`]
#[derive(Debug, Clone)]
pub struct ServerSettingsBuilder {
    settings: ServerSettings,
}

impl ServerSettingsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: ServerSettings::default(),
        }
    }

    #[must_use]
    pub fn bind_address(mut self, address: IpAddr) -> Self {
        self.settings.bind_address = address;
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    #[must_use]
    pub fn work_root<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.settings.work_root = dir.into();
        self
    }

    #[must_use]
    pub fn checkpoints_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.settings.checkpoints_dir = dir.into();
        self
    }

    #[must_use]
    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.settings.temp_dir = dir.into();
        self
    }

    #[must_use]
    pub fn python_executable<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.settings.python_executable = program.into();
        self
    }

    #[must_use]
    pub fn entry_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.entry_args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.settings.max_upload_bytes = bytes;
        self
    }

    /// Build and validate
    ///
    /// A relative `checkpoints_dir` becomes an absolute path under `work_root`.
    pub fn build(self) -> Result<ServerSettings> {
        let mut settings = self.settings;
        settings.validate()?;
        settings.anchor_checkpoints_dir()?;
        Ok(settings)
    }
}

impl Default for ServerSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
