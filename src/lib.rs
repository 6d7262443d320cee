#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Wav2Lip Server
//!
//! HTTP service and library that turn a face image and a voice track into a
//! lip-synchronized video by driving an external Wav2Lip inference process.
//!
//! The crate owns the translation from a user-facing configuration to the
//! inference command line and the lifecycle of each run:
//!
//! - **Configuration**: validated [`Wav2LipConfig`] with grouped `OPTIONS`,
//!   `PADDING`, `MASK` and `OTHER` settings and a JSON schema
//! - **Parameter derivation**: resolution scaling, padding scaling, mask
//!   feathering remap and output-suffix composition ([`params`])
//! - **Invocation**: deterministic argument list for the inference script
//! - **Process runner**: launch, wait, detect success or failure
//! - **Scoped cleanup**: every request works in its own directory that is
//!   removed on every exit path
//! - **HTTP API**: axum router with multipart upload and streamed download
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wav2lip_server::{LipSyncService, ServerSettings, Wav2LipConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = ServerSettings::builder()
//!     .checkpoints_dir("checkpoints")
//!     .build()?;
//! let service = LipSyncService::new(Arc::new(settings.subprocess_engine()), &settings);
//!
//! let config = Wav2LipConfig::builder().build()?;
//! let video = service
//!     .render_files("face.png".as_ref(), "voice.wav".as_ref(), &config, "out".as_ref())
//!     .await?;
//! println!("saved {}", video.display());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface and tracing subscriber setup
//! - `webp-support` (default): WebP face images
//! - `video-support`: probe video faces through FFmpeg
//! - `tracing-json`, `tracing-files`: JSON and file log output

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod invocation;
pub mod params;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod server;
pub mod service;
pub mod settings;
pub mod tracing_config;
pub mod workspace;

pub use config::{
    DefaultProfile, MaskConfig, ModelVersion, OptionsConfig, OtherConfig, OutputHeight,
    PaddingConfig, PreviewWindow, Quality, ResolutionScale, Wav2LipConfig, Wav2LipConfigBuilder,
};
pub use error::{LipSyncError, Result, ValidationError};
pub use invocation::{Invocation, InvocationBuilder};
pub use params::{derive, ResolvedParams, ScaledPadding};
pub use probe::{DefaultProber, ImageProber, MediaProbe, MediaProber};
pub use progress::{
    NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate,
    TracingProgressReporter,
};
pub use runner::{InferenceEngine, SubprocessEngine};
pub use server::{app_router, AppState};
pub use service::{GenerateRequest, GeneratedVideo, LipSyncService, Upload};
pub use settings::{ServerSettings, ServerSettingsBuilder};
pub use workspace::{OutputArtifact, RequestWorkspace};

#[cfg(feature = "video-support")]
pub use probe::FfmpegProber;
