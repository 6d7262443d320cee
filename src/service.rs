//! Request orchestration
//!
//! [`LipSyncService`] drives one generation from uploads to a finished
//! video: media-type check, staging, probing, parameter derivation,
//! invocation, process run and output hand-off. Every request runs in its
//! own [`RequestWorkspace`], so failures anywhere in the pipeline leave
//! nothing behind.

use crate::config::{DefaultProfile, Wav2LipConfig};
use crate::error::{LipSyncError, Result};
use crate::invocation::InvocationBuilder;
use crate::params::{derive, ResolvedParams};
use crate::probe::{DefaultProber, MediaProber};
use crate::progress::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker};
use crate::runner::{verify_output, InferenceEngine};
use crate::settings::ServerSettings;
use crate::tracing_config::{events, spans};
use crate::workspace::{OutputArtifact, RequestWorkspace};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// One uploaded file
#[derive(Debug, Clone, Default)]
pub struct Upload {
    /// Client-side file name, used only for its extension
    pub filename: Option<String>,
    /// Declared MIME type
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new<S: Into<String>>(filename: Option<S>, content_type: Option<S>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.map(Into::into),
            content_type: content_type.map(Into::into),
            bytes,
        }
    }

    /// Name used for staging; falls back to the MIME type's usual image
    /// extension so the prober can recognize files uploaded without one
    fn staging_name(&self) -> Option<String> {
        let has_extension = self
            .filename
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .is_some();
        if has_extension {
            return self.filename.clone();
        }
        image::ImageFormat::from_mime_type(self.essence())
            .and_then(|format| format.extensions_str().first())
            .map(|ext| format!("upload.{}", ext))
            .or_else(|| self.filename.clone())
    }

    /// MIME type without parameters, lower-cased
    fn essence(&self) -> String {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// Inputs of one generation request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Face image (or video)
    pub image: Upload,
    /// Voice track
    pub audio: Upload,
    /// Configuration; the service's default profile when absent
    pub config: Option<Wav2LipConfig>,
}

/// Successful generation result
#[derive(Debug)]
pub struct GeneratedVideo {
    /// Video file, deleted when dropped
    pub artifact: OutputArtifact,
    /// Download name, `lip_sync_video_{quality}_{uuid}.mp4`
    pub filename: String,
    /// Suffix composed from the configuration
    pub output_suffix: String,
}

/// Reject uploads whose declared types cannot be face or voice media
///
/// # Errors
/// - `UnsupportedMediaType` naming the offending upload
pub fn check_media_types(image: &Upload, audio: &Upload) -> Result<()> {
    if !image.essence().starts_with("image/") {
        return Err(LipSyncError::unsupported_media_type(format!(
            "Image must be an image file (got '{}')",
            image.content_type.as_deref().unwrap_or("none")
        )));
    }
    let voice = audio.essence();
    if !voice.starts_with("audio/") && !voice.starts_with("video/") {
        return Err(LipSyncError::unsupported_media_type(format!(
            "Audio must be an audio or video file (got '{}')",
            audio.content_type.as_deref().unwrap_or("none")
        )));
    }
    Ok(())
}

/// Download name for a generated video
#[must_use]
pub fn response_filename(config: &Wav2LipConfig) -> String {
    format!(
        "lip_sync_video_{}_{}.mp4",
        config.options.quality.as_str().to_lowercase(),
        Uuid::new_v4()
    )
}

/// Lip-sync generation service
pub struct LipSyncService {
    engine: Arc<dyn InferenceEngine>,
    prober: Arc<dyn MediaProber>,
    reporter: Arc<dyn ProgressReporter>,
    temp_dir: PathBuf,
    checkpoints_dir: PathBuf,
    default_profile: DefaultProfile,
}

impl LipSyncService {
    /// Service with the default prober, no progress reporting and the API
    /// default profile
    pub fn new(engine: Arc<dyn InferenceEngine>, settings: &ServerSettings) -> Self {
        Self {
            engine,
            prober: Arc::new(DefaultProber),
            reporter: Arc::new(NoOpProgressReporter),
            temp_dir: settings.temp_dir.clone(),
            checkpoints_dir: settings.checkpoints_dir.clone(),
            default_profile: DefaultProfile::Api,
        }
    }

    #[must_use]
    pub fn with_prober(mut self, prober: Arc<dyn MediaProber>) -> Self {
        self.prober = prober;
        self
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Profile used when a request carries no configuration
    #[must_use]
    pub fn with_default_profile(mut self, profile: DefaultProfile) -> Self {
        self.default_profile = profile;
        self
    }

    #[must_use]
    pub fn default_profile(&self) -> DefaultProfile {
        self.default_profile
    }

    /// Default configuration for requests that omit one
    #[must_use]
    pub fn default_config(&self) -> Wav2LipConfig {
        Wav2LipConfig::for_profile(self.default_profile)
    }

    #[must_use]
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Generate a video from uploaded media
    ///
    /// # Errors
    /// - `UnsupportedMediaType` before anything touches the disk
    /// - `Validation` for an invalid configuration
    /// - `MediaProbe` when the face input cannot be probed
    /// - `InferenceProcess` when the model run fails
    pub async fn generate(&self, request: GenerateRequest) -> Result<GeneratedVideo> {
        let config = request.config.clone().unwrap_or_else(|| self.default_config());
        let request_id = Uuid::new_v4().to_string();
        let span = spans::request(&request_id, config.options.quality.as_str());

        let mut tracker = ProgressTracker::new(self.reporter.clone());
        let result = self
            .generate_tracked(request, config, &mut tracker)
            .instrument(span)
            .await;
        self.finish(&mut tracker, &result);
        result
    }

    async fn generate_tracked(
        &self,
        request: GenerateRequest,
        config: Wav2LipConfig,
        tracker: &mut ProgressTracker,
    ) -> Result<GeneratedVideo> {
        tracker.report_stage(ProcessingStage::MediaTypeCheck);
        check_media_types(&request.image, &request.audio)?;
        config.validate()?;

        tracker.report_stage(ProcessingStage::Staging);
        let workspace = RequestWorkspace::create(&self.temp_dir)?;
        let face = workspace
            .stage_bytes("face", request.image.staging_name().as_deref(), &request.image.bytes)
            .await?;
        let audio = workspace
            .stage_bytes("audio", request.audio.filename.as_deref(), &request.audio.bytes)
            .await?;

        let (artifact, params) = self
            .run_pipeline(workspace, &face, &audio, &config, tracker)
            .await?;

        Ok(GeneratedVideo {
            artifact,
            filename: response_filename(&config),
            output_suffix: params.output_suffix,
        })
    }

    /// Render on-disk inputs into `output_dir` as `<face stem><suffix>.mp4`
    ///
    /// # Errors
    /// Same as [`generate`](Self::generate), plus `Io` when the inputs
    /// cannot be read or the result cannot be written
    pub async fn render_files(
        &self,
        face: &Path,
        audio: &Path,
        config: &Wav2LipConfig,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let mut tracker = ProgressTracker::new(self.reporter.clone());
        let result = self
            .render_tracked(face, audio, config, output_dir, &mut tracker)
            .instrument(spans::render(face, audio))
            .await;
        self.finish(&mut tracker, &result);
        result
    }

    async fn render_tracked(
        &self,
        face: &Path,
        audio: &Path,
        config: &Wav2LipConfig,
        output_dir: &Path,
        tracker: &mut ProgressTracker,
    ) -> Result<PathBuf> {
        tracker.report_stage(ProcessingStage::MediaTypeCheck);
        config.validate()?;
        for input in [face, audio] {
            if !input.is_file() {
                return Err(LipSyncError::invalid_media(format!(
                    "Input '{}' does not exist",
                    input.display()
                )));
            }
        }

        tracker.report_stage(ProcessingStage::Staging);
        let workspace = RequestWorkspace::create(&self.temp_dir)?;
        let staged_face = workspace.stage_file("face", face).await?;
        let staged_audio = workspace.stage_file("audio", audio).await?;

        let (artifact, params) = self
            .run_pipeline(workspace, &staged_face, &staged_audio, config, tracker)
            .await?;

        let stem = face
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let destination = output_dir.join(format!("{}{}.mp4", stem, params.output_suffix));
        artifact.persist_to(&destination).await
    }

    /// Probe, derive, invoke and collect the output of one staged request
    async fn run_pipeline(
        &self,
        workspace: RequestWorkspace,
        face: &Path,
        audio: &Path,
        config: &Wav2LipConfig,
        tracker: &mut ProgressTracker,
    ) -> Result<(OutputArtifact, ResolvedParams)> {
        tracker.report_stage(ProcessingStage::Probing);
        let probe = self.prober.probe(face).await?;
        tracing::debug!(
            width = probe.width,
            height = probe.height,
            fps = probe.fps,
            "Face input probed"
        );

        tracker.report_stage(ProcessingStage::ParameterDerivation);
        let params = derive(config, &probe, &self.checkpoints_dir)?;
        let invocation = InvocationBuilder::new()
            .params(&params)
            .face(face)
            .audio(audio)
            .output(workspace.output_path())
            .build()?;

        tracker.report_stage(ProcessingStage::Inference);
        let started = Instant::now();
        let produced = self
            .engine
            .run(&invocation)
            .instrument(spans::inference(
                self.engine.name(),
                params.out_height,
                params.resolution_scale.legacy_factor(),
            ))
            .await?;
        events::performance_metric("inference", started.elapsed().as_millis() as u64);

        tracker.report_stage(ProcessingStage::Finalizing);
        verify_output(&produced)
            .await
            .map_err(|reason| LipSyncError::inference_process(None, reason))?;
        let artifact = workspace.into_artifact(&produced)?;

        Ok((artifact, params))
    }

    fn finish<T>(&self, tracker: &mut ProgressTracker, result: &Result<T>) {
        match result {
            Ok(_) => tracker.report_completion(),
            Err(e) => tracker.report_error(&e.to_string()),
        }
    }
}
