//! Input media probing
//!
//! The parameter deriver needs the input's width, height, frame rate and
//! duration. Still images are read through the `image` crate; video inputs
//! go through FFmpeg when the `video-support` feature is enabled.

use crate::error::{LipSyncError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Frame rate the inference script assumes for a still image
pub const STATIC_IMAGE_FPS: f64 = 30.0;

/// Metadata of an input media file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaProbe {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: f64,
    /// Duration in seconds (0 for a still image)
    pub duration: f64,
}

impl MediaProbe {
    /// Probe result for a still image of the given size
    #[must_use]
    pub fn still_image(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: STATIC_IMAGE_FPS,
            duration: 0.0,
        }
    }
}

/// Trait for media metadata extraction
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Read width/height/fps/duration of the file at `path`
    ///
    /// # Errors
    /// - `MediaProbe` when the file cannot be decoded or has no dimensions
    async fn probe(&self, path: &Path) -> Result<MediaProbe>;
}

/// Reads still image headers through the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageProber;

#[async_trait]
impl MediaProber for ImageProber {
    async fn probe(&self, path: &Path) -> Result<MediaProbe> {
        let owned: PathBuf = path.to_path_buf();
        let dimensions = tokio::task::spawn_blocking(move || image::image_dimensions(&owned))
            .await
            .map_err(|e| LipSyncError::internal(format!("Image probe task failed: {}", e)))?;

        let (width, height) =
            dimensions.map_err(|e| LipSyncError::probe_error(path, &e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(LipSyncError::probe_error(path, "image has no pixels"));
        }

        tracing::debug!(path = %path.display(), width, height, "Probed still image");
        Ok(MediaProbe::still_image(width, height))
    }
}

/// Reads the best video stream through FFmpeg
#[cfg(feature = "video-support")]
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegProber;

#[cfg(feature = "video-support")]
#[async_trait]
impl MediaProber for FfmpegProber {
    async fn probe(&self, path: &Path) -> Result<MediaProbe> {
        use ffmpeg_next as ffmpeg;

        let owned = path.to_path_buf();
        let probe = tokio::task::spawn_blocking(move || -> Result<MediaProbe> {
            ffmpeg::init().map_err(|e| {
                LipSyncError::internal(format!("Failed to initialize FFmpeg: {}", e))
            })?;

            let input = ffmpeg::format::input(&owned)
                .map_err(|e| LipSyncError::probe_error(&owned, &e.to_string()))?;
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| LipSyncError::probe_error(&owned, "no video stream found"))?;
            let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .and_then(|context| context.decoder().video())
                .map_err(|e| LipSyncError::probe_error(&owned, &e.to_string()))?;

            let width = decoder.width();
            let height = decoder.height();
            if width == 0 || height == 0 {
                return Err(LipSyncError::probe_error(&owned, "video has no dimensions"));
            }

            Ok(MediaProbe {
                width,
                height,
                fps: f64::from(stream.avg_frame_rate()),
                duration: stream.duration() as f64 * f64::from(stream.time_base()),
            })
        })
        .await
        .map_err(|e| LipSyncError::internal(format!("Video probe task failed: {}", e)))??;

        tracing::debug!(
            path = %path.display(),
            width = probe.width,
            height = probe.height,
            fps = probe.fps,
            duration = probe.duration,
            "Probed video"
        );
        Ok(probe)
    }
}

/// Chooses a prober by file extension
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProber;

impl DefaultProber {
    /// Whether the path names a still image format this build can decode
    #[must_use]
    pub fn is_still_image(path: &Path) -> bool {
        image::ImageFormat::from_path(path).is_ok_and(|format| format.reading_enabled())
    }
}

#[async_trait]
impl MediaProber for DefaultProber {
    async fn probe(&self, path: &Path) -> Result<MediaProbe> {
        if Self::is_still_image(path) {
            return ImageProber.probe(path).await;
        }

        #[cfg(feature = "video-support")]
        {
            FfmpegProber.probe(path).await
        }

        #[cfg(not(feature = "video-support"))]
        {
            Err(LipSyncError::probe_error(
                path,
                "not a recognized image and video support is not enabled",
            ))
        }
    }
}
