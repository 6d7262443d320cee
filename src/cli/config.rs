//! Configuration conversion utilities for CLI arguments

use super::main_impl::{CliProfile, CliQuality, EngineArgs, RenderArgs, ServeArgs};
use crate::config::{DefaultProfile, ModelVersion, OutputHeight, Quality, Wav2LipConfig};
use crate::settings::{ServerSettings, ServerSettingsBuilder};
use anyhow::{bail, Context, Result};

impl From<CliProfile> for DefaultProfile {
    fn from(profile: CliProfile) -> Self {
        match profile {
            CliProfile::Api => DefaultProfile::Api,
            CliProfile::Settings => DefaultProfile::Settings,
        }
    }
}

impl From<CliQuality> for Quality {
    fn from(quality: CliQuality) -> Self {
        match quality {
            CliQuality::Fast => Quality::Fast,
            CliQuality::Improved => Quality::Improved,
            CliQuality::Enhanced => Quality::Enhanced,
            CliQuality::Experimental => Quality::Experimental,
        }
    }
}

/// Convert CLI arguments to settings and configurations
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Settings for `serve`
    pub(crate) fn settings_from_serve(args: &ServeArgs) -> Result<ServerSettings> {
        let max_upload_bytes = args
            .max_upload_mb
            .checked_mul(1024 * 1024)
            .context("Upload limit is too large")?;

        Self::engine_builder(&args.engine)
            .bind_address(args.host)
            .port(args.port)
            .max_upload_bytes(max_upload_bytes)
            .build()
            .context("Invalid settings")
    }

    /// Settings for commands that only launch the engine
    pub(crate) fn settings_from_engine(args: &EngineArgs) -> Result<ServerSettings> {
        Self::engine_builder(args).build().context("Invalid settings")
    }

    /// Configuration for `render`: file or profile defaults, then overrides
    pub(crate) fn render_config(args: &RenderArgs) -> Result<Wav2LipConfig> {
        let mut config = match &args.config {
            Some(path) => Wav2LipConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => Wav2LipConfig::for_profile(args.profile.into()),
        };

        if let Some(quality) = args.quality {
            config.options.quality = quality.into();
        }
        if let Some(height) = &args.output_height {
            config.options.output_height = parse_output_height(height)?;
        }
        if args.gan {
            config.options.wav2lip_version = ModelVersion::Wav2LipGan;
        }

        config.validate()?;
        Ok(config)
    }

    fn engine_builder(args: &EngineArgs) -> ServerSettingsBuilder {
        let mut builder = ServerSettings::builder()
            .checkpoints_dir(&args.checkpoints_dir)
            .work_root(&args.work_root)
            .python_executable(&args.python);
        if let Some(temp_dir) = &args.temp_dir {
            builder = builder.temp_dir(temp_dir);
        }
        if let Some(entry_args) = &args.entry_args {
            builder = builder.entry_args(entry_args.iter().filter(|a| !a.is_empty()).cloned());
        }
        builder
    }
}

/// Parse "full", "half" (or their long forms) or a pixel height
pub(crate) fn parse_output_height(value: &str) -> Result<OutputHeight> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "full" | crate::config::FULL_RESOLUTION => Ok(OutputHeight::Full),
        "half" | crate::config::HALF_RESOLUTION => Ok(OutputHeight::Half),
        other => match other.parse::<u32>() {
            Ok(0) => bail!("Output height must be a positive integer"),
            Ok(pixels) => Ok(OutputHeight::Custom(pixels)),
            Err(_) => bail!("Output height must be 'full', 'half' or a pixel count, got '{value}'"),
        },
    }
}
