//! Derivation of inference parameters
//!
//! Turns a validated [`Wav2LipConfig`] and the probed input metadata into the
//! fully resolved values the inference script is launched with. Everything
//! here is pure; a fresh [`ResolvedParams`] is computed for every request.

use crate::config::{ModelVersion, OutputHeight, Quality, ResolutionScale, Wav2LipConfig};
use crate::error::{LipSyncError, Result};
use crate::probe::MediaProbe;
use std::path::{Path, PathBuf};

/// Padding after scaling, in output pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaledPadding {
    pub up: i64,
    pub down: i64,
    pub left: i64,
    pub right: i64,
}

/// Every value the inference invocation needs, resolved for one request
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    pub resolution_scale: ResolutionScale,
    pub out_height: u32,
    pub padding: ScaledPadding,
    /// Feathering after the quality-tuning remap
    pub feathering: u32,
    /// `round(1 // factor)`; see [`rescale_factor`]
    pub rescale_factor: u32,
    pub checkpoint_path: PathBuf,
    pub output_suffix: String,
    /// Zero-based frame index for preview mode
    pub frame_to_preview: u32,
    pub quality: Quality,
    pub mask_size: f64,
    pub nosmooth: bool,
    pub debug_mask: bool,
    pub preview_settings: bool,
    pub mouth_tracking: bool,
}

/// Remap the configured feathering level.
///
/// A tuning table, not a formula: 3 becomes 5, 2 becomes 3, anything else is
/// kept. Applying it twice is not the same as applying it once.
#[must_use]
pub fn remap_feathering(feathering: u32) -> u32 {
    match feathering {
        3 => 5,
        2 => 3,
        other => other,
    }
}

/// Scale one padding value by the legacy resolution factor
#[must_use]
pub fn scale_padding(pad: i32, scale: ResolutionScale) -> i64 {
    i64::from(pad) * i64::from(scale.legacy_factor())
}

/// `round(1 // factor)`: 1 at full resolution, 0 for every other scale.
///
/// Looks like it wants the inverse of the scale but floor-divides first.
/// Kept as is; it is reported but not passed to the inference script.
#[must_use]
pub fn rescale_factor(scale: ResolutionScale) -> u32 {
    1 / scale.legacy_factor()
}

/// Output height for an input of `input_height` pixels.
///
/// Divides by the scale and rounds half to even; a custom height is used as
/// given and never divides.
#[must_use]
pub fn resolve_out_height(input_height: u32, scale: ResolutionScale) -> u32 {
    match scale {
        ResolutionScale::Custom(height) => height,
        ResolutionScale::Full | ResolutionScale::Half => {
            (f64::from(input_height) / f64::from(scale.legacy_factor())).round_ties_even() as u32
        },
    }
}

/// Convert a 1-indexed preview frame to a zero-based index, clamped at 0
#[must_use]
pub fn normalize_frame_to_preview(frame: i64) -> u32 {
    u32::try_from((frame - 1).max(0)).unwrap_or(u32::MAX)
}

/// Checkpoint file for a model version inside `checkpoints_dir`
#[must_use]
pub fn checkpoint_path(checkpoints_dir: &Path, version: ModelVersion) -> PathBuf {
    checkpoints_dir.join(version.checkpoint_file_name())
}

/// Render a float the way the inference tooling prints it (`2.0`, `2.5`)
#[must_use]
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Compose the output filename suffix.
///
/// Settings tokens are appended in a fixed order when
/// `OTHER.include_settings_in_suffix` is set; `_preview` is appended whenever
/// preview mode is on.
#[must_use]
pub fn compose_output_suffix(config: &Wav2LipConfig, out_height: u32, feathering: u32) -> String {
    let options = &config.options;
    let padding = &config.padding;
    let mut suffix = config.other.output_suffix.clone();

    if config.other.include_settings_in_suffix {
        if options.wav2lip_version == ModelVersion::Wav2LipGan {
            suffix.push_str("_GAN");
        }
        suffix.push('_');
        suffix.push_str(options.quality.as_str());
        if options.output_height != OutputHeight::Full {
            suffix.push_str(&format!("_{}", out_height));
        }
        suffix.push_str(if options.nosmooth {
            "_nosmooth1"
        } else {
            "_nosmooth0"
        });

        let pads = [('U', padding.u), ('D', padding.d), ('L', padding.l), ('R', padding.r)];
        if pads.iter().any(|(_, value)| *value != 0) {
            suffix.push_str("_pads-");
            for (tag, value) in pads.iter().filter(|(_, value)| *value != 0) {
                suffix.push_str(&format!("{}{}", tag, value));
            }
        }

        if options.quality != Quality::Fast {
            suffix.push_str(&format!(
                "_mask-S{}F{}",
                format_float(config.mask.size),
                feathering
            ));
            if config.mask.mouth_tracking {
                suffix.push_str("_mt");
            }
            if config.mask.debug_mask {
                suffix.push_str("_debug");
            }
        }
    }

    if config.other.preview_settings {
        suffix.push_str("_preview");
    }
    suffix
}

/// Resolve all inference parameters for one request
///
/// # Errors
/// - `InvalidMedia` when the probe reports no usable dimensions
pub fn derive(
    config: &Wav2LipConfig,
    probe: &MediaProbe,
    checkpoints_dir: &Path,
) -> Result<ResolvedParams> {
    if probe.width == 0 || probe.height == 0 {
        return Err(LipSyncError::invalid_media(format!(
            "Input reports {}x{} pixels",
            probe.width, probe.height
        )));
    }

    let resolution_scale = config.resolution_scale();
    let out_height = resolve_out_height(probe.height, resolution_scale);
    let feathering = remap_feathering(config.mask.feathering);
    let padding = ScaledPadding {
        up: scale_padding(config.padding.u, resolution_scale),
        down: scale_padding(config.padding.d, resolution_scale),
        left: scale_padding(config.padding.l, resolution_scale),
        right: scale_padding(config.padding.r, resolution_scale),
    };

    let params = ResolvedParams {
        resolution_scale,
        out_height,
        padding,
        feathering,
        rescale_factor: rescale_factor(resolution_scale),
        checkpoint_path: checkpoint_path(checkpoints_dir, config.options.wav2lip_version),
        output_suffix: compose_output_suffix(config, out_height, feathering),
        frame_to_preview: normalize_frame_to_preview(i64::from(config.other.frame_to_preview)),
        quality: config.options.quality,
        mask_size: config.mask.size,
        nosmooth: config.options.nosmooth,
        debug_mask: config.mask.debug_mask,
        preview_settings: config.other.preview_settings,
        mouth_tracking: config.mask.mouth_tracking,
    };

    tracing::debug!(
        input_width = probe.width,
        input_height = probe.height,
        out_height = params.out_height,
        fullres = params.resolution_scale.legacy_factor(),
        feathering = params.feathering,
        suffix = %params.output_suffix,
        "Resolved inference parameters"
    );
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(width: u32, height: u32) -> MediaProbe {
        MediaProbe::still_image(width, height)
    }

    #[test]
    fn test_feathering_remap_table() {
        assert_eq!(remap_feathering(3), 5);
        assert_eq!(remap_feathering(2), 3);
        for value in [0, 1, 4, 5, 6, 10, 100] {
            assert_eq!(remap_feathering(value), value);
        }
    }

    #[test]
    fn test_feathering_remap_is_not_idempotent() {
        // 2 -> 3 -> 5 and 3 -> 5 -> 5
        assert_ne!(remap_feathering(remap_feathering(2)), remap_feathering(2));
        assert_eq!(remap_feathering(remap_feathering(3)), remap_feathering(3));
        for value in [0, 1, 4, 7] {
            assert_eq!(remap_feathering(remap_feathering(value)), remap_feathering(value));
        }
    }

    #[test]
    fn test_padding_scaling() {
        assert_eq!(scale_padding(3, ResolutionScale::Half), 6);
        assert_eq!(scale_padding(1, ResolutionScale::Custom(480)), 3);
        assert_eq!(scale_padding(-4, ResolutionScale::Half), -8);
        assert_eq!(scale_padding(7, ResolutionScale::Full), 7);
    }

    #[test]
    fn test_rescale_factor_floor_divides() {
        assert_eq!(rescale_factor(ResolutionScale::Full), 1);
        assert_eq!(rescale_factor(ResolutionScale::Half), 0);
        assert_eq!(rescale_factor(ResolutionScale::Custom(480)), 0);
    }

    #[test]
    fn test_out_height() {
        assert_eq!(resolve_out_height(720, ResolutionScale::Half), 360);
        assert_eq!(resolve_out_height(720, ResolutionScale::Full), 720);
        assert_eq!(resolve_out_height(720, ResolutionScale::Custom(480)), 480);
        // halves round to even
        assert_eq!(resolve_out_height(721, ResolutionScale::Half), 360);
        assert_eq!(resolve_out_height(723, ResolutionScale::Half), 362);
    }

    #[test]
    fn test_frame_to_preview_normalization() {
        assert_eq!(normalize_frame_to_preview(1), 0);
        assert_eq!(normalize_frame_to_preview(0), 0);
        assert_eq!(normalize_frame_to_preview(-3), 0);
        assert_eq!(normalize_frame_to_preview(101), 100);
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(1.25), "1.25");
    }

    #[test]
    fn test_suffix_full_settings_order() {
        let config = Wav2LipConfig::builder()
            .include_settings_in_suffix(true)
            .wav2lip_version(ModelVersion::Wav2LipGan)
            .quality(Quality::Enhanced)
            .output_height(OutputHeight::Custom(480))
            .nosmooth(true)
            .padding(2, 0, 0, 0)
            .mask_size(2.5)
            .feathering(2)
            .mouth_tracking(true)
            .build()
            .unwrap();

        let params = derive(&config, &probe(1280, 720), Path::new("checkpoints")).unwrap();
        assert!(params
            .output_suffix
            .ends_with("_GAN_Enhanced_480_nosmooth1_pads-U2_mask-S2.5F3_mt"));
        assert_eq!(
            params.output_suffix,
            "_Easy-Wav2Lip_GAN_Enhanced_480_nosmooth1_pads-U2_mask-S2.5F3_mt"
        );
    }

    #[test]
    fn test_suffix_without_settings() {
        let config = Wav2LipConfig::builder()
            .wav2lip_version(ModelVersion::Wav2LipGan)
            .padding(1, 1, 1, 1)
            .build()
            .unwrap();
        assert_eq!(compose_output_suffix(&config, 720, 3), "_Easy-Wav2Lip");

        let config = Wav2LipConfig::builder()
            .output_suffix("_take")
            .preview_settings(true)
            .build()
            .unwrap();
        assert_eq!(compose_output_suffix(&config, 720, 3), "_take_preview");
    }

    #[test]
    fn test_suffix_fast_full_resolution() {
        let config = Wav2LipConfig::builder()
            .output_suffix("")
            .include_settings_in_suffix(true)
            .quality(Quality::Fast)
            .nosmooth(false)
            .padding(0, 3, -2, 0)
            .debug_mask(true)
            .preview_settings(true)
            .build()
            .unwrap();
        assert_eq!(
            compose_output_suffix(&config, 1080, 3),
            "_Fast_nosmooth0_pads-D3L-2_preview"
        );
    }

    #[test]
    fn test_suffix_half_resolution_with_debug_mask() {
        let config = Wav2LipConfig::builder()
            .output_suffix("")
            .include_settings_in_suffix(true)
            .output_height(OutputHeight::Half)
            .mask_size(3.0)
            .feathering(1)
            .debug_mask(true)
            .build()
            .unwrap();
        let params = derive(&config, &probe(1280, 720), Path::new("ckpt")).unwrap();
        assert_eq!(params.output_suffix, "_Improved_360_nosmooth1_mask-S3.0F1_debug");
    }

    #[test]
    fn test_derive_half_resolution_720p() {
        let config = Wav2LipConfig::builder()
            .output_height(OutputHeight::Half)
            .padding(3, 0, 1, -2)
            .feathering(3)
            .frame_to_preview(101)
            .build()
            .unwrap();
        let params = derive(&config, &probe(1280, 720), Path::new("/srv/checkpoints")).unwrap();

        assert_eq!(params.out_height, 360);
        assert_eq!(params.resolution_scale, ResolutionScale::Half);
        assert_eq!(
            params.padding,
            ScaledPadding {
                up: 6,
                down: 0,
                left: 2,
                right: -4
            }
        );
        assert_eq!(params.feathering, 5);
        assert_eq!(params.rescale_factor, 0);
        assert_eq!(params.frame_to_preview, 100);
        assert_eq!(
            params.checkpoint_path,
            PathBuf::from("/srv/checkpoints/Wav2Lip.pth")
        );
    }

    #[test]
    fn test_derive_custom_height_and_gan_checkpoint() {
        let config = Wav2LipConfig::builder()
            .output_height(OutputHeight::Custom(540))
            .wav2lip_version(ModelVersion::Wav2LipGan)
            .padding(1, 1, 1, 1)
            .build()
            .unwrap();
        let params = derive(&config, &probe(1920, 1080), Path::new("checkpoints")).unwrap();

        assert_eq!(params.out_height, 540);
        assert_eq!(params.resolution_scale.legacy_factor(), 3);
        assert_eq!(params.padding.up, 3);
        assert_eq!(
            params.checkpoint_path,
            PathBuf::from("checkpoints/Wav2Lip_GAN.pth")
        );
    }

    #[test]
    fn test_derive_rejects_empty_probe() {
        let config = Wav2LipConfig::default();
        let err = derive(&config, &probe(0, 720), Path::new("checkpoints")).unwrap_err();
        assert!(matches!(err, LipSyncError::InvalidMedia(_)));
    }
}
