//! Inference command-line construction
//!
//! Serializes [`ResolvedParams`] plus the staged input paths into the flat,
//! ordered argument list the inference script parses.

use crate::error::{LipSyncError, Result};
use crate::params::{format_float, ResolvedParams};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Ordered argument list for one inference run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    args: Vec<OsString>,
    output_path: PathBuf,
}

impl Invocation {
    /// Arguments in launch order
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// File the process is expected to write
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Value following a flag, if the flag is present
    #[must_use]
    pub fn flag_value(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(OsString::as_os_str)
    }
}

/// Python's spelling of a boolean, which the inference script expects
fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Builder for [`Invocation`]
#[derive(Debug, Default)]
pub struct InvocationBuilder<'a> {
    params: Option<&'a ResolvedParams>,
    face: Option<PathBuf>,
    audio: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl<'a> InvocationBuilder<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn params(mut self, params: &'a ResolvedParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Staged face image or video
    #[must_use]
    pub fn face<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.face = Some(path.into());
        self
    }

    /// Staged voice track
    #[must_use]
    pub fn audio<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.audio = Some(path.into());
        self
    }

    /// Where the inference script writes the video
    #[must_use]
    pub fn output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Build the argument list
    ///
    /// # Errors
    /// - `Internal` if parameters or any of the three paths were not set
    pub fn build(self) -> Result<Invocation> {
        let params = self
            .params
            .ok_or_else(|| LipSyncError::internal("Invocation built without resolved parameters"))?;
        let face = self
            .face
            .ok_or_else(|| LipSyncError::internal("Invocation built without a face input"))?;
        let audio = self
            .audio
            .ok_or_else(|| LipSyncError::internal("Invocation built without an audio input"))?;
        let output = self
            .output
            .ok_or_else(|| LipSyncError::internal("Invocation built without an output path"))?;

        let pads = params.padding;
        let mut args: Vec<OsString> = Vec::with_capacity(32);
        let mut push = |flag: &str, values: &[&OsStr]| {
            args.push(flag.into());
            args.extend(values.iter().map(|v| v.to_os_string()));
        };

        push("--face", &[face.as_os_str()]);
        push("--audio", &[audio.as_os_str()]);
        push("--outfile", &[output.as_os_str()]);
        push(
            "--pads",
            &[
                OsStr::new(&pads.up.to_string()),
                OsStr::new(&pads.down.to_string()),
                OsStr::new(&pads.left.to_string()),
                OsStr::new(&pads.right.to_string()),
            ],
        );
        push("--checkpoint_path", &[params.checkpoint_path.as_os_str()]);
        push("--out_height", &[OsStr::new(&params.out_height.to_string())]);
        push(
            "--fullres",
            &[OsStr::new(&params.resolution_scale.legacy_factor().to_string())],
        );
        push("--quality", &[OsStr::new(params.quality.as_str())]);
        push("--mask_dilation", &[OsStr::new(&format_float(params.mask_size))]);
        push("--mask_feathering", &[OsStr::new(&params.feathering.to_string())]);
        push("--nosmooth", &[OsStr::new(py_bool(params.nosmooth))]);
        push("--debug_mask", &[OsStr::new(py_bool(params.debug_mask))]);
        push("--preview_settings", &[OsStr::new(py_bool(params.preview_settings))]);
        push("--mouth_tracking", &[OsStr::new(py_bool(params.mouth_tracking))]);

        Ok(Invocation {
            args,
            output_path: output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelVersion, OutputHeight, Quality, Wav2LipConfig};
    use crate::params::derive;
    use crate::probe::MediaProbe;

    fn resolved(config: &Wav2LipConfig) -> ResolvedParams {
        derive(config, &MediaProbe::still_image(1280, 720), Path::new("/app/checkpoints")).unwrap()
    }

    fn as_strings(invocation: &Invocation) -> Vec<String> {
        invocation
            .args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_full_argument_order() {
        let config = Wav2LipConfig::builder()
            .quality(Quality::Enhanced)
            .output_height(OutputHeight::Half)
            .wav2lip_version(ModelVersion::Wav2LipGan)
            .padding(3, 0, 1, 0)
            .feathering(2)
            .mouth_tracking(true)
            .build()
            .unwrap();
        let params = resolved(&config);

        let invocation = InvocationBuilder::new()
            .params(&params)
            .face("/tmp/req/face.png")
            .audio("/tmp/req/audio.wav")
            .output("/tmp/req/output.mp4")
            .build()
            .unwrap();

        #[rustfmt::skip]
        let expected = [
            "--face", "/tmp/req/face.png",
            "--audio", "/tmp/req/audio.wav",
            "--outfile", "/tmp/req/output.mp4",
            "--pads", "6", "0", "2", "0",
            "--checkpoint_path", "/app/checkpoints/Wav2Lip_GAN.pth",
            "--out_height", "360",
            "--fullres", "2",
            "--quality", "Enhanced",
            "--mask_dilation", "2.5",
            "--mask_feathering", "3",
            "--nosmooth", "True",
            "--debug_mask", "False",
            "--preview_settings", "False",
            "--mouth_tracking", "True",
        ];
        assert_eq!(as_strings(&invocation), expected);
        assert_eq!(invocation.output_path(), Path::new("/tmp/req/output.mp4"));
    }

    #[test]
    fn test_custom_height_passes_sentinel_scale() {
        let config = Wav2LipConfig::builder()
            .output_height(OutputHeight::Custom(480))
            .build()
            .unwrap();
        let params = resolved(&config);
        let invocation = InvocationBuilder::new()
            .params(&params)
            .face("f.png")
            .audio("a.wav")
            .output("o.mp4")
            .build()
            .unwrap();

        assert_eq!(invocation.flag_value("--fullres"), Some(OsStr::new("3")));
        assert_eq!(invocation.flag_value("--out_height"), Some(OsStr::new("480")));
        assert_eq!(invocation.flag_value("--quality"), Some(OsStr::new("Improved")));
        assert_eq!(invocation.flag_value("--missing"), None);
    }

    #[test]
    fn test_build_is_deterministic() {
        let params = resolved(&Wav2LipConfig::default());
        let build = || {
            InvocationBuilder::new()
                .params(&params)
                .face("f.png")
                .audio("a.wav")
                .output("o.mp4")
                .build()
                .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_missing_inputs_are_internal_errors() {
        let params = resolved(&Wav2LipConfig::default());

        let err = InvocationBuilder::new()
            .face("f.png")
            .audio("a.wav")
            .output("o.mp4")
            .build()
            .unwrap_err();
        assert!(matches!(err, LipSyncError::Internal(_)));

        let err = InvocationBuilder::new()
            .params(&params)
            .face("f.png")
            .output("o.mp4")
            .build()
            .unwrap_err();
        assert!(matches!(err, LipSyncError::Internal(_)));
    }
}
