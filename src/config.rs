//! Configuration types for lip-sync generation
//!
//! A [`Wav2LipConfig`] is built from an untyped JSON mapping and validated
//! field by field, so a malformed request is rejected before any file is
//! staged or any process is launched. Unknown keys are kept and written back
//! out on serialization.

use crate::error::{LipSyncError, ValidationError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::path::Path;

/// Literal accepted for `OPTIONS.output_height` to keep the input height
pub const FULL_RESOLUTION: &str = "full resolution";

/// Literal accepted for `OPTIONS.output_height` to halve the input height
pub const HALF_RESOLUTION: &str = "half resolution";

const OPTIONS: &str = "OPTIONS";
const PADDING: &str = "PADDING";
const MASK: &str = "MASK";
const OTHER: &str = "OTHER";

/// Processing depth, controlling which enhancement stages run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    /// Base lip-sync model only
    Fast,
    /// Base model plus a feathered mouth mask
    Improved,
    /// Mask plus face super-resolution
    Enhanced,
    /// Experimental super-resolution variant
    Experimental,
}

impl Quality {
    /// All tiers in declaration order
    pub const ALL: [Quality; 4] = [
        Quality::Fast,
        Quality::Improved,
        Quality::Enhanced,
        Quality::Experimental,
    ];

    /// Literal used in configuration and on the inference command line
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "Fast",
            Self::Improved => "Improved",
            Self::Enhanced => "Enhanced",
            Self::Experimental => "Experimental",
        }
    }

    /// Human-readable description of what the tier does
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Fast => "base model only",
            Self::Improved => "base model + feathered mouth mask",
            Self::Enhanced => "base model + mask + super-resolution",
            Self::Experimental => "experimental super-resolution variant",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == value)
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested output height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputHeight {
    /// Keep the input height
    Full,
    /// Half the input height
    Half,
    /// Explicit pixel height
    Custom(u32),
}

impl Default for OutputHeight {
    fn default() -> Self {
        Self::Full
    }
}

impl Serialize for OutputHeight {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Full => serializer.serialize_str(FULL_RESOLUTION),
            Self::Half => serializer.serialize_str(HALF_RESOLUTION),
            Self::Custom(height) => serializer.serialize_u32(*height),
        }
    }
}

/// How the output height relates to the input height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionScale {
    /// Divisor 1
    Full,
    /// Divisor 2
    Half,
    /// Custom height override; the height is authoritative, never a divisor
    Custom(u32),
}

impl ResolutionScale {
    /// Numeric factor the inference script understands (`--fullres`).
    ///
    /// `3` marks a custom height. It still multiplies padding.
    #[must_use]
    pub fn legacy_factor(&self) -> u32 {
        match self {
            Self::Full => 1,
            Self::Half => 2,
            Self::Custom(_) => 3,
        }
    }

    /// Whether the output height is an explicit override
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

/// Lip-sync model checkpoint variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelVersion {
    /// Standard model
    #[default]
    #[serde(rename = "Wav2Lip")]
    Wav2Lip,
    /// GAN-trained model
    #[serde(rename = "Wav2Lip_GAN")]
    Wav2LipGan,
}

impl ModelVersion {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wav2Lip => "Wav2Lip",
            Self::Wav2LipGan => "Wav2Lip_GAN",
        }
    }

    /// Weights file name inside the checkpoints directory
    #[must_use]
    pub fn checkpoint_file_name(&self) -> &'static str {
        match self {
            Self::Wav2Lip => "Wav2Lip.pth",
            Self::Wav2LipGan => "Wav2Lip_GAN.pth",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        [Self::Wav2Lip, Self::Wav2LipGan]
            .into_iter()
            .find(|v| v.as_str() == value)
    }
}

/// Preview window mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreviewWindow {
    #[default]
    Full,
}

/// Which entry point a default configuration is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultProfile {
    /// HTTP API defaults (quality `Improved`)
    #[default]
    Api,
    /// Settings-file defaults used by local rendering (quality `Enhanced`)
    Settings,
}

/// Main processing options
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionsConfig {
    pub quality: Quality,
    pub output_height: OutputHeight,
    pub wav2lip_version: ModelVersion,
    pub use_previous_tracking_data: bool,
    pub nosmooth: bool,
    pub preview_window: PreviewWindow,
    /// Unrecognized keys, preserved as given
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            quality: Quality::Improved,
            output_height: OutputHeight::Full,
            wav2lip_version: ModelVersion::Wav2Lip,
            use_previous_tracking_data: true,
            nosmooth: true,
            preview_window: PreviewWindow::Full,
            extra: Map::new(),
        }
    }
}

/// Face box padding in input pixels (signed)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaddingConfig {
    pub u: i32,
    pub d: i32,
    pub l: i32,
    pub r: i32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Mouth mask options
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaskConfig {
    pub size: f64,
    pub feathering: u32,
    pub mouth_tracking: bool,
    pub debug_mask: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            size: 2.5,
            feathering: 2,
            mouth_tracking: false,
            debug_mask: false,
            extra: Map::new(),
        }
    }
}

/// Output naming and preview options
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtherConfig {
    pub batch_process: bool,
    pub output_suffix: String,
    pub include_settings_in_suffix: bool,
    pub preview_settings: bool,
    /// 1-indexed
    pub frame_to_preview: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for OtherConfig {
    fn default() -> Self {
        Self {
            batch_process: false,
            output_suffix: "_Easy-Wav2Lip".to_string(),
            include_settings_in_suffix: false,
            preview_settings: false,
            frame_to_preview: 100,
            extra: Map::new(),
        }
    }
}

/// Complete, validated lip-sync configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Wav2LipConfig {
    #[serde(rename = "OPTIONS")]
    pub options: OptionsConfig,
    #[serde(rename = "PADDING")]
    pub padding: PaddingConfig,
    #[serde(rename = "MASK")]
    pub mask: MaskConfig,
    #[serde(rename = "OTHER")]
    pub other: OtherConfig,
    /// Unrecognized top-level keys, preserved as given
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Wav2LipConfig {
    /// Default configuration for an entry point
    #[must_use]
    pub fn for_profile(profile: DefaultProfile) -> Self {
        let mut config = Self::default();
        if profile == DefaultProfile::Settings {
            config.options.quality = Quality::Enhanced;
        }
        config
    }

    /// Create a new configuration builder starting from the API defaults
    #[must_use]
    pub fn builder() -> Wav2LipConfigBuilder {
        Wav2LipConfigBuilder::default()
    }

    /// Build a configuration from an untyped JSON mapping.
    ///
    /// Missing groups and fields take their defaults. The first field that
    /// violates its type or constraint is reported by its dotted path.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let root = value
            .as_object()
            .ok_or_else(|| ValidationError::new("config", "must be a JSON object"))?;
        let defaults = Self::default();

        let section = Fields::of(root, OPTIONS)?;
        let quality = match section.get("quality") {
            None => defaults.options.quality,
            Some(v) => v.as_str().and_then(Quality::parse).ok_or_else(|| {
                section.invalid(
                    "quality",
                    "must be one of 'Fast', 'Improved', 'Enhanced', 'Experimental'",
                )
            })?,
        };
        let output_height = match section.get("output_height") {
            None => defaults.options.output_height,
            Some(v) => parse_output_height(v).ok_or_else(|| {
                section.invalid(
                    "output_height",
                    "must be 'full resolution', 'half resolution' or a positive integer",
                )
            })?,
        };
        let wav2lip_version = match section.get("wav2lip_version") {
            None => defaults.options.wav2lip_version,
            Some(v) => v.as_str().and_then(ModelVersion::parse).ok_or_else(|| {
                section.invalid("wav2lip_version", "must be one of 'Wav2Lip', 'Wav2Lip_GAN'")
            })?,
        };
        let preview_window = match section.get("preview_window") {
            None => defaults.options.preview_window,
            Some(Value::String(s)) if s == "Full" => PreviewWindow::Full,
            Some(_) => return Err(section.invalid("preview_window", "must be 'Full'")),
        };
        let options = OptionsConfig {
            quality,
            output_height,
            wav2lip_version,
            use_previous_tracking_data: section.boolean(
                "use_previous_tracking_data",
                defaults.options.use_previous_tracking_data,
            )?,
            nosmooth: section.boolean("nosmooth", defaults.options.nosmooth)?,
            preview_window,
            extra: section.extra(&[
                "quality",
                "output_height",
                "wav2lip_version",
                "use_previous_tracking_data",
                "nosmooth",
                "preview_window",
            ]),
        };

        let section = Fields::of(root, PADDING)?;
        let padding = PaddingConfig {
            u: section.int32("u", 0)?,
            d: section.int32("d", 0)?,
            l: section.int32("l", 0)?,
            r: section.int32("r", 0)?,
            extra: section.extra(&["u", "d", "l", "r"]),
        };

        let section = Fields::of(root, MASK)?;
        let size = section.number("size", defaults.mask.size)?;
        if !size.is_finite() || size < 0.0 {
            return Err(section.invalid("size", "must be greater than or equal to 0"));
        }
        let mask = MaskConfig {
            size,
            feathering: section.unsigned("feathering", defaults.mask.feathering, 0)?,
            mouth_tracking: section.boolean("mouth_tracking", defaults.mask.mouth_tracking)?,
            debug_mask: section.boolean("debug_mask", defaults.mask.debug_mask)?,
            extra: section.extra(&["size", "feathering", "mouth_tracking", "debug_mask"]),
        };

        let section = Fields::of(root, OTHER)?;
        let other = OtherConfig {
            batch_process: section.boolean("batch_process", defaults.other.batch_process)?,
            output_suffix: section.string("output_suffix", &defaults.other.output_suffix)?,
            include_settings_in_suffix: section.boolean(
                "include_settings_in_suffix",
                defaults.other.include_settings_in_suffix,
            )?,
            preview_settings: section
                .boolean("preview_settings", defaults.other.preview_settings)?,
            frame_to_preview: section.unsigned(
                "frame_to_preview",
                defaults.other.frame_to_preview,
                1,
            )?,
            extra: section.extra(&[
                "batch_process",
                "output_suffix",
                "include_settings_in_suffix",
                "preview_settings",
                "frame_to_preview",
            ]),
        };

        let extra = root
            .iter()
            .filter(|(key, _)| ![OPTIONS, PADDING, MASK, OTHER].contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            options,
            padding,
            mask,
            other,
            extra,
        })
    }

    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LipSyncError::file_io_error("read configuration file", path, &e))?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| LipSyncError::validation("config", format!("must be valid JSON ({e})")))?;
        Ok(Self::from_value(&value)?)
    }

    /// Check invariants of a configuration assembled in code
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let OutputHeight::Custom(0) = self.options.output_height {
            return Err(ValidationError::new(
                "OPTIONS.output_height",
                "must be a positive integer",
            ));
        }
        if !self.mask.size.is_finite() || self.mask.size < 0.0 {
            return Err(ValidationError::new(
                "MASK.size",
                "must be greater than or equal to 0",
            ));
        }
        if self.other.frame_to_preview < 1 {
            return Err(ValidationError::new(
                "OTHER.frame_to_preview",
                "must be greater than or equal to 1",
            ));
        }
        Ok(())
    }

    /// Description of the selected quality tier
    #[must_use]
    pub fn quality_description(&self) -> &'static str {
        self.options.quality.description()
    }

    /// Resolution scale implied by `OPTIONS.output_height`
    #[must_use]
    pub fn resolution_scale(&self) -> ResolutionScale {
        match self.options.output_height {
            OutputHeight::Full => ResolutionScale::Full,
            OutputHeight::Half => ResolutionScale::Half,
            OutputHeight::Custom(height) => ResolutionScale::Custom(height),
        }
    }

    /// Whether the output height is an explicit pixel value
    #[must_use]
    pub fn is_custom_resolution(&self) -> bool {
        matches!(self.options.output_height, OutputHeight::Custom(_))
    }

    /// JSON Schema describing the accepted configuration document
    #[must_use]
    pub fn json_schema() -> Value {
        let defaults = Self::default();
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": "Wav2LipConfig",
            "description": "Complete configuration model for Wav2Lip processing.",
            "type": "object",
            "additionalProperties": true,
            "properties": {
                "OPTIONS": {
                    "type": "object",
                    "additionalProperties": true,
                    "properties": {
                        "quality": {
                            "description": "Processing quality level",
                            "enum": Quality::ALL.iter().map(Quality::as_str).collect::<Vec<_>>(),
                            "default": defaults.options.quality.as_str(),
                        },
                        "output_height": {
                            "description": "Output video height - 'full resolution', 'half resolution', or pixel height",
                            "anyOf": [
                                { "enum": [FULL_RESOLUTION, HALF_RESOLUTION] },
                                { "type": "integer", "exclusiveMinimum": 0 }
                            ],
                            "default": FULL_RESOLUTION,
                        },
                        "wav2lip_version": {
                            "description": "Wav2Lip model version to use",
                            "enum": [ModelVersion::Wav2Lip.as_str(), ModelVersion::Wav2LipGan.as_str()],
                            "default": defaults.options.wav2lip_version.as_str(),
                        },
                        "use_previous_tracking_data": {
                            "description": "Whether to use previous tracking data",
                            "type": "boolean",
                            "default": defaults.options.use_previous_tracking_data,
                        },
                        "nosmooth": {
                            "description": "Disable smoothing",
                            "type": "boolean",
                            "default": defaults.options.nosmooth,
                        },
                        "preview_window": {
                            "description": "Preview window mode",
                            "enum": ["Full"],
                            "default": "Full",
                        }
                    }
                },
                "PADDING": {
                    "type": "object",
                    "additionalProperties": true,
                    "properties": {
                        "u": { "description": "Upper padding", "type": "integer", "default": 0 },
                        "d": { "description": "Down padding", "type": "integer", "default": 0 },
                        "l": { "description": "Left padding", "type": "integer", "default": 0 },
                        "r": { "description": "Right padding", "type": "integer", "default": 0 }
                    }
                },
                "MASK": {
                    "type": "object",
                    "additionalProperties": true,
                    "properties": {
                        "size": { "description": "Mask size", "type": "number", "minimum": 0, "default": defaults.mask.size },
                        "feathering": { "description": "Mask feathering level", "type": "integer", "minimum": 0, "default": defaults.mask.feathering },
                        "mouth_tracking": { "description": "Enable mouth tracking", "type": "boolean", "default": false },
                        "debug_mask": { "description": "Enable debug mask visualization", "type": "boolean", "default": false }
                    }
                },
                "OTHER": {
                    "type": "object",
                    "additionalProperties": true,
                    "properties": {
                        "batch_process": { "description": "Enable batch processing", "type": "boolean", "default": false },
                        "output_suffix": { "description": "Output file suffix", "type": "string", "default": defaults.other.output_suffix },
                        "include_settings_in_suffix": { "description": "Include settings in output filename", "type": "boolean", "default": false },
                        "preview_settings": { "description": "Enable preview settings", "type": "boolean", "default": false },
                        "frame_to_preview": { "description": "Frame number to preview", "type": "integer", "minimum": 1, "default": defaults.other.frame_to_preview }
                    }
                }
            }
        })
    }
}

impl<'de> Deserialize<'de> for Wav2LipConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<Value> for Wav2LipConfig {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

fn parse_output_height(value: &Value) -> Option<OutputHeight> {
    match value {
        Value::String(s) if s == FULL_RESOLUTION => Some(OutputHeight::Full),
        Value::String(s) if s == HALF_RESOLUTION => Some(OutputHeight::Half),
        Value::Number(n) => n
            .as_u64()
            .filter(|h| *h > 0)
            .and_then(|h| u32::try_from(h).ok())
            .map(OutputHeight::Custom),
        _ => None,
    }
}

/// Typed field access within one configuration group
struct Fields<'a> {
    section: &'static str,
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn of(root: &'a Map<String, Value>, section: &'static str) -> Result<Self, ValidationError> {
        match root.get(section) {
            None => Ok(Self { section, map: None }),
            Some(Value::Object(map)) => Ok(Self {
                section,
                map: Some(map),
            }),
            Some(_) => Err(ValidationError::new(section, "must be an object")),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.and_then(|m| m.get(key))
    }

    fn invalid(&self, key: &str, constraint: &str) -> ValidationError {
        ValidationError::new(format!("{}.{}", self.section, key), constraint)
    }

    fn boolean(&self, key: &str, default: bool) -> Result<bool, ValidationError> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(self.invalid(key, "must be a boolean")),
        }
    }

    fn int32(&self, key: &str, default: i32) -> Result<i32, ValidationError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| self.invalid(key, "must be an integer")),
        }
    }

    fn unsigned(&self, key: &str, default: u32, min: u32) -> Result<u32, ValidationError> {
        let value = match self.get(key) {
            None => return Ok(default),
            Some(v) => v
                .as_i64()
                .ok_or_else(|| self.invalid(key, "must be an integer"))?,
        };
        u32::try_from(value)
            .ok()
            .filter(|n| *n >= min)
            .ok_or_else(|| {
                self.invalid(key, &format!("must be greater than or equal to {min}"))
            })
    }

    fn number(&self, key: &str, default: f64) -> Result<f64, ValidationError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| self.invalid(key, "must be a number")),
        }
    }

    fn string(&self, key: &str, default: &str) -> Result<String, ValidationError> {
        match self.get(key) {
            None => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(self.invalid(key, "must be a string")),
        }
    }

    fn extra(&self, known: &[&str]) -> Map<String, Value> {
        self.map
            .map(|m| {
                m.iter()
                    .filter(|(key, _)| !known.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Builder for `Wav2LipConfig`
#[derive(Debug, Default)]
pub struct Wav2LipConfigBuilder {
    config: Wav2LipConfig,
}

impl Wav2LipConfigBuilder {
    /// Start from the defaults of an entry point
    #[must_use]
    pub fn from_profile(profile: DefaultProfile) -> Self {
        Self {
            config: Wav2LipConfig::for_profile(profile),
        }
    }

    #[must_use]
    pub fn quality(mut self, quality: Quality) -> Self {
        self.config.options.quality = quality;
        self
    }

    #[must_use]
    pub fn output_height(mut self, height: OutputHeight) -> Self {
        self.config.options.output_height = height;
        self
    }

    #[must_use]
    pub fn wav2lip_version(mut self, version: ModelVersion) -> Self {
        self.config.options.wav2lip_version = version;
        self
    }

    #[must_use]
    pub fn use_previous_tracking_data(mut self, enabled: bool) -> Self {
        self.config.options.use_previous_tracking_data = enabled;
        self
    }

    #[must_use]
    pub fn nosmooth(mut self, nosmooth: bool) -> Self {
        self.config.options.nosmooth = nosmooth;
        self
    }

    /// Set padding as up, down, left, right
    #[must_use]
    pub fn padding(mut self, u: i32, d: i32, l: i32, r: i32) -> Self {
        self.config.padding.u = u;
        self.config.padding.d = d;
        self.config.padding.l = l;
        self.config.padding.r = r;
        self
    }

    #[must_use]
    pub fn mask_size(mut self, size: f64) -> Self {
        self.config.mask.size = size;
        self
    }

    #[must_use]
    pub fn feathering(mut self, feathering: u32) -> Self {
        self.config.mask.feathering = feathering;
        self
    }

    #[must_use]
    pub fn mouth_tracking(mut self, enabled: bool) -> Self {
        self.config.mask.mouth_tracking = enabled;
        self
    }

    #[must_use]
    pub fn debug_mask(mut self, enabled: bool) -> Self {
        self.config.mask.debug_mask = enabled;
        self
    }

    #[must_use]
    pub fn batch_process(mut self, enabled: bool) -> Self {
        self.config.other.batch_process = enabled;
        self
    }

    #[must_use]
    pub fn output_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.config.other.output_suffix = suffix.into();
        self
    }

    #[must_use]
    pub fn include_settings_in_suffix(mut self, enabled: bool) -> Self {
        self.config.other.include_settings_in_suffix = enabled;
        self
    }

    #[must_use]
    pub fn preview_settings(mut self, enabled: bool) -> Self {
        self.config.other.preview_settings = enabled;
        self
    }

    #[must_use]
    pub fn frame_to_preview(mut self, frame: u32) -> Self {
        self.config.other.frame_to_preview = frame;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> crate::Result<Wav2LipConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
