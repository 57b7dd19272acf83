//! Per-stage user-editable configuration and its validation.
//!
//! These structs are config, not pipeline state: the orchestrator reads
//! them when a fan-out stage is triggered but never mutates them.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Inclusive bounds for the requested variation count per combination.
pub const MIN_VARIATIONS: u8 = 1;
pub const MAX_VARIATIONS: u8 = 8;

/// Inclusive bounds for the diffusion guidance scale.
pub const MIN_GUIDANCE_SCALE: f64 = 1.0;
pub const MAX_GUIDANCE_SCALE: f64 = 4.5;

/// Style preset UUID meaning "no preset".
pub const STYLE_PRESET_NONE: &str = "556c1ee5-ec38-42e8-955a-1e82dad0ffa1";

// ---------------------------------------------------------------------------
// Model generation
// ---------------------------------------------------------------------------

/// Advanced knobs for the model generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSettings {
    pub negative_prompt: String,
    pub guidance_scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            negative_prompt: "distorted, blurry, disfigured, bad anatomy, ugly".to_string(),
            guidance_scale: 3.5,
            seed: None,
        }
    }
}

/// Settings for the text-to-image model generation stage.
///
/// Body size and skin tone are deliberately absent: the fan-out supplies
/// them per combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub prompt: String,
    pub gender: String,
    pub pose_type: String,
    pub age: String,
    pub eyes: String,
    /// Style preset UUID understood by the upstream service.
    #[serde(rename = "styleUUID")]
    pub style_uuid: String,
    pub enhance_details: bool,
    pub alchemy: bool,
    pub ultra: bool,
    pub enhance_prompt: bool,
    pub num_variations: u8,
    #[serde(default)]
    pub advanced_settings: AdvancedSettings,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            gender: "female".to_string(),
            pose_type: "neutral".to_string(),
            age: "not-specified".to_string(),
            eyes: "not-specified".to_string(),
            style_uuid: STYLE_PRESET_NONE.to_string(),
            enhance_details: true,
            alchemy: true,
            ultra: false,
            enhance_prompt: false,
            num_variations: 4,
            advanced_settings: AdvancedSettings::default(),
        }
    }
}

impl GenerationSettings {
    /// Validate before triggering the model generation fan-out.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation(
                "A prompt is required before generating models".to_string(),
            ));
        }
        if !(MIN_VARIATIONS..=MAX_VARIATIONS).contains(&self.num_variations) {
            return Err(CoreError::Validation(format!(
                "numVariations must be between {MIN_VARIATIONS} and {MAX_VARIATIONS}"
            )));
        }
        let scale = self.advanced_settings.guidance_scale;
        if !(MIN_GUIDANCE_SCALE..=MAX_GUIDANCE_SCALE).contains(&scale) {
            return Err(CoreError::Validation(format!(
                "guidanceScale must be between {MIN_GUIDANCE_SCALE} and {MAX_GUIDANCE_SCALE}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Virtual try-on
// ---------------------------------------------------------------------------

/// Parameters forwarded to the virtual try-on service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnParameters {
    /// `quality` or `speed`.
    pub mode: String,
    /// `auto`, `front`, `back`, or `side`.
    pub garment_photo_type: String,
    pub num_samples: u8,
    pub restore_background: bool,
    pub cover_feet: bool,
    pub adjust_hands: bool,
    pub restore_clothes: bool,
    pub nsfw_filter: bool,
    pub long_top: bool,
    /// Upstream provider tag. `fashn` handles multi-sample requests best.
    pub api_provider: String,
    pub seed: u32,
}

impl TryOnParameters {
    /// Construct defaults with a caller-supplied seed (the API layer
    /// draws a random one so this crate stays deterministic).
    pub fn with_seed(seed: u32) -> Self {
        Self {
            mode: "quality".to_string(),
            garment_photo_type: "auto".to_string(),
            num_samples: 4,
            restore_background: true,
            cover_feet: false,
            adjust_hands: false,
            restore_clothes: false,
            nsfw_filter: true,
            long_top: false,
            api_provider: "fashn".to_string(),
            seed,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(MIN_VARIATIONS..=MAX_VARIATIONS).contains(&self.num_samples) {
            return Err(CoreError::Validation(format!(
                "numSamples must be between {MIN_VARIATIONS} and {MAX_VARIATIONS}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Background generation
// ---------------------------------------------------------------------------

/// Parameters for the background replacement stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundParameters {
    pub prompt: String,
    /// `fast` or `quality`.
    pub mode: String,
    pub refine_prompt: bool,
    pub original_quality: bool,
    pub num_results: u8,
    /// Optional style reference, must already be a public URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
}

impl Default for BackgroundParameters {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            mode: "fast".to_string(),
            refine_prompt: true,
            original_quality: false,
            num_results: 1,
            reference_image_url: None,
        }
    }
}

impl BackgroundParameters {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation(
                "A background prompt is required".to_string(),
            ));
        }
        if !(MIN_VARIATIONS..=MAX_VARIATIONS).contains(&self.num_results) {
            return Err(CoreError::Validation(format!(
                "numResults must be between {MIN_VARIATIONS} and {MAX_VARIATIONS}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Image tagging
// ---------------------------------------------------------------------------

/// Parameters for the tagging/captioning stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggingParameters {
    /// Captioning model tag understood by the tagging service.
    pub model: String,
}

impl Default for TaggingParameters {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
        }
    }
}
