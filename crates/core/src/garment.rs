//! Garment input artifact and its validation.
//!
//! The garment is the single user-supplied input to a photoshoot run.
//! It is immutable once the run leaves the upload stage, except via
//! explicit back-navigation to stage 0.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// How much of the model the garment covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    #[serde(rename = "Full Body")]
    FullBody,
    Top,
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::FullBody
    }
}

/// Garment category passed to the try-on service as `clothingType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WearType {
    NotDefined,
    Casual,
    Formal,
    Business,
    LongDress,
    ShortDress,
    TShirtJeans,
    TShirt,
    Blouse,
    Suit,
    Swimsuit,
    Sportswear,
    Streetwear,
}

impl WearType {
    /// Wire string sent to the try-on service.
    pub fn as_str(&self) -> &'static str {
        match self {
            WearType::NotDefined => "not-defined",
            WearType::Casual => "casual",
            WearType::Formal => "formal",
            WearType::Business => "business",
            WearType::LongDress => "long-dress",
            WearType::ShortDress => "short-dress",
            WearType::TShirtJeans => "t-shirt-jeans",
            WearType::TShirt => "t-shirt",
            WearType::Blouse => "blouse",
            WearType::Suit => "suit",
            WearType::Swimsuit => "swimsuit",
            WearType::Sportswear => "sportswear",
            WearType::Streetwear => "streetwear",
        }
    }
}

impl Default for WearType {
    fn default() -> Self {
        WearType::NotDefined
    }
}

/// The uploaded product to be photographed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarmentInfo {
    /// Public or proxied URL of the garment image.
    pub image_url: Option<String>,
    #[serde(default)]
    pub model_type: ModelType,
    #[serde(default)]
    pub wear_type: WearType,
    #[serde(default)]
    pub name: String,
}

impl GarmentInfo {
    /// Validate that the garment is ready for the generation stages.
    ///
    /// An image must be uploaded and a concrete wear type chosen.
    pub fn validate_ready(&self) -> Result<(), CoreError> {
        if self.image_url.as_deref().unwrap_or("").is_empty() {
            return Err(CoreError::Validation(
                "A garment image must be uploaded first".to_string(),
            ));
        }
        if self.wear_type == WearType::NotDefined {
            return Err(CoreError::Validation(
                "A wear type must be selected for the garment".to_string(),
            ));
        }
        Ok(())
    }

    /// The garment image URL, once validated present.
    pub fn image_url(&self) -> Result<&str, CoreError> {
        self.image_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CoreError::Validation("Garment image is missing".to_string()))
    }
}
