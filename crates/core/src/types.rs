//! Core combination and variant types shared across the pipeline.
//!
//! A photoshoot run fans out over a fixed grid of model attributes:
//! three body sizes crossed with three skin tones. Every fan-out stage
//! and every selection stage is keyed by a [`CombinationKey`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Attribute enums
// ---------------------------------------------------------------------------

/// Body size attribute of a generated model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodySize {
    Thin,
    Average,
    PlusSize,
}

impl BodySize {
    /// All body sizes, in the deterministic fan-out order.
    pub const ALL: [BodySize; 3] = [BodySize::Thin, BodySize::Average, BodySize::PlusSize];

    /// Wire string used in combination keys and upstream payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            BodySize::Thin => "thin",
            BodySize::Average => "average",
            BodySize::PlusSize => "plus-size",
        }
    }
}

impl fmt::Display for BodySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodySize {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thin" => Ok(BodySize::Thin),
            "average" => Ok(BodySize::Average),
            "plus-size" | "plussize" => Ok(BodySize::PlusSize),
            other => Err(CoreError::Validation(format!("Unknown body size '{other}'"))),
        }
    }
}

/// Skin tone attribute of a generated model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinTone {
    Light,
    Medium,
    Dark,
}

impl SkinTone {
    /// All skin tones, in the deterministic fan-out order.
    pub const ALL: [SkinTone; 3] = [SkinTone::Light, SkinTone::Medium, SkinTone::Dark];

    /// Wire string used in combination keys and upstream payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkinTone::Light => "light",
            SkinTone::Medium => "medium",
            SkinTone::Dark => "dark",
        }
    }
}

impl fmt::Display for SkinTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkinTone {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(SkinTone::Light),
            "medium" => Ok(SkinTone::Medium),
            "dark" => Ok(SkinTone::Dark),
            other => Err(CoreError::Validation(format!("Unknown skin tone '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// CombinationKey
// ---------------------------------------------------------------------------

/// Composite identifier for one (body size, skin tone) cell of the grid.
///
/// Serialized as `"<body-size>-<skin-tone>"`, e.g. `"plus-size-light"`.
/// Parsing splits on the *last* hyphen so the hyphenated `plus-size`
/// body size round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CombinationKey {
    pub body_size: BodySize,
    pub skin_tone: SkinTone,
}

impl CombinationKey {
    pub fn new(body_size: BodySize, skin_tone: SkinTone) -> Self {
        Self {
            body_size,
            skin_tone,
        }
    }

    /// The full 9-key grid in deterministic order: body size outer,
    /// skin tone inner.
    pub fn grid() -> Vec<CombinationKey> {
        let mut keys = Vec::with_capacity(9);
        for body_size in BodySize::ALL {
            for skin_tone in SkinTone::ALL {
                keys.push(CombinationKey::new(body_size, skin_tone));
            }
        }
        keys
    }

    /// Human-readable label, e.g. `"Plus-size, Light skin"`.
    pub fn label(&self) -> String {
        let body = self.body_size.as_str();
        let mut chars = body.chars();
        let capitalized = match chars.next() {
            Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        format!("{capitalized}, {} skin", self.skin_tone)
    }
}

impl fmt::Display for CombinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.body_size, self.skin_tone)
    }
}

impl FromStr for CombinationKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, tone) = s
            .rsplit_once('-')
            .ok_or_else(|| CoreError::Validation(format!("Malformed combination key '{s}'")))?;
        Ok(CombinationKey::new(body.parse()?, tone.parse()?))
    }
}

impl Serialize for CombinationKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CombinationKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// One generated candidate image for a combination.
///
/// Immutable after creation except for the `selected` display flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Canonical (possibly proxied) image URL.
    pub image_url: String,
    pub body_size: BodySize,
    pub skin_tone: SkinTone,
    /// UI-only flag mirroring the current selection.
    #[serde(default)]
    pub selected: bool,
    /// Set when this variant is a fallback for a failed generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True while a regeneration for this cell is in flight.
    #[serde(default)]
    pub is_processing: bool,
}

impl Variant {
    /// A successfully generated variant.
    pub fn new(image_url: impl Into<String>, key: CombinationKey) -> Self {
        Self {
            image_url: image_url.into(),
            body_size: key.body_size,
            skin_tone: key.skin_tone,
            selected: false,
            error: None,
            is_processing: false,
        }
    }

    /// A fallback variant carrying the source image and the failure reason.
    pub fn fallback(image_url: impl Into<String>, key: CombinationKey, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(image_url, key)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
