//! Feature and search configuration.

use serde::{Deserialize, Serialize};

use crate::types::{VisionError, VisionResult};
use crate::wavelet::{BoundaryMode, Wavelet};

/// Default number of decomposition levels.
pub const DEFAULT_LEVEL: usize = 3;

/// Default side length of preprocessed images.
pub const DEFAULT_IMAGE_SIDE: u32 = 128;

/// Default number of results returned by a query.
pub const DEFAULT_TOP_K: usize = 10;

/// Default std-dev tolerance, in percent.
pub const DEFAULT_STD_TOLERANCE: f64 = 50.0;

/// How feature vectors are extracted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub level: usize,
    pub wavelet: Wavelet,
    pub mode: BoundaryMode,
    pub image_side: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            wavelet: Wavelet::Db8,
            mode: BoundaryMode::Symmetric,
            image_side: DEFAULT_IMAGE_SIDE,
        }
    }
}

/// Query defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
    pub std_tolerance: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            std_tolerance: DEFAULT_STD_TOLERANCE,
        }
    }
}

/// Full configuration consumed by the library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WbiisConfig {
    pub features: FeatureConfig,
    pub search: SearchConfig,
    /// Worker threads for batch extraction. `None` uses all available cores.
    pub workers: Option<usize>,
}

impl WbiisConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(text: &str) -> VisionResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| VisionError::InvalidParameter(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value is usable.
    pub fn validate(&self) -> VisionResult<()> {
        validate_level(self.features.level)?;
        validate_top_k(self.search.top_k)?;
        validate_tolerance(self.search.std_tolerance)?;
        if self.features.image_side == 0 {
            return Err(VisionError::InvalidParameter(
                "image_side must be greater than 0".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(VisionError::InvalidParameter(
                "workers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_level(level: usize) -> VisionResult<()> {
    if level == 0 {
        return Err(VisionError::InvalidParameter(
            "decomposition level must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_top_k(k: usize) -> VisionResult<()> {
    if k == 0 {
        return Err(VisionError::InvalidParameter(
            "k must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_tolerance(percent: f64) -> VisionResult<()> {
    if !percent.is_finite() || !(0.0..100.0).contains(&percent) {
        return Err(VisionError::InvalidParameter(format!(
            "std tolerance must be in [0, 100), got {percent}"
        )));
    }
    Ok(())
}
