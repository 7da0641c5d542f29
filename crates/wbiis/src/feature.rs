//! Feature vector construction from preprocessed images.

use std::sync::Arc;

use crate::config::{validate_level, FeatureConfig};
use crate::types::{ColorImage, FeatureVector, VisionResult, CHANNELS};
use crate::wavelet::{Dwt2, WaveletDecomposer};

/// Turns images into wavelet feature vectors.
///
/// Channels are processed in storage order `(C1, C2, C3)`. For each one the
/// decomposer's standard deviation goes into `stds` and its four subbands are
/// appended, row-major, in `[A, H, V, D]` order.
#[derive(Clone)]
pub struct FeatureExtractor {
    decomposer: Arc<dyn WaveletDecomposer>,
    level: usize,
}

impl FeatureExtractor {
    /// Create an extractor around any decomposer.
    pub fn new(decomposer: Arc<dyn WaveletDecomposer>, level: usize) -> VisionResult<Self> {
        validate_level(level)?;
        Ok(Self { decomposer, level })
    }

    /// Create the separable DWT extractor described by `config`.
    pub fn from_config(config: &FeatureConfig) -> VisionResult<Self> {
        Self::new(Arc::new(Dwt2::new(config.wavelet, config.mode)), config.level)
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Build the feature vector of one image.
    pub fn extract(&self, image: &ColorImage) -> VisionResult<FeatureVector> {
        let mut stds = [0.0; CHANNELS];
        let mut coefficients = Vec::new();

        for (c, std) in stds.iter_mut().enumerate() {
            let decomposition = self.decomposer.decompose(image.channel(c), self.level)?;
            *std = decomposition.std;

            if coefficients.is_empty() {
                let (rows, cols) = decomposition.subbands.shape();
                coefficients.reserve(CHANNELS * 4 * rows * cols);
            }
            for band in decomposition.subbands.iter() {
                coefficients.extend(band.iter().copied());
            }
        }

        Ok(FeatureVector { stds, coefficients })
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            decomposer: Arc::new(Dwt2::default()),
            level: crate::config::DEFAULT_LEVEL,
        }
    }
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}
