//! Core data types for images, feature vectors, and search results.

use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Number of color channels every image carries.
pub const CHANNELS: usize = 3;

/// A preprocessed image: three channels of equal, fixed size.
///
/// Channels are stored as `(channel, row, column)`. The loader produces them
/// in component color space order `(C1, C2, C3)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    data: Array3<f64>,
}

impl ColorImage {
    /// Wrap a `(channel, row, column)` array. Fails unless it has exactly
    /// three non-empty channels.
    pub fn new(data: Array3<f64>) -> VisionResult<Self> {
        let (c, h, w) = data.dim();
        if c != CHANNELS {
            return Err(VisionError::Dimension(format!(
                "expected {CHANNELS} channels, got {c}"
            )));
        }
        if h == 0 || w == 0 {
            return Err(VisionError::Dimension(format!(
                "image has an empty side ({h}x{w})"
            )));
        }
        Ok(Self { data })
    }

    /// Build an image by evaluating `f(channel, row, column)` at every sample.
    pub fn from_fn<F>(height: usize, width: usize, mut f: F) -> VisionResult<Self>
    where
        F: FnMut(usize, usize, usize) -> f64,
    {
        Self::new(Array3::from_shape_fn((CHANNELS, height, width), |(c, y, x)| {
            f(c, y, x)
        }))
    }

    /// Borrow one channel.
    pub fn channel(&self, c: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), c)
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }
}

/// An image paired with the identifier it is stored under.
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub id: String,
    pub image: ColorImage,
}

/// Wavelet feature vector of one image.
///
/// `coefficients` holds, for each channel in order, the flattened
/// approximation, horizontal, vertical, and diagonal subbands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub stds: [f64; CHANNELS],
    pub coefficients: Vec<f64>,
}

impl FeatureVector {
    /// Number of coefficients in the flattened vector.
    pub fn dim(&self) -> usize {
        self.coefficients.len()
    }
}

/// One ranked search hit: a store position and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub index: usize,
    pub distance: f64,
}

impl SearchMatch {
    /// Ascending by distance, then by store position.
    pub fn rank_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.index.cmp(&other.index))
    }
}

/// Errors that can occur in the wavelet search library.
#[derive(thiserror::Error, Debug)]
pub enum VisionError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dimension error: {0}")]
    Dimension(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Nearest-neighbor index has not been built")]
    IndexNotBuilt,

    #[error("Query cancelled")]
    Cancelled,

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Convenience result type.
pub type VisionResult<T> = Result<T, VisionError>;
