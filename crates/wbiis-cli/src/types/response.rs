//! Results reported to the user.

use serde::{Deserialize, Serialize};

use wbiis::{BoundaryMode, QueryMode, Wavelet};

/// How a database is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// All images decoded and decomposed on a worker pool.
    Eager,
    /// Images streamed and decomposed one at a time.
    Lazy,
}

/// One ranked query hit, resolved to its file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedImage {
    pub rank: usize,
    pub index: usize,
    pub id: String,
    pub distance: f64,
}

/// Outcome of loading a database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSummary {
    pub directory: String,
    pub images: usize,
    pub available: usize,
    pub coefficients: usize,
    pub indexed: bool,
    pub mode: LoadMode,
    pub elapsed_ms: u64,
}

/// Outcome of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReport {
    pub query: String,
    pub mode: QueryMode,
    pub top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_tolerance: Option<f64>,
    pub elapsed_ms: u64,
    pub results: Vec<RankedImage>,
}

/// Summary of one image's feature vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub path: String,
    pub wavelet: Wavelet,
    pub mode: BoundaryMode,
    pub level: usize,
    pub subband_shape: (usize, usize),
    pub stds: [f64; 3],
    pub coefficients: usize,
}

/// Statistics of the loaded database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub directory: Option<String>,
    pub originals: Option<String>,
    pub images: usize,
    pub coefficients: usize,
    pub indexed: bool,
    pub last_results: usize,
}
