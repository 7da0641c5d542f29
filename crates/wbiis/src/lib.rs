//! WBIIS: wavelet-based image indexing and search.
//!
//! Images are decomposed per channel with a multi-level 2-D wavelet
//! transform; the coarsest subbands form a feature vector. A batch of vectors
//! becomes a [`FeatureStore`], optionally indexed for exact nearest-neighbor
//! lookup, and queried through a [`SearchEngine`].

pub mod config;
pub mod feature;
pub mod handle;
pub mod index;
pub mod loader;
pub mod search;
pub mod store;
pub mod types;
pub mod wavelet;

pub use config::{FeatureConfig, SearchConfig, WbiisConfig};
pub use feature::FeatureExtractor;
pub use handle::EngineHandle;
pub use index::{BallTreeIndex, FlatIndex, NeighborIndex};
pub use loader::{is_supported_format, lazy_images, list_images, ComponentLoader, ImageSource};
pub use search::{euclidean_distance, std_accept, CancelToken, QueryMode, QueryOptions, SearchEngine};
pub use store::FeatureStore;
pub use types::*;
pub use wavelet::{BoundaryMode, Decomposition, Dwt2, Subbands, Wavelet, WaveletDecomposer};
