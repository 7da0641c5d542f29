//! Similarity search over a loaded feature store.
//!
//! The fast query asks the nearest-neighbor index and ignores standard
//! deviations. The slow query scans every stored vector, dropping candidates
//! whose channel standard deviations fall outside a tolerance band before
//! any distance is computed (Wang, Wiederhold, Firschein and Wei, 1998).
//! Both rank by the Euclidean norm of the full coefficient difference.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{validate_tolerance, validate_top_k, SearchConfig};
use crate::index::{BallTreeIndex, NeighborIndex};
use crate::store::FeatureStore;
use crate::types::{FeatureVector, SearchMatch, VisionError, VisionResult, CHANNELS};

/// Euclidean distance between two equally long vectors.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Band factor for a tolerance in percent: `1 - percent / 100`.
pub fn beta(percent: f64) -> f64 {
    1.0 - percent / 100.0
}

/// Whether candidate std `t` lies strictly inside `(s * beta, s / beta)`.
pub fn std_within(t: f64, s: f64, beta: f64) -> bool {
    s * beta < t && t < s / beta
}

/// Std-dev gate: channel 1 within the band, or channels 2 and 3 both within it.
pub fn std_accept(query_stds: &[f64; CHANNELS], db_stds: &[f64; CHANNELS], percent: f64) -> bool {
    let beta = beta(percent);
    let [s1, s2, s3] = *query_stds;
    let [t1, t2, t3] = *db_stds;
    std_within(t1, s1, beta) || (std_within(t2, s2, beta) && std_within(t3, s3, beta))
}

/// Cooperative cancellation for long scans.
///
/// Clones share one flag. A token with a deadline also reports cancelled
/// once the deadline passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that cancels itself after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Query strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Nearest-neighbor index, no std gating.
    #[default]
    Fast,
    /// Std-gated linear scan.
    Slow,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryMode::Fast => "fast",
            QueryMode::Slow => "slow",
        })
    }
}

impl FromStr for QueryMode {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(QueryMode::Fast),
            "slow" => Ok(QueryMode::Slow),
            other => Err(VisionError::InvalidParameter(format!(
                "Unknown query mode: {other}. Use 'fast' or 'slow'."
            ))),
        }
    }
}

/// Parameters of a single query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub mode: QueryMode,
    pub top_k: usize,
    /// Std-dev tolerance in percent, used by the slow query only.
    pub std_tolerance: f64,
}

impl QueryOptions {
    pub fn new(mode: QueryMode, config: &SearchConfig) -> Self {
        Self {
            mode,
            top_k: config.top_k,
            std_tolerance: config.std_tolerance,
        }
    }
}

/// An immutable feature store together with its optional index.
///
/// Engines are built once and shared behind an `Arc`; see
/// [`EngineHandle`](crate::handle::EngineHandle).
pub struct SearchEngine {
    store: FeatureStore,
    index: Option<Box<dyn NeighborIndex>>,
}

impl SearchEngine {
    /// Engine without an index; only the slow query is available.
    pub fn new(store: FeatureStore) -> Self {
        Self { store, index: None }
    }

    /// Engine with a ball tree over the store. An empty store gets no index.
    pub fn with_index(store: FeatureStore) -> VisionResult<Self> {
        if store.is_empty() {
            tracing::warn!("Feature store is empty; skipping index build");
            return Ok(Self::new(store));
        }
        let index = BallTreeIndex::build(&store)?;
        Ok(Self {
            store,
            index: Some(Box::new(index)),
        })
    }

    /// Engine around a prebuilt index, which must cover exactly this store.
    pub fn from_parts(store: FeatureStore, index: Box<dyn NeighborIndex>) -> VisionResult<Self> {
        if index.len() != store.len() || store.dim() != Some(index.dim()) {
            return Err(VisionError::Dimension(format!(
                "index covers {} vectors of {} coefficients, store has {} of {:?}",
                index.len(),
                index.dim(),
                store.len(),
                store.dim()
            )));
        }
        Ok(Self {
            store,
            index: Some(index),
        })
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Run a query in the requested mode.
    pub fn query(
        &self,
        query: &FeatureVector,
        options: &QueryOptions,
        cancel: &CancelToken,
    ) -> VisionResult<Vec<SearchMatch>> {
        match options.mode {
            QueryMode::Fast => self.fast_query(query, options.top_k),
            QueryMode::Slow => {
                self.slow_query(query, options.top_k, options.std_tolerance, cancel)
            }
        }
    }

    /// Nearest neighbors by coefficient distance, via the index.
    pub fn fast_query(&self, query: &FeatureVector, k: usize) -> VisionResult<Vec<SearchMatch>> {
        validate_top_k(k)?;
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        self.store.check_query(query)?;
        let index = self.index.as_ref().ok_or(VisionError::IndexNotBuilt)?;

        let start = Instant::now();
        let matches = index.query(&query.coefficients, k)?;
        tracing::info!(
            k,
            returned = matches.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Finished fast query"
        );
        Ok(matches)
    }

    /// Std-gated linear scan. A cancelled scan returns
    /// [`VisionError::Cancelled`] and no partial results.
    pub fn slow_query(
        &self,
        query: &FeatureVector,
        k: usize,
        percent: f64,
        cancel: &CancelToken,
    ) -> VisionResult<Vec<SearchMatch>> {
        validate_top_k(k)?;
        validate_tolerance(percent)?;
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        self.store.check_query(query)?;

        let start = Instant::now();
        let mut matches: Vec<SearchMatch> = self
            .store
            .vectors()
            .par_iter()
            .enumerate()
            .map(|(index, candidate)| {
                if cancel.is_cancelled() {
                    return Err(VisionError::Cancelled);
                }
                Ok(std_accept(&query.stds, &candidate.stds, percent).then(|| SearchMatch {
                    index,
                    distance: euclidean_distance(&query.coefficients, &candidate.coefficients),
                }))
            })
            .filter_map(Result::transpose)
            .collect::<VisionResult<_>>()?;

        if cancel.is_cancelled() {
            return Err(VisionError::Cancelled);
        }

        let accepted = matches.len();
        matches.sort_by(SearchMatch::rank_cmp);
        matches.truncate(k);
        tracing::info!(
            k,
            accepted,
            scanned = self.store.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Finished slow query"
        );
        Ok(matches)
    }
}

impl fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchEngine")
            .field("images", &self.store.len())
            .field("indexed", &self.has_index())
            .finish()
    }
}
