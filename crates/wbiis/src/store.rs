//! Ordered, immutable collections of feature vectors.

use std::path::PathBuf;
use std::time::Instant;

use rayon::prelude::*;

use crate::feature::FeatureExtractor;
use crate::loader::{image_id, ImageSource};
use crate::types::{FeatureVector, LabeledImage, VisionError, VisionResult};

/// Feature vectors of a batch of images, index-aligned with their identifiers.
///
/// Position in the store is the identity used by every query. All vectors
/// share one coefficient length.
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    identifiers: Vec<String>,
    vectors: Vec<FeatureVector>,
}

impl FeatureStore {
    /// Assemble a store, checking the identifier count and coefficient lengths.
    pub fn from_parts(identifiers: Vec<String>, vectors: Vec<FeatureVector>) -> VisionResult<Self> {
        if vectors.is_empty() {
            return Err(VisionError::EmptyInput(
                "cannot build a feature store from zero images".to_string(),
            ));
        }
        if identifiers.len() != vectors.len() {
            return Err(VisionError::Dimension(format!(
                "{} identifiers for {} vectors",
                identifiers.len(),
                vectors.len()
            )));
        }
        let dim = vectors[0].dim();
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.dim() != dim) {
            return Err(VisionError::Dimension(format!(
                "vector {i} ({}) has {} coefficients, expected {dim}",
                identifiers[i],
                v.dim()
            )));
        }
        Ok(Self {
            identifiers,
            vectors,
        })
    }

    /// Extract features from `images` on a bounded worker pool.
    ///
    /// Output order always matches input order, whatever order workers finish in.
    pub fn build(
        images: &[LabeledImage],
        extractor: &FeatureExtractor,
        workers: Option<usize>,
    ) -> VisionResult<Self> {
        let start = Instant::now();
        let results = run_on_pool(images, workers, |item| {
            extractor
                .extract(&item.image)
                .map(|v| (item.id.clone(), v))
        })?;
        let store = Self::assemble(results)?;
        tracing::info!(
            images = store.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built feature store"
        );
        Ok(store)
    }

    /// Load and extract every path on a bounded worker pool.
    pub fn load_parallel(
        paths: &[PathBuf],
        source: &dyn ImageSource,
        extractor: &FeatureExtractor,
        workers: Option<usize>,
    ) -> VisionResult<Self> {
        let start = Instant::now();
        let results = run_on_pool(paths, workers, |path| {
            let image = source.load(path)?;
            let vector = extractor.extract(&image)?;
            tracing::debug!("Extracted features for {}", path.display());
            Ok((image_id(path), vector))
        })?;
        let store = Self::assemble(results)?;
        tracing::info!(
            images = store.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded feature store in parallel"
        );
        Ok(store)
    }

    /// Consume a stream of images one at a time, strictly in order.
    pub fn from_stream<I>(images: I, extractor: &FeatureExtractor) -> VisionResult<Self>
    where
        I: IntoIterator<Item = VisionResult<LabeledImage>>,
    {
        let start = Instant::now();
        let mut identifiers = Vec::new();
        let mut vectors = Vec::new();
        for item in images {
            let LabeledImage { id, image } = item?;
            vectors.push(extractor.extract(&image)?);
            identifiers.push(id);
        }
        let store = Self::from_parts(identifiers, vectors)?;
        tracing::info!(
            images = store.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built feature store from stream"
        );
        Ok(store)
    }

    fn assemble(results: Vec<(String, FeatureVector)>) -> VisionResult<Self> {
        let (identifiers, vectors) = results.into_iter().unzip();
        Self::from_parts(identifiers, vectors)
    }

    /// Number of stored images.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Coefficient length shared by every vector, or `None` when empty.
    pub fn dim(&self) -> Option<usize> {
        self.vectors.first().map(FeatureVector::dim)
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn get(&self, index: usize) -> Option<&FeatureVector> {
        self.vectors.get(index)
    }

    pub fn identifier(&self, index: usize) -> Option<&str> {
        self.identifiers.get(index).map(String::as_str)
    }

    /// Fail unless `query` has this store's coefficient length. An empty store
    /// accepts any query.
    pub fn check_query(&self, query: &FeatureVector) -> VisionResult<()> {
        match self.dim() {
            Some(dim) if dim != query.dim() => Err(VisionError::Dimension(format!(
                "query has {} coefficients, store vectors have {dim}",
                query.dim()
            ))),
            _ => Ok(()),
        }
    }
}

/// Worker count: the request, capped at the available hardware parallelism.
pub fn worker_count(requested: Option<usize>) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    requested.unwrap_or(available).clamp(1, available)
}

/// Map `items` through `f` on a dedicated pool, collecting in input order.
fn run_on_pool<T, R, F>(items: &[T], workers: Option<usize>, f: F) -> VisionResult<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> VisionResult<R> + Sync,
{
    let threads = worker_count(workers);
    tracing::debug!(threads, items = items.len(), "Starting extraction pool");
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    pool.install(|| items.par_iter().map(&f).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColorImage;

    fn image(seed: usize) -> ColorImage {
        ColorImage::from_fn(128, 128, |c, y, x| {
            ((x * (seed + 1) + y * (c + 2) + seed * 13) % 256) as f64
        })
        .unwrap()
    }

    fn labeled(n: usize) -> Vec<LabeledImage> {
        (0..n)
            .map(|i| LabeledImage {
                id: format!("img_{i}.jpg"),
                image: image(i),
            })
            .collect()
    }

    #[test]
    fn test_build_preserves_order() {
        let extractor = FeatureExtractor::default();
        let images = labeled(6);
        let store = FeatureStore::build(&images, &extractor, Some(4)).unwrap();

        assert_eq!(store.len(), 6);
        for (i, item) in images.iter().enumerate() {
            assert_eq!(store.identifier(i), Some(item.id.as_str()));
            assert_eq!(store.get(i), Some(&extractor.extract(&item.image).unwrap()));
        }
    }

    #[test]
    fn test_stream_matches_parallel() {
        let extractor = FeatureExtractor::default();
        let images = labeled(4);
        let parallel = FeatureStore::build(&images, &extractor, None).unwrap();
        let streamed =
            FeatureStore::from_stream(images.into_iter().map(Ok), &extractor).unwrap();
        assert_eq!(parallel.identifiers(), streamed.identifiers());
        assert_eq!(parallel.vectors(), streamed.vectors());
    }

    #[test]
    fn test_empty_batch_is_error() {
        let extractor = FeatureExtractor::default();
        let err = FeatureStore::build(&[], &extractor, None).unwrap_err();
        assert!(matches!(err, VisionError::EmptyInput(_)));
        let err = FeatureStore::from_stream(Vec::new(), &extractor).unwrap_err();
        assert!(matches!(err, VisionError::EmptyInput(_)));
    }

    #[test]
    fn test_stream_stops_at_first_error() {
        let extractor = FeatureExtractor::default();
        let items = vec![
            Ok(labeled(1).remove(0)),
            Err(VisionError::EmptyInput("broken".to_string())),
        ];
        assert!(FeatureStore::from_stream(items, &extractor).is_err());
    }

    #[test]
    fn test_mismatched_sizes_rejected() {
        let extractor = FeatureExtractor::default();
        let mut images = labeled(2);
        images[1].image = ColorImage::from_fn(160, 160, |_, y, x| (x + y) as f64).unwrap();
        let err = FeatureStore::build(&images, &extractor, None).unwrap_err();
        assert!(matches!(err, VisionError::Dimension(_)));
    }

    #[test]
    fn test_from_parts_checks_lengths() {
        let v = FeatureVector {
            stds: [1.0; 3],
            coefficients: vec![0.0; 4],
        };
        let err = FeatureStore::from_parts(vec!["a".into()], vec![v.clone(), v]).unwrap_err();
        assert!(matches!(err, VisionError::Dimension(_)));
    }

    #[test]
    fn test_check_query() {
        let v = FeatureVector {
            stds: [1.0; 3],
            coefficients: vec![0.0; 4],
        };
        let store = FeatureStore::from_parts(vec!["a".into()], vec![v]).unwrap();
        let short = FeatureVector {
            stds: [1.0; 3],
            coefficients: vec![0.0; 3],
        };
        assert!(matches!(store.check_query(&short), Err(VisionError::Dimension(_))));
        assert!(FeatureStore::default().check_query(&short).is_ok());
    }

    #[test]
    fn test_worker_count_is_bounded() {
        let available = worker_count(None);
        assert!(available >= 1);
        assert_eq!(worker_count(Some(usize::MAX)), available);
        assert_eq!(worker_count(Some(0)), 1);
    }
}
