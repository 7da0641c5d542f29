//! Search session lifecycle: database loading, queries, and saved results.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use wbiis::{
    lazy_images, list_images, CancelToken, ComponentLoader, Dwt2, EngineHandle, FeatureExtractor,
    FeatureStore, ImageSource, QueryMode, QueryOptions, SearchEngine, WbiisConfig,
};

use crate::types::{
    CliError, CliResult, FeatureSummary, LoadMode, LoadSummary, QueryReport, RankedImage,
    SessionStats,
};

/// Owns the configuration, the published engine, and the results of the
/// last query.
pub struct SearchSession {
    config: WbiisConfig,
    extractor: FeatureExtractor,
    loader: ComponentLoader,
    engine: EngineHandle,
    database_dir: Option<PathBuf>,
    originals_dir: Option<PathBuf>,
    last_results: Vec<RankedImage>,
}

impl SearchSession {
    /// Create a session with nothing loaded.
    pub fn new(config: WbiisConfig) -> CliResult<Self> {
        config.validate()?;
        let extractor = FeatureExtractor::from_config(&config.features)?;
        let loader = ComponentLoader::new(config.features.image_side);

        tracing::info!(
            wavelet = %config.features.wavelet,
            mode = %config.features.mode,
            level = config.features.level,
            side = config.features.image_side,
            "Search session created"
        );

        Ok(Self {
            config,
            extractor,
            loader,
            engine: EngineHandle::new(),
            database_dir: None,
            originals_dir: None,
            last_results: Vec::new(),
        })
    }

    pub fn config(&self) -> &WbiisConfig {
        &self.config
    }

    /// Directory holding higher resolution copies of the database images,
    /// under the same file names. Used by [`save_results`](Self::save_results).
    pub fn set_originals_dir(&mut self, dir: Option<PathBuf>) -> CliResult<()> {
        if let Some(dir) = &dir {
            if !dir.is_dir() {
                return Err(CliError::InvalidParams(format!(
                    "Not a directory: {}",
                    dir.display()
                )));
            }
        }
        self.originals_dir = dir;
        Ok(())
    }

    /// Sample `size` images from `dir`, extract their features, and publish a
    /// new engine. On failure the previously published engine stays in place.
    pub fn load_database(
        &mut self,
        dir: &Path,
        size: usize,
        mode: LoadMode,
        seed: Option<u64>,
    ) -> CliResult<LoadSummary> {
        if size == 0 {
            return Err(CliError::InvalidParams("Sample size must be at least 1".into()));
        }
        let start = Instant::now();
        let available = list_images(dir)?;
        if size > available.len() {
            return Err(CliError::InvalidParams(format!(
                "Sample size {size} exceeds the {} images in {}",
                available.len(),
                dir.display()
            )));
        }

        let paths = sample_paths(&available, size, seed);
        tracing::info!(
            "Loading {} of {} images from {} ({:?})",
            paths.len(),
            available.len(),
            dir.display(),
            mode
        );

        let store = match mode {
            LoadMode::Eager => FeatureStore::load_parallel(
                &paths,
                &self.loader,
                &self.extractor,
                self.config.workers,
            )?,
            LoadMode::Lazy => {
                FeatureStore::from_stream(lazy_images(paths, &self.loader), &self.extractor)?
            }
        };

        let engine = SearchEngine::with_index(store)?;
        let summary = LoadSummary {
            directory: dir.display().to_string(),
            images: engine.store().len(),
            available: available.len(),
            coefficients: engine.store().dim().unwrap_or(0),
            indexed: engine.has_index(),
            mode,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        self.engine.publish(engine);
        self.database_dir = Some(dir.to_path_buf());
        self.last_results.clear();
        Ok(summary)
    }

    /// Snapshot of the published engine.
    pub fn engine(&self) -> CliResult<Arc<SearchEngine>> {
        self.engine.current().ok_or(CliError::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_loaded()
    }

    /// Query options for `mode` with the configured defaults.
    pub fn default_options(&self, mode: QueryMode) -> QueryOptions {
        QueryOptions::new(mode, &self.config.search)
    }

    /// Run a query with the image at `path` against the loaded database.
    pub fn query(
        &mut self,
        path: &Path,
        options: &QueryOptions,
        cancel: &CancelToken,
    ) -> CliResult<QueryReport> {
        let engine = self.engine()?;
        let start = Instant::now();

        let image = self.loader.load(path)?;
        let vector = self.extractor.extract(&image)?;
        let matches = engine.query(&vector, options, cancel)?;

        let results: Vec<RankedImage> = matches
            .iter()
            .enumerate()
            .map(|(rank, m)| RankedImage {
                rank: rank + 1,
                index: m.index,
                id: engine.store().identifier(m.index).unwrap_or_default().to_string(),
                distance: m.distance,
            })
            .collect();

        self.last_results = results.clone();
        Ok(QueryReport {
            query: path.display().to_string(),
            mode: options.mode,
            top_k: options.top_k,
            std_tolerance: (options.mode == QueryMode::Slow).then_some(options.std_tolerance),
            elapsed_ms: start.elapsed().as_millis() as u64,
            results,
        })
    }

    /// Extract and summarize the feature vector of one image.
    pub fn features(&self, path: &Path) -> CliResult<FeatureSummary> {
        let image = self.loader.load(path)?;
        let vector = self.extractor.extract(&image)?;
        let features = &self.config.features;
        let dwt = Dwt2::new(features.wavelet, features.mode);

        Ok(FeatureSummary {
            path: path.display().to_string(),
            wavelet: features.wavelet,
            mode: features.mode,
            level: features.level,
            subband_shape: dwt.subband_shape(image.height(), image.width(), features.level),
            stds: vector.stds,
            coefficients: vector.dim(),
        })
    }

    pub fn last_results(&self) -> &[RankedImage] {
        &self.last_results
    }

    /// Copy the files behind the last results into `dest`.
    ///
    /// Files come from the originals directory when one is set, otherwise
    /// from the database directory. Returns the number of files copied.
    pub fn save_results(&self, dest: &Path) -> CliResult<usize> {
        if self.last_results.is_empty() {
            return Err(CliError::NoResults);
        }
        let source_dir = self
            .originals_dir
            .as_ref()
            .or(self.database_dir.as_ref())
            .ok_or(CliError::NotLoaded)?;

        std::fs::create_dir_all(dest)?;
        for result in &self.last_results {
            let from = source_dir.join(&result.id);
            let to = dest.join(format!("{:02}_{}", result.rank, result.id));
            std::fs::copy(&from, &to).map_err(|e| {
                CliError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to copy {}: {e}", from.display()),
                ))
            })?;
            tracing::debug!("Copied {} to {}", from.display(), to.display());
        }

        tracing::info!(
            "Saved {} results to {}",
            self.last_results.len(),
            dest.display()
        );
        Ok(self.last_results.len())
    }

    /// Drop the loaded engine and results.
    pub fn clear(&mut self) {
        self.engine.clear();
        self.database_dir = None;
        self.last_results.clear();
    }

    pub fn stats(&self) -> SessionStats {
        let engine = self.engine.current();
        SessionStats {
            directory: self.database_dir.as_ref().map(|d| d.display().to_string()),
            originals: self.originals_dir.as_ref().map(|d| d.display().to_string()),
            images: engine.as_ref().map_or(0, |e| e.store().len()),
            coefficients: engine
                .as_ref()
                .and_then(|e| e.store().dim())
                .unwrap_or(0),
            indexed: engine.as_ref().is_some_and(|e| e.has_index()),
            last_results: self.last_results.len(),
        }
    }
}

/// Pick `size` distinct paths at random. The sample keeps directory order so
/// store positions follow file names.
fn sample_paths(available: &[PathBuf], size: usize, seed: Option<u64>) -> Vec<PathBuf> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut chosen: Vec<usize> = (0..available.len())
        .collect::<Vec<_>>()
        .choose_multiple(&mut rng, size)
        .copied()
        .collect();
    chosen.sort_unstable();
    chosen.into_iter().map(|i| available[i].clone()).collect()
}
