//! Edge case integration tests for the wbiis search session.
//!
//! Covers loading, both query modes, saving results, and configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use wbiis::{CancelToken, QueryMode, VisionError, WbiisConfig};
use wbiis_cli::config::{load_config, read_config_file};
use wbiis_cli::session::SearchSession;
use wbiis_cli::types::{CliError, LoadMode};

// ─────────────────────── helpers ───────────────────────

/// A deterministic, non-uniform RGB pattern. Different seeds give different
/// images.
fn pattern(seed: u32, width: u32, height: u32) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            ((x * (seed + 1) + y * 3 + seed * 17) % 256) as u8,
            ((x + y * (seed + 2)) % 256) as u8,
            ((x * y / 7 + seed * 31) % 256) as u8,
        ])
    })
}

/// Write `count` distinct PNGs named `img_NN.png` into `dir`.
fn write_database(dir: &Path, count: u32) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("img_{i:02}.png"));
            pattern(i, 160 + i, 140).save(&path).unwrap();
            path
        })
        .collect()
}

fn session() -> SearchSession {
    SearchSession::new(WbiisConfig::default()).unwrap()
}

fn loaded_session(db: &Path, size: usize, mode: LoadMode) -> SearchSession {
    let mut session = session();
    session.load_database(db, size, mode, Some(42)).unwrap();
    session
}

// ═══════════════════════════════════════════════════════
// LOADING
// ═══════════════════════════════════════════════════════

/// Test 1: Eager load of the whole directory
#[test]
fn test_01_eager_load() {
    let dir = tempfile::tempdir().unwrap();
    write_database(dir.path(), 6);
    std::fs::write(dir.path().join("readme.txt"), "not an image").unwrap();

    let mut session = session();
    let summary = session
        .load_database(dir.path(), 6, LoadMode::Eager, None)
        .unwrap();

    assert_eq!(summary.images, 6);
    assert_eq!(summary.available, 6);
    assert_eq!(summary.coefficients, 3 * 4 * 29 * 29);
    assert!(summary.indexed);
    assert!(session.is_loaded());
    println!("TEST 01 - Eager Load: PASS");
}

/// Test 2: Sample size larger than the directory
#[test]
fn test_02_sample_too_large() {
    let dir = tempfile::tempdir().unwrap();
    write_database(dir.path(), 3);

    let mut session = session();
    let err = session
        .load_database(dir.path(), 4, LoadMode::Eager, None)
        .unwrap_err();
    assert!(matches!(err, CliError::InvalidParams(_)));
    assert!(!session.is_loaded());

    let err = session
        .load_database(dir.path(), 0, LoadMode::Eager, None)
        .unwrap_err();
    assert!(matches!(err, CliError::InvalidParams(_)));
    println!("TEST 02 - Sample Too Large: PASS");
}

/// Test 3: Failed reload keeps the published engine
#[test]
fn test_03_failed_reload_keeps_engine() {
    let dir = tempfile::tempdir().unwrap();
    write_database(dir.path(), 4);

    let mut session = loaded_session(dir.path(), 4, LoadMode::Eager);
    let before = session.engine().unwrap();

    assert!(session
        .load_database(dir.path(), 10, LoadMode::Eager, None)
        .is_err());
    let after = session.engine().unwrap();
    assert!(std::sync::Arc::ptr_eq(&before, &after));
    println!("TEST 03 - Failed Reload Keeps Engine: PASS");
}

/// Test 4: Lazy and eager loads agree for the same seed
#[test]
fn test_04_lazy_matches_eager() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 8);

    let mut eager = loaded_session(dir.path(), 5, LoadMode::Eager);
    let mut lazy = loaded_session(dir.path(), 5, LoadMode::Lazy);

    let eager_ids = eager.engine().unwrap().store().identifiers().to_vec();
    let lazy_ids = lazy.engine().unwrap().store().identifiers().to_vec();
    assert_eq!(eager_ids, lazy_ids);

    let options = eager.default_options(QueryMode::Fast);
    let cancel = CancelToken::new();
    let a = eager.query(&paths[0], &options, &cancel).unwrap();
    let b = lazy.query(&paths[0], &options, &cancel).unwrap();
    assert_eq!(a.results.len(), b.results.len());
    for (x, y) in a.results.iter().zip(&b.results) {
        assert_eq!(x.id, y.id);
        assert!((x.distance - y.distance).abs() < 1e-9);
    }
    println!("TEST 04 - Lazy Matches Eager: PASS");
}

/// Test 5: Subbands too small for the decomposition level
#[test]
fn test_05_image_side_too_small() {
    let dir = tempfile::tempdir().unwrap();
    write_database(dir.path(), 2);

    let mut config = WbiisConfig::default();
    config.features.image_side = 64;
    let mut session = SearchSession::new(config).unwrap();

    let err = session
        .load_database(dir.path(), 2, LoadMode::Eager, None)
        .unwrap_err();
    assert!(matches!(err, CliError::Vision(VisionError::Dimension(_))));
    assert!(!session.is_loaded());
    println!("TEST 05 - Image Side Too Small: PASS");
}

/// Test 6: Missing database directory
#[test]
fn test_06_missing_directory() {
    let mut session = session();
    let err = session
        .load_database(Path::new("/nonexistent/wbiis-db"), 1, LoadMode::Eager, None)
        .unwrap_err();
    assert!(matches!(err, CliError::Vision(VisionError::Io(_))));
    println!("TEST 06 - Missing Directory: PASS");
}

// ═══════════════════════════════════════════════════════
// QUERIES
// ═══════════════════════════════════════════════════════

/// Test 7: Query before any load
#[test]
fn test_07_query_before_load() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 1);

    let mut session = session();
    let options = session.default_options(QueryMode::Fast);
    let err = session
        .query(&paths[0], &options, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, CliError::NotLoaded));
    println!("TEST 07 - Query Before Load: PASS");
}

/// Test 8: Fast query finds the query image itself first
#[test]
fn test_08_fast_query_self_match() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 6);
    let mut session = loaded_session(dir.path(), 6, LoadMode::Eager);

    let mut options = session.default_options(QueryMode::Fast);
    options.top_k = 3;
    let report = session
        .query(&paths[2], &options, &CancelToken::new())
        .unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.results[0].id, "img_02.png");
    assert_eq!(report.results[0].rank, 1);
    assert!(report.results[0].distance < 1e-9);
    assert!(report
        .results
        .windows(2)
        .all(|w| w[0].distance <= w[1].distance));
    assert!(report.std_tolerance.is_none());
    println!("TEST 08 - Fast Query Self Match: PASS");
}

/// Test 9: Slow query agrees with fast query on the best match
#[test]
fn test_09_slow_query() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 6);
    let mut session = loaded_session(dir.path(), 6, LoadMode::Eager);

    let options = session.default_options(QueryMode::Slow);
    let report = session
        .query(&paths[4], &options, &CancelToken::new())
        .unwrap();

    assert!(!report.results.is_empty());
    assert!(report.results.len() <= 6);
    assert_eq!(report.results[0].id, "img_04.png");
    assert!(report.results[0].distance < 1e-9);
    assert_eq!(report.std_tolerance, Some(50.0));
    println!("TEST 09 - Slow Query: PASS");
}

/// Test 10: k beyond the database size returns everything
#[test]
fn test_10_k_beyond_size() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 4);
    let mut session = loaded_session(dir.path(), 4, LoadMode::Eager);

    let mut options = session.default_options(QueryMode::Fast);
    options.top_k = 100;
    let report = session
        .query(&paths[0], &options, &CancelToken::new())
        .unwrap();
    assert_eq!(report.results.len(), 4);
    println!("TEST 10 - K Beyond Size: PASS");
}

/// Test 11: Invalid k and tolerance
#[test]
fn test_11_invalid_query_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 2);
    let mut session = loaded_session(dir.path(), 2, LoadMode::Eager);

    let mut options = session.default_options(QueryMode::Fast);
    options.top_k = 0;
    let err = session
        .query(&paths[0], &options, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, CliError::Vision(VisionError::InvalidParameter(_))));

    let mut options = session.default_options(QueryMode::Slow);
    options.std_tolerance = 100.0;
    let err = session
        .query(&paths[0], &options, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, CliError::Vision(VisionError::InvalidParameter(_))));
    println!("TEST 11 - Invalid Query Parameters: PASS");
}

/// Test 12: Expired deadline cancels a slow query
#[test]
fn test_12_cancelled_slow_query() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 3);
    let mut session = loaded_session(dir.path(), 3, LoadMode::Eager);

    let options = session.default_options(QueryMode::Slow);
    let cancel = CancelToken::with_timeout(Duration::ZERO);
    let err = session.query(&paths[0], &options, &cancel).unwrap_err();
    assert!(matches!(err, CliError::Vision(VisionError::Cancelled)));
    assert!(session.last_results().is_empty());
    println!("TEST 12 - Cancelled Slow Query: PASS");
}

/// Test 13: Unreadable query image
#[test]
fn test_13_corrupted_query_image() {
    let dir = tempfile::tempdir().unwrap();
    write_database(dir.path(), 2);
    let mut session = loaded_session(dir.path(), 2, LoadMode::Eager);

    let bad = tempfile::tempdir().unwrap();
    let path = bad.path().join("broken.png");
    std::fs::write(&path, b"definitely not a png").unwrap();

    let options = session.default_options(QueryMode::Fast);
    let err = session
        .query(&path, &options, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, CliError::Vision(VisionError::Image(_))));
    println!("TEST 13 - Corrupted Query Image: PASS");
}

// ═══════════════════════════════════════════════════════
// RESULTS AND STATS
// ═══════════════════════════════════════════════════════

/// Test 14: Saving copies ranked files from the database directory
#[test]
fn test_14_save_results() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 5);
    let mut session = loaded_session(dir.path(), 5, LoadMode::Eager);

    let mut options = session.default_options(QueryMode::Fast);
    options.top_k = 2;
    session
        .query(&paths[1], &options, &CancelToken::new())
        .unwrap();

    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("results");
    let copied = session.save_results(&dest).unwrap();
    assert_eq!(copied, 2);

    let first = dest.join("01_img_01.png");
    assert!(first.exists());
    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&paths[1]).unwrap()
    );
    println!("TEST 14 - Save Results: PASS");
}

/// Test 15: Saving prefers the originals directory
#[test]
fn test_15_save_from_originals() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 3);
    let originals = tempfile::tempdir().unwrap();
    for i in 0..3u32 {
        pattern(i, 640, 480)
            .save(originals.path().join(format!("img_{i:02}.png")))
            .unwrap();
    }

    let mut session = loaded_session(dir.path(), 3, LoadMode::Eager);
    session
        .set_originals_dir(Some(originals.path().to_path_buf()))
        .unwrap();

    let mut options = session.default_options(QueryMode::Fast);
    options.top_k = 1;
    session
        .query(&paths[0], &options, &CancelToken::new())
        .unwrap();

    let out = tempfile::tempdir().unwrap();
    session.save_results(out.path()).unwrap();
    let saved = image::open(out.path().join("01_img_00.png")).unwrap();
    assert_eq!((saved.width(), saved.height()), (640, 480));

    assert!(session
        .set_originals_dir(Some(PathBuf::from("/nonexistent/originals")))
        .is_err());
    println!("TEST 15 - Save From Originals: PASS");
}

/// Test 16: Stats follow loads and clears
#[test]
fn test_16_stats() {
    let dir = tempfile::tempdir().unwrap();
    write_database(dir.path(), 4);
    let mut session = loaded_session(dir.path(), 3, LoadMode::Lazy);

    let stats = session.stats();
    assert_eq!(stats.images, 3);
    assert_eq!(stats.coefficients, 10092);
    assert!(stats.indexed);
    assert!(stats.directory.is_some());

    session.clear();
    let stats = session.stats();
    assert_eq!(stats.images, 0);
    assert!(stats.directory.is_none());
    println!("TEST 16 - Stats: PASS");
}

/// Test 17: Feature summary of one image
#[test]
fn test_17_inspect_features() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 1);

    let summary = session().features(&paths[0]).unwrap();
    assert_eq!(summary.subband_shape, (29, 29));
    assert_eq!(summary.coefficients, 10092);
    assert_eq!(summary.level, 3);
    assert!(summary.stds.iter().all(|s| *s > 0.0));
    println!("TEST 17 - Inspect Features: PASS");
}

// ═══════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════

/// Test 18: Config file values and validation
#[test]
fn test_18_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"features": {"wavelet": "haar", "level": 2}, "workers": 2}"#,
    )
    .unwrap();

    let config = load_config(path.to_str()).unwrap();
    assert_eq!(config.features.level, 2);
    assert_eq!(config.workers, Some(2));
    assert_eq!(config.search.top_k, 10);

    std::fs::write(&path, r#"{"features": {"level": 0}}"#).unwrap();
    assert!(matches!(read_config_file(&path), Err(CliError::Config(_))));
    println!("TEST 18 - Config File: PASS");
}

/// Test 19: Missing explicit config file
#[test]
fn test_19_missing_config_file() {
    let err = load_config(Some("/nonexistent/wbiis/config.json")).unwrap_err();
    assert!(matches!(err, CliError::Config(_)));
    println!("TEST 19 - Missing Config File: PASS");
}

/// Test 20: Haar features at a deeper level
#[test]
fn test_20_haar_session() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_database(dir.path(), 3);

    let mut config = WbiisConfig::default();
    config.features.wavelet = wbiis::Wavelet::Haar;
    config.features.level = 4;
    let mut session = SearchSession::new(config).unwrap();
    let summary = session
        .load_database(dir.path(), 3, LoadMode::Eager, Some(1))
        .unwrap();
    assert_eq!(summary.coefficients, 3 * 4 * 8 * 8);

    let options = session.default_options(QueryMode::Fast);
    let report = session
        .query(&paths[1], &options, &CancelToken::new())
        .unwrap();
    assert_eq!(report.results[0].id, "img_01.png");
    println!("TEST 20 - Haar Session: PASS");
}
