//! Multi-level 2-D discrete wavelet decomposition of a single channel.
//!
//! Each level filters along axis 0 (rows of samples down a column) and then
//! along axis 1 with the decomposition low-pass and high-pass filters,
//! keeping every second output. A signal of length `n` filtered with `F`
//! taps yields `floor((n + F - 1) / 2)` coefficients, with the boundary
//! extended according to [`BoundaryMode`].
//!
//! Only the coarsest level is retained: the approximation subband and the
//! three detail subbands produced alongside it.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::config::validate_level;
use crate::types::{VisionError, VisionResult};

/// Daubechies 8 reconstruction low-pass filter (16 taps).
#[allow(clippy::excessive_precision)]
const DB8_REC_LO: [f64; 16] = [
    0.05441584224308161,
    0.3128715909144659,
    0.6756307362980128,
    0.5853546836548691,
    -0.015829105256023893,
    -0.2840155429624281,
    0.00047248457399797254,
    0.128747426620186,
    -0.01736930100202211,
    -0.04408825393106472,
    0.013981027917015516,
    0.008746094047015655,
    -0.00487035299301066,
    -0.0003917403729959771,
    0.0006754494059985568,
    -0.00011747678400228192,
];

const HAAR_REC_LO: [f64; 2] = [std::f64::consts::FRAC_1_SQRT_2; 2];

/// Supported wavelet bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wavelet {
    Haar,
    Db8,
}

impl Wavelet {
    pub fn name(&self) -> &'static str {
        match self {
            Wavelet::Haar => "haar",
            Wavelet::Db8 => "db8",
        }
    }

    fn rec_lo(&self) -> &'static [f64] {
        match self {
            Wavelet::Haar => &HAAR_REC_LO,
            Wavelet::Db8 => &DB8_REC_LO,
        }
    }

    /// Number of filter taps.
    pub fn filter_len(&self) -> usize {
        self.rec_lo().len()
    }

    /// Decomposition filters derived from the reconstruction low-pass filter
    /// by time reversal and quadrature mirroring.
    pub fn filter_bank(&self) -> FilterBank {
        let rec_lo = self.rec_lo();
        let len = rec_lo.len();
        let dec_lo: Vec<f64> = rec_lo.iter().rev().copied().collect();
        let rec_hi: Vec<f64> = (0..len)
            .map(|k| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                sign * rec_lo[len - 1 - k]
            })
            .collect();
        let dec_hi: Vec<f64> = rec_hi.into_iter().rev().collect();
        FilterBank { dec_lo, dec_hi }
    }
}

impl fmt::Display for Wavelet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Wavelet {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "haar" | "db1" => Ok(Wavelet::Haar),
            "db8" => Ok(Wavelet::Db8),
            other => Err(VisionError::InvalidParameter(format!(
                "Unsupported wavelet: {other}. Use 'db8' or 'haar'."
            ))),
        }
    }
}

/// How a signal is extended past its ends during filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Half-sample reflection: `x[-1] = x[0]`, `x[n] = x[n-1]`.
    Symmetric,
    /// Wrap-around: `x[-1] = x[n-1]`.
    Periodic,
    /// Zero padding.
    Zero,
}

impl BoundaryMode {
    pub fn name(&self) -> &'static str {
        match self {
            BoundaryMode::Symmetric => "symmetric",
            BoundaryMode::Periodic => "periodic",
            BoundaryMode::Zero => "zero",
        }
    }

    /// Read `x[i]` with `i` possibly outside `0..x.len()`.
    fn sample(self, x: &[f64], i: isize) -> f64 {
        let n = x.len() as isize;
        if (0..n).contains(&i) {
            return x[i as usize];
        }
        match self {
            BoundaryMode::Symmetric => {
                let period = 2 * n;
                let m = i.rem_euclid(period);
                let idx = if m < n { m } else { period - 1 - m };
                x[idx as usize]
            }
            BoundaryMode::Periodic => x[i.rem_euclid(n) as usize],
            BoundaryMode::Zero => 0.0,
        }
    }
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BoundaryMode {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "symmetric" | "sym" => Ok(BoundaryMode::Symmetric),
            "periodic" | "per" => Ok(BoundaryMode::Periodic),
            "zero" | "zpd" => Ok(BoundaryMode::Zero),
            other => Err(VisionError::InvalidParameter(format!(
                "Unsupported boundary mode: {other}. Use 'symmetric', 'periodic' or 'zero'."
            ))),
        }
    }
}

/// Decomposition low-pass and high-pass filters.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    pub dec_lo: Vec<f64>,
    pub dec_hi: Vec<f64>,
}

/// The four subbands of one decomposition level, all of the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Subbands {
    pub approximation: Array2<f64>,
    pub horizontal: Array2<f64>,
    pub vertical: Array2<f64>,
    pub diagonal: Array2<f64>,
}

impl Subbands {
    /// `(rows, columns)` of each subband.
    pub fn shape(&self) -> (usize, usize) {
        self.approximation.dim()
    }

    /// Subbands in `[A, H, V, D]` order.
    pub fn iter(&self) -> impl Iterator<Item = &Array2<f64>> {
        [
            &self.approximation,
            &self.horizontal,
            &self.vertical,
            &self.diagonal,
        ]
        .into_iter()
    }
}

/// Output of decomposing one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// Population standard deviation of the approximation subband.
    pub std: f64,
    pub subbands: Subbands,
}

/// Decomposes one image channel to a given depth.
pub trait WaveletDecomposer: Send + Sync {
    fn decompose(&self, channel: ArrayView2<'_, f64>, level: usize) -> VisionResult<Decomposition>;
}

/// Number of coefficients one filtering pass produces.
pub fn output_len(n: usize, filter_len: usize) -> usize {
    (n + filter_len - 1) / 2
}

/// Deepest level a signal of length `n` supports: the largest `L` with
/// `(filter_len - 1) * 2^L <= n`.
pub fn max_level(n: usize, filter_len: usize) -> usize {
    let support = filter_len.saturating_sub(1).max(1);
    let mut span = support;
    let mut level = 0;
    while span * 2 <= n {
        span *= 2;
        level += 1;
    }
    level
}

/// Separable 2-D discrete wavelet transform.
#[derive(Debug, Clone)]
pub struct Dwt2 {
    wavelet: Wavelet,
    mode: BoundaryMode,
    bank: FilterBank,
}

impl Dwt2 {
    pub fn new(wavelet: Wavelet, mode: BoundaryMode) -> Self {
        Self {
            wavelet,
            mode,
            bank: wavelet.filter_bank(),
        }
    }

    pub fn wavelet(&self) -> Wavelet {
        self.wavelet
    }

    pub fn mode(&self) -> BoundaryMode {
        self.mode
    }

    /// Deepest level supported by a `rows x cols` channel.
    pub fn max_level(&self, rows: usize, cols: usize) -> usize {
        let f = self.wavelet.filter_len();
        max_level(rows, f).min(max_level(cols, f))
    }

    /// Shape of the retained subbands after `level` levels.
    pub fn subband_shape(&self, rows: usize, cols: usize, level: usize) -> (usize, usize) {
        let f = self.wavelet.filter_len();
        (0..level).fold((rows, cols), |(r, c), _| (output_len(r, f), output_len(c, f)))
    }

    /// One decomposition level.
    pub fn dwt2(&self, data: ArrayView2<'_, f64>) -> Subbands {
        let lo = self.filter_axis(data, Axis(0), &self.bank.dec_lo);
        let hi = self.filter_axis(data, Axis(0), &self.bank.dec_hi);

        Subbands {
            approximation: self.filter_axis(lo.view(), Axis(1), &self.bank.dec_lo),
            horizontal: self.filter_axis(hi.view(), Axis(1), &self.bank.dec_lo),
            vertical: self.filter_axis(lo.view(), Axis(1), &self.bank.dec_hi),
            diagonal: self.filter_axis(hi.view(), Axis(1), &self.bank.dec_hi),
        }
    }

    /// Filter every lane along `axis` and downsample by two.
    fn filter_axis(&self, data: ArrayView2<'_, f64>, axis: Axis, filter: &[f64]) -> Array2<f64> {
        let n = data.len_of(axis);
        let mut shape = data.raw_dim();
        shape[axis.index()] = output_len(n, filter.len());
        let mut out = Array2::<f64>::zeros(shape);

        let mut signal = Vec::with_capacity(n);
        for (lane, mut out_lane) in data.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
            signal.clear();
            signal.extend(lane.iter().copied());
            for (o, slot) in out_lane.iter_mut().enumerate() {
                let center = (2 * o + 1) as isize;
                *slot = filter
                    .iter()
                    .enumerate()
                    .map(|(j, &tap)| tap * self.mode.sample(&signal, center - j as isize))
                    .sum();
            }
        }
        out
    }
}

impl Default for Dwt2 {
    fn default() -> Self {
        Self::new(Wavelet::Db8, BoundaryMode::Symmetric)
    }
}

impl WaveletDecomposer for Dwt2 {
    fn decompose(&self, channel: ArrayView2<'_, f64>, level: usize) -> VisionResult<Decomposition> {
        validate_level(level)?;
        let (rows, cols) = channel.dim();
        let supported = self.max_level(rows, cols);
        if level > supported {
            return Err(VisionError::Dimension(format!(
                "{rows}x{cols} channel supports at most {supported} level(s) of {} decomposition, requested {level}",
                self.wavelet
            )));
        }

        let mut subbands = self.dwt2(channel);
        for _ in 1..level {
            subbands = self.dwt2(subbands.approximation.view());
        }

        Ok(Decomposition {
            std: population_std(&subbands.approximation),
            subbands,
        })
    }
}

/// Population standard deviation (divisor `n`).
pub fn population_std(values: &Array2<f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    var.sqrt()
}
