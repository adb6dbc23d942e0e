//! Statistical functionals over 1-D feature contours.
//!
//! Given a contour of per-frame values (one input dimension of a
//! feature stream), computes any subset of thirteen functional
//! categories, each with individually selectable outputs. Every
//! category writes a fixed number of values for its configuration;
//! short or degenerate inputs are padded with zeros so the output
//! width never changes.

pub mod peaks;
pub mod regression;
pub mod stats;
pub mod temporal;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub use peaks::{Peaks2Config, PeaksConfig};
pub use regression::RegressionConfig;
pub use stats::{
    CrossingsConfig, ExtremesConfig, MeansConfig, MomentsConfig, PercentilesConfig,
};
pub use temporal::{DctConfig, OnsetConfig, SamplesConfig, SegmentsConfig, TimesConfig};

/// Unit used for durations, positions, and rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeNorm {
    /// Fractions of the input contour length.
    Segment,
    /// Seconds, via the input frame period.
    Seconds,
    /// Raw frame counts.
    Frames,
}

/// Restriction of the contour before any functional is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFilter {
    None,
    /// Keep values unequal zero.
    NonZero,
    /// Keep values greater than zero.
    Positive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionalsConfig {
    pub filter: ValueFilter,
    pub time_norm: TimeNorm,
    /// Input dimensions the functionals apply to; empty selects all.
    pub enabled_dimensions: Vec<usize>,
    pub crossings: CrossingsConfig,
    pub dct: DctConfig,
    pub samples: SamplesConfig,
    pub segments: SegmentsConfig,
    pub times: TimesConfig,
    pub extremes: ExtremesConfig,
    pub means: MeansConfig,
    pub onset: OnsetConfig,
    pub peaks: PeaksConfig,
    pub percentiles: PercentilesConfig,
    pub regression: RegressionConfig,
    pub moments: MomentsConfig,
    pub peaks2: Peaks2Config,
}

impl Default for FunctionalsConfig {
    fn default() -> Self {
        Self {
            filter: ValueFilter::None,
            time_norm: TimeNorm::Frames,
            enabled_dimensions: Vec::new(),
            crossings: CrossingsConfig::default(),
            dct: DctConfig::default(),
            samples: SamplesConfig::default(),
            segments: SegmentsConfig::default(),
            times: TimesConfig::default(),
            extremes: ExtremesConfig::default(),
            means: MeansConfig::default(),
            onset: OnsetConfig::default(),
            peaks: PeaksConfig::default(),
            percentiles: PercentilesConfig::default(),
            regression: RegressionConfig::default(),
            moments: MomentsConfig::default(),
            peaks2: Peaks2Config::default(),
        }
    }
}

/// Shared per-contour context handed to every category.
pub(crate) struct Contour<'a> {
    pub data: &'a [f64],
    pub sorted: &'a [f64],
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub period: f64,
    pub norm: TimeNorm,
}

impl Contour<'_> {
    pub fn n(&self) -> usize {
        self.data.len()
    }
}

pub struct Functionals {
    config: FunctionalsConfig,
    period: f64,
    /// Output width per category, in declaration order.
    widths: [usize; 13],
    n_features: usize,
}

impl Functionals {
    pub fn new(config: FunctionalsConfig, period: f64) -> Result<Self> {
        if config.dct.enabled && config.dct.last_coeff < config.dct.first_coeff {
            return Err(Error::BadConfig {
                stage: "functionals",
                reason: "dct coefficient range is empty".into(),
            });
        }
        for &(a, b) in &config.percentiles.ranges {
            let np = config.percentiles.percentile.len();
            if a >= np || b >= np {
                return Err(Error::BadConfig {
                    stage: "functionals",
                    reason: format!(
                        "percentile range ({a},{b}) exceeds the {np} configured percentiles"
                    ),
                });
            }
        }
        if config.segments.enabled && config.segments.max_segments == 0 {
            return Err(Error::BadConfig {
                stage: "functionals",
                reason: "max_segments must be at least 1".into(),
            });
        }
        let widths = [
            config.crossings.n_outputs(),
            config.dct.n_outputs(),
            config.samples.n_outputs(),
            config.segments.n_outputs(),
            config.times.n_outputs(),
            config.extremes.n_outputs(),
            config.means.n_outputs(),
            config.onset.n_outputs(),
            config.peaks.n_outputs(),
            config.percentiles.n_outputs(),
            config.regression.n_outputs(),
            config.moments.n_outputs(),
            config.peaks2.n_outputs(),
        ];
        let n_features = widths.iter().sum();
        Ok(Self {
            config,
            period,
            widths,
            n_features,
        })
    }

    /// Number of output values per processed input dimension.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Which of `n_dims` input dimensions the functionals are applied to.
    pub fn selected_dimensions(&self, n_dims: usize) -> Vec<usize> {
        if self.config.enabled_dimensions.is_empty() {
            (0..n_dims).collect()
        } else {
            self.config
                .enabled_dimensions
                .iter()
                .copied()
                .filter(|&d| d < n_dims)
                .collect()
        }
    }

    /// Computes all enabled functionals over a single contour and
    /// appends exactly `n_features()` values to `out`.
    pub fn apply_contour(&self, contour: &[f64], out: &mut Vec<f64>) {
        let filtered: Vec<f64>;
        let data: &[f64] = match self.config.filter {
            ValueFilter::None => contour,
            ValueFilter::NonZero => {
                filtered = contour.iter().copied().filter(|&x| x != 0.0).collect();
                &filtered
            }
            ValueFilter::Positive => {
                filtered = contour.iter().copied().filter(|&x| x > 0.0).collect();
                &filtered
            }
        };

        if data.is_empty() {
            out.extend(std::iter::repeat(0.0).take(self.n_features));
            return;
        }

        let mut sorted = data.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut min = data[0];
        let mut max = data[0];
        let mut mean = 0.0;
        for &x in data {
            if x < min {
                min = x;
            }
            if x > max {
                max = x;
            }
            mean += x;
        }
        mean /= data.len() as f64;

        let ctx = Contour {
            data,
            sorted: &sorted,
            min,
            max,
            mean,
            period: self.period,
            norm: self.config.time_norm,
        };

        let c = &self.config;
        for (i, width) in self.widths.iter().enumerate() {
            let start = out.len();
            match i {
                0 => stats::crossings(&c.crossings, &ctx, out),
                1 => temporal::dct(&c.dct, &ctx, out),
                2 => temporal::samples(&c.samples, &ctx, out),
                3 => temporal::segments(&c.segments, &ctx, out),
                4 => temporal::times(&c.times, &ctx, out),
                5 => stats::extremes(&c.extremes, &ctx, out),
                6 => stats::means(&c.means, &ctx, out),
                7 => temporal::onset(&c.onset, &ctx, out),
                8 => peaks::peaks(&c.peaks, &ctx, out),
                9 => stats::percentiles(&c.percentiles, &ctx, out),
                10 => regression::regression(&c.regression, &ctx, out),
                11 => stats::moments(&c.moments, &ctx, out),
                12 => peaks::peaks2(&c.peaks2, &ctx, out),
                _ => unreachable!(),
            }
            // pad or clip so each category keeps its declared width
            let written = out.len() - start;
            if written < *width {
                out.extend(std::iter::repeat(0.0).take(width - written));
            } else if written > *width {
                out.truncate(start + width);
            }
        }
    }

    /// Applies the functionals to an interleaved frame buffer
    /// (`n_frames` rows of `n_dims` values), one contour per selected
    /// dimension, concatenating the per-dimension outputs.
    pub fn apply(&self, frames: &[f64], n_dims: usize) -> Result<Vec<f64>> {
        if n_dims == 0 || frames.len() % n_dims != 0 {
            return Err(Error::BadDimension {
                stage: "functionals",
                got: frames.len(),
                reason: "frame buffer is not a multiple of the dimension count",
            });
        }
        let n_frames = frames.len() / n_dims;
        let dims = self.selected_dimensions(n_dims);
        let mut out = Vec::with_capacity(dims.len() * self.n_features);
        let mut contour = vec![0.0; n_frames];
        for &d in &dims {
            for (j, v) in contour.iter_mut().enumerate() {
                *v = frames[j * n_dims + d];
            }
            self.apply_contour(&contour, &mut out);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(config: FunctionalsConfig) -> Functionals {
        Functionals::new(config, 0.01).unwrap()
    }

    #[test]
    fn test_output_width_constant_for_degenerate_input() {
        let mut config = FunctionalsConfig::default();
        config.means.enabled = true;
        config.moments.enabled = true;
        config.extremes.enabled = true;
        let f = engine(config);
        let n = f.n_features();
        assert!(n > 0);
        let mut out = Vec::new();
        f.apply_contour(&[], &mut out);
        assert_eq!(out.len(), n);
        assert!(out.iter().all(|&x| x == 0.0));
        out.clear();
        f.apply_contour(&[1.0], &mut out);
        assert_eq!(out.len(), n);
    }

    #[test]
    fn test_nonzero_filter_drops_zeros() {
        let mut config = FunctionalsConfig::default();
        config.filter = ValueFilter::NonZero;
        config.means = MeansConfig::only_amean();
        config.means.enabled = true;
        let f = engine(config);
        let mut out = Vec::new();
        f.apply_contour(&[0.0, 2.0, 0.0, 4.0], &mut out);
        assert_eq!(out, vec![3.0]);
    }

    #[test]
    fn test_dimension_selection() {
        let mut config = FunctionalsConfig::default();
        config.enabled_dimensions = vec![1];
        config.means = MeansConfig::only_amean();
        config.means.enabled = true;
        let f = engine(config);
        // two dims interleaved: dim0 = 1,1,1  dim1 = 2,4,6
        let frames = [1.0, 2.0, 1.0, 4.0, 1.0, 6.0];
        let out = f.apply(&frames, 2).unwrap();
        assert_eq!(out, vec![4.0]);
    }

    #[test]
    fn test_bad_percentile_range_rejected() {
        let mut config = FunctionalsConfig::default();
        config.percentiles.enabled = true;
        config.percentiles.percentile = vec![0.2, 0.8];
        config.percentiles.ranges = vec![(0, 2)];
        assert!(Functionals::new(config, 0.01).is_err());
    }
}
