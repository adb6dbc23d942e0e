//! Distribution statistics: crossing rates, extremes, means, central
//! moments, and percentiles.

use serde::{Deserialize, Serialize};

use super::{Contour, TimeNorm};

fn flag(enabled: bool, value: f64, out: &mut Vec<f64>) {
    if enabled {
        out.push(value);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossingsConfig {
    pub enabled: bool,
    /// Zero-crossing rate.
    pub zcr: bool,
    /// Mean-crossing rate.
    pub mcr: bool,
    pub amean: bool,
}

impl Default for CrossingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            zcr: true,
            mcr: true,
            amean: true,
        }
    }
}

impl CrossingsConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        [self.zcr, self.mcr, self.amean]
            .iter()
            .filter(|&&b| b)
            .count()
    }
}

pub(crate) fn crossings(cfg: &CrossingsConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let x = ctx.data;
    let n = ctx.n();
    let mean = ctx.mean;
    let mut nz = 0u64;
    let mut nm = 0u64;
    for i in 1..n.saturating_sub(1) {
        if (x[i - 1] * x[i + 1] <= 0.0 && x[i] == 0.0) || x[i - 1] * x[i] < 0.0 {
            nz += 1;
        }
        let a = x[i - 1] - mean;
        let b = x[i] - mean;
        let c = x[i + 1] - mean;
        if (a * c <= 0.0 && b == 0.0) || a * b < 0.0 {
            nm += 1;
        }
    }
    flag(cfg.zcr, nz as f64 / n as f64, out);
    flag(cfg.mcr, nm as f64 / n as f64, out);
    flag(cfg.amean, mean, out);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtremesConfig {
    pub enabled: bool,
    pub max: bool,
    pub min: bool,
    pub range: bool,
    pub maxpos: bool,
    pub minpos: bool,
    /// Distance of the maximum from the arithmetic mean.
    pub maxamean_dist: bool,
    pub minamean_dist: bool,
}

impl Default for ExtremesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max: true,
            min: true,
            range: true,
            maxpos: true,
            minpos: true,
            maxamean_dist: true,
            minamean_dist: true,
        }
    }
}

impl ExtremesConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        [
            self.max,
            self.min,
            self.range,
            self.maxpos,
            self.minpos,
            self.maxamean_dist,
            self.minamean_dist,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }
}

pub(crate) fn extremes(cfg: &ExtremesConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let x = ctx.data;
    let maxpos = x.iter().position(|&v| v == ctx.max).unwrap_or(0);
    let minpos = x.iter().position(|&v| v == ctx.min).unwrap_or(0);
    let (maxpos, minpos) = match ctx.norm {
        TimeNorm::Frames => (maxpos as f64, minpos as f64),
        TimeNorm::Seconds => (maxpos as f64 * ctx.period, minpos as f64 * ctx.period),
        TimeNorm::Segment => (
            maxpos as f64 / ctx.n() as f64,
            minpos as f64 / ctx.n() as f64,
        ),
    };
    flag(cfg.max, ctx.max, out);
    flag(cfg.min, ctx.min, out);
    flag(cfg.range, ctx.max - ctx.min, out);
    flag(cfg.maxpos, maxpos, out);
    flag(cfg.minpos, minpos, out);
    flag(cfg.maxamean_dist, ctx.max - ctx.mean, out);
    flag(cfg.minamean_dist, ctx.mean - ctx.min, out);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeansConfig {
    pub enabled: bool,
    pub amean: bool,
    pub absmean: bool,
    pub qmean: bool,
    pub nzamean: bool,
    pub nzabsmean: bool,
    pub nzqmean: bool,
    pub nzgmean: bool,
    pub nnz: bool,
    pub flatness: bool,
    pub posamean: bool,
    pub negamean: bool,
    pub posqmean: bool,
    pub posrqmean: bool,
    pub negqmean: bool,
    pub negrqmean: bool,
    pub rqmean: bool,
    pub nzrqmean: bool,
}

impl Default for MeansConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            amean: true,
            absmean: true,
            qmean: true,
            nzamean: true,
            nzabsmean: true,
            nzqmean: true,
            nzgmean: true,
            nnz: true,
            flatness: true,
            posamean: true,
            negamean: true,
            posqmean: true,
            posrqmean: true,
            negqmean: true,
            negrqmean: true,
            rqmean: true,
            nzrqmean: true,
        }
    }
}

impl MeansConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        [
            self.amean,
            self.absmean,
            self.qmean,
            self.nzamean,
            self.nzabsmean,
            self.nzqmean,
            self.nzgmean,
            self.nnz,
            self.flatness,
            self.posamean,
            self.negamean,
            self.posqmean,
            self.posrqmean,
            self.negqmean,
            self.negrqmean,
            self.rqmean,
            self.nzrqmean,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }

    #[cfg(test)]
    pub(crate) fn only_amean() -> Self {
        Self {
            enabled: true,
            amean: true,
            absmean: false,
            qmean: false,
            nzamean: false,
            nzabsmean: false,
            nzqmean: false,
            nzgmean: false,
            nnz: false,
            flatness: false,
            posamean: false,
            negamean: false,
            posqmean: false,
            posrqmean: false,
            negqmean: false,
            negrqmean: false,
            rqmean: false,
            nzrqmean: false,
        }
    }
}

pub(crate) fn means(cfg: &MeansConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let x = ctx.data;
    let n = ctx.n() as f64;
    let mut absmean = 0.0;
    let mut qmean = 0.0;
    let mut nzamean = 0.0;
    let mut nzabsmean = 0.0;
    let mut nzqmean = 0.0;
    let mut nzgmean = 0.0;
    let mut posamean = 0.0;
    let mut negamean = 0.0;
    let mut posqmean = 0.0;
    let mut negqmean = 0.0;
    let mut nnz = 0u64;
    let mut npos = 0u64;
    let mut nneg = 0u64;
    for &v in x {
        let a = v.abs();
        absmean += a;
        qmean += v * v;
        if v != 0.0 {
            nnz += 1;
            nzamean += v;
            nzabsmean += a;
            nzqmean += v * v;
            nzgmean += a.ln();
            if v > 0.0 {
                npos += 1;
                posamean += v;
                posqmean += v * v;
            } else {
                nneg += 1;
                negamean += v;
                negqmean += v * v;
            }
        }
    }
    absmean /= n;
    qmean /= n;
    if nnz > 0 {
        let nz = nnz as f64;
        nzamean /= nz;
        nzabsmean /= nz;
        nzqmean /= nz;
        nzgmean = (nzgmean / nz).exp();
    }
    if npos > 0 {
        posamean /= npos as f64;
        posqmean /= npos as f64;
    }
    if nneg > 0 {
        negamean /= nneg as f64;
        negqmean /= nneg as f64;
    }
    let nnz = match ctx.norm {
        TimeNorm::Frames => nnz as f64,
        TimeNorm::Seconds => nnz as f64 * ctx.period,
        TimeNorm::Segment => nnz as f64 / n,
    };
    let flatness = if absmean != 0.0 { nzgmean / absmean } else { 1.0 };

    flag(cfg.amean, ctx.mean, out);
    flag(cfg.absmean, absmean, out);
    flag(cfg.qmean, qmean, out);
    flag(cfg.nzamean, nzamean, out);
    flag(cfg.nzabsmean, nzabsmean, out);
    flag(cfg.nzqmean, nzqmean, out);
    flag(cfg.nzgmean, nzgmean, out);
    flag(cfg.nnz, nnz, out);
    flag(cfg.flatness, flatness, out);
    flag(cfg.posamean, posamean, out);
    flag(cfg.negamean, negamean, out);
    flag(cfg.posqmean, posqmean, out);
    flag(cfg.posrqmean, posqmean.sqrt(), out);
    flag(cfg.negqmean, negqmean, out);
    flag(cfg.negrqmean, negqmean.sqrt(), out);
    flag(cfg.rqmean, qmean.sqrt(), out);
    flag(cfg.nzrqmean, nzqmean.sqrt(), out);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentsConfig {
    pub enabled: bool,
    pub variance: bool,
    pub stddev: bool,
    pub skewness: bool,
    pub kurtosis: bool,
    pub amean: bool,
}

impl Default for MomentsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            variance: true,
            stddev: true,
            skewness: true,
            kurtosis: true,
            amean: true,
        }
    }
}

impl MomentsConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        [
            self.variance,
            self.stddev,
            self.skewness,
            self.kurtosis,
            self.amean,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }
}

pub(crate) fn moments(cfg: &MomentsConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let n = ctx.n() as f64;
    let mut m2 = 0.0;
    let mut m3 = 0.0;
    let mut m4 = 0.0;
    for &v in ctx.data {
        let d = v - ctx.mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    m2 /= n;
    let stddev = if m2 > 0.0 { m2.sqrt() } else { 0.0 };
    let skewness = if m2 > 0.0 { m3 / (n * m2 * stddev) } else { 0.0 };
    let kurtosis = if m2 > 0.0 { m4 / (n * m2 * m2) } else { 0.0 };
    flag(cfg.variance, m2, out);
    flag(cfg.stddev, stddev, out);
    flag(cfg.skewness, skewness, out);
    flag(cfg.kurtosis, kurtosis, out);
    flag(cfg.amean, ctx.mean, out);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PercentilesConfig {
    pub enabled: bool,
    pub quartiles: bool,
    pub iqr: bool,
    /// Linear interpolation between neighbouring sorted values.
    pub interp: bool,
    /// Additional percentiles in `[0, 1]`.
    pub percentile: Vec<f64>,
    /// Absolute differences between pairs of `percentile` entries,
    /// given as index pairs.
    pub ranges: Vec<(usize, usize)>,
}

impl Default for PercentilesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            quartiles: true,
            iqr: true,
            interp: true,
            percentile: Vec::new(),
            ranges: Vec::new(),
        }
    }
}

impl PercentilesConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        let mut n = 0;
        if self.quartiles {
            n += 3;
        }
        if self.iqr {
            n += 3;
        }
        n + self.percentile.len() + self.ranges.len()
    }
}

fn pctl_nearest(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let idx = (p * (n - 1) as f64 + 0.5).floor() as usize;
    sorted[idx.min(n - 1)]
}

fn pctl_interp(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let idx = p * (n - 1) as f64;
    let i1 = (idx.floor() as usize).min(n - 1);
    let i2 = (idx.ceil() as usize).min(n - 1);
    if i1 == i2 {
        sorted[i1]
    } else {
        sorted[i1] * (i2 as f64 - idx) + sorted[i2] * (idx - i1 as f64)
    }
}

pub(crate) fn percentile_of(sorted: &[f64], p: f64, interp: bool) -> f64 {
    let p = p.clamp(0.0, 1.0);
    if interp {
        pctl_interp(sorted, p)
    } else {
        pctl_nearest(sorted, p)
    }
}

pub(crate) fn percentiles(cfg: &PercentilesConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let s = ctx.sorted;
    let q1 = percentile_of(s, 0.25, cfg.interp);
    let q2 = percentile_of(s, 0.50, cfg.interp);
    let q3 = percentile_of(s, 0.75, cfg.interp);
    if cfg.quartiles {
        out.extend([q1, q2, q3]);
    }
    if cfg.iqr {
        out.extend([q2 - q1, q3 - q2, q3 - q1]);
    }
    let base = out.len();
    for &p in &cfg.percentile {
        out.push(percentile_of(s, p, cfg.interp));
    }
    for &(a, b) in &cfg.ranges {
        out.push((out[base + b] - out[base + a]).abs());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contour<'a>(data: &'a [f64], sorted: &'a [f64]) -> Contour<'a> {
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        let mean = data.iter().sum::<f64>() / data.len() as f64;
        Contour {
            data,
            sorted,
            min,
            max,
            mean,
            period: 0.01,
            norm: TimeNorm::Frames,
        }
    }

    #[test]
    fn test_median_is_middle_percentile() {
        let s = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_of(&s, 0.5, true), 3.0);
        assert_eq!(percentile_of(&s, 0.5, false), 3.0);
        let even = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_of(&even, 0.5, true), 2.5);
    }

    #[test]
    fn test_quartiles_ordered_on_random_data() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(7);
        let data: Vec<f64> = (0..200).map(|_| rng.gen_range(-5.0..5.0)).collect();
        let mut sorted = data.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let ctx = contour(&data, &sorted);
        let cfg = PercentilesConfig {
            enabled: true,
            ..PercentilesConfig::default()
        };
        let mut out = Vec::new();
        percentiles(&cfg, &ctx, &mut out);
        // q1 q2 q3, then q2-q1, q3-q2, q3-q1
        assert_eq!(out.len(), 6);
        assert!(out[0] <= out[1] && out[1] <= out[2]);
        assert!((out[5] - (out[2] - out[0])).abs() < 1e-12);
        assert!(out[0] >= ctx.min && out[2] <= ctx.max);
    }

    #[test]
    fn test_percentile_bounds_are_min_and_max() {
        let s = [-2.0, 0.5, 1.0, 7.0];
        assert_eq!(percentile_of(&s, 0.0, true), -2.0);
        assert_eq!(percentile_of(&s, 1.0, true), 7.0);
        assert_eq!(percentile_of(&s, 0.0, false), -2.0);
        assert_eq!(percentile_of(&s, 1.0, false), 7.0);
    }

    #[test]
    fn test_mean_and_variance() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let sorted = data;
        let ctx = contour(&data, &sorted);
        let cfg = MomentsConfig {
            enabled: true,
            ..MomentsConfig::default()
        };
        let mut out = Vec::new();
        moments(&cfg, &ctx, &mut out);
        assert_eq!(out.len(), 5);
        assert!((out[0] - 2.0).abs() < 1e-12); // variance
        assert!((out[4] - 3.0).abs() < 1e-12); // mean
        assert!(out[2].abs() < 1e-12); // symmetric, no skew
    }

    #[test]
    fn test_zero_crossing_rate() {
        let data = [1.0, -1.0, 1.0, -1.0, 1.0];
        let sorted = [-1.0, -1.0, 1.0, 1.0, 1.0];
        let ctx = contour(&data, &sorted);
        let cfg = CrossingsConfig {
            enabled: true,
            ..CrossingsConfig::default()
        };
        let mut out = Vec::new();
        crossings(&cfg, &ctx, &mut out);
        // interior samples all flip sign
        assert!((out[0] - 3.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_extreme_positions() {
        let data = [0.0, 3.0, -1.0, 2.0];
        let sorted = [-1.0, 0.0, 2.0, 3.0];
        let ctx = contour(&data, &sorted);
        let cfg = ExtremesConfig {
            enabled: true,
            ..ExtremesConfig::default()
        };
        let mut out = Vec::new();
        extremes(&cfg, &ctx, &mut out);
        assert_eq!(out[0], 3.0);
        assert_eq!(out[1], -1.0);
        assert_eq!(out[2], 4.0);
        assert_eq!(out[3], 1.0); // maxpos in frames
        assert_eq!(out[4], 2.0);
    }

    #[test]
    fn test_nonzero_geometric_mean() {
        let data = [0.0, 2.0, 8.0];
        let sorted = [0.0, 2.0, 8.0];
        let ctx = contour(&data, &sorted);
        let cfg = MeansConfig {
            enabled: true,
            ..MeansConfig::default()
        };
        let mut out = Vec::new();
        means(&cfg, &ctx, &mut out);
        assert_eq!(out.len(), 17);
        // nzgmean = sqrt(2 * 8) = 4, nnz = 2
        assert!((out[6] - 4.0).abs() < 1e-12);
        assert_eq!(out[7], 2.0);
    }
}
