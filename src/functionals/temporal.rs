//! Temporal-shape functionals: DCT coefficients, sampled values,
//! segment statistics, level/rise/fall times, and onset detection.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::{Contour, TimeNorm};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DctConfig {
    pub enabled: bool,
    /// First DCT-II coefficient to output (0 is the DC term).
    pub first_coeff: usize,
    pub last_coeff: usize,
}

impl Default for DctConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            first_coeff: 1,
            last_coeff: 6,
        }
    }
}

impl DctConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            0
        } else {
            self.last_coeff - self.first_coeff + 1
        }
    }
}

pub(crate) fn dct(cfg: &DctConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let x = ctx.data;
    let n = ctx.n() as f64;
    let factor = (2.0 / n).sqrt();
    for i in cfg.first_coeff..=cfg.last_coeff {
        let mut acc = 0.0;
        for (m, &v) in x.iter().enumerate() {
            acc += v * (PI * i as f64 / n * (m as f64 + 0.5)).cos();
        }
        out.push(acc * factor);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplesConfig {
    pub enabled: bool,
    /// Relative positions in `[0, 1]` to sample the contour at.
    pub positions: Vec<f64>,
}

impl SamplesConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            0
        } else {
            self.positions.len()
        }
    }
}

pub(crate) fn samples(cfg: &SamplesConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let n = ctx.n();
    for &p in &cfg.positions {
        let idx = ((n - 1) as f64 * p.clamp(0.0, 1.0)) as usize;
        out.push(ctx.data[idx]);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentsConfig {
    pub enabled: bool,
    pub num_segments: bool,
    pub mean_len: bool,
    pub max_len: bool,
    pub min_len: bool,
    /// Upper bound on detected segments; also sets the minimum
    /// segment length `n / max_segments - 1`.
    pub max_segments: usize,
    /// Segment boundary threshold relative to the contour range.
    pub range_rel_threshold: f64,
}

impl Default for SegmentsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            num_segments: true,
            mean_len: true,
            max_len: true,
            min_len: true,
            max_segments: 100,
            range_rel_threshold: 0.25,
        }
    }
}

impl SegmentsConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        [self.num_segments, self.mean_len, self.max_len, self.min_len]
            .iter()
            .filter(|&&b| b)
            .count()
    }
}

pub(crate) fn segments(cfg: &SegmentsConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let x = ctx.data;
    let n = ctx.n();
    let seg_thresh = (ctx.max - ctx.min) * cfg.range_rel_threshold;
    let seg_min_len = (n / cfg.max_segments).saturating_sub(1).max(2) as i64;
    let ravg_len = n / (cfg.max_segments / 2).max(1);

    let mut ravg = 0.0;
    let mut last_seg = -(seg_min_len / 2);
    let mut n_segments = 0u64;
    let mut mean_len = 0.0;
    let mut max_len = 0.0f64;
    let mut min_len = 0.0f64;
    for (i, &v) in x.iter().enumerate() {
        ravg += v;
        if i >= ravg_len {
            ravg -= x[i - ravg_len];
        }
        let ra = ravg / i.min(ravg_len).max(1) as f64;
        if v - ra > seg_thresh && i as i64 - last_seg > seg_min_len {
            n_segments += 1;
            let len = (i as i64 - last_seg) as f64;
            mean_len += len;
            max_len = max_len.max(len);
            if min_len == 0.0 || len < min_len {
                min_len = len;
            }
            last_seg = i as i64;
        }
    }
    if n_segments > 1 {
        mean_len /= n_segments as f64;
    }
    let scale = match ctx.norm {
        TimeNorm::Frames => 1.0,
        TimeNorm::Seconds => ctx.period,
        TimeNorm::Segment => 1.0 / n as f64,
    };
    if cfg.num_segments {
        out.push(n_segments as f64 / cfg.max_segments as f64);
    }
    if cfg.mean_len {
        out.push(mean_len * scale);
    }
    if cfg.max_len {
        out.push(max_len * scale);
    }
    if cfg.min_len {
        out.push(min_len * scale);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimesConfig {
    pub enabled: bool,
    pub upleveltime25: bool,
    pub downleveltime25: bool,
    pub upleveltime50: bool,
    pub downleveltime50: bool,
    pub upleveltime75: bool,
    pub downleveltime75: bool,
    pub upleveltime90: bool,
    pub downleveltime90: bool,
    pub risetime: bool,
    pub falltime: bool,
    /// Time spent in left-curved (convex) parts of the contour.
    pub leftctime: bool,
    pub rightctime: bool,
    pub duration: bool,
    /// Extra up-level thresholds, relative to the contour range.
    pub upleveltime: Vec<f64>,
    pub downleveltime: Vec<f64>,
}

impl Default for TimesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            upleveltime25: true,
            downleveltime25: true,
            upleveltime50: true,
            downleveltime50: true,
            upleveltime75: true,
            downleveltime75: true,
            upleveltime90: true,
            downleveltime90: true,
            risetime: true,
            falltime: true,
            leftctime: true,
            rightctime: true,
            duration: true,
            upleveltime: Vec::new(),
            downleveltime: Vec::new(),
        }
    }
}

impl TimesConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        [
            self.upleveltime25,
            self.downleveltime25,
            self.upleveltime50,
            self.downleveltime50,
            self.upleveltime75,
            self.downleveltime75,
            self.upleveltime90,
            self.downleveltime90,
            self.risetime,
            self.falltime,
            self.leftctime,
            self.rightctime,
            self.duration,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
            + self.upleveltime.len()
            + self.downleveltime.len()
    }
}

pub(crate) fn times(cfg: &TimesConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let x = ctx.data;
    let n = ctx.n();
    let range = ctx.max - ctx.min;
    let level = |f: f64| f * range + ctx.min;

    let below = |l: f64| x.iter().filter(|&&v| v <= l).count() as f64;
    let n25 = below(level(0.25));
    let n50 = below(level(0.50));
    let n75 = below(level(0.75));
    let n90 = below(level(0.90));

    let mut n_rise = 0.0;
    let mut n_fall = 0.0;
    for i in 1..n {
        if x[i - 1] < x[i] {
            n_rise += 1.0;
        } else if x[i - 1] > x[i] {
            n_fall += 1.0;
        }
    }
    let mut n_left = 0.0;
    let mut n_right = 0.0;
    for i in 1..n.saturating_sub(1) {
        let a1 = x[i] - x[i - 1];
        let a2 = x[i + 1] - x[i];
        if a2 < a1 {
            n_right += 1.0;
        } else if a1 < a2 {
            n_left += 1.0;
        }
    }

    // level/rise/fall counts, curvature counts, and total length all
    // normalize in the selected time unit
    let (norm, norm1, norm2, duration) = match ctx.norm {
        TimeNorm::Frames => (1.0, 1.0, 1.0, n as f64),
        TimeNorm::Seconds => {
            let inv = 1.0 / ctx.period;
            (inv, inv, inv, n as f64 * ctx.period)
        }
        TimeNorm::Segment => (
            n as f64,
            (n as f64 - 1.0).max(1.0),
            (n as f64 - 2.0).max(1.0),
            1.0,
        ),
    };

    let nf = n as f64;
    let mut push = |enabled: bool, v: f64| {
        if enabled {
            out.push(v);
        }
    };
    push(cfg.upleveltime25, (nf - n25) / norm);
    push(cfg.downleveltime25, n25 / norm);
    push(cfg.upleveltime50, (nf - n50) / norm);
    push(cfg.downleveltime50, n50 / norm);
    push(cfg.upleveltime75, (nf - n75) / norm);
    push(cfg.downleveltime75, n75 / norm);
    push(cfg.upleveltime90, (nf - n90) / norm);
    push(cfg.downleveltime90, n90 / norm);
    push(cfg.risetime, n_rise / norm1);
    push(cfg.falltime, n_fall / norm1);
    push(cfg.leftctime, n_left / norm2);
    push(cfg.rightctime, n_right / norm2);
    push(cfg.duration, duration);
    for &f in &cfg.upleveltime {
        let l = level(f);
        push(true, x.iter().filter(|&&v| v > l).count() as f64 / norm);
    }
    for &f in &cfg.downleveltime {
        let l = level(f);
        push(true, x.iter().filter(|&&v| v <= l).count() as f64 / norm);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    pub enabled: bool,
    pub onset_pos: bool,
    pub offset_pos: bool,
    pub n_onsets: bool,
    pub n_offsets: bool,
    pub threshold: f64,
    /// Separate onset threshold; falls back to `threshold`.
    pub threshold_onset: Option<f64>,
    pub threshold_offset: Option<f64>,
    /// Compare absolute values against the thresholds.
    pub use_abs_val: bool,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            onset_pos: true,
            offset_pos: true,
            n_onsets: true,
            n_offsets: true,
            threshold: 0.0,
            threshold_onset: None,
            threshold_offset: None,
            use_abs_val: true,
        }
    }
}

impl OnsetConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        [self.onset_pos, self.offset_pos, self.n_onsets, self.n_offsets]
            .iter()
            .filter(|&&b| b)
            .count()
    }
}

pub(crate) fn onset(cfg: &OnsetConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let x = ctx.data;
    let n = ctx.n();
    let t_on = cfg.threshold_onset.unwrap_or(cfg.threshold);
    let t_off = cfg.threshold_offset.unwrap_or(cfg.threshold);

    let mut above = x[0] > t_on;
    let mut n_onsets = 0u64;
    let mut n_offsets = 0u64;
    let mut onset_pos: Option<usize> = None;
    let mut offset_pos: Option<usize> = None;
    for (i, &v) in x.iter().enumerate().skip(1) {
        let cur = if cfg.use_abs_val { v.abs() } else { v };
        if cur > t_on && !above {
            n_onsets += 1;
            onset_pos.get_or_insert(i);
            above = true;
        } else if cur <= t_off && above {
            n_offsets += 1;
            offset_pos = Some(i);
            above = false;
        }
    }
    let onset_pos = onset_pos.unwrap_or(0) as f64;
    let offset_pos = offset_pos.unwrap_or(n - 1) as f64;
    let scale = match ctx.norm {
        TimeNorm::Frames => 1.0,
        TimeNorm::Seconds => ctx.period,
        TimeNorm::Segment => 1.0 / n as f64,
    };
    let mut push = |enabled: bool, v: f64| {
        if enabled {
            out.push(v);
        }
    };
    push(cfg.onset_pos, onset_pos * scale);
    push(cfg.offset_pos, offset_pos * scale);
    push(cfg.n_onsets, n_onsets as f64);
    push(cfg.n_offsets, n_offsets as f64);
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
    fn test_dct_dc_term_of_constant_signal() {
        let data = [1.0; 8];
        let ctx = contour(&data, &data);
        let cfg = DctConfig {
            enabled: true,
            first_coeff: 0,
            last_coeff: 1,
        };
        let mut out = Vec::new();
        dct(&cfg, &ctx, &mut out);
        // coefficient 0 sums the signal, coefficient 1 cancels
        assert!((out[0] - 8.0 * (2.0f64 / 8.0).sqrt()).abs() < 1e-12);
        assert!(out[1].abs() < 1e-12);
    }

    #[test]
    fn test_samples_pick_relative_positions() {
        let data = [10.0, 20.0, 30.0, 40.0, 50.0];
        let ctx = contour(&data, &data);
        let cfg = SamplesConfig {
            enabled: true,
            positions: vec![0.0, 0.5, 1.0],
        };
        let mut out = Vec::new();
        samples(&cfg, &ctx, &mut out);
        assert_eq!(out, vec![10.0, 30.0, 50.0]);
    }

    #[test]
    fn test_rise_and_fall_times() {
        // 4 rising pairs then 3 falling pairs
        let data = [0.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0];
        let sorted = [0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0];
        let ctx = contour(&data, &sorted);
        let cfg = TimesConfig {
            enabled: true,
            ..TimesConfig::default()
        };
        let mut out = Vec::new();
        times(&cfg, &ctx, &mut out);
        assert_eq!(out.len(), 13);
        assert_eq!(out[8], 4.0); // risetime in frames
        assert_eq!(out[9], 3.0); // falltime
        assert_eq!(out[12], 8.0); // duration
    }

    #[test]
    fn test_onset_positions_and_counts() {
        let data = [0.0, 0.0, 0.8, 0.9, 0.0, 0.0, 0.7, 0.0];
        let sorted = [0.0, 0.0, 0.0, 0.0, 0.0, 0.7, 0.8, 0.9];
        let ctx = contour(&data, &sorted);
        let cfg = OnsetConfig {
            enabled: true,
            threshold: 0.5,
            ..OnsetConfig::default()
        };
        let mut out = Vec::new();
        onset(&cfg, &ctx, &mut out);
        assert_eq!(out, vec![2.0, 7.0, 2.0, 2.0]);
    }

    #[test]
    fn test_segments_detects_plateaus() {
        // two clear bursts over a zero baseline
        let mut data = vec![0.0; 40];
        for v in &mut data[5..12] {
            *v = 1.0;
        }
        for v in &mut data[25..33] {
            *v = 1.0;
        }
        let mut sorted = data.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let ctx = contour(&data, &sorted);
        let cfg = SegmentsConfig {
            enabled: true,
            max_segments: 10,
            ..SegmentsConfig::default()
        };
        let mut out = Vec::new();
        segments(&cfg, &ctx, &mut out);
        assert_eq!(out.len(), 4);
        // at least one boundary per burst, reported relative to max_segments
        assert!(out[0] >= 0.2 && out[0] <= 1.0);
        assert!(out[2] >= out[3]);
        assert!(out[3] > 0.0);
    }
}
