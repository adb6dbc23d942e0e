//! Peak statistics: a fast range-heuristic detector and a pruned
//! extremum-list detector with amplitude, distance, and slope
//! statistics.

use serde::{Deserialize, Serialize};

use super::{Contour, TimeNorm};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeaksConfig {
    pub enabled: bool,
    pub num_peaks: bool,
    pub mean_peak_dist: bool,
    pub peak_mean: bool,
    /// Distance of the peak mean from the contour mean.
    pub peak_mean_mean_dist: bool,
    pub peak_dist_stddev: bool,
    /// Seed the detector with the first two samples instead of zeros.
    pub overlap_flag: bool,
}

impl Default for PeaksConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            num_peaks: true,
            mean_peak_dist: true,
            peak_mean: true,
            peak_mean_mean_dist: true,
            peak_dist_stddev: true,
            overlap_flag: true,
        }
    }
}

impl PeaksConfig {
    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        [
            self.num_peaks,
            self.mean_peak_dist,
            self.peak_mean,
            self.peak_mean_mean_dist,
            self.peak_dist_stddev,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }
}

pub(crate) fn peaks(cfg: &PeaksConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let x = ctx.data;
    let n = ctx.n();
    let range = ctx.max - ctx.min;

    let overlap = cfg.overlap_flag && n > 1;
    let (start, mut lastlast, mut last) = if overlap {
        (2, x[0], x[1])
    } else {
        (0, 0.0, 0.0)
    };

    let mut peakflag = false;
    let mut last_min = 0.0;
    let mut last_max = 0.0;
    let mut cur_max_pos = 0usize;
    let mut last_max_pos: i64 = -1;
    let mut n_peaks = 0u64;
    let mut peak_mean = 0.0;
    let mut dists: Vec<f64> = Vec::new();
    for (i, &v) in x.iter().enumerate().skip(start) {
        if lastlast < last && last > v {
            // candidate maximum just behind i
            if !peakflag {
                last_max = v;
            } else if v > last_max {
                last_max = v;
                cur_max_pos = i;
            }
            if last_max - last_min > 0.11 * range {
                peakflag = true;
                cur_max_pos = i;
            }
        } else if lastlast > last && last < v {
            last_min = v;
        }
        // commit the peak once the contour drops far enough below it
        if peakflag && (v < last_max - 0.09 * range || i == n - 1) {
            n_peaks += 1;
            peak_mean += last_max;
            if last_max_pos >= 0 {
                dists.push(cur_max_pos as f64 - last_max_pos as f64);
            }
            last_max_pos = cur_max_pos as i64;
            peakflag = false;
        }
        lastlast = last;
        last = v;
    }

    let mut peak_dist;
    let mut stddev = 0.0;
    if dists.is_empty() {
        peak_dist = (n + 1) as f64;
    } else {
        peak_dist = dists.iter().sum::<f64>() / dists.len() as f64;
        for d in &dists {
            stddev += (d - peak_dist) * (d - peak_dist);
        }
        stddev = (stddev / dists.len() as f64).sqrt();
    }
    match ctx.norm {
        TimeNorm::Frames => {}
        TimeNorm::Seconds => {
            peak_dist *= ctx.period;
            stddev *= ctx.period;
        }
        TimeNorm::Segment => {
            peak_dist /= n as f64;
            stddev /= n as f64;
        }
    }
    let peak_mean = if n_peaks > 0 {
        peak_mean / n_peaks as f64
    } else {
        0.0
    };

    let mut push = |enabled: bool, v: f64| {
        if enabled {
            out.push(v);
        }
    };
    push(cfg.num_peaks, n_peaks as f64);
    push(cfg.mean_peak_dist, peak_dist);
    push(cfg.peak_mean, peak_mean);
    push(cfg.peak_mean_mean_dist, peak_mean - ctx.mean);
    push(cfg.peak_dist_stddev, stddev);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Peaks2Config {
    pub enabled: bool,
    pub num_peaks: bool,
    pub mean_peak_dist: bool,
    pub peak_dist_stddev: bool,
    pub peak_range_abs: bool,
    pub peak_range_rel: bool,
    pub peak_mean: bool,
    pub peak_mean_mean_dist: bool,
    pub peak_mean_mean_ratio: bool,
    /// Peak-to-peak amplitude differences.
    pub ptp_amp_mean_abs: bool,
    pub ptp_amp_mean_rel: bool,
    pub ptp_amp_stddev_abs: bool,
    pub ptp_amp_stddev_rel: bool,
    pub min_range_abs: bool,
    pub min_range_rel: bool,
    pub min_mean: bool,
    pub min_mean_mean_dist: bool,
    pub min_mean_mean_ratio: bool,
    /// Minimum-to-minimum amplitude differences.
    pub mtm_amp_mean_abs: bool,
    pub mtm_amp_mean_rel: bool,
    pub mtm_amp_stddev_abs: bool,
    pub mtm_amp_stddev_rel: bool,
    pub mean_rising_slope: bool,
    pub max_rising_slope: bool,
    pub min_rising_slope: bool,
    pub stddev_rising_slope: bool,
    pub mean_falling_slope: bool,
    pub max_falling_slope: bool,
    pub min_falling_slope: bool,
    pub stddev_falling_slope: bool,
    /// Peak pruning threshold relative to the neighbouring value.
    pub rel_thresh: f64,
    pub abs_thresh: f64,
    pub use_abs_thresh: bool,
    /// Compare rises and falls relative to their base value instead
    /// of against `abs_thresh`.
    pub dyn_rel_thresh: bool,
}

impl Default for Peaks2Config {
    fn default() -> Self {
        Self {
            enabled: false,
            num_peaks: true,
            mean_peak_dist: true,
            peak_dist_stddev: true,
            peak_range_abs: true,
            peak_range_rel: true,
            peak_mean: true,
            peak_mean_mean_dist: true,
            peak_mean_mean_ratio: true,
            ptp_amp_mean_abs: true,
            ptp_amp_mean_rel: true,
            ptp_amp_stddev_abs: true,
            ptp_amp_stddev_rel: true,
            min_range_abs: true,
            min_range_rel: true,
            min_mean: true,
            min_mean_mean_dist: true,
            min_mean_mean_ratio: true,
            mtm_amp_mean_abs: true,
            mtm_amp_mean_rel: true,
            mtm_amp_stddev_abs: true,
            mtm_amp_stddev_rel: true,
            mean_rising_slope: true,
            max_rising_slope: true,
            min_rising_slope: true,
            stddev_rising_slope: true,
            mean_falling_slope: true,
            max_falling_slope: true,
            min_falling_slope: true,
            stddev_falling_slope: true,
            rel_thresh: 0.0,
            abs_thresh: 0.0,
            use_abs_thresh: false,
            dyn_rel_thresh: true,
        }
    }
}

impl Peaks2Config {
    fn needs_slopes(&self) -> bool {
        self.mean_rising_slope
            || self.max_rising_slope
            || self.min_rising_slope
            || self.stddev_rising_slope
            || self.mean_falling_slope
            || self.max_falling_slope
            || self.min_falling_slope
            || self.stddev_falling_slope
    }

    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        [
            self.num_peaks,
            self.mean_peak_dist,
            self.peak_dist_stddev,
            self.peak_range_abs,
            self.peak_range_rel,
            self.peak_mean,
            self.peak_mean_mean_dist,
            self.peak_mean_mean_ratio,
            self.ptp_amp_mean_abs,
            self.ptp_amp_mean_rel,
            self.ptp_amp_stddev_abs,
            self.ptp_amp_stddev_rel,
            self.min_range_abs,
            self.min_range_rel,
            self.min_mean,
            self.min_mean_mean_dist,
            self.min_mean_mean_ratio,
            self.mtm_amp_mean_abs,
            self.mtm_amp_mean_rel,
            self.mtm_amp_stddev_abs,
            self.mtm_amp_stddev_rel,
            self.mean_rising_slope,
            self.max_rising_slope,
            self.min_rising_slope,
            self.stddev_rising_slope,
            self.mean_falling_slope,
            self.max_falling_slope,
            self.min_falling_slope,
            self.stddev_falling_slope,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }
}

#[derive(Debug, Clone, Copy)]
struct Extremum {
    is_max: bool,
    y: f64,
    x: usize,
    removed: bool,
}

struct Thresh {
    dynamic: bool,
    rel: f64,
    abs: f64,
}

impl Thresh {
    fn below(&self, diff: f64, base: f64) -> bool {
        if self.dynamic {
            if base == 0.0 {
                diff != 0.0
            } else {
                (diff / base).abs() < self.rel
            }
        } else {
            diff < self.abs
        }
    }
}

pub(crate) fn peaks2(cfg: &Peaks2Config, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let x = ctx.data;
    let n = ctx.n();
    let range = ctx.max - ctx.min;

    let mut rel = cfg.rel_thresh.max(0.0);
    if !cfg.dyn_rel_thresh && rel > 1.0 {
        rel = 1.0;
    }
    let th = Thresh {
        dynamic: cfg.dyn_rel_thresh && !cfg.use_abs_thresh,
        rel,
        abs: if cfg.use_abs_thresh {
            cfg.abs_thresh
        } else {
            rel * range
        },
    };

    // step 1: all strict local extrema
    let mut list: Vec<Extremum> = Vec::new();
    for i in 2..n.saturating_sub(2) {
        if x[i] > x[i - 1] && x[i] > x[i + 1] {
            list.push(Extremum {
                is_max: true,
                y: x[i],
                x: i,
                removed: false,
            });
        } else if x[i] < x[i - 1] && x[i] < x[i + 1] {
            list.push(Extremum {
                is_max: false,
                y: x[i],
                x: i,
                removed: false,
            });
        }
    }

    // step 2a: drop maxima whose rise over the preceding value or
    // minimum stays below the threshold
    let mut last_val = x[0];
    let mut last_min = x[0];
    let mut last_max = x[0];
    let mut min_flag = false;
    let mut last_max_idx: Option<usize> = None;
    for i in 0..list.len() {
        let el = list[i];
        if el.is_max {
            if th.below((el.y - last_val).abs(), el.y.min(last_val)) {
                if th.below(el.y - last_min, last_min) {
                    list[i].removed = true;
                } else {
                    if el.y > last_max * 1.05 {
                        if let Some(j) = last_max_idx {
                            list[j].removed = true;
                        }
                        last_max = el.y;
                        last_max_idx = Some(i);
                    } else if min_flag {
                        last_max = el.y;
                        last_max_idx = Some(i);
                    } else {
                        list[i].removed = true;
                    }
                    min_flag = false;
                }
            } else {
                min_flag = false;
                last_max = el.y;
                last_max_idx = Some(i);
            }
        } else if !th.below((el.y - last_val).abs(), el.y.min(last_val)) {
            min_flag = true;
            last_min = el.y;
        }
        last_val = el.y;
    }

    // step 2b: drop minima that barely dip below the preceding maximum
    let mut last_max = x[0];
    for el in list.iter_mut().filter(|e| !e.removed) {
        if el.is_max {
            last_max = el.y;
        } else if th.below(last_max - el.y, el.y) {
            el.removed = true;
        }
    }

    // step 3: enforce alternation, keeping the higher of adjacent
    // maxima and the lower of adjacent minima
    let mut last_min = x[0];
    let mut last_max = x[0];
    let mut min_flag = false;
    let mut init = true;
    let mut last_min_idx: Option<usize> = None;
    let mut last_max_idx: Option<usize> = None;
    for i in 0..list.len() {
        let el = list[i];
        if el.removed {
            continue;
        }
        if !el.is_max {
            if !min_flag || init {
                last_min = el.y;
                last_min_idx = Some(i);
                min_flag = true;
                init = false;
            } else if el.y >= last_min {
                list[i].removed = true;
            } else {
                if let Some(j) = last_min_idx {
                    if j != i {
                        list[j].removed = true;
                    }
                }
                last_min_idx = Some(i);
                last_min = el.y;
            }
        } else if min_flag || init {
            last_max = el.y;
            last_max_idx = Some(i);
            min_flag = false;
            init = false;
        } else if el.y <= last_max {
            list[i].removed = true;
        } else {
            if let Some(j) = last_max_idx {
                if j != i {
                    list[j].removed = true;
                }
            }
            last_max_idx = Some(i);
            last_max = el.y;
        }
    }

    let survivors: Vec<Extremum> = list.into_iter().filter(|e| !e.removed).collect();

    // amplitude and distance statistics
    let mut peak_min = 0.0;
    let mut peak_max = 0.0;
    let mut peak_dist = 0.0;
    let mut peak_diff = 0.0;
    let mut n_peak_dist = 0u64;
    let mut peak_mean = 0.0;
    let mut n_peaks = 0u64;
    let mut min_min = 0.0;
    let mut min_max = 0.0;
    let mut min_diff = 0.0;
    let mut n_min_dist = 0u64;
    let mut min_mean = 0.0;
    let mut n_mins = 0u64;
    let mut prev_max: Option<Extremum> = None;
    let mut prev_min: Option<Extremum> = None;
    for el in &survivors {
        if el.is_max {
            match prev_max {
                None => {
                    peak_min = el.y;
                    peak_max = el.y;
                }
                Some(p) => {
                    n_peak_dist += 1;
                    peak_dist += (el.x - p.x) as f64;
                    peak_diff += (el.y - p.y).abs();
                    peak_min = peak_min.min(el.y);
                    peak_max = peak_max.max(el.y);
                }
            }
            prev_max = Some(*el);
            peak_mean += el.y;
            n_peaks += 1;
        } else {
            match prev_min {
                None => {
                    min_min = el.y;
                    min_max = el.y;
                }
                Some(p) => {
                    n_min_dist += 1;
                    min_diff += (el.y - p.y).abs();
                    min_min = min_min.min(el.y);
                    min_max = min_max.max(el.y);
                }
            }
            prev_min = Some(*el);
            min_mean += el.y;
            n_mins += 1;
        }
    }
    if n_peaks > 1 {
        peak_mean /= n_peaks as f64;
        if n_peak_dist > 1 {
            peak_dist /= n_peak_dist as f64;
            peak_diff /= n_peak_dist as f64;
        }
    }
    if n_mins > 0 {
        min_mean /= n_mins as f64;
        if n_min_dist > 1 {
            min_diff /= n_min_dist as f64;
        }
    }

    let mut peak_stddev_dist = 0.0;
    let mut peak_stddev_diff = 0.0;
    let mut min_stddev_diff = 0.0;
    let mut prev_max: Option<Extremum> = None;
    let mut prev_min: Option<Extremum> = None;
    for el in &survivors {
        if el.is_max {
            if let Some(p) = prev_max {
                let d = (el.x - p.x) as f64 - peak_dist;
                peak_stddev_dist += d * d;
                let a = (el.y - p.y).abs() - peak_diff;
                peak_stddev_diff += a * a;
            }
            prev_max = Some(*el);
        } else {
            if let Some(p) = prev_min {
                let a = (el.y - p.y).abs() - min_diff;
                min_stddev_diff += a * a;
            }
            prev_min = Some(*el);
        }
    }
    if n_peak_dist > 1 {
        peak_stddev_dist /= n_peak_dist as f64;
        peak_stddev_diff /= n_peak_dist as f64;
    }
    peak_stddev_dist = if peak_stddev_dist > 0.0 {
        peak_stddev_dist.sqrt()
    } else {
        0.0
    };
    peak_stddev_diff = if peak_stddev_diff > 0.0 {
        peak_stddev_diff.sqrt()
    } else {
        0.0
    };
    if n_min_dist > 1 {
        min_stddev_diff /= n_min_dist as f64;
    }
    min_stddev_diff = if min_stddev_diff > 0.0 {
        min_stddev_diff.sqrt()
    } else {
        0.0
    };

    // slope statistics between alternating extrema
    let mut mean_rising = 0.0;
    let mut mean_falling = 0.0;
    let mut min_rising = 0.0;
    let mut max_rising = 0.0;
    let mut min_falling = 0.0;
    let mut max_falling = 0.0;
    let mut stddev_rising = 0.0;
    let mut stddev_falling = 0.0;
    if cfg.needs_slopes() {
        let t = ctx.period;
        let mut n_rising = 0u64;
        let mut n_falling = 0u64;
        let mut last_max = x[0];
        let mut last_max_pos = 0usize;
        let mut last_min = x[0];
        let mut last_min_pos = 0usize;
        let mut last_is_max: i32 = -1;
        for el in &survivors {
            if !el.is_max {
                last_min = el.y;
                last_min_pos = el.x;
                if last_min_pos > last_max_pos {
                    let slope = (last_max - last_min) / ((last_min_pos - last_max_pos) as f64 * t);
                    mean_falling += slope;
                    if n_falling == 0 {
                        min_falling = slope;
                        max_falling = slope;
                    } else {
                        min_falling = min_falling.min(slope);
                        max_falling = max_falling.max(slope);
                    }
                    n_falling += 1;
                    last_is_max = 0;
                }
            } else {
                last_max = el.y;
                last_max_pos = el.x;
                if last_max_pos > last_min_pos {
                    let slope = (last_max - last_min) / ((last_max_pos - last_min_pos) as f64 * t);
                    mean_rising += slope;
                    if n_rising == 0 {
                        min_rising = slope;
                        max_rising = slope;
                    } else {
                        min_rising = min_rising.min(slope);
                        max_rising = max_rising.max(slope);
                    }
                    n_rising += 1;
                    last_is_max = 1;
                }
            }
        }
        // slope from the last extremum to the end of the input
        if last_is_max == 1 {
            if n - 1 > last_max_pos {
                let slope = (x[n - 1] - last_max) / ((n - 1 - last_max_pos) as f64 * t);
                mean_falling += slope;
                if n_falling == 0 {
                    min_falling = slope;
                    max_falling = slope;
                } else {
                    min_falling = min_falling.min(slope);
                    max_falling = max_falling.max(slope);
                }
                n_falling += 1;
            }
        } else if last_is_max == 0 {
            if n - 1 > last_min_pos {
                let slope = (x[n - 1] - last_min) / ((n - 1 - last_min_pos) as f64 * t);
                mean_rising += slope;
                if n_rising == 0 {
                    min_rising = slope;
                    max_rising = slope;
                } else {
                    min_rising = min_rising.min(slope);
                    max_rising = max_rising.max(slope);
                }
                n_rising += 1;
            }
        } else {
            // no extrema at all, assign the overall trend
            let slope = (x[n - 1] - x[0]) / n as f64;
            if slope > 0.0 {
                mean_rising = slope;
                max_rising = slope;
                min_rising = slope;
                n_rising = 1;
            } else if slope < 0.0 {
                mean_falling = slope;
                max_falling = slope;
                min_falling = slope;
                n_falling = 1;
            }
        }
        if n_rising > 1 {
            mean_rising /= n_rising as f64;
        }
        if n_falling > 1 {
            mean_falling /= n_falling as f64;
        }

        let mut last_max = x[0];
        let mut last_max_pos = 0usize;
        let mut last_min = x[0];
        let mut last_min_pos = 0usize;
        for el in &survivors {
            if !el.is_max {
                last_min = el.y;
                last_min_pos = el.x;
                if last_min_pos > last_max_pos {
                    let slope = (last_max - last_min) / ((last_min_pos - last_max_pos) as f64 * t);
                    stddev_falling += (slope - mean_falling) * (slope - mean_falling);
                }
            } else {
                last_max = el.y;
                last_max_pos = el.x;
                if last_max_pos > last_min_pos {
                    let slope = (last_max - last_min) / ((last_max_pos - last_min_pos) as f64 * t);
                    stddev_rising += (slope - mean_rising) * (slope - mean_rising);
                }
            }
        }
        if n_rising > 1 {
            stddev_rising /= n_rising as f64;
        }
        if n_falling > 1 {
            stddev_falling /= n_falling as f64;
        }
        stddev_rising = if stddev_rising > 0.0 {
            stddev_rising.sqrt()
        } else {
            0.0
        };
        stddev_falling = if stddev_falling > 0.0 {
            stddev_falling.sqrt()
        } else {
            0.0
        };
    }

    match ctx.norm {
        TimeNorm::Frames => {}
        TimeNorm::Seconds => {
            peak_dist *= ctx.period;
            peak_stddev_dist *= ctx.period;
        }
        TimeNorm::Segment => {
            peak_dist /= n as f64;
            peak_stddev_dist /= n as f64;
        }
    }

    let rel_to_range = |v: f64| if range != 0.0 { v / range } else { v };
    let mut push = |enabled: bool, v: f64| {
        if enabled {
            out.push(v);
        }
    };
    push(cfg.num_peaks, n_peaks as f64);
    push(cfg.mean_peak_dist, peak_dist);
    push(cfg.peak_dist_stddev, peak_stddev_dist);
    push(cfg.peak_range_abs, peak_max - peak_min);
    push(cfg.peak_range_rel, rel_to_range(peak_max - peak_min).abs());
    push(cfg.peak_mean, peak_mean);
    push(cfg.peak_mean_mean_dist, peak_mean - ctx.mean);
    push(
        cfg.peak_mean_mean_ratio,
        if ctx.mean != 0.0 {
            peak_mean / ctx.mean
        } else {
            peak_mean
        },
    );
    push(cfg.ptp_amp_mean_abs, peak_diff);
    push(cfg.ptp_amp_mean_rel, rel_to_range(peak_diff));
    push(cfg.ptp_amp_stddev_abs, peak_stddev_diff);
    push(cfg.ptp_amp_stddev_rel, rel_to_range(peak_stddev_diff));
    push(cfg.min_range_abs, min_max - min_min);
    push(cfg.min_range_rel, rel_to_range(min_max - min_min).abs());
    push(cfg.min_mean, min_mean);
    push(cfg.min_mean_mean_dist, ctx.mean - min_mean);
    push(
        cfg.min_mean_mean_ratio,
        if ctx.mean != 0.0 {
            min_mean / ctx.mean
        } else {
            min_mean
        },
    );
    push(cfg.mtm_amp_mean_abs, min_diff);
    push(cfg.mtm_amp_mean_rel, rel_to_range(min_diff));
    push(cfg.mtm_amp_stddev_abs, min_stddev_diff);
    push(cfg.mtm_amp_stddev_rel, rel_to_range(min_stddev_diff));
    push(cfg.mean_rising_slope, mean_rising);
    push(cfg.max_rising_slope, max_rising);
    push(cfg.min_rising_slope, min_rising);
    push(cfg.stddev_rising_slope, stddev_rising);
    push(cfg.mean_falling_slope, mean_falling);
    push(cfg.max_falling_slope, max_falling);
    push(cfg.min_falling_slope, min_falling);
    push(cfg.stddev_falling_slope, stddev_falling);
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
    fn test_single_peak_detected() {
        let data = [0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0];
        let sorted = [0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0];
        let ctx = contour(&data, &sorted);
        let cfg = PeaksConfig {
            enabled: true,
            ..PeaksConfig::default()
        };
        let mut out = Vec::new();
        peaks(&cfg, &ctx, &mut out);
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], 1.0);
        // no second peak, mean distance falls back to n + 1
        assert_eq!(out[1], 8.0);
        assert_eq!(out[4], 0.0);
    }

    #[test]
    fn test_flat_input_has_no_peaks() {
        let data = [2.0; 10];
        let ctx = contour(&data, &data);
        let cfg = PeaksConfig {
            enabled: true,
            ..PeaksConfig::default()
        };
        let mut out = Vec::new();
        peaks(&cfg, &ctx, &mut out);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn test_periodic_peaks_and_slopes() {
        // triangular wave, maxima at 3, 9, 15 and minima at 6, 12
        let mut data = Vec::new();
        for _ in 0..3 {
            data.extend([1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
        }
        let mut sorted = data.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let ctx = contour(&data, &sorted);
        let cfg = Peaks2Config {
            enabled: true,
            ..Peaks2Config::default()
        };
        let mut out = Vec::new();
        peaks2(&cfg, &ctx, &mut out);
        assert_eq!(out.len(), 29);
        assert_eq!(out[0], 3.0); // peaks
        assert_eq!(out[1], 6.0); // mean peak distance in frames
        assert_eq!(out[2], 0.0); // perfectly periodic
        assert_eq!(out[5], 4.0); // peak mean
        assert_eq!(out[14], 1.0); // minimum mean
        // rise of 3 over 3 frames of 10 ms each
        assert!((out[21] - 100.0).abs() < 1e-9);
        assert!(out[24] < 1e-9); // identical rising slopes
    }

    #[test]
    fn test_monotonic_ramp_reports_overall_slope() {
        let data: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mut sorted = data.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let ctx = contour(&data, &sorted);
        let cfg = Peaks2Config {
            enabled: true,
            ..Peaks2Config::default()
        };
        let mut out = Vec::new();
        peaks2(&cfg, &ctx, &mut out);
        assert_eq!(out[0], 0.0);
        assert!((out[21] - 0.9).abs() < 1e-9); // (9 - 0) / 10
        assert_eq!(out[25], 0.0);
    }

    #[test]
    fn test_small_ripple_pruned_by_threshold() {
        // one dominant peak with a tiny ripple on its flank
        let data = [
            1.0, 1.2, 1.0, 5.0, 4.9, 5.02, 4.0, 2.0, 1.0, 1.05, 1.0, 1.0,
        ];
        let mut sorted = data.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let ctx = contour(&data, &sorted);
        let cfg = Peaks2Config {
            enabled: true,
            rel_thresh: 0.10,
            ..Peaks2Config::default()
        };
        let mut out = Vec::new();
        peaks2(&cfg, &ctx, &mut out);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[5], 5.0);
    }
}
