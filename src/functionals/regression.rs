//! Linear and quadratic least-squares fits over the frame index,
//! with fit errors, parabola vertex, and partial slopes.

use serde::{Deserialize, Serialize};

use super::Contour;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    pub enabled: bool,
    /// Linear slope.
    pub linregc1: bool,
    /// Linear offset.
    pub linregc2: bool,
    pub linregerr_a: bool,
    pub linregerr_q: bool,
    /// Quadratic coefficients a, b, c.
    pub qregc1: bool,
    pub qregc2: bool,
    pub qregc3: bool,
    pub qregerr_a: bool,
    pub qregerr_q: bool,
    pub centroid: bool,
    /// Parabola slope left of the vertex.
    pub qreg_ls: bool,
    pub qreg_rs: bool,
    pub qreg_x0: bool,
    pub qreg_y0: bool,
    /// Parabola value at the right contour edge.
    pub qreg_yr: bool,
    /// Vertex height and edge values before input normalization.
    pub qreg_y0nn: bool,
    pub qreg_c3nn: bool,
    pub qreg_yrnn: bool,
    /// Scale slopes by the contour length.
    pub norm_reg_coeff: bool,
    /// Scale values and errors by the contour range.
    pub norm_inputs: bool,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            linregc1: true,
            linregc2: true,
            linregerr_a: true,
            linregerr_q: true,
            qregc1: true,
            qregc2: true,
            qregc3: true,
            qregerr_a: true,
            qregerr_q: true,
            centroid: true,
            qreg_ls: true,
            qreg_rs: true,
            qreg_x0: true,
            qreg_y0: true,
            qreg_yr: true,
            qreg_y0nn: true,
            qreg_c3nn: true,
            qreg_yrnn: true,
            norm_reg_coeff: true,
            norm_inputs: true,
        }
    }
}

impl RegressionConfig {
    fn needs_quadratic(&self) -> bool {
        self.qregc1
            || self.qregc2
            || self.qregc3
            || self.qregerr_a
            || self.qregerr_q
            || self.centroid
            || self.qreg_ls
            || self.qreg_rs
            || self.qreg_x0
            || self.qreg_y0
            || self.qreg_yr
            || self.qreg_y0nn
            || self.qreg_c3nn
            || self.qreg_yrnn
    }

    pub fn n_outputs(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        [
            self.linregc1,
            self.linregc2,
            self.linregerr_a,
            self.linregerr_q,
            self.qregc1,
            self.qregc2,
            self.qregc3,
            self.qregerr_a,
            self.qregerr_q,
            self.centroid,
            self.qreg_ls,
            self.qreg_rs,
            self.qreg_x0,
            self.qreg_y0,
            self.qreg_yr,
            self.qreg_y0nn,
            self.qreg_c3nn,
            self.qreg_yrnn,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }
}

fn guard(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

pub(crate) fn regression(cfg: &RegressionConfig, ctx: &Contour, out: &mut Vec<f64>) {
    if !cfg.enabled || ctx.n() == 0 {
        return;
    }
    let x = ctx.data;
    let n = ctx.n() as f64;
    let mut range = ctx.max - ctx.min;
    if range <= 0.0 {
        range = 1.0;
    }

    // first moments over the frame index
    let asum = ctx.mean * n;
    let mut num = 0.0;
    let mut num2 = 0.0;
    for (i, &v) in x.iter().enumerate() {
        let t = v * i as f64;
        num += t;
        num2 += t * i as f64;
    }
    let mut centroid = if asum != 0.0 { num / (asum * n) } else { 0.0 };

    let quad = cfg.needs_quadratic();
    let mut m = 0.0;
    let mut t = 0.0;
    let mut a = 0.0;
    let mut b = 0.0;
    let mut c = 0.0;
    if ctx.n() > 1 {
        // power sums of the index 0..n-1
        let s1 = n * (n - 1.0) / 2.0;
        let s2 = n * (n - 1.0) * (2.0 * n - 1.0) / 6.0;
        let s3 = s1 * s1;
        let s4 = s2 * (3.0 * ((n - 1.0) * (n - 1.0) + (n - 1.0)) - 1.0) / 5.0;

        let denom = n - s1 * s1 / s2;
        t = if denom != 0.0 {
            (asum - num * s1 / s2) / denom
        } else {
            0.0
        };
        m = (num - t * s1) / s2;

        if quad {
            let det = s4 * s2 * n + 2.0 * s3 * s1 * s2 - s2 * s2 * s2 - s3 * s3 * n - s3 * s4;
            if det != 0.0 {
                a = ((s2 * n - s3) * num2 + (s1 * s2 - s3 * n) * num + (s3 * s1 - s2 * s2) * asum)
                    / det;
                b = ((s1 * s2 - s3 * n) * num2 + (s4 * n - s2 * s2) * num + (s3 * s2 - s4 * s1) * asum)
                    / det;
                c = ((s3 * s1 - s2 * s2) * num2 + (s3 * s2 - s4 * s1) * num + (s4 * s2 - s3 * s3) * asum)
                    / det;
            }
        }
    } else {
        t = x[0];
        c = x[0];
    }

    let mut lea = 0.0;
    let mut leq = 0.0;
    for (i, &v) in x.iter().enumerate() {
        let mut e = v - (m * i as f64 + t);
        if cfg.norm_inputs {
            e /= range;
        }
        lea += e.abs();
        leq += e * e;
    }

    let mut qea = 0.0;
    let mut qeq = 0.0;
    let mut x0 = 0.0;
    let mut y0 = 0.0;
    let mut yr = 0.0;
    let mut y0nn = 0.0;
    let mut c3nn = 0.0;
    let mut yrnn = 0.0;
    if quad {
        for (i, &v) in x.iter().enumerate() {
            let i = i as f64;
            let mut e = v - (a * i * i + b * i + c);
            if cfg.norm_inputs {
                e /= range;
            }
            qea += e.abs();
            qeq += e * e;
        }
        // parabola vertex, clipped to +-n
        x0 = b / (-2.0 * a);
        if !x0.is_finite() {
            x0 = n;
        }
        x0 = x0.clamp(-n, n);
        y0 = guard(c - b * b / (4.0 * a));
        y0nn = y0;
        yr = guard(a * (n - 1.0) * (n - 1.0) + b * (n - 1.0) + c);
        yrnn = yr;
        c3nn = c;
    }

    if cfg.norm_reg_coeff {
        m *= n - 1.0;
        a *= (n - 1.0) * (n - 1.0);
        b *= n - 1.0;
        if n != 1.0 {
            x0 /= n - 1.0;
        }
    }
    if cfg.norm_inputs {
        m /= range;
        t = (t - ctx.min) / range;
        a /= range;
        b /= range;
        c = (c - ctx.min) / range;
        y0 = (y0 - ctx.min) / range;
        yr = (yr - ctx.min) / range;
    }

    let mut ls = 0.0;
    let mut rs = 0.0;
    if quad {
        if x0 > 0.0 {
            ls = (y0 - c) / x0;
        }
        if cfg.norm_reg_coeff {
            if x0 < n - 1.0 {
                rs = (yr - y0) / (1.0 - x0);
            }
        } else if x0 < n - 1.0 {
            rs = (yr - y0) / (n - 1.0 - x0);
        }
    }

    m = guard(m);
    t = guard(t);
    a = guard(a);
    b = guard(b);
    if !c.is_finite() {
        c = 0.0;
        c3nn = 0.0;
    }
    ls = guard(ls);
    rs = guard(rs);
    centroid = guard(centroid);
    let lea = guard(lea / n);
    let leq = guard(leq / n);
    let qea = guard(qea / n);
    let qeq = guard(qeq / n);

    let mut push = |enabled: bool, v: f64| {
        if enabled {
            out.push(v);
        }
    };
    push(cfg.linregc1, m);
    push(cfg.linregc2, t);
    push(cfg.linregerr_a, lea);
    push(cfg.linregerr_q, leq);
    push(cfg.qregc1, a);
    push(cfg.qregc2, b);
    push(cfg.qregc3, c);
    push(cfg.qregerr_a, qea);
    push(cfg.qregerr_q, qeq);
    push(cfg.centroid, centroid);
    push(cfg.qreg_ls, ls);
    push(cfg.qreg_rs, rs);
    push(cfg.qreg_x0, x0);
    push(cfg.qreg_y0, y0);
    push(cfg.qreg_yr, yr);
    push(cfg.qreg_y0nn, y0nn);
    push(cfg.qreg_c3nn, c3nn);
    push(cfg.qreg_yrnn, yrnn);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functionals::TimeNorm;

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

    fn raw_config() -> RegressionConfig {
        RegressionConfig {
            enabled: true,
            norm_reg_coeff: false,
            norm_inputs: false,
            ..RegressionConfig::default()
        }
    }

    #[test]
    fn test_linear_fit_recovers_slope_and_offset() {
        // y = 2i + 1, exact fit
        let data: Vec<f64> = (0..10).map(|i| 2.0 * i as f64 + 1.0).collect();
        let mut sorted = data.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let ctx = contour(&data, &sorted);
        let mut out = Vec::new();
        regression(&raw_config(), &ctx, &mut out);
        assert_eq!(out.len(), 18);
        assert!((out[0] - 2.0).abs() < 1e-9);
        assert!((out[1] - 1.0).abs() < 1e-9);
        assert!(out[2].abs() < 1e-9); // no linear error
        assert!(out[3].abs() < 1e-9);
    }

    #[test]
    fn test_quadratic_fit_recovers_parabola() {
        // y = (i - 4)^2 = i^2 - 8i + 16
        let data: Vec<f64> = (0..9).map(|i| (i as f64 - 4.0).powi(2)).collect();
        let mut sorted = data.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let ctx = contour(&data, &sorted);
        let mut out = Vec::new();
        regression(&raw_config(), &ctx, &mut out);
        assert!((out[4] - 1.0).abs() < 1e-6); // a
        assert!((out[5] + 8.0).abs() < 1e-6); // b
        assert!((out[6] - 16.0).abs() < 1e-6); // c
        assert!(out[7].abs() < 1e-6); // no quadratic error
        assert!((out[12] - 4.0).abs() < 1e-6); // vertex x0
        assert!(out[13].abs() < 1e-6); // vertex y0
    }

    #[test]
    fn test_constant_input_has_zero_slope() {
        let data = [5.0; 6];
        let ctx = contour(&data, &data);
        let mut out = Vec::new();
        regression(&raw_config(), &ctx, &mut out);
        assert!(out[0].abs() < 1e-9);
        assert!((out[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_degenerates_gracefully() {
        let data = [3.0];
        let ctx = contour(&data, &data);
        let mut out = Vec::new();
        regression(&raw_config(), &ctx, &mut out);
        assert_eq!(out.len(), 18);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 3.0);
        assert_eq!(out[6], 3.0);
        assert!(out.iter().all(|v| v.is_finite()));
    }
}
