//! Shared numeric routines used by several stages: cubic splines,
//! parabolic interpolation, medians, spectral entropy, and the
//! linear-prediction helpers behind the PLP and LPC stages.

pub fn is_power_of_2(x: usize) -> bool {
    x >= 1 && (x & (x - 1)) == 0
}

/// Smallest power of two >= `x`, with a floor of 4.
pub fn ceil_to_next_pow2(x: usize) -> usize {
    let mut y = 4;
    while y < x {
        y <<= 1;
    }
    y
}

pub fn lc_sinc(x: f64) -> f64 {
    let y = std::f64::consts::PI * x;
    if y == 0.0 {
        1.0
    } else {
        y.sin() / y
    }
}

/// Natural cubic spline fit. Computes second derivatives `y2` for the
/// knots `(x, y)`. Boundary slopes above 0.99e30 select the natural
/// boundary condition.
pub fn spline(x: &[f64], y: &[f64], yp1: f64, ypn: f64, y2: &mut [f64]) -> bool {
    let n = x.len();
    if n < 3 || y.len() != n || y2.len() != n {
        return false;
    }
    let mut u = vec![0.0; n - 1];

    if yp1 > 0.99e30 {
        y2[0] = 0.0;
        u[0] = 0.0;
    } else {
        y2[0] = -0.5;
        u[0] = (3.0 / (x[1] - x[0])) * ((y[1] - y[0]) / (x[1] - x[0]) - yp1);
    }

    for i in 1..n - 1 {
        let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
        let p = sig * y2[i - 1] + 2.0;
        y2[i] = (sig - 1.0) / p;
        let mut ui = (y[i + 1] - y[i]) / (x[i + 1] - x[i]) - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
        ui = (6.0 * ui / (x[i + 1] - x[i - 1]) - sig * u[i - 1]) / p;
        u[i] = ui;
    }

    let (qn, un) = if ypn > 0.99e30 {
        (0.0, 0.0)
    } else {
        (
            0.5,
            (3.0 / (x[n - 1] - x[n - 2])) * (ypn - (y[n - 1] - y[n - 2]) / (x[n - 1] - x[n - 2])),
        )
    };

    y2[n - 1] = (un - qn * u[n - 2]) / (qn * y2[n - 2] + 1.0);
    for k in (0..n - 1).rev() {
        y2[k] = y2[k] * y2[k + 1] + u[k];
    }
    true
}

/// Evaluates a spline fitted by [`spline`] at `x`. Returns `None` when
/// two knots coincide.
pub fn splint(xa: &[f64], ya: &[f64], y2a: &[f64], x: f64) -> Option<f64> {
    let n = xa.len();
    let mut klo = 1usize;
    let mut khi = n;
    while khi - klo > 1 {
        let k = (khi + klo) >> 1;
        if xa[k - 1] > x {
            khi = k;
        } else {
            klo = k;
        }
    }
    let khi = khi - 1;
    let klo = klo - 1;
    let h = xa[khi] - xa[klo];
    if h == 0.0 {
        return None;
    }
    let a = (xa[khi] - x) / h;
    let b = (x - xa[klo]) / h;
    Some(
        a * ya[klo]
            + b * ya[khi]
            + ((a * a * a - a) * y2a[klo] + (b * b * b - b) * y2a[khi]) * (h * h) / 6.0,
    )
}

/// Peak enhancement for sub-harmonic summation: zeroes the spectrum
/// between local maxima, leaving a 3-bin halo around each one.
pub fn spec_enhance_peaks(a: &mut [f64]) {
    let n = a.len();
    if n < 2 {
        return;
    }
    let mut posmax: Vec<i64> = Vec::with_capacity(n / 2 + 2);
    if a[0] > a[1] {
        posmax.push(0);
    }
    for i in 1..n - 1 {
        if a[i] > a[i - 1] && a[i] >= a[i + 1] {
            posmax.push(i as i64);
        }
    }
    if a[n - 1] > a[n - 2] {
        posmax.push(n as i64 - 1);
    }

    if posmax.len() == 1 {
        // with a single maximum the second position slot is never
        // filled; the clear is centred on 0
        let p = 0i64;
        let mut j = 0i64;
        while j <= p - 3 {
            a[j as usize] = 0.0;
            j += 1;
        }
        let mut j = p + 3;
        while (j as usize) < n {
            a[j as usize] = 0.0;
            j += 1;
        }
    } else {
        for i in 1..posmax.len() {
            let mut j = posmax[i - 1] + 3;
            while j <= posmax[i] - 3 {
                if j >= 0 && (j as usize) < n {
                    a[j as usize] = 0.0;
                }
                j += 1;
            }
        }
    }
}

/// In-place 3-point smoothing: `a[i] = (a[i-1] + 2 a[i] + a[i+1]) / 4`.
pub fn spec_smooth(a: &mut [f64]) {
    let n = a.len();
    if n < 2 {
        return;
    }
    let mut aim1 = 0.0;
    for i in 0..n - 1 {
        let ai = a[i];
        a[i] = (aim1 + 2.0 * ai + a[i + 1]) / 4.0;
        aim1 = ai;
    }
}

/// Parabola through three points. Returns the x of the vertex and fills
/// `y` with the vertex height. Falls back to picking the largest point
/// when the three are collinear.
pub fn quad_from_3_points(
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    x3: f64,
    y3: f64,
    y: &mut f64,
) -> f64 {
    let den = x1 * x1 * x2 + x2 * x2 * x3 + x3 * x3 * x1 - x3 * x3 * x2 - x2 * x2 * x1
        - x1 * x1 * x3;
    if den != 0.0 {
        let a = (y1 * x2 + y2 * x3 + y3 * x1 - y3 * x2 - y2 * x1 - y1 * x3) / den;
        let b = (x1 * x1 * y2 + x2 * x2 * y3 + x3 * x3 * y1
            - x3 * x3 * y2
            - x2 * x2 * y1
            - x1 * x1 * y3)
            / den;
        let c = (x1 * x1 * x2 * y3 + x2 * x2 * x3 * y1 + x3 * x3 * x1 * y2
            - x3 * x3 * x2 * y1
            - x2 * x2 * x1 * y3
            - x1 * x1 * x3 * y2)
            / den;
        if a != 0.0 {
            let x = -b / (2.0 * a);
            *y = c - a * x * x;
            return x;
        }
    }
    if y1 > y2 && y1 > y3 {
        *y = y1;
        return x1;
    } else if y2 > y1 && y2 > y3 {
        *y = y2;
        return x2;
    } else if y3 > y1 && y3 > y2 {
        *y = y3;
        return x3;
    }
    *y = y1;
    x1
}

/// Median: middle element for odd n, mean of the two middle elements
/// for even n.
pub fn median(x: &[f64]) -> f64 {
    let n = x.len();
    if n == 0 {
        return 0.0;
    }
    let mut tmp = x.to_vec();
    tmp.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if n & 1 == 1 {
        tmp[n >> 1]
    } else {
        0.5 * (tmp[n / 2] + tmp[n / 2 - 1])
    }
}

/// Median that also reports which original index (or indices, for even
/// n) the median came from, so auxiliary data can be reordered in step
/// with the filtered values.
pub fn median_ordered(x: &[f64]) -> (f64, usize, usize) {
    let n = x.len();
    if n == 0 {
        return (0.0, 0, 0);
    }
    let mut idx: Vec<usize> = (0..n).collect();
    idx.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(std::cmp::Ordering::Equal));
    if n & 1 == 1 {
        let m = n >> 1;
        (x[idx[m]], idx[m], idx[m])
    } else {
        let lo = idx[(n >> 1) - 1];
        let hi = idx[n >> 1];
        (0.5 * (x[lo] + x[hi]), lo, hi)
    }
}

/// Spectral entropy in bits of the vector treated as an unnormalized
/// PMF. Negative values are floored, exact zeros substituted with 1e-5.
pub fn entropy(vals: &[f64]) -> f64 {
    let mut v = vals.to_vec();
    let mut dn: f64 = 0.0;
    let mut min: f64 = 0.0;
    for &x in &v {
        dn += x;
        if x < min {
            min = x;
        }
    }
    if min < 0.0 {
        for x in v.iter_mut() {
            *x -= min;
            if *x == 0.0 {
                *x = 1e-5;
                dn += 1e-5;
            }
            dn -= min;
        }
    }
    if dn < 1e-6 {
        dn = 1e-6;
    }
    let l2 = 2.0f64.ln();
    let mut e = 0.0;
    for &x in &v {
        let ln = x / dn;
        if ln > 0.0 {
            e += ln * ln.ln() / l2;
        }
    }
    -e
}

/// Time-domain autocorrelation for the LPC autocorrelation method.
pub fn auto_corr(x: &[f64], acf: &mut [f64]) {
    let n = x.len();
    for (lag, out) in acf.iter_mut().enumerate() {
        let mut sum = 0.0;
        for i in lag..n {
            sum += x[i] * x[i - lag];
        }
        *out = sum;
    }
}

/// Durbin recursion on an autocorrelation sequence. Fills `a` with the
/// `p` predictor coefficients and, when given, `refl` with the
/// reflection coefficients. Returns the prediction gain.
pub fn calc_lpc_acf(r: &[f64], a: &mut [f64], mut refl: Option<&mut [f64]>) -> f64 {
    let p = a.len();
    if r.is_empty() || r[0] == 0.0 {
        for x in a.iter_mut() {
            *x = 0.0;
        }
        if let Some(k) = refl.as_deref_mut() {
            for x in k.iter_mut() {
                *x = 0.0;
            }
        }
        return 0.0;
    }

    let mut e = r[0];
    for m in 1..=p {
        let mut sum = r[m];
        for i in 1..m {
            sum += a[i - 1] * r[m - i];
        }
        let k_m = -sum / e;
        if let Some(k) = refl.as_deref_mut() {
            k[m - 1] = k_m;
        }
        a[m - 1] = k_m;
        for i in 1..=m / 2 {
            let x = a[i - 1];
            a[i - 1] += k_m * a[m - i - 1];
            if i < m / 2 || (m & 1) == 1 {
                a[m - i - 1] += k_m * x;
            }
        }
        e *= 1.0 - k_m * k_m;
        if e == 0.0 {
            for x in a.iter_mut().skip(m) {
                *x = 0.0;
            }
            break;
        }
    }
    e
}

/// Burg's method on a time-domain frame. Coefficients come out with
/// the same sign convention as `calc_lpc_acf`. Returns the gain.
pub fn calc_lpc_burg(x: &[f64], a: &mut [f64]) -> f64 {
    let n = x.len();
    let m = a.len();
    if m == 0 || n < m {
        for v in a.iter_mut() {
            *v = 0.0;
        }
        return 0.0;
    }
    let mut xms = x.iter().map(|v| v * v).sum::<f64>() / n as f64;
    if xms <= 0.0 {
        for v in a.iter_mut() {
            *v = 0.0;
        }
        return xms * n as f64;
    }

    let mut b1 = vec![0.0f64; n];
    let mut b2 = vec![0.0f64; n];
    let mut aa = vec![0.0f64; m];
    b1[0] = x[0];
    b2[n - 2] = x[n - 1];
    for j in 1..n - 1 {
        b1[j] = x[j];
        b2[j - 1] = x[j];
    }

    let mut done = 0;
    for i in 0..m {
        let mut num = 0.0;
        let mut den = 0.0;
        for j in 0..n - i - 1 {
            num += b1[j] * b2[j];
            den += b1[j] * b1[j] + b2[j] * b2[j];
        }
        if den <= 0.0 {
            break;
        }
        a[i] = 2.0 * num / den;
        xms *= 1.0 - a[i] * a[i];
        for j in 0..i {
            a[j] = aa[j] - a[i] * aa[i - j - 1];
        }
        if i < m - 1 {
            aa[..=i].copy_from_slice(&a[..=i]);
            for j in 0..n - i - 2 {
                b1[j] -= aa[i] * b2[j];
                b2[j] = b2[j + 1] - aa[i] * b1[j + 1];
            }
        }
        done = i + 1;
    }

    for v in a.iter_mut().take(done) {
        *v = -*v;
    }
    for v in a.iter_mut().skip(done) {
        *v = 0.0;
    }
    xms * n as f64
}

/// Recursive conversion of LPC coefficients to cepstral coefficients
/// `first_cc..=last_cc` (1-based). Returns the 0th cepstral coefficient
/// `-ln(1/gain)`.
pub fn lp_to_ceps(lp: &[f64], lp_gain: f64, ceps: &mut [f64], first_cc: usize, last_cc: usize) -> f64 {
    let n_lp = lp.len();
    let first_cc = first_cc.max(1);
    let last_cc = last_cc.min(n_lp);

    for n in first_cc..=last_cc {
        let mut sum = 0.0;
        for i in 1..n {
            sum += (n - i) as f64 * lp[i - 1] * ceps[n - i - 1];
        }
        ceps[n - first_cc] = -(lp[n - first_cc] + sum / n as f64);
    }

    let gain = if lp_gain <= 0.0 { 1.0 } else { lp_gain };
    -(1.0 / gain).ln()
}
