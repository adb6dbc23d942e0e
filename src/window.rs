//! Analysis windower. The window vector is cached and only rebuilt when
//! the incoming frame length changes.

use crate::error::Result;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    Rectangular,
    /// Triangular with non-zero endpoints.
    Triangular,
    /// Squared triangular.
    TriangularPow,
    Bartlett,
    Hann,
    Hamming,
    Sine,
    Lanczos,
    Gauss,
    Blackman,
    BartlettHann,
    BlackmanHarris,
}

impl FromStr for WindowType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rec" | "rectangular" => Ok(WindowType::Rectangular),
            "tri" | "triangular" => Ok(WindowType::Triangular),
            "trp" => Ok(WindowType::TriangularPow),
            "bar" | "bartlett" => Ok(WindowType::Bartlett),
            "han" | "hann" | "hanning" => Ok(WindowType::Hann),
            "ham" | "hamming" => Ok(WindowType::Hamming),
            "sin" | "sine" => Ok(WindowType::Sine),
            "lac" | "lanczos" => Ok(WindowType::Lanczos),
            "gau" | "gauss" => Ok(WindowType::Gauss),
            "bla" | "blackman" => Ok(WindowType::Blackman),
            "bah" | "bartlett-hann" => Ok(WindowType::BartlettHann),
            "blh" | "blackman-harris" => Ok(WindowType::BlackmanHarris),
            other => Err(format!("unknown window function: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub win_type: WindowType,
    pub gain: f64,
    pub offset: f64,
    /// Gauss width, clamped to [0.01, 0.5] of the frame.
    pub sigma: f64,
    /// Blackman family coefficients.
    pub alpha0: f64,
    pub alpha1: f64,
    pub alpha2: f64,
    pub alpha3: f64,
    /// Take the square root of the window vector.
    pub square_root: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            win_type: WindowType::Hann,
            gain: 1.0,
            offset: 0.0,
            sigma: 0.4,
            alpha0: 0.42,
            alpha1: 0.5,
            alpha2: 0.08,
            alpha3: 0.01168,
            square_root: false,
        }
    }
}

pub struct Windower {
    config: WindowConfig,
    win: Vec<f64>,
}

impl Windower {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            win: Vec::new(),
        }
    }

    /// The cached (ungained) window for length `n`, building it on demand.
    pub fn window(&mut self, n: usize) -> &[f64] {
        if self.win.len() != n {
            self.win = build_window(&self.config, n);
        }
        &self.win
    }

    pub fn apply(&mut self, frame: &[f64], out: &mut Vec<f64>) {
        let gain = self.config.gain;
        let offset = self.config.offset;
        let win = self.window(frame.len());
        out.clear();
        out.extend(
            frame
                .iter()
                .zip(win.iter())
                .map(|(&x, &w)| gain * x * w + offset),
        );
    }
}

impl Stage for Windower {
    fn output_dim(&self) -> usize {
        self.win.len()
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        self.apply(input, output);
        Ok(())
    }

    fn reset(&mut self) {
        self.win.clear();
    }
}

fn build_window(config: &WindowConfig, n: usize) -> Vec<f64> {
    use std::f64::consts::PI;
    let nn = n as f64;
    let mut w: Vec<f64> = match config.win_type {
        WindowType::Rectangular => vec![1.0; n],
        WindowType::Triangular => (0..n)
            .map(|i| {
                if i < n / 2 {
                    2.0 * (i + 1) as f64 / nn
                } else {
                    2.0 * (n - i) as f64 / nn
                }
            })
            .collect(),
        WindowType::TriangularPow => {
            let mut t = build_window(
                &WindowConfig {
                    win_type: WindowType::Triangular,
                    ..config.clone()
                },
                n,
            );
            for x in t.iter_mut() {
                *x *= *x;
            }
            t
        }
        WindowType::Bartlett => (0..n)
            .map(|i| {
                if i < n / 2 {
                    2.0 * i as f64 / (nn - 1.0)
                } else {
                    2.0 * (n - 1 - i) as f64 / (nn - 1.0)
                }
            })
            .collect(),
        WindowType::Hann => (0..n)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (nn - 1.0)).cos()))
            .collect(),
        WindowType::Hamming => (0..n)
            .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (nn - 1.0)).cos())
            .collect(),
        WindowType::Sine => (0..n)
            .map(|i| (PI * i as f64 / (nn - 1.0)).sin())
            .collect(),
        WindowType::Lanczos => (0..n)
            .map(|i| crate::dsp::lc_sinc(2.0 * i as f64 / (nn - 1.0) - 1.0))
            .collect(),
        WindowType::Gauss => {
            let sigma = config.sigma.clamp(0.01, 0.5);
            (0..n)
                .map(|i| {
                    let t = (i as f64 - (nn - 1.0) / 2.0) / (sigma * (nn - 1.0) / 2.0);
                    (-0.5 * t * t).exp()
                })
                .collect()
        }
        WindowType::Blackman => (0..n)
            .map(|i| {
                let t = 2.0 * PI * i as f64 / (nn - 1.0);
                config.alpha0 - config.alpha1 * t.cos() + config.alpha2 * (2.0 * t).cos()
            })
            .collect(),
        WindowType::BartlettHann => (0..n)
            .map(|i| {
                config.alpha0
                    - config.alpha1 * (i as f64 / (nn - 1.0) - 0.5).abs()
                    - config.alpha2 * (2.0 * PI * i as f64 / (nn - 1.0)).cos()
            })
            .collect(),
        WindowType::BlackmanHarris => (0..n)
            .map(|i| {
                let t = 2.0 * PI * i as f64 / (nn - 1.0);
                config.alpha0 - config.alpha1 * t.cos() + config.alpha2 * (2.0 * t).cos()
                    - config.alpha3 * (3.0 * t).cos()
            })
            .collect(),
    };
    if config.square_root {
        for x in w.iter_mut() {
            *x = x.max(0.0).sqrt();
        }
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(t: WindowType, n: usize) -> Vec<f64> {
        build_window(
            &WindowConfig {
                win_type: t,
                ..Default::default()
            },
            n,
        )
    }

    #[test]
    fn test_symmetry_and_bounds() {
        for t in [
            WindowType::Bartlett,
            WindowType::Hann,
            WindowType::Hamming,
            WindowType::Sine,
            WindowType::Lanczos,
            WindowType::Gauss,
            WindowType::Blackman,
            WindowType::BartlettHann,
            WindowType::BlackmanHarris,
        ] {
            let w = make(t, 33);
            for i in 0..33 {
                assert!(
                    (w[i] - w[32 - i]).abs() < 1e-12,
                    "{:?} not symmetric at {}",
                    t,
                    i
                );
                assert!(w[i] <= 1.0 + 1e-12, "{:?} exceeds 1 at {}", t, i);
            }
        }
    }

    #[test]
    fn test_hann_endpoints_and_center() {
        let w = make(WindowType::Hann, 11);
        assert!(w[0].abs() < 1e-12);
        assert!(w[10].abs() < 1e-12);
        assert!((w[5] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cache_rebuild_on_length_change() {
        let mut w = Windower::new(WindowConfig::default());
        let mut out = Vec::new();
        w.apply(&vec![1.0; 16], &mut out);
        assert_eq!(out.len(), 16);
        w.apply(&vec![1.0; 32], &mut out);
        assert_eq!(out.len(), 32);
        assert_eq!(w.window(32).len(), 32);
    }

    #[test]
    fn test_gain_and_offset() {
        let mut w = Windower::new(WindowConfig {
            win_type: WindowType::Rectangular,
            gain: 2.0,
            offset: 1.0,
            ..Default::default()
        });
        let mut out = Vec::new();
        w.apply(&[3.0, 3.0], &mut out);
        assert_eq!(out, vec![7.0, 7.0]);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("gauss".parse::<WindowType>(), Ok(WindowType::Gauss));
        assert_eq!("Han".parse::<WindowType>(), Ok(WindowType::Hann));
        assert!("foo".parse::<WindowType>().is_err());
    }
}
