//! Perceptual linear prediction cepstra from filterbank energies.
//!
//! Log (or inverse-log) compression, inverse DFT onto an
//! autocorrelation, Durbin recursion, then the cepstral recursion.
//! Each step can be disabled, in which case the stage outputs the
//! product of the steps that did run.

use crate::dsp;
use crate::error::{Error, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlpConfig {
    pub first_cc: usize,
    pub last_cc: usize,
    pub lp_order: usize,
    pub mel_floor: f64,
    pub cep_lifter: f64,
    pub do_log: bool,
    pub do_inv_log: bool,
    pub do_idft: bool,
    pub do_lp: bool,
    pub do_lp_to_ceps: bool,
    pub htk_compatible: bool,
}

impl Default for PlpConfig {
    fn default() -> Self {
        Self {
            first_cc: 0,
            last_cc: 12,
            lp_order: 12,
            mel_floor: 9.3e-10,
            cep_lifter: 0.0,
            do_log: true,
            do_inv_log: true,
            do_idft: true,
            do_lp: true,
            do_lp_to_ceps: true,
            htk_compatible: false,
        }
    }
}

pub struct Plp {
    config: PlpConfig,
    n_bands: usize,
    n_freq: usize,
    n_auto: usize,
    n_ceps: usize,
    costable: Vec<f64>,
    sintable: Vec<f64>,
    src: Vec<f64>,
    acf: Vec<f64>,
    lpc: Vec<f64>,
    ceps: Vec<f64>,
}

impl Plp {
    pub fn new(config: PlpConfig, n_bands: usize) -> Result<Self> {
        if n_bands < 1 {
            return Err(Error::BadDimension {
                stage: "plp",
                got: n_bands,
                reason: "need at least one filterbank band",
            });
        }
        if config.last_cc < config.first_cc {
            return Err(Error::BadConfig {
                stage: "plp",
                reason: format!(
                    "last_cc {} before first_cc {}",
                    config.last_cc, config.first_cc
                ),
            });
        }
        if config.lp_order < 1 {
            return Err(Error::BadConfig {
                stage: "plp",
                reason: "lp_order must be at least 1".into(),
            });
        }
        let mut config = config;
        if config.htk_compatible {
            config.mel_floor = 1.0;
        }
        let n_freq = n_bands + 2; // DC and Nyquist pad
        let n_auto = config.lp_order + 1;
        let n_ceps = config.last_cc - config.first_cc + 1;

        let a = PI / (n_freq - 1) as f64;
        let mut costable = vec![0.0f64; n_auto * n_freq];
        for i in 0..n_auto {
            let ib = i * n_freq;
            costable[ib] = 1.0;
            for m in 1..n_freq - 1 {
                costable[ib + m] = 2.0 * (a * i as f64 * m as f64).cos();
            }
            costable[ib + n_freq - 1] = (a * i as f64 * (n_freq - 1) as f64).cos();
        }

        let lift = config.cep_lifter;
        let sintable: Vec<f64> = (config.first_cc..=config.last_cc)
            .map(|i| {
                if lift > 0.0 {
                    1.0 + lift / 2.0 * (PI * i as f64 / lift).sin()
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self {
            src: vec![0.0; n_bands],
            acf: vec![0.0; n_auto],
            lpc: vec![0.0; config.lp_order],
            ceps: vec![0.0; n_ceps],
            config,
            n_bands,
            n_freq,
            n_auto,
            n_ceps,
            costable,
            sintable,
        })
    }
}

impl Stage for Plp {
    fn output_dim(&self) -> usize {
        let c = &self.config;
        if !c.do_idft {
            self.n_bands
        } else if !c.do_lp {
            self.n_auto
        } else if !c.do_lp_to_ceps {
            c.lp_order
        } else {
            self.n_ceps
        }
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        if input.len() != self.n_bands {
            return Err(Error::BadDimension {
                stage: "plp",
                got: input.len(),
                reason: "band frame does not match configured size",
            });
        }
        let c = self.config.clone();
        self.src.copy_from_slice(input);
        if c.do_log {
            for x in self.src.iter_mut() {
                *x = if *x < c.mel_floor {
                    c.mel_floor.ln()
                } else {
                    x.ln()
                };
            }
        }
        if c.do_inv_log {
            for x in self.src.iter_mut() {
                *x = x.exp();
            }
        }

        output.clear();
        if !c.do_idft {
            output.extend_from_slice(&self.src);
            return Ok(());
        }

        let n_freq = self.n_freq;
        for i in 0..self.n_auto {
            let ib = i * n_freq;
            let mut tmp = if c.htk_compatible {
                self.costable[ib] * self.src[0]
            } else {
                0.0
            };
            for m in 1..n_freq - 1 {
                tmp += self.costable[ib + m] * self.src[m - 1];
            }
            tmp += self.costable[ib + n_freq - 1] * self.src[n_freq - 3];
            self.acf[i] = tmp / (2.0 * (n_freq - 1) as f64);
        }

        if !c.do_lp {
            output.extend_from_slice(&self.acf);
            return Ok(());
        }

        let mut lp_gain = dsp::calc_lpc_acf(&self.acf, &mut self.lpc, None);

        if !c.do_lp_to_ceps {
            output.extend_from_slice(&self.lpc);
            return Ok(());
        }

        if lp_gain <= 0.0 {
            lp_gain = 1.0;
        }
        let dst = if !c.htk_compatible && c.first_cc == 0 {
            &mut self.ceps[1..]
        } else {
            &mut self.ceps[..]
        };
        let zeroth = dsp::lp_to_ceps(&self.lpc, lp_gain, dst, c.first_cc, c.last_cc);
        if c.first_cc == 0 {
            if !c.htk_compatible {
                self.ceps[0] = zeroth;
            } else {
                self.ceps[self.n_ceps - 1] = zeroth;
            }
        }

        for i in c.first_cc..=c.last_cc {
            let i0 = i - c.first_cc;
            let mut i1 = i0;
            if c.htk_compatible && c.first_cc == 0 {
                i1 = if i == c.last_cc { 0 } else { i0 + 1 };
            }
            output.push(if c.cep_lifter > 0.0 {
                self.ceps[i0] * self.sintable[i1]
            } else {
                self.ceps[i0]
            });
        }
        Ok(())
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dim_per_enabled_steps() {
        let base = PlpConfig::default();
        assert_eq!(Plp::new(base.clone(), 26).unwrap().output_dim(), 13);
        let acf_only = PlpConfig {
            do_lp: false,
            ..base.clone()
        };
        assert_eq!(Plp::new(acf_only, 26).unwrap().output_dim(), 13);
        let lpc_only = PlpConfig {
            do_lp_to_ceps: false,
            ..base.clone()
        };
        assert_eq!(Plp::new(lpc_only, 26).unwrap().output_dim(), 12);
        let passthrough = PlpConfig {
            do_idft: false,
            ..base
        };
        assert_eq!(Plp::new(passthrough, 26).unwrap().output_dim(), 26);
    }

    #[test]
    fn test_acf_of_flat_spectrum_concentrates_at_lag_zero() {
        let config = PlpConfig {
            do_log: false,
            do_inv_log: false,
            do_lp: false,
            ..Default::default()
        };
        let mut plp = Plp::new(config, 26).unwrap();
        let input = vec![1.0; 26];
        let mut out = Vec::new();
        plp.process_frame(&input, &mut out).unwrap();
        assert_eq!(out.len(), 13);
        // Flat spectrum: lag-0 autocorrelation dominates all others.
        for lag in 1..out.len() {
            assert!(out[0].abs() > out[lag].abs());
        }
    }

    #[test]
    fn test_log_invlog_passthrough_matches_input() {
        let config = PlpConfig {
            do_idft: false,
            ..Default::default()
        };
        let mut plp = Plp::new(config, 8).unwrap();
        let input: Vec<f64> = (1..=8).map(|x| x as f64).collect();
        let mut out = Vec::new();
        plp.process_frame(&input, &mut out).unwrap();
        for (x, y) in input.iter().zip(&out) {
            assert!((x - y).abs() < 1e-9, "log then exp should cancel");
        }
    }

    #[test]
    fn test_full_chain_finite_on_silence() {
        let mut plp = Plp::new(PlpConfig::default(), 26).unwrap();
        let mut out = Vec::new();
        plp.process_frame(&vec![0.0; 26], &mut out).unwrap();
        assert_eq!(out.len(), 13);
        for v in &out {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn test_cepstra_change_with_spectral_tilt() {
        let mut plp = Plp::new(PlpConfig::default(), 26).unwrap();
        let flat = vec![1.0; 26];
        let tilted: Vec<f64> = (0..26).map(|i| 1.0 / (1.0 + i as f64)).collect();
        let (mut a, mut b) = (Vec::new(), Vec::new());
        plp.process_frame(&flat, &mut a).unwrap();
        plp.process_frame(&tilted, &mut b).unwrap();
        let diff: f64 = a.iter().zip(&b).map(|(x, y)| (x - y).abs()).sum();
        assert!(diff > 1e-6);
    }
}
