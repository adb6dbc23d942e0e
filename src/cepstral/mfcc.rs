//! Mel-frequency cepstral coefficients from filterbank energies.

use crate::error::{Error, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MfccConfig {
    pub first_cc: usize,
    pub last_cc: usize,
    pub mel_floor: f64,
    /// Raised-sine lifter constant; 0 disables liftering.
    pub cep_lifter: f64,
    /// Place coefficient 0 last and skip the mel floor like HTK does.
    pub htk_compatible: bool,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            first_cc: 1,
            last_cc: 12,
            mel_floor: 1e-8,
            cep_lifter: 22.0,
            htk_compatible: false,
        }
    }
}

pub struct Mfcc {
    config: MfccConfig,
    n_bands: usize,
    /// cos(pi*i*(m+0.5)/M) for each kept coefficient i and band m.
    costable: Vec<f64>,
    sintable: Vec<f64>,
    factor: f64,
}

impl Mfcc {
    pub fn new(config: MfccConfig, n_bands: usize) -> Result<Self> {
        if n_bands < 1 {
            return Err(Error::BadDimension {
                stage: "mfcc",
                got: n_bands,
                reason: "need at least one filterbank band",
            });
        }
        let mut config = config;
        if config.last_cc < config.first_cc {
            return Err(Error::BadConfig {
                stage: "mfcc",
                reason: format!(
                    "last_cc {} before first_cc {}",
                    config.last_cc, config.first_cc
                ),
            });
        }
        if config.htk_compatible {
            config.mel_floor = 1.0;
        }
        let n_ceps = config.last_cc - config.first_cc + 1;
        let m = n_bands as f64;
        let mut costable = Vec::with_capacity(n_ceps * n_bands);
        for i in config.first_cc..=config.last_cc {
            for band in 0..n_bands {
                costable.push((PI * i as f64 / m * (band as f64 + 0.5)).cos());
            }
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
            config,
            n_bands,
            costable,
            sintable,
            factor: (2.0 / m).sqrt(),
        })
    }
}

impl Stage for Mfcc {
    fn output_dim(&self) -> usize {
        self.config.last_cc - self.config.first_cc + 1
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        if input.len() != self.n_bands {
            return Err(Error::BadDimension {
                stage: "mfcc",
                got: input.len(),
                reason: "band frame does not match configured size",
            });
        }
        let n_ceps = self.output_dim();
        output.clear();
        for i in 0..n_ceps {
            let row = &self.costable[i * self.n_bands..(i + 1) * self.n_bands];
            let mut sum = 0.0;
            for (x, c) in input.iter().zip(row) {
                sum += x.max(self.config.mel_floor).ln() * c;
            }
            output.push(sum * self.factor * self.sintable[i]);
        }
        if self.config.htk_compatible && self.config.first_cc == 0 && n_ceps > 1 {
            let c0 = output.remove(0);
            output.push(c0);
        }
        Ok(())
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_bands_yield_zero_higher_ceps() {
        // log of a constant is constant; DCT of a constant is zero for
        // every coefficient above 0.
        let mut mfcc = Mfcc::new(MfccConfig::default(), 26).unwrap();
        let input = vec![2.0; 26];
        let mut out = Vec::new();
        mfcc.process_frame(&input, &mut out).unwrap();
        assert_eq!(out.len(), 12);
        for v in &out {
            assert!(v.abs() < 1e-10, "got {v}");
        }
    }

    #[test]
    fn test_zeroth_coefficient_is_scaled_log_sum() {
        let config = MfccConfig {
            first_cc: 0,
            last_cc: 0,
            cep_lifter: 0.0,
            ..Default::default()
        };
        let mut mfcc = Mfcc::new(config, 4).unwrap();
        let input = vec![std::f64::consts::E; 4];
        let mut out = Vec::new();
        mfcc.process_frame(&input, &mut out).unwrap();
        // sum of ln(e) over 4 bands times sqrt(2/4)
        assert!((out[0] - 4.0 * (0.5f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_mel_floor_applied() {
        let mut mfcc = Mfcc::new(MfccConfig::default(), 8).unwrap();
        let mut out = Vec::new();
        mfcc.process_frame(&vec![0.0; 8], &mut out).unwrap();
        for v in &out {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn test_htk_moves_c0_last() {
        let config = MfccConfig {
            first_cc: 0,
            last_cc: 3,
            cep_lifter: 0.0,
            htk_compatible: true,
            ..Default::default()
        };
        let mut htk = Mfcc::new(config.clone(), 8).unwrap();
        let mut plain = Mfcc::new(
            MfccConfig {
                htk_compatible: false,
                ..config
            },
            8,
        )
        .unwrap();
        let input: Vec<f64> = (1..=8).map(|x| x as f64).collect();
        let (mut a, mut b) = (Vec::new(), Vec::new());
        htk.process_frame(&input, &mut a).unwrap();
        plain.process_frame(&input, &mut b).unwrap();
        assert!((a[3] - b[0]).abs() < 1e-12);
        assert!((a[0] - b[1]).abs() < 1e-12);
    }

    #[test]
    fn test_liftering_weights() {
        let mfcc = Mfcc::new(MfccConfig::default(), 26).unwrap();
        // first weight: 1 + 11 sin(pi/22)
        let w0 = 1.0 + 11.0 * (PI / 22.0).sin();
        assert!((mfcc.sintable[0] - w0).abs() < 1e-12);
    }
}
