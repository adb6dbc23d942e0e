//! Magnitude and/or phase from packed half-complex FFT coefficients.

use crate::error::{Error, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

const DB_FLOOR: f64 = -10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MagphaseConfig {
    pub magnitude: bool,
    pub phase: bool,
    /// Scale magnitudes by 2/N (spectral density).
    pub normalize: bool,
    /// Square magnitudes to a power spectrum.
    pub power: bool,
    /// Log power spectral density in dB, floored at -10 dB.
    pub db_psd: bool,
    /// Reference offset for the dB mode.
    pub db_pnorm: f64,
}

impl Default for MagphaseConfig {
    fn default() -> Self {
        Self {
            magnitude: true,
            phase: false,
            normalize: false,
            power: false,
            db_psd: false,
            db_pnorm: 90.302,
        }
    }
}

pub struct Magphase {
    config: MagphaseConfig,
    n: usize,
}

impl Magphase {
    pub fn new(config: MagphaseConfig, input_dim: usize) -> Result<Self> {
        if input_dim < 4 || input_dim % 2 != 0 {
            return Err(Error::BadDimension {
                stage: "magphase",
                got: input_dim,
                reason: "expected an even FFT-derived dimension >= 4",
            });
        }
        if !config.magnitude && !config.phase {
            return Err(Error::BadConfig {
                stage: "magphase",
                reason: "at least one of magnitude/phase must be enabled".into(),
            });
        }
        Ok(Self { config, n: input_dim })
    }

    fn mag_value(&self, re: f64, im: f64) -> f64 {
        let m = (re * re + im * im).sqrt();
        if self.config.db_psd {
            let psd = 2.0 * m * m / self.n as f64;
            if psd > 0.0 {
                (self.config.db_pnorm + 10.0 * psd.log10()).max(DB_FLOOR)
            } else {
                DB_FLOOR
            }
        } else {
            let m = if self.config.normalize {
                m * 2.0 / self.n as f64
            } else {
                m
            };
            if self.config.power {
                m * m
            } else {
                m
            }
        }
    }
}

impl Stage for Magphase {
    fn output_dim(&self) -> usize {
        let n = self.n;
        match (self.config.magnitude, self.config.phase) {
            (true, true) => n + 1,
            (true, false) => n / 2 + 1,
            (false, true) => n / 2,
            (false, false) => 0,
        }
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        let n = self.n;
        output.clear();
        if self.config.magnitude {
            output.push(self.mag_value(input[0], 0.0));
            for k in 1..n / 2 {
                output.push(self.mag_value(input[2 * k], input[2 * k + 1]));
            }
            output.push(self.mag_value(input[1], 0.0));
        }
        if self.config.phase {
            output.push(0.0); // DC
            for k in 1..n / 2 {
                output.push(input[2 * k + 1].atan2(input[2 * k]));
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dims() {
        let m = Magphase::new(MagphaseConfig::default(), 16).unwrap();
        assert_eq!(m.output_dim(), 9);
        let m = Magphase::new(
            MagphaseConfig {
                magnitude: false,
                phase: true,
                ..Default::default()
            },
            16,
        )
        .unwrap();
        assert_eq!(m.output_dim(), 8);
        let m = Magphase::new(
            MagphaseConfig {
                phase: true,
                ..Default::default()
            },
            16,
        )
        .unwrap();
        assert_eq!(m.output_dim(), 17);
    }

    #[test]
    fn test_rejects_odd_dim() {
        assert!(Magphase::new(MagphaseConfig::default(), 15).is_err());
        assert!(Magphase::new(MagphaseConfig::default(), 2).is_err());
    }

    #[test]
    fn test_magnitude_of_packed_bins() {
        let mut m = Magphase::new(MagphaseConfig::default(), 8).unwrap();
        // DC=4, Nyq=2, bin1=(3,4), bin2=(0,1), bin3=(0,0)
        let input = [4.0, 2.0, 3.0, 4.0, 0.0, 1.0, 0.0, 0.0];
        let mut out = Vec::new();
        m.process_frame(&input, &mut out).unwrap();
        assert_eq!(out.len(), 5);
        assert!((out[0] - 4.0).abs() < 1e-12);
        assert!((out[1] - 5.0).abs() < 1e-12);
        assert!((out[2] - 1.0).abs() < 1e-12);
        assert!((out[4] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_db_floor() {
        let mut m = Magphase::new(
            MagphaseConfig {
                db_psd: true,
                ..Default::default()
            },
            8,
        )
        .unwrap();
        let mut out = Vec::new();
        m.process_frame(&[0.0; 8], &mut out).unwrap();
        for v in &out {
            assert_eq!(*v, DB_FLOOR);
        }
    }
}
