//! Critical-band filterbank over a linear-axis magnitude spectrum.
//!
//! Two bandwidth designs: the classic 50%-overlap triangular bank with
//! centers equidistant on the chosen scale, and an ERB design with
//! per-band bandwidths from the Moore-Glasberg expression.

use crate::error::{Error, Result};
use crate::spectral::SpectScale;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthMethod {
    /// Triangular filters, left/right edges at the neighbour centers.
    Lr,
    /// Equivalent-rectangular-bandwidth filters (HFCC style).
    Erb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MelspecConfig {
    pub n_bands: usize,
    pub lo_freq: f64,
    pub hi_freq: f64,
    pub use_power: bool,
    /// Scale outputs like HTK, which never normalizes 16 bit samples.
    pub htk_compatible: bool,
    pub scale: SpectScale,
    pub bw_method: BandwidthMethod,
    pub log_scale_base: f64,
    pub first_note: f64,
}

impl Default for MelspecConfig {
    fn default() -> Self {
        Self {
            n_bands: 26,
            lo_freq: 20.0,
            hi_freq: 8000.0,
            use_power: false,
            htk_compatible: false,
            scale: SpectScale::Mel,
            bw_method: BandwidthMethod::Lr,
            log_scale_base: 2.0,
            first_note: 27.05,
        }
    }
}

enum FilterBank {
    /// Per-bin weight of the falling slope plus the band each bin
    /// feeds; the complement goes to the next band up.
    Shared { chan_map: Vec<i64>, coeffs: Vec<f64> },
    /// Independent weights per band with bin ranges.
    PerBand {
        coeffs: Vec<f64>,
        ranges: Vec<(i64, i64)>,
    },
}

pub struct Melspec {
    config: MelspecConfig,
    blocksize: usize,
    n_lo: usize,
    n_hi: usize,
    bank: FilterBank,
    center_freqs: Vec<f64>,
    scratch: Vec<f64>,
}

fn f_to_n(fhz: f64, base_f: f64) -> i64 {
    (fhz / base_f + 0.5) as i64
}

impl Melspec {
    /// `blocksize` is the number of magnitude bins, `frame_size_sec`
    /// the frame length fixing the bin spacing.
    pub fn new(config: MelspecConfig, blocksize: usize, frame_size_sec: f64) -> Result<Self> {
        if blocksize < 2 {
            return Err(Error::BadDimension {
                stage: "melspec",
                got: blocksize,
                reason: "need at least 2 magnitude bins",
            });
        }
        if config.n_bands < 1 {
            return Err(Error::BadConfig {
                stage: "melspec",
                reason: "n_bands must be at least 1".into(),
            });
        }
        let mut config = config;
        if config.scale == SpectScale::Log
            && (config.log_scale_base <= 0.0 || config.log_scale_base == 1.0)
        {
            log::warn!(
                "log scale base {} must be > 0 and != 1, using 2.0",
                config.log_scale_base
            );
            config.log_scale_base = 2.0;
        }
        let param = match config.scale {
            SpectScale::Log => config.log_scale_base,
            SpectScale::Semitone => config.first_note,
            _ => 0.0,
        };

        let f0 = 1.0 / frame_size_sec;
        let full_n = ((blocksize - 1) * 2) as f64;
        let fs = full_n / frame_size_sec;
        if config.lo_freq < 0.0 || config.lo_freq > fs / 2.0 || config.lo_freq > config.hi_freq {
            config.lo_freq = 0.0;
        }
        if config.hi_freq < config.lo_freq || config.hi_freq > fs / 2.0 || config.hi_freq <= 0.0 {
            config.hi_freq = fs / 2.0;
        }
        let lo_t = config.scale.transf_fwd(config.lo_freq, param);
        let hi_t = config.scale.transf_fwd(config.hi_freq, param);
        let n_lo = (f_to_n(config.lo_freq, f0).clamp(0, blocksize as i64)) as usize;
        let n_hi = (f_to_n(config.hi_freq, f0).clamp(0, blocksize as i64)) as usize;

        let n_bands = config.n_bands;
        let (bank, center_freqs) = match config.bw_method {
            BandwidthMethod::Lr => {
                let m_bandw = (hi_t - lo_t) / (n_bands as f64 + 1.0);
                let cfs: Vec<f64> = (0..=n_bands + 1)
                    .map(|m| lo_t + m as f64 * m_bandw)
                    .collect();

                let mut chan_map = vec![-3i64; blocksize];
                let mut m = 0usize;
                for n in 0..blocksize {
                    if n <= n_lo || n >= n_hi {
                        continue;
                    }
                    let nm = config.scale.transf_fwd(n as f64 * f0, param);
                    while m <= n_bands + 1 && cfs[m] < nm {
                        if m > n_bands {
                            break;
                        }
                        m += 1;
                    }
                    chan_map[n] = m as i64 - 2;
                }

                let mut coeffs = vec![0.0f64; blocksize];
                let mut m = 0usize;
                for (n, c) in coeffs.iter_mut().enumerate().take(n_hi).skip(n_lo) {
                    let nm = config.scale.transf_fwd(n as f64 * f0, param);
                    while nm > cfs[m + 1] && m <= n_bands {
                        m += 1;
                    }
                    *c = (cfs[m + 1] - nm) / (cfs[m + 1] - cfs[m]);
                }
                (FilterBank::Shared { chan_map, coeffs }, cfs)
            }
            BandwidthMethod::Erb => {
                // Moore-Glasberg ERB coefficients.
                let (a, b, c) = (6.23e-6, 0.09339, 28.52);

                // Solve for the first center whose lower edge sits at
                // lo_freq and the last whose upper edge sits at hi_freq.
                let fl1 = config.lo_freq;
                let ah = 0.5 / (700.0 + fl1);
                let bh = 700.0 / (700.0 + fl1);
                let ch = -fl1 / 2.0 * (1.0 + 700.0 / (700.0 + fl1));
                let bq = (b - bh) / (a - ah);
                let cq = (c - ch) / (a - ah);
                let fc1 = 0.5 * (-bq + (bq * bq - 4.0 * cq).sqrt());

                let fh_n = config.hi_freq;
                let ah = -0.5 / (700.0 + fh_n);
                let bh = -700.0 / (700.0 + fh_n);
                let ch = fh_n / 2.0 * (1.0 + 700.0 / (700.0 + fh_n));
                let bq = (b - bh) / (a - ah);
                let cq = (c - ch) / (a - ah);
                let fc_n = 0.5 * (-bq + (bq * bq - 4.0 * cq).sqrt());

                let fc1_t = config.scale.transf_fwd(fc1, param);
                let fc_n_t = config.scale.transf_fwd(fc_n, param);
                let m_bandw = (fc_n_t - fc1_t) / (n_bands as f64 - 1.0);
                let mut cfs: Vec<f64> = (0..n_bands - 1)
                    .map(|m| fc1_t + m as f64 * m_bandw)
                    .collect();
                cfs.push(fc_n_t);

                let mut coeffs = vec![0.0f64; blocksize * n_bands];
                let mut ranges = Vec::with_capacity(n_bands);
                for (m, cf) in cfs.iter().enumerate() {
                    let fc = config.scale.transf_inv(*cf, param)?;
                    let erb7 = a * fc * fc + b * fc + c + 700.0;
                    let fl = -erb7 + (erb7 * erb7 + fc * (fc + 1400.0)).sqrt();
                    let fh = fl + 2.0 * (erb7 - 700.0);

                    let fl_i = f_to_n(fl, f0);
                    let fc_i = f_to_n(fc, f0);
                    let fh_i = f_to_n(fh, f0);
                    ranges.push((fl_i, fh_i));

                    let mut n = fl_i.max(0);
                    while n <= fc_i && (n as usize) < blocksize {
                        let f = n as f64 * f0;
                        coeffs[m * blocksize + n as usize] = (f - fl) / (fc - fl);
                        n += 1;
                    }
                    let mut n = fc_i.max(0) + 1;
                    while n <= fh_i && (n as usize) < blocksize {
                        let f = n as f64 * f0;
                        coeffs[m * blocksize + n as usize] = (fh - f) / (fh - fc);
                        n += 1;
                    }
                }
                (FilterBank::PerBand { coeffs, ranges }, cfs)
            }
        };

        Ok(Self {
            config,
            blocksize,
            n_lo,
            n_hi,
            bank,
            center_freqs,
            scratch: vec![0.0; blocksize],
        })
    }

    /// Filter center frequencies on the target scale.
    pub fn center_freqs(&self) -> &[f64] {
        &self.center_freqs
    }
}

impl Stage for Melspec {
    fn output_dim(&self) -> usize {
        self.config.n_bands
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        if input.len() != self.blocksize {
            return Err(Error::BadDimension {
                stage: "melspec",
                got: input.len(),
                reason: "magnitude frame does not match configured size",
            });
        }
        let n_bands = self.config.n_bands;
        if self.config.use_power {
            for (s, x) in self.scratch.iter_mut().zip(input) {
                *s = x * x;
            }
        } else {
            self.scratch.copy_from_slice(input);
        }
        let src = &self.scratch;

        output.clear();
        output.resize(n_bands, 0.0);
        match &self.bank {
            FilterBank::Shared { chan_map, coeffs } => {
                for n in self.n_lo..self.n_hi {
                    let m = chan_map[n];
                    let a = src[n] * coeffs[n];
                    if m > -2 {
                        if m > -1 {
                            output[m as usize] += a;
                        }
                        if m < n_bands as i64 - 1 {
                            output[(m + 1) as usize] += src[n] - a;
                        }
                    }
                }
            }
            FilterBank::PerBand { coeffs, ranges } => {
                for (m, (n1, n2)) in ranges.iter().enumerate() {
                    let mut n = (*n1).max(self.n_lo as i64);
                    while n <= *n2 && n < self.n_hi as i64 {
                        output[m] += src[n as usize] * coeffs[m * self.blocksize + n as usize];
                        n += 1;
                    }
                }
            }
        }

        if self.config.htk_compatible {
            let scale = if self.config.use_power {
                32767.0 * 32767.0
            } else {
                32767.0
            };
            for v in output.iter_mut() {
                *v *= scale;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(config: MelspecConfig) -> Melspec {
        Melspec::new(config, 257, 0.032).unwrap()
    }

    #[test]
    fn test_output_dim_and_centers() {
        let m = make(MelspecConfig::default());
        assert_eq!(m.output_dim(), 26);
        // Shared bank keeps nBands+2 edge frequencies.
        assert_eq!(m.center_freqs().len(), 28);
        for w in m.center_freqs().windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn test_energy_conservation_inside_band_range() {
        // A flat spectrum splits each interior bin between exactly two
        // adjacent bands, so total output equals the bin count covered
        // by interior filters.
        let mut m = make(MelspecConfig::default());
        let input = vec![1.0; 257];
        let mut out = Vec::new();
        m.process_frame(&input, &mut out).unwrap();
        let total: f64 = out.iter().sum();
        assert!(total > 0.0);
        for v in &out {
            assert!(*v >= 0.0);
        }
        assert!(total <= 257.0);
    }

    #[test]
    fn test_power_and_htk_scaling() {
        let config = MelspecConfig {
            use_power: true,
            htk_compatible: true,
            ..Default::default()
        };
        let mut m = make(config);
        let mut plain = make(MelspecConfig {
            use_power: true,
            ..Default::default()
        });
        let input = vec![0.5; 257];
        let (mut a, mut b) = (Vec::new(), Vec::new());
        m.process_frame(&input, &mut a).unwrap();
        plain.process_frame(&input, &mut b).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y * 32767.0 * 32767.0).abs() < 1e-6 * x.abs().max(1.0));
        }
    }

    #[test]
    fn test_erb_bank_builds_and_filters() {
        let config = MelspecConfig {
            bw_method: BandwidthMethod::Erb,
            n_bands: 20,
            ..Default::default()
        };
        let mut m = make(config);
        assert_eq!(m.center_freqs().len(), 20);
        let mut input = vec![0.0; 257];
        // narrowband energy near 1 kHz (bin 32 at 31.25 Hz spacing)
        input[32] = 1.0;
        let mut out = Vec::new();
        m.process_frame(&input, &mut out).unwrap();
        let hits = out.iter().filter(|v| **v > 0.0).count();
        assert!(hits >= 1, "some band must cover 1 kHz");
    }

    #[test]
    fn test_bad_freq_range_falls_back() {
        let config = MelspecConfig {
            lo_freq: 9000.0,
            hi_freq: 8000.0,
            ..Default::default()
        };
        // lo > hi is reset to 0, not an error
        let m = make(config);
        assert_eq!(m.output_dim(), 26);
    }
}
