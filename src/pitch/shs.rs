//! Subharmonic summation pitch detection on an octave-scale spectrum.

use super::{Candidates, PitchBaseConfig, PitchDetector};
use crate::dsp;
use crate::error::{Error, Result};
use crate::spectral::ScaleMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShsConfig {
    pub n_harmonics: usize,
    pub compression_factor: f64,
    /// Insert every local peak sorted by score instead of only peaks
    /// that beat the current best.
    pub greedy_peak_algo: bool,
}

impl Default for ShsConfig {
    fn default() -> Self {
        Self {
            n_harmonics: 15,
            compression_factor: 0.85,
            greedy_peak_algo: false,
        }
    }
}

pub struct PitchShs {
    config: ShsConfig,
    n_octaves: f64,
    points_per_octave: f64,
    base: f64,
    fmin_t: f64,
    fstep_t: f64,
    ss: Vec<f64>,
}

impl PitchShs {
    /// `meta` is the axis record of the spectral scale stage feeding
    /// this detector; `n_input` its output dimension.
    pub fn new(config: ShsConfig, meta: &ScaleMeta, n_input: usize) -> Result<Self> {
        if meta.n_octaves == 0.0 {
            return Err(Error::BadConfig {
                stage: "shs",
                reason: "input axis metadata has no octave count, expected a log-scale spectrum"
                    .into(),
            });
        }
        if n_input < 3 {
            return Err(Error::BadDimension {
                stage: "shs",
                got: n_input,
                reason: "need at least 3 warped spectral bins",
            });
        }
        if config.n_harmonics < 2 {
            return Err(Error::BadConfig {
                stage: "shs",
                reason: "n_harmonics must be at least 2".into(),
            });
        }
        let mut base = (meta.min_f.ln() / meta.fmin_t).exp();
        if (base - 2.0).abs() < 1e-5 {
            base = 2.0;
        } else {
            log::warn!(
                "spectral axis is not an octave scale (base {base}, fmin {}, fmin_t {})",
                meta.min_f,
                meta.fmin_t
            );
        }
        Ok(Self {
            config,
            n_octaves: meta.n_octaves,
            points_per_octave: meta.points_per_octave,
            base,
            fmin_t: meta.fmin_t,
            fstep_t: (meta.fmax_t - meta.fmin_t) / (n_input - 1) as f64,
            ss: vec![0.0; n_input],
        })
    }
}

impl PitchDetector for PitchShs {
    fn detect(
        &mut self,
        base_cfg: &PitchBaseConfig,
        spectrum: &[f64],
        cand: &mut Candidates,
    ) -> Option<usize> {
        if self.n_octaves == 0.0 {
            return None;
        }
        let n = spectrum.len();
        let n_cands = cand.f0.len();
        let ss = &mut self.ss;
        ss.copy_from_slice(spectrum);

        // shift by octaves of each harmonic and accumulate, compressing
        // higher harmonics geometrically
        let mut scale = self.config.compression_factor;
        for h in 2..self.config.n_harmonics + 1 {
            let shift = (self.points_per_octave * (h as f64).log2()).floor() as usize;
            for j in shift..n {
                ss[j - shift] += spectrum[j] * scale;
            }
            scale *= self.config.compression_factor;
        }
        for v in ss.iter_mut() {
            *v /= self.config.n_harmonics as f64;
            if *v < 0.0 {
                *v = 0.0;
            }
        }

        let mut n_cand = 0usize;
        cand.score[0] = 0.0;
        let mut ss_mean = ss[0];
        for i in 1..n - 1 {
            let is_peak = ss[i - 1] < ss[i] && ss[i] > ss[i + 1];
            if self.config.greedy_peak_algo {
                if is_peak {
                    for j in 0..n_cands {
                        if cand.score[j] == 0.0 || cand.score[j] < ss[i] {
                            for jj in (j + 1..n_cands).rev() {
                                cand.score[jj] = cand.score[jj - 1];
                                cand.f0[jj] = cand.f0[jj - 1];
                            }
                            cand.f0[j] = i as f64;
                            cand.score[j] = ss[i];
                            if n_cand < n_cands {
                                n_cand += 1;
                            }
                            break;
                        }
                    }
                }
            } else if is_peak && (ss[i] > cand.score[0] || cand.score[0] == 0.0) {
                for j in (1..n_cands).rev() {
                    cand.score[j] = cand.score[j - 1];
                    cand.f0[j] = cand.f0[j - 1];
                }
                cand.f0[0] = i as f64;
                cand.score[0] = ss[i];
                if n_cand < n_cands {
                    n_cand += 1;
                }
            }
            ss_mean += ss[i];
        }
        ss_mean = (ss_mean + ss[n - 1]) / n as f64;

        // parabolic interpolation around each peak, then back to Hz
        for i in 0..n_cand {
            let j = cand.f0[i] as usize;
            let f1 = cand.f0[i] * self.fstep_t + self.fmin_t;
            let f2 = (cand.f0[i] + 1.0) * self.fstep_t + self.fmin_t;
            let f0 = (cand.f0[i] - 1.0) * self.fstep_t + self.fmin_t;
            let mut sc = 0.0;
            let fx = dsp::quad_from_3_points(f0, ss[j - 1], f1, ss[j], f2, ss[j + 1], &mut sc);
            cand.f0[i] = (fx * self.base.ln()).exp();
            cand.score[i] = sc;
            cand.voice[i] = if sc > 0.0 && sc > ss_mean {
                1.0 - ss_mean / sc
            } else {
                0.0
            };
        }

        // prefer a lower candidate over slot 0 when it is plausibly the
        // true fundamental of an octave error
        if base_cfg.octave_correction {
            let c = &self.config;
            for i in 0..n_cand {
                if cand.f0[i] < cand.f0[0]
                    && cand.f0[i] > 0.0
                    && (cand.voice[i] > base_cfg.voicing_cutoff
                        || cand.voice[i] >= 0.9 * base_cfg.voicing_cutoff)
                    && cand.score[i]
                        > (1.0 / (c.n_harmonics - 1) as f64 * c.compression_factor)
                            * cand.score[0]
                {
                    cand.swap(0, i);
                }
            }
        }

        Some(n_cand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::PitchStage;
    use crate::spectral::{ScaleConfig, SpecScaler, SpectScale};
    use crate::stage::Stage;

    fn octave_meta(n_points: usize) -> ScaleMeta {
        let config = ScaleConfig {
            scale: SpectScale::Log,
            log_scale_base: 2.0,
            min_f: 42.0,
            max_f: 620.0,
            n_points_target: n_points,
            ..Default::default()
        };
        SpecScaler::new(config, 256, 0.064)
            .unwrap()
            .meta()
            .clone()
    }

    /// Synthetic octave-scale spectrum of a harmonic tone at `f0_hz`.
    fn harmonic_spectrum(meta: &ScaleMeta, n: usize, f0_hz: f64) -> Vec<f64> {
        let fstep = (meta.fmax_t - meta.fmin_t) / (n - 1) as f64;
        let mut spec = vec![0.0; n];
        for h in 1..=5u32 {
            let f_t = (f0_hz * h as f64).log2();
            let idx = (f_t - meta.fmin_t) / fstep;
            let i = idx.round() as i64;
            if i >= 1 && (i as usize) < n - 1 {
                let frac = idx - i as f64;
                let amp = 1.0 / h as f64;
                spec[i as usize] += amp;
                spec[i as usize - 1] += amp * (0.5 - frac * 0.4);
                spec[i as usize + 1] += amp * (0.5 + frac * 0.4);
            }
        }
        spec
    }

    #[test]
    fn test_shs_finds_150_hz_tone() {
        let n = 256;
        let meta = octave_meta(n);
        let shs = PitchShs::new(ShsConfig::default(), &meta, n).unwrap();
        let base = PitchBaseConfig {
            min_pitch: 42.0,
            n_candidates: 6,
            voicing_cutoff: 0.7,
            ..Default::default()
        };
        let mut stage = PitchStage::new(base, shs, n).unwrap();
        let spec = harmonic_spectrum(&meta, n, 150.0);
        let mut out = Vec::new();
        stage.process_frame(&spec, &mut out).unwrap();
        assert!(out[0] >= 1.0, "must find at least one candidate");
        let f0 = out[1];
        assert!(
            (f0 - 150.0).abs() < 6.0,
            "best candidate {f0} not near 150 Hz"
        );
    }

    #[test]
    fn test_greedy_algo_keeps_more_candidates() {
        let n = 256;
        let meta = octave_meta(n);
        let greedy = PitchShs::new(
            ShsConfig {
                greedy_peak_algo: true,
                ..Default::default()
            },
            &meta,
            n,
        )
        .unwrap();
        let base = PitchBaseConfig {
            min_pitch: 42.0,
            n_candidates: 6,
            ..Default::default()
        };
        let mut stage = PitchStage::new(base, greedy, n).unwrap();
        // two tones produce peaks at both fundamentals
        let mut spec = harmonic_spectrum(&meta, n, 150.0);
        for (a, b) in spec.iter_mut().zip(harmonic_spectrum(&meta, n, 220.0)) {
            *a += b;
        }
        let mut out = Vec::new();
        stage.process_frame(&spec, &mut out).unwrap();
        assert!(out[0] >= 2.0, "greedy picker should keep both tones");
    }

    #[test]
    fn test_non_octave_meta_rejected() {
        let meta = ScaleMeta {
            scale: SpectScale::Mel,
            param: 0.0,
            min_f: 25.0,
            max_f: 8000.0,
            n_octaves: 0.0,
            points_per_octave: 0.0,
            fmin_t: 0.0,
            fmax_t: 1.0,
            delta_f_t: 0.1,
        };
        assert!(PitchShs::new(ShsConfig::default(), &meta, 64).is_err());
    }
}
