//! Non-linear frequency axis warping of magnitude spectra.
//!
//! A magnitude spectrum on a linear Hz axis is resampled onto a target
//! scale (log, semitone, mel, bark variants) by cubic spline
//! interpolation over the forward-transformed bin frequencies.

use crate::dsp;
use crate::error::{Error, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectScale {
    Linear,
    Log,
    Semitone,
    Bark,
    BarkSchroeder,
    BarkSpeex,
    Mel,
}

impl FromStr for SpectScale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lin" | "linear" => Ok(SpectScale::Linear),
            "log" | "logarithmic" => Ok(SpectScale::Log),
            "semi" | "semitone" => Ok(SpectScale::Semitone),
            "bark" => Ok(SpectScale::Bark),
            "bark_schroed" | "bark_schroeder" => Ok(SpectScale::BarkSchroeder),
            "bark_speex" => Ok(SpectScale::BarkSpeex),
            "mel" => Ok(SpectScale::Mel),
            _ => Err(Error::BadConfig {
                stage: "scale",
                reason: format!("unknown frequency scale '{s}'"),
            }),
        }
    }
}

impl SpectScale {
    /// Map a linear frequency in Hz onto the target scale.
    /// `param` is the log base for `Log` and the frequency of the first
    /// note for `Semitone`; it is ignored otherwise.
    pub fn transf_fwd(self, x: f64, param: f64) -> f64 {
        match self {
            SpectScale::Linear => x,
            SpectScale::Log => x.ln() / param.ln(),
            SpectScale::Semitone => {
                if x / param > 1.0 {
                    12.0 * (x / param).log2()
                } else {
                    0.0
                }
            }
            SpectScale::Bark => {
                if x > 0.0 {
                    26.81 / (1.0 + 1960.0 / x) - 0.53
                } else {
                    0.0
                }
            }
            SpectScale::BarkSchroeder => {
                if x > 0.0 {
                    let f = x / 600.0;
                    6.0 * (f + (f * f + 1.0).sqrt()).ln()
                } else {
                    0.0
                }
            }
            SpectScale::BarkSpeex => {
                13.1 * (0.00074 * x).atan() + 2.24 * (x * x * 1.85e-8).atan() + 1e-4 * x
            }
            SpectScale::Mel => {
                if x > 0.0 {
                    1127.0 * (1.0 + x / 700.0).ln()
                } else {
                    0.0
                }
            }
        }
    }

    /// Inverse of `transf_fwd`. The Speex bark approximation has no
    /// closed-form inverse.
    pub fn transf_inv(self, x: f64, param: f64) -> Result<f64> {
        match self {
            SpectScale::Linear => Ok(x),
            SpectScale::Log => Ok((x * param.ln()).exp()),
            SpectScale::Semitone => Ok(param * (x / 12.0).exp2()),
            SpectScale::Bark => {
                let z0 = (x + 0.53) / 26.81;
                Ok(1960.0 * z0 / (1.0 - z0))
            }
            SpectScale::BarkSchroeder => Ok(600.0 * (x / 6.0).sinh()),
            SpectScale::BarkSpeex => Err(Error::UnsupportedScale("bark_speex has no inverse")),
            SpectScale::Mel => Ok(700.0 * ((x / 1127.0).exp() - 1.0)),
        }
    }

    /// Scale parameter passed to the transforms, from the config knobs.
    fn param(self, config: &ScaleConfig) -> f64 {
        match self {
            SpectScale::Log => config.log_scale_base,
            SpectScale::Semitone => config.first_note,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub scale: SpectScale,
    pub log_scale_base: f64,
    pub first_note: f64,
    pub min_f: f64,
    pub max_f: f64,
    /// Number of output points; 0 uses the input dimension.
    pub n_points_target: usize,
    pub spec_enhance: bool,
    pub spec_smooth: bool,
    /// Post-scale auditory weighting; only applied for a log axis with
    /// base 2.
    pub auditory_weighting: bool,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            scale: SpectScale::Log,
            log_scale_base: 2.0,
            first_note: 27.5,
            min_f: 25.0,
            max_f: 8000.0,
            n_points_target: 0,
            spec_enhance: false,
            spec_smooth: false,
            auditory_weighting: false,
        }
    }
}

/// Axis metadata handed to downstream consumers (pitch, mel banks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleMeta {
    pub scale: SpectScale,
    pub param: f64,
    pub min_f: f64,
    pub max_f: f64,
    pub n_octaves: f64,
    pub points_per_octave: f64,
    pub fmin_t: f64,
    pub fmax_t: f64,
    pub delta_f_t: f64,
}

pub struct SpecScaler {
    config: ScaleConfig,
    n_mag: usize,
    n_target: usize,
    meta: ScaleMeta,
    /// Forward-transformed source bin frequencies.
    f_t: Vec<f64>,
    audw: Option<Vec<f64>>,
    y: Vec<f64>,
    y2: Vec<f64>,
    warned_spline: bool,
}

impl SpecScaler {
    /// `fs_sec` is the frame length in seconds, fixing the source bin
    /// spacing to 1/fs_sec Hz.
    pub fn new(config: ScaleConfig, n_mag: usize, fs_sec: f64) -> Result<Self> {
        if n_mag < 3 {
            return Err(Error::BadDimension {
                stage: "scale",
                got: n_mag,
                reason: "need at least 3 magnitude bins",
            });
        }
        if fs_sec <= 0.0 {
            return Err(Error::BadConfig {
                stage: "scale",
                reason: format!("frame length {fs_sec} must be positive"),
            });
        }
        let mut config = config;
        if config.min_f < 1.0 {
            config.min_f = 1.0;
        }
        if config.max_f <= config.min_f {
            return Err(Error::BadConfig {
                stage: "scale",
                reason: format!("max_f {} <= min_f {}", config.max_f, config.min_f),
            });
        }
        let n_target = if config.n_points_target == 0 {
            n_mag
        } else {
            config.n_points_target
        };
        if n_target < 2 {
            return Err(Error::BadConfig {
                stage: "scale",
                reason: "n_points_target must be at least 2".into(),
            });
        }

        let scale = config.scale;
        let param = scale.param(&config);
        let delta_f = 1.0 / fs_sec;
        let fmin_t = scale.transf_fwd(config.min_f, param);
        let fmax_t = scale.transf_fwd(config.max_f, param);
        let delta_f_t = (fmax_t - fmin_t) / (n_target - 1) as f64;

        let mut f_t: Vec<f64> = (0..n_mag)
            .map(|i| scale.transf_fwd(i as f64 * delta_f, param))
            .collect();
        if scale == SpectScale::Log {
            // ln(0) at DC; extrapolate from the first two finite points.
            f_t[0] = 2.0 * f_t[1] - f_t[2];
        }

        let n_octaves = (config.max_f / config.min_f).log2();
        let points_per_octave = n_target as f64 / n_octaves;

        let audw = if config.auditory_weighting
            && scale == SpectScale::Log
            && (config.log_scale_base - 2.0).abs() < 1e-9
        {
            let atan_s = points_per_octave * (65.0f64 / 50.0).log2() - 1.0;
            Some(
                (0..n_target)
                    .map(|i| {
                        0.5 + (3.0 * ((i + 1) as f64 - atan_s) / points_per_octave).atan()
                            / std::f64::consts::PI
                    })
                    .collect(),
            )
        } else {
            None
        };

        let meta = ScaleMeta {
            scale,
            param,
            min_f: config.min_f,
            max_f: config.max_f,
            n_octaves,
            points_per_octave,
            fmin_t,
            fmax_t,
            delta_f_t,
        };

        Ok(Self {
            config,
            n_mag,
            n_target,
            meta,
            f_t,
            audw,
            y: vec![0.0; n_mag],
            y2: vec![0.0; n_mag],
            warned_spline: false,
        })
    }

    pub fn meta(&self) -> &ScaleMeta {
        &self.meta
    }
}

impl Stage for SpecScaler {
    fn output_dim(&self) -> usize {
        self.n_target
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        if input.len() != self.n_mag {
            return Err(Error::BadDimension {
                stage: "scale",
                got: input.len(),
                reason: "magnitude frame does not match configured size",
            });
        }
        self.y.copy_from_slice(input);
        if self.config.spec_enhance {
            dsp::spec_enhance_peaks(&mut self.y);
        }
        if self.config.spec_smooth {
            dsp::spec_smooth(&mut self.y);
        }

        output.clear();
        if !dsp::spline(&self.f_t, &self.y, 1e31, 1e31, &mut self.y2) {
            if !self.warned_spline {
                log::warn!("spline setup failed on the warped axis, emitting zeros");
                self.warned_spline = true;
            }
            output.resize(self.n_target, 0.0);
            return Ok(());
        }
        for i in 0..self.n_target {
            let x = self.meta.fmin_t + i as f64 * self.meta.delta_f_t;
            output.push(dsp::splint(&self.f_t, &self.y, &self.y2, x).unwrap_or(0.0));
        }
        if let Some(w) = &self.audw {
            for (v, wi) in output.iter_mut().zip(w) {
                if *v > 0.0 {
                    *v *= wi;
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.warned_spline = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fwd_inv_roundtrip() {
        let scales = [
            (SpectScale::Log, 2.0),
            (SpectScale::Semitone, 27.5),
            (SpectScale::Bark, 0.0),
            (SpectScale::BarkSchroeder, 0.0),
            (SpectScale::Mel, 0.0),
        ];
        for (scale, param) in scales {
            for f in [50.0, 220.0, 1000.0, 4000.0] {
                let t = scale.transf_fwd(f, param);
                let back = scale.transf_inv(t, param).unwrap();
                assert!(
                    (back - f).abs() < 1e-6,
                    "{scale:?} at {f} Hz came back as {back}"
                );
            }
        }
    }

    #[test]
    fn test_speex_has_no_inverse() {
        assert!(SpectScale::BarkSpeex.transf_inv(5.0, 0.0).is_err());
    }

    #[test]
    fn test_mel_reference_points() {
        assert!((SpectScale::Mel.transf_fwd(700.0, 0.0) - 1127.0 * 2f64.ln()).abs() < 1e-9);
        assert!(SpectScale::Mel.transf_fwd(0.0, 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_scaler_preserves_flat_spectrum() {
        let config = ScaleConfig {
            scale: SpectScale::Log,
            min_f: 25.0,
            max_f: 500.0,
            ..Default::default()
        };
        let mut scaler = SpecScaler::new(config, 64, 0.064).unwrap();
        let input = vec![1.0; 64];
        let mut out = Vec::new();
        scaler.process_frame(&input, &mut out).unwrap();
        assert_eq!(out.len(), 64);
        // Spline through a constant stays constant.
        for v in &out {
            assert!((v - 1.0).abs() < 1e-6, "got {v}");
        }
    }

    #[test]
    fn test_scaler_meta() {
        let config = ScaleConfig {
            scale: SpectScale::Log,
            min_f: 50.0,
            max_f: 800.0,
            n_points_target: 120,
            ..Default::default()
        };
        let scaler = SpecScaler::new(config, 64, 0.064).unwrap();
        let meta = scaler.meta();
        assert!((meta.n_octaves - 4.0).abs() < 1e-12);
        assert!((meta.points_per_octave - 30.0).abs() < 1e-12);
        assert_eq!(scaler.output_dim(), 120);
    }

    #[test]
    fn test_min_f_forced_to_one() {
        let config = ScaleConfig {
            min_f: 0.0,
            ..Default::default()
        };
        let scaler = SpecScaler::new(config, 32, 0.032).unwrap();
        assert!((scaler.meta().min_f - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_scale_names() {
        assert_eq!("mel".parse::<SpectScale>().unwrap(), SpectScale::Mel);
        assert_eq!(
            "BARK_SCHROED".parse::<SpectScale>().unwrap(),
            SpectScale::BarkSchroeder
        );
        assert!("nope".parse::<SpectScale>().is_err());
    }
}
