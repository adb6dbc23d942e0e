//! Pitch chain: candidate detection, smoothing, direction analysis.

pub mod direction;
pub mod shs;
pub mod smoother;

pub use direction::{PitchDirection, PitchDirectionConfig};
pub use shs::{PitchShs, ShsConfig};
pub use smoother::{PitchSmoother, PitchSmootherConfig, PostSmoothingMethod};

use crate::error::{Error, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

/// Shared knobs of every pitch detector front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchBaseConfig {
    pub max_pitch: f64,
    pub min_pitch: f64,
    pub n_candidates: usize,
    pub voicing: bool,
    pub scores: bool,
    pub f0c1: bool,
    pub voicing_c1: bool,
    pub f0raw: bool,
    pub voicing_clip: bool,
    pub voicing_cutoff: f64,
    /// Let the detector keep its own preferred candidate in slot 0
    /// instead of promoting the best-scored one.
    pub octave_correction: bool,
}

impl Default for PitchBaseConfig {
    fn default() -> Self {
        Self {
            max_pitch: 620.0,
            min_pitch: 52.0,
            n_candidates: 3,
            voicing: true,
            scores: true,
            f0c1: false,
            voicing_c1: false,
            f0raw: false,
            voicing_clip: false,
            voicing_cutoff: 1.0,
            octave_correction: false,
        }
    }
}

/// Scratch candidate arrays a detector fills per frame.
#[derive(Debug, Clone)]
pub struct Candidates {
    pub f0: Vec<f64>,
    pub voice: Vec<f64>,
    pub score: Vec<f64>,
}

impl Candidates {
    fn new(n: usize) -> Self {
        Self {
            f0: vec![0.0; n],
            voice: vec![0.0; n],
            score: vec![0.0; n],
        }
    }

    fn clear(&mut self) {
        for v in self.f0.iter_mut() {
            *v = 0.0;
        }
        for v in self.voice.iter_mut() {
            *v = 0.0;
        }
        for v in self.score.iter_mut() {
            *v = 0.0;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.f0.swap(a, b);
        self.voice.swap(a, b);
        self.score.swap(a, b);
    }
}

/// A per-frame pitch candidate source driving the shared candidate
/// post-processing.
pub trait PitchDetector {
    /// Fill the candidate arrays from one spectral frame. Returns the
    /// number of candidates found, or `None` when detection cannot run.
    fn detect(&mut self, base: &PitchBaseConfig, spectrum: &[f64], cand: &mut Candidates)
        -> Option<usize>;
}

/// Positions of the fields in a pitch output frame, published for the
/// smoother and the voice activity stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitchMeta {
    pub n_candidates: usize,
    pub voicing_cutoff: f64,
    pub pos_f0cand: usize,
    pub pos_cand_voice: Option<usize>,
    pub pos_cand_score: Option<usize>,
    pub pos_f0c1: Option<usize>,
    pub pos_voicing_c1: Option<usize>,
    pub pos_f0raw: Option<usize>,
    pub pos_voicing_clip: Option<usize>,
}

/// Runs a `PitchDetector` per frame and emits the candidate layout
/// `[nCand, f0…, voicing…, scores…, F0C1, voicingC1, F0raw,
/// voicingClip]` with the optional fields gated by config.
pub struct PitchStage<D> {
    config: PitchBaseConfig,
    detector: D,
    cand: Candidates,
    input_dim: usize,
    meta: PitchMeta,
}

impl<D: PitchDetector> PitchStage<D> {
    pub fn new(config: PitchBaseConfig, detector: D, input_dim: usize) -> Result<Self> {
        if input_dim < 3 {
            return Err(Error::BadDimension {
                stage: "pitch",
                got: input_dim,
                reason: "need at least 3 spectral bins",
            });
        }
        let mut config = config;
        config.n_candidates = config.n_candidates.clamp(1, 20);
        let n = config.n_candidates;

        let mut pos = 1 + n;
        let mut field = |enabled: bool, width: usize| {
            if enabled {
                let p = pos;
                pos += width;
                Some(p)
            } else {
                None
            }
        };
        let meta = PitchMeta {
            n_candidates: n,
            voicing_cutoff: config.voicing_cutoff,
            pos_f0cand: 1,
            pos_cand_voice: field(config.voicing, n),
            pos_cand_score: field(config.scores, n),
            pos_f0c1: field(config.f0c1, 1),
            pos_voicing_c1: field(config.voicing_c1, 1),
            pos_f0raw: field(config.f0raw, 1),
            pos_voicing_clip: field(config.voicing_clip, 1),
        };

        Ok(Self {
            cand: Candidates::new(n),
            config,
            detector,
            input_dim,
            meta,
        })
    }

    pub fn meta(&self) -> &PitchMeta {
        &self.meta
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }
}

impl<D: PitchDetector> Stage for PitchStage<D> {
    fn output_dim(&self) -> usize {
        let c = &self.config;
        let n = c.n_candidates;
        let mut dim = 1 + n;
        if c.voicing {
            dim += n;
        }
        if c.scores {
            dim += n;
        }
        dim += [c.f0c1, c.voicing_c1, c.f0raw, c.voicing_clip]
            .iter()
            .filter(|b| **b)
            .count();
        dim
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        if input.len() != self.input_dim {
            return Err(Error::BadDimension {
                stage: "pitch",
                got: input.len(),
                reason: "spectral frame does not match configured size",
            });
        }
        let c = &self.config;
        let n = c.n_candidates;
        self.cand.clear();

        let detected = self.detector.detect(c, input, &mut self.cand);
        output.clear();
        let Some(mut n_cand) = detected else {
            output.resize(self.output_dim(), 0.0);
            return Ok(());
        };

        // drop out-of-range candidates by shifting the rest left
        let mut i = 0;
        while i < n && n_cand > 0 {
            if self.cand.f0[i] > c.max_pitch || self.cand.f0[i] < c.min_pitch {
                let orig = self.cand.f0[i];
                for j in i + 1..n {
                    self.cand.f0[j - 1] = self.cand.f0[j];
                    self.cand.voice[j - 1] = self.cand.voice[j];
                    self.cand.score[j - 1] = self.cand.score[j];
                }
                self.cand.f0[n - 1] = 0.0;
                self.cand.voice[n - 1] = 0.0;
                self.cand.score[n - 1] = 0.0;
                if orig > 0.0 {
                    n_cand -= 1;
                    continue; // re-check the shifted slot
                }
            }
            i += 1;
        }

        output.push(n_cand as f64);

        // promote the best-scored candidate unless the detector already
        // ordered them
        if !c.octave_correction {
            let mut max_i = 0;
            for i in 1..n {
                if self.cand.score[i] > self.cand.score[max_i] {
                    max_i = i;
                }
            }
            if max_i > 0 {
                self.cand.swap(0, max_i);
            }
        }

        output.extend_from_slice(&self.cand.f0);
        if c.voicing {
            output.extend_from_slice(&self.cand.voice);
        }
        if c.scores {
            output.extend_from_slice(&self.cand.score);
        }
        if c.f0c1 {
            output.push(self.cand.f0[0]);
        }
        if c.voicing_c1 {
            output.push(self.cand.voice[0]);
        }
        if c.f0raw {
            output.push(if self.cand.voice[0] <= c.voicing_cutoff {
                0.0
            } else {
                self.cand.f0[0]
            });
        }
        if c.voicing_clip {
            output.push(if self.cand.voice[0] <= c.voicing_cutoff {
                0.0
            } else {
                self.cand.voice[0]
            });
        }
        Ok(())
    }

    fn reset(&mut self) {}
}
