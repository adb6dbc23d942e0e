//! Pitch candidate smoothing: octave-error correction, optional
//! temporal median filtering, and contour post-smoothing.

use super::PitchMeta;
use crate::dsp;
use crate::error::{Error, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostSmoothingMethod {
    None,
    Simple,
    Median,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchSmootherConfig {
    /// Temporal median filter length over the raw candidates; 0 is off.
    pub median_filter_0: usize,
    pub post_smoothing: usize,
    pub post_smoothing_method: PostSmoothingMethod,
    pub octave_correction: bool,
    pub f0_final: bool,
    pub f0_final_env: bool,
    pub voicing_final_clipped: bool,
    pub voicing_final_unclipped: bool,
    pub f0raw: bool,
    pub voicing_c1: bool,
    pub voicing_clip: bool,
}

impl Default for PitchSmootherConfig {
    fn default() -> Self {
        Self {
            median_filter_0: 0,
            post_smoothing: 0,
            post_smoothing_method: PostSmoothingMethod::Simple,
            octave_correction: true,
            f0_final: true,
            f0_final_env: false,
            voicing_final_clipped: false,
            voicing_final_unclipped: false,
            f0raw: false,
            voicing_c1: false,
            voicing_clip: false,
        }
    }
}

/// Positions of the smoothed outputs, for the direction and voice
/// activity stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmootherMeta {
    pub voicing_cutoff: f64,
    pub pos_f0_final: Option<usize>,
    pub pos_f0_final_env: Option<usize>,
    pub pos_voicing_final_clipped: Option<usize>,
    pub pos_voicing_final_unclipped: Option<usize>,
    pub pos_voicing_c1: Option<usize>,
    pub pos_f0raw: Option<usize>,
    pub pos_voicing_clip: Option<usize>,
}

/// Per-candidate history for the temporal median filter; voice and
/// score follow the element the median picks.
struct MedianHistory {
    t: usize,
    pos: usize,
    f0: Vec<Vec<f64>>,
    voice: Vec<Vec<f64>>,
    score: Vec<Vec<f64>>,
}

impl MedianHistory {
    fn new(n_cands: usize, t: usize) -> Self {
        Self {
            t,
            pos: 0,
            f0: vec![vec![0.0; t]; n_cands],
            voice: vec![vec![0.0; t]; n_cands],
            score: vec![vec![0.0; t]; n_cands],
        }
    }

    fn apply(&mut self, f0: &mut [f64], voice: &mut [f64], score: &mut [f64]) {
        for c in 0..f0.len() {
            self.f0[c][self.pos] = f0[c];
            self.voice[c][self.pos] = voice[c];
            self.score[c][self.pos] = score[c];
            let (med, i0, i1) = dsp::median_ordered(&self.f0[c]);
            f0[c] = med;
            if self.t & 1 == 1 {
                voice[c] = self.voice[c][i0];
                score[c] = self.score[c][i0];
            } else {
                voice[c] = 0.5 * (self.voice[c][i0] + self.voice[c][i1]);
                score[c] = 0.5 * (self.score[c][i0] + self.score[c][i1]);
            }
        }
        self.pos = (self.pos + 1) % self.t;
    }

    fn reset(&mut self) {
        self.pos = 0;
        for h in self.f0.iter_mut().chain(&mut self.voice).chain(&mut self.score) {
            for v in h.iter_mut() {
                *v = 0.0;
            }
        }
    }
}

pub struct PitchSmoother {
    config: PitchSmootherConfig,
    input_meta: PitchMeta,
    input_dim: usize,
    meta: SmootherMeta,
    median0: Option<MedianHistory>,
    f0cand: Vec<f64>,
    cand_voice: Vec<f64>,
    cand_score: Vec<f64>,
    last_final: Vec<f64>,
    first_frame: bool,
    ons_flag: i32,
    ons_flag_o: i32,
    last_voice: f64,
    pitch_env: f64,
}

impl PitchSmoother {
    pub fn new(config: PitchSmootherConfig, input_meta: &PitchMeta, input_dim: usize) -> Result<Self> {
        let mut config = config;
        match config.post_smoothing_method {
            PostSmoothingMethod::None => config.post_smoothing = 0,
            PostSmoothingMethod::Simple => config.post_smoothing = 1,
            PostSmoothingMethod::Median => {
                if config.post_smoothing < 2 {
                    config.post_smoothing = 2;
                }
            }
        }
        if input_meta.pos_cand_voice.is_none() {
            return Err(Error::MissingField {
                stage: "pitch_smoother",
                field: "cand_voice",
            });
        }
        if input_meta.pos_cand_score.is_none() {
            return Err(Error::MissingField {
                stage: "pitch_smoother",
                field: "cand_score",
            });
        }
        if config.voicing_c1 && input_meta.pos_voicing_c1.is_none() {
            return Err(Error::MissingField {
                stage: "pitch_smoother",
                field: "voicing_c1",
            });
        }
        if config.f0raw && input_meta.pos_f0raw.is_none() {
            return Err(Error::MissingField {
                stage: "pitch_smoother",
                field: "f0raw",
            });
        }
        if config.voicing_clip && input_meta.pos_voicing_clip.is_none() {
            return Err(Error::MissingField {
                stage: "pitch_smoother",
                field: "voicing_clip",
            });
        }

        let mut pos = 0;
        let mut field = |enabled: bool| {
            if enabled {
                let p = pos;
                pos += 1;
                Some(p)
            } else {
                None
            }
        };
        let meta = SmootherMeta {
            voicing_cutoff: input_meta.voicing_cutoff,
            pos_f0_final: field(config.f0_final),
            pos_f0_final_env: field(config.f0_final_env),
            pos_voicing_final_clipped: field(config.voicing_final_clipped),
            pos_voicing_final_unclipped: field(config.voicing_final_unclipped),
            pos_voicing_c1: field(config.voicing_c1),
            pos_f0raw: field(config.f0raw),
            pos_voicing_clip: field(config.voicing_clip),
        };

        let n = input_meta.n_candidates;
        Ok(Self {
            median0: if config.median_filter_0 > 0 {
                Some(MedianHistory::new(n, config.median_filter_0))
            } else {
                None
            },
            last_final: vec![0.0; config.post_smoothing],
            config,
            input_meta: input_meta.clone(),
            input_dim,
            meta,
            f0cand: vec![0.0; n],
            cand_voice: vec![0.0; n],
            cand_score: vec![0.0; n],
            first_frame: true,
            ons_flag: 0,
            ons_flag_o: 0,
            last_voice: 0.0,
            pitch_env: 0.0,
        })
    }

    pub fn meta(&self) -> &SmootherMeta {
        &self.meta
    }

    fn octave_correct(&mut self) {
        let c = self.f0cand.len();
        let f0cand = &mut self.f0cand;
        let cand_voice = &mut self.cand_voice;
        let cand_score = &mut self.cand_score;

        let mut cand0_is_min = true;
        let mut vp_min = 0.0;
        let mut min_c: Option<usize> = None;
        for i in 1..c {
            if f0cand[i] > 0.0 && f0cand[i] < f0cand[0] {
                if cand_voice[i] > 0.9 * cand_voice[0] && cand_voice[i] > vp_min {
                    vp_min = cand_voice[i];
                    min_c = Some(i);
                }
                cand0_is_min = false;
            }
        }
        if !cand0_is_min {
            if let Some(m) = min_c {
                f0cand.swap(0, m);
                cand_voice.swap(0, m);
                cand_score.swap(0, m);
            }
        } else {
            // all other candidates are above f0cand[0]: if two of them
            // sit roughly f0cand[0]/2 apart the true pitch is likely an
            // octave down
            let mut halved = false;
            let mut j = 0;
            while !halved && j + 1 < c {
                for i in j + 1..c {
                    if f0cand[i] > 0.0 && f0cand[j] > 0.0 {
                        let k = ((f0cand[i] - f0cand[j]).abs() * 2.0 / f0cand[0] - 1.0).abs();
                        if k < 0.1 {
                            f0cand[0] /= 2.0;
                            halved = true;
                            break;
                        }
                    }
                }
                j += 1;
            }
        }
    }
}

impl Stage for PitchSmoother {
    fn output_dim(&self) -> usize {
        let c = &self.config;
        [
            c.f0_final,
            c.f0_final_env,
            c.voicing_final_clipped,
            c.voicing_final_unclipped,
            c.voicing_c1,
            c.f0raw,
            c.voicing_clip,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        if input.len() != self.input_dim {
            return Err(Error::BadDimension {
                stage: "pitch_smoother",
                got: input.len(),
                reason: "pitch frame does not match configured size",
            });
        }
        let n = self.input_meta.n_candidates;
        let voice_i = self.input_meta.pos_cand_voice.unwrap_or(0);
        let score_i = self.input_meta.pos_cand_score.unwrap_or(0);
        for j in 0..n {
            self.f0cand[j] = input[self.input_meta.pos_f0cand + j];
            self.cand_voice[j] = input[voice_i + j];
            self.cand_score[j] = input[score_i + j];
        }

        if let Some(m) = self.median0.as_mut() {
            m.apply(&mut self.f0cand, &mut self.cand_voice, &mut self.cand_score);
        }

        if self.config.octave_correction {
            self.octave_correct();
        }

        let c = self.config.clone();
        let cutoff = self.input_meta.voicing_cutoff;
        let mut voice_c1 = self.cand_voice[0];
        output.clear();

        if c.f0_final || c.f0_final_env {
            let pitch = if self.cand_voice[0] > cutoff {
                self.f0cand[0]
            } else {
                0.0
            };

            let pitch_out;
            if c.post_smoothing > 0 {
                match c.post_smoothing_method {
                    PostSmoothingMethod::Simple => {
                        if self.first_frame {
                            // delay by one frame for synchronisation
                            self.first_frame = false;
                            output.resize(self.output_dim(), 0.0);
                            return Ok(());
                        }
                        voice_c1 = self.last_voice;
                        self.last_voice = self.cand_voice[0];

                        let last = self.last_final[0];
                        if last == 0.0 && pitch > 0.0 {
                            self.ons_flag = 1;
                        }
                        if last > 0.0 && pitch == 0.0 && self.ons_flag == 0 {
                            self.ons_flag = -1;
                        }
                        if last > 0.0 && pitch > 0.0 {
                            self.ons_flag = 0;
                        }
                        if last == 0.0 && pitch == 0.0 {
                            self.ons_flag = 0;
                        }

                        if pitch == 0.0 && self.ons_flag == 1 {
                            self.last_final[0] = 0.0;
                        } else if pitch > 0.0 && self.ons_flag == -1 {
                            self.last_final[0] = pitch;
                        }

                        let mut doubling = false;
                        let mut halving = false;
                        if self.last_final[0] > 0.0 && pitch > 0.0 {
                            let factor = self.last_final[0] / pitch;
                            if factor > 1.2 {
                                halving = true;
                            } else if factor < 0.8 {
                                doubling = true;
                            }
                        }
                        if doubling && self.ons_flag_o == -1 {
                            self.last_final[0] = pitch;
                        } else if halving && self.ons_flag_o == 1 {
                            self.last_final[0] = pitch;
                        }
                        if doubling {
                            self.ons_flag_o = 1;
                        }
                        if halving && self.ons_flag == 0 {
                            self.ons_flag_o = -1;
                        }
                        if !(halving || doubling) {
                            self.ons_flag_o = 0;
                        }

                        pitch_out = self.last_final[0];
                        for i in (1..c.post_smoothing).rev() {
                            self.last_final[i] = self.last_final[i - 1];
                        }
                        self.last_final[0] = pitch;
                    }
                    PostSmoothingMethod::Median => {
                        for i in (1..c.post_smoothing).rev() {
                            self.last_final[i] = self.last_final[i - 1];
                        }
                        self.last_final[0] = pitch;
                        pitch_out = dsp::median(&self.last_final);
                    }
                    PostSmoothingMethod::None => {
                        pitch_out = pitch;
                    }
                }
            } else {
                pitch_out = pitch;
            }

            if c.f0_final {
                output.push(pitch_out);
            }
            if c.f0_final_env {
                if pitch_out > 0.0 {
                    if self.pitch_env == 0.0 {
                        self.pitch_env = pitch_out;
                    } else {
                        self.pitch_env = 0.75 * self.pitch_env + 0.25 * pitch_out;
                    }
                }
                output.push(self.pitch_env);
            }
        }

        if c.voicing_final_clipped {
            output.push(if voice_c1 > cutoff { voice_c1 } else { 0.0 });
        }
        if c.voicing_final_unclipped {
            output.push(voice_c1);
        }
        if c.voicing_c1 {
            output.push(input[self.input_meta.pos_voicing_c1.unwrap_or(0)]);
        }
        if c.f0raw {
            output.push(input[self.input_meta.pos_f0raw.unwrap_or(0)]);
        }
        if c.voicing_clip {
            output.push(input[self.input_meta.pos_voicing_clip.unwrap_or(0)]);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.first_frame = true;
        self.ons_flag = 0;
        self.ons_flag_o = 0;
        self.last_voice = 0.0;
        self.pitch_env = 0.0;
        for v in self.last_final.iter_mut() {
            *v = 0.0;
        }
        if let Some(m) = self.median0.as_mut() {
            m.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::PitchMeta;

    fn meta(n: usize) -> PitchMeta {
        PitchMeta {
            n_candidates: n,
            voicing_cutoff: 0.7,
            pos_f0cand: 1,
            pos_cand_voice: Some(1 + n),
            pos_cand_score: Some(1 + 2 * n),
            pos_f0c1: None,
            pos_voicing_c1: None,
            pos_f0raw: None,
            pos_voicing_clip: None,
        }
    }

    fn frame(n: usize, f0: &[f64], voice: &[f64], score: &[f64]) -> Vec<f64> {
        let mut v = vec![f0.iter().filter(|x| **x > 0.0).count() as f64];
        let pad = |src: &[f64]| {
            let mut x = src.to_vec();
            x.resize(n, 0.0);
            x
        };
        v.extend(pad(f0));
        v.extend(pad(voice));
        v.extend(pad(score));
        v
    }

    #[test]
    fn test_final_pitch_follows_voicing_cutoff() {
        let m = meta(3);
        let mut s = PitchSmoother::new(
            PitchSmootherConfig {
                post_smoothing_method: PostSmoothingMethod::None,
                ..Default::default()
            },
            &m,
            10,
        )
        .unwrap();
        let mut out = Vec::new();
        s.process_frame(&frame(3, &[200.0], &[0.9], &[1.0]), &mut out)
            .unwrap();
        assert_eq!(out, vec![200.0]);
        s.process_frame(&frame(3, &[200.0], &[0.5], &[1.0]), &mut out)
            .unwrap();
        assert_eq!(out, vec![0.0], "voicing below cutoff mutes the pitch");
    }

    #[test]
    fn test_octave_correction_prefers_lower_candidate() {
        let m = meta(3);
        let mut s = PitchSmoother::new(
            PitchSmootherConfig {
                post_smoothing_method: PostSmoothingMethod::None,
                ..Default::default()
            },
            &m,
            10,
        )
        .unwrap();
        let mut out = Vec::new();
        // 400 Hz leads but a strongly voiced 200 Hz candidate exists
        s.process_frame(&frame(3, &[400.0, 200.0], &[0.9, 0.88], &[2.0, 1.5]), &mut out)
            .unwrap();
        assert_eq!(out, vec![200.0]);
    }

    #[test]
    fn test_octave_halving_from_candidate_spacing() {
        let m = meta(3);
        let mut s = PitchSmoother::new(
            PitchSmootherConfig {
                post_smoothing_method: PostSmoothingMethod::None,
                ..Default::default()
            },
            &m,
            10,
        )
        .unwrap();
        let mut out = Vec::new();
        // cand0 is the lowest, but two higher candidates sit ~200 Hz
        // apart, half of cand0's 400 Hz: halve it
        s.process_frame(
            &frame(3, &[400.0, 600.0, 800.0], &[0.9, 0.1, 0.1], &[2.0, 0.5, 0.4]),
            &mut out,
        )
        .unwrap();
        assert_eq!(out, vec![200.0]);
    }

    #[test]
    fn test_simple_smoothing_delays_one_frame() {
        let m = meta(3);
        let mut s = PitchSmoother::new(PitchSmootherConfig::default(), &m, 10).unwrap();
        let mut out = Vec::new();
        let f = frame(3, &[180.0], &[0.9], &[1.0]);
        s.process_frame(&f, &mut out).unwrap();
        assert_eq!(out, vec![0.0], "first frame is sync padding");
        s.process_frame(&f, &mut out).unwrap();
        assert_eq!(out, vec![0.0], "one frame of latency");
        s.process_frame(&f, &mut out).unwrap();
        assert_eq!(out, vec![180.0]);
    }

    #[test]
    fn test_single_frame_onset_suppressed() {
        let m = meta(3);
        let mut s = PitchSmoother::new(PitchSmootherConfig::default(), &m, 10).unwrap();
        let voiced = frame(3, &[180.0], &[0.9], &[1.0]);
        let unvoiced = frame(3, &[0.0], &[0.0], &[0.0]);
        let mut out = Vec::new();
        s.process_frame(&voiced, &mut out).unwrap(); // sync
        s.process_frame(&voiced, &mut out).unwrap();
        assert_eq!(out, vec![0.0]);
        // a lone voiced frame followed by silence is judged spurious
        // and never surfaces
        s.process_frame(&unvoiced, &mut out).unwrap();
        assert_eq!(out, vec![0.0]);
        s.process_frame(&unvoiced, &mut out).unwrap();
        assert_eq!(out, vec![0.0]);
    }

    #[test]
    fn test_envelope_tracks_voiced_frames_only() {
        let m = meta(3);
        let mut s = PitchSmoother::new(
            PitchSmootherConfig {
                post_smoothing_method: PostSmoothingMethod::None,
                f0_final_env: true,
                ..Default::default()
            },
            &m,
            10,
        )
        .unwrap();
        let mut out = Vec::new();
        s.process_frame(&frame(3, &[200.0], &[0.9], &[1.0]), &mut out)
            .unwrap();
        assert_eq!(out, vec![200.0, 200.0]);
        s.process_frame(&frame(3, &[0.0], &[0.0], &[0.0]), &mut out)
            .unwrap();
        assert_eq!(out, vec![0.0, 200.0], "envelope holds through silence");
        s.process_frame(&frame(3, &[300.0], &[0.9], &[1.0]), &mut out)
            .unwrap();
        assert_eq!(out, vec![300.0, 225.0]);
    }

    #[test]
    fn test_median_smoothing_suppresses_spike() {
        let m = meta(3);
        let mut s = PitchSmoother::new(
            PitchSmootherConfig {
                post_smoothing_method: PostSmoothingMethod::Median,
                post_smoothing: 3,
                ..Default::default()
            },
            &m,
            10,
        )
        .unwrap();
        let mut out = Vec::new();
        for f0 in [100.0, 100.0, 400.0, 100.0] {
            s.process_frame(&frame(3, &[f0], &[0.9], &[1.0]), &mut out)
                .unwrap();
        }
        assert_eq!(out, vec![100.0], "median rejects the one-frame spike");
    }
}
