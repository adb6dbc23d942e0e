//! Pitch movement classification at pseudo-syllable level.
//!
//! Rising and falling pitch is judged at the ends of energetic voiced
//! segments with two moving averages over the smoothed pitch envelope,
//! plus a continuous per-frame direction value.

use super::smoother::SmootherMeta;
use crate::energy::EnergyMeta;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchDirectionConfig {
    /// Long-term average buffer length in seconds.
    pub ltbs: f64,
    /// Short-term average buffer length in seconds.
    pub stbs: f64,
    /// Speaking-rate window in input frames.
    pub speaking_rate_bsize: usize,
    pub f0_direction: bool,
    pub direction_score: bool,
    pub speaking_rate: bool,
    pub f0_avg: bool,
    pub f0_smooth: bool,
}

impl Default for PitchDirectionConfig {
    fn default() -> Self {
        Self {
            ltbs: 0.20,
            stbs: 0.05,
            speaking_rate_bsize: 100,
            f0_direction: true,
            direction_score: true,
            speaking_rate: false,
            f0_avg: false,
            f0_smooth: false,
        }
    }
}

pub struct PitchDirection {
    config: PitchDirectionConfig,
    input_dim: usize,
    f0_offset: usize,
    f0env_offset: usize,
    e_offset: usize,
    time_step: f64,

    st_buf: Vec<f64>,
    lt_buf: Vec<f64>,
    st_ptr: usize,
    lt_ptr: usize,
    st_sum: f64,
    lt_sum: f64,
    buf_init: bool,

    f0_non0: f64,
    last_f0: f64,
    last_e: f64,
    f0s: f64,

    insyl: bool,
    f0cnt: usize,
    sylen: usize,
    syl_cnt: usize,
    start_f0: f64,
    max_f0: f64,
    min_f0: f64,
    max_f0_pos: usize,
    min_f0_pos: usize,
    start_e: f64,
    max_e: f64,
    min_e: f64,
    end_e: f64,
    max_pos: usize,
    min_pos: usize,
    n_rise: usize,
    n_fall: usize,
    n_flat: usize,

    cur_spk_rate: f64,
    n_buf0: usize,
    n_buf1: usize,
    n_syl0: usize,
    n_syl1: usize,

    time: f64,
    events: Vec<Event>,
}

impl PitchDirection {
    /// The input frame is the smoother output with the energy frame
    /// appended behind it.
    pub fn new(
        config: PitchDirectionConfig,
        smoother_meta: &SmootherMeta,
        energy_meta: &EnergyMeta,
        smoother_dim: usize,
        energy_dim: usize,
        time_step: f64,
    ) -> Result<Self> {
        let f0_offset = smoother_meta.pos_f0_final.ok_or(Error::MissingField {
            stage: "pitch_direction",
            field: "f0_final",
        })?;
        let f0env_offset = smoother_meta.pos_f0_final_env.ok_or(Error::MissingField {
            stage: "pitch_direction",
            field: "f0_final_env",
        })?;
        let e_offset = smoother_dim
            + energy_meta.pos_rms.ok_or(Error::MissingField {
                stage: "pitch_direction",
                field: "rms_energy",
            })?;
        if time_step <= 0.0 {
            return Err(Error::BadConfig {
                stage: "pitch_direction",
                reason: format!("frame period {time_step} must be positive"),
            });
        }
        let stbs_frames = (config.stbs / time_step).ceil() as usize;
        let ltbs_frames = (config.ltbs / time_step).ceil() as usize;
        if stbs_frames == 0 || ltbs_frames == 0 {
            return Err(Error::BadConfig {
                stage: "pitch_direction",
                reason: "averaging buffers must span at least one frame".into(),
            });
        }
        Ok(Self {
            config,
            input_dim: smoother_dim + energy_dim,
            f0_offset,
            f0env_offset,
            e_offset,
            time_step,
            st_buf: vec![0.0; stbs_frames],
            lt_buf: vec![0.0; ltbs_frames],
            st_ptr: 0,
            lt_ptr: 0,
            st_sum: 0.0,
            lt_sum: 0.0,
            buf_init: false,
            f0_non0: 0.0,
            last_f0: 0.0,
            last_e: 0.0,
            f0s: 0.0,
            insyl: false,
            f0cnt: 0,
            sylen: 0,
            syl_cnt: 0,
            start_f0: 0.0,
            max_f0: 0.0,
            min_f0: 0.0,
            max_f0_pos: 0,
            min_f0_pos: 0,
            start_e: 0.0,
            max_e: 0.0,
            min_e: 0.0,
            end_e: 0.0,
            max_pos: 0,
            min_pos: 0,
            n_rise: 0,
            n_fall: 0,
            n_flat: 0,
            cur_spk_rate: 0.0,
            n_buf0: 0,
            n_buf1: 0,
            n_syl0: 0,
            n_syl1: 0,
            time: 0.0,
            events: Vec::new(),
        })
    }

    /// Pitch movement events queued since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Number of pseudo-syllables classified so far.
    pub fn syllable_count(&self) -> usize {
        self.syl_cnt
    }

    /// Classify the syllable that just ended; emits an event when the
    /// contour is clear enough.
    fn classify_syllable(&mut self) {
        let start_f0 = self.start_f0;
        let end_f0 = self.f0s;
        let mut conf = self.sylen as f64;
        if conf > 10.0 {
            conf = 10.0;
        }
        conf *= 30.0;
        let mut score = 0i64;
        let mut rf = false;
        let mut result: i32 = -1;

        if end_f0 > start_f0.powf(1.01) {
            if start_f0 != 0.0 {
                score = ((end_f0 - start_f0) / start_f0 * conf) as i64;
            }
            if score >= 1 {
                rf = true;
                result = 0;
            }
        } else if end_f0 < start_f0.powf(1.0 / 1.01) {
            if start_f0 != 0.0 {
                score = ((start_f0 - end_f0) / start_f0 * conf) as i64;
            }
            if score >= 1 {
                rf = true;
                result = 1;
            }
        }

        if !rf
            && self.max_f0 > end_f0.powf(1.01)
            && self.max_f0 > start_f0.powf(1.01)
            && start_f0 != 0.0
        {
            if result >= 0 {
                if score < 15 {
                    result = 2;
                }
            } else {
                result = 2;
            }
        }
        if !rf
            && self.min_f0 < end_f0.powf(1.0 / 1.01)
            && self.min_f0 < start_f0.powf(1.0 / 1.01)
            && start_f0 != 0.0
        {
            if result >= 0 {
                if score < 15 {
                    result = 3;
                }
            } else {
                result = 3;
            }
        }

        // simple rise/fall must agree with the per-frame majority vote
        if result == 0 || result == 1 {
            if self.n_fall > self.n_rise && self.n_fall > self.n_flat {
                if result == 0 {
                    result = -1;
                }
            } else if self.n_rise > self.n_fall && self.n_rise > self.n_flat {
                if result == 1 {
                    result = -1;
                }
            } else {
                result = -1;
            }
        }

        let name = match result {
            0 => "pitch-rise",
            1 => "pitch-fall",
            2 => "pitch-rise-fall",
            3 => "pitch-fall-rise",
            _ => return,
        };
        log::debug!(
            "syllable {}: {} (len {} frames, f0 {:.1}->{:.1}, max {:.1}@{}, min {:.1}@{}, \
             energy {:.3}->{:.3}, max {:.3}@{}, min {:.3}@{})",
            self.syl_cnt,
            name,
            self.sylen,
            start_f0,
            end_f0,
            self.max_f0,
            self.max_f0_pos,
            self.min_f0,
            self.min_f0_pos,
            self.start_e,
            self.end_e,
            self.max_e,
            self.max_pos,
            self.min_e,
            self.min_pos
        );
        self.events.push(Event::new(name, self.time * 1000.0, 0.0));
    }
}

impl Stage for PitchDirection {
    fn output_dim(&self) -> usize {
        let c = &self.config;
        [
            c.f0_direction,
            c.direction_score,
            c.speaking_rate,
            c.f0_avg,
            c.f0_smooth,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        if input.len() != self.input_dim {
            return Err(Error::BadDimension {
                stage: "pitch_direction",
                got: input.len(),
                reason: "combined pitch+energy frame does not match configured size",
            });
        }
        let f0e_now = input[self.f0env_offset];
        let f0_now = input[self.f0_offset];
        let loudn = input[self.e_offset];

        if f0_now != 0.0 {
            self.f0_non0 = f0_now;
        }

        // speaking rate over a double-length window
        let bsize = self.config.speaking_rate_bsize;
        if self.n_buf0 < bsize {
            self.n_buf0 += 1;
            if self.n_buf0 == bsize {
                self.cur_spk_rate = self.n_syl0 as f64 / (self.n_buf0 as f64 * self.time_step);
            }
        }
        if self.n_buf1 < bsize * 2 {
            self.n_buf1 += 1;
        } else {
            self.cur_spk_rate = self.n_syl1 as f64 / (self.n_buf1 as f64 * self.time_step);
            self.n_buf1 -= self.n_buf0;
            self.n_syl1 = self.n_syl1.saturating_sub(self.n_syl0);
            self.n_syl0 = 0;
            self.n_buf0 = 0;
        }

        if !self.buf_init {
            self.st_buf[self.st_ptr] = f0e_now;
            self.lt_buf[self.lt_ptr] = f0e_now;
            self.st_ptr += 1;
            if self.st_ptr >= self.st_buf.len() {
                self.st_ptr = 0;
            }
            self.lt_ptr += 1;
            if self.lt_ptr >= self.lt_buf.len() {
                self.lt_ptr = 0;
                self.buf_init = true;
                self.lt_sum = self.lt_buf.iter().sum();
                self.st_sum = self.st_buf.iter().sum();
            }
        } else {
            if !self.insyl {
                if f0_now > 0.0 {
                    if self.f0cnt >= 1 {
                        // syllable start
                        if self.n_buf0 < bsize {
                            self.n_syl0 += 1;
                        }
                        self.n_syl1 += 1;
                        self.insyl = true;
                        self.sylen = self.f0cnt;
                        self.f0cnt = 0;
                        self.start_f0 = (self.last_f0 + f0_now) * 0.5;
                        self.f0s = self.start_f0;
                        self.max_f0 = self.last_f0.max(f0_now);
                        self.min_f0 = self.last_f0.min(f0_now);
                        self.max_f0_pos = 0;
                        self.min_f0_pos = 0;
                        self.n_fall = 0;
                        self.n_rise = 0;
                        self.n_flat = 0;
                    }
                    self.f0cnt += 1;
                    if self.start_e == 0.0 {
                        self.start_e = self.last_e;
                        self.min_e = self.last_e;
                        self.max_e = self.last_e;
                    }
                } else {
                    self.f0cnt = 0;
                    self.start_e = 0.0;
                    self.max_e = 0.0;
                    self.min_e = 0.0;
                }
            } else {
                if f0_now <= 0.0 {
                    if self.f0cnt >= 1 {
                        // syllable end
                        self.insyl = false;
                        if self.sylen > 3 {
                            self.end_e = self.last_e;
                            self.f0cnt = 0;
                            self.syl_cnt += 1;
                            self.classify_syllable();
                        }
                    }
                    self.f0cnt += 1;
                } else {
                    self.f0cnt = 0;
                }

                if self.insyl {
                    if loudn > self.max_e {
                        self.max_e = loudn;
                        self.max_pos = self.sylen;
                    }
                    if loudn < self.min_e {
                        self.min_e = loudn;
                        self.min_pos = self.sylen;
                    }
                    self.f0s = 0.5 * self.f0s + 0.5 * self.f0_non0;
                    if self.f0s > self.max_f0 {
                        self.max_f0 = self.f0s;
                        self.max_f0_pos = self.sylen;
                    }
                    if self.f0s < self.min_f0 {
                        self.min_f0 = self.f0s;
                        self.min_f0_pos = self.sylen;
                    }
                    self.sylen += 1;

                    let lmean = self.lt_sum / self.lt_buf.len() as f64;
                    let smean = self.st_sum / self.st_buf.len() as f64;
                    if smean > lmean.powf(1.02) {
                        self.n_rise += 1;
                    } else if smean < lmean.powf(1.0 / 1.02) {
                        self.n_fall += 1;
                    } else {
                        self.n_flat += 1;
                    }
                }
            }
            self.last_f0 = f0_now;
            self.last_e = loudn;
        }

        let mut dir = 0.0;
        let mut smean = 0.0;
        let mut lmean = 0.0;
        if self.insyl {
            self.lt_sum -= self.lt_buf[self.lt_ptr];
            self.lt_buf[self.lt_ptr] = self.f0s;
            self.lt_sum += self.f0s;
            self.lt_ptr += 1;
            if self.lt_ptr >= self.lt_buf.len() {
                self.lt_ptr = 0;
            }

            self.st_sum -= self.st_buf[self.st_ptr];
            self.st_buf[self.st_ptr] = self.f0s;
            self.st_sum += self.f0s;
            self.st_ptr += 1;
            if self.st_ptr >= self.st_buf.len() {
                self.st_ptr = 0;
            }

            lmean = self.lt_sum / self.lt_buf.len() as f64;
            smean = self.st_sum / self.st_buf.len() as f64;
            dir = if smean > lmean.powf(1.01) {
                1.0
            } else if smean < lmean.powf(1.0 / 1.01) {
                -1.0
            } else {
                0.0
            };
        }

        output.clear();
        if self.config.f0_direction {
            output.push(dir);
        }
        if self.config.direction_score {
            output.push(smean - lmean);
        }
        if self.config.speaking_rate {
            output.push(self.cur_spk_rate);
        }
        if self.config.f0_avg {
            output.push(self.lt_sum / self.lt_buf.len() as f64);
        }
        if self.config.f0_smooth {
            output.push(self.f0s);
        }

        self.time += self.time_step;
        Ok(())
    }

    fn reset(&mut self) {
        self.st_buf.fill(0.0);
        self.lt_buf.fill(0.0);
        self.events.clear();
        self.st_ptr = 0;
        self.lt_ptr = 0;
        self.st_sum = 0.0;
        self.lt_sum = 0.0;
        self.buf_init = false;
        self.f0_non0 = 0.0;
        self.last_f0 = 0.0;
        self.last_e = 0.0;
        self.f0s = 0.0;
        self.insyl = false;
        self.f0cnt = 0;
        self.sylen = 0;
        self.syl_cnt = 0;
        self.start_f0 = 0.0;
        self.max_f0 = 0.0;
        self.min_f0 = 0.0;
        self.max_f0_pos = 0;
        self.min_f0_pos = 0;
        self.max_pos = 0;
        self.min_pos = 0;
        self.start_e = 0.0;
        self.max_e = 0.0;
        self.min_e = 0.0;
        self.end_e = 0.0;
        self.n_rise = 0;
        self.n_fall = 0;
        self.n_flat = 0;
        self.cur_spk_rate = 0.0;
        self.n_buf0 = 0;
        self.n_buf1 = 0;
        self.n_syl0 = 0;
        self.n_syl1 = 0;
        self.time = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direction(time_step: f64) -> PitchDirection {
        let sm = SmootherMeta {
            voicing_cutoff: 0.7,
            pos_f0_final: Some(0),
            pos_f0_final_env: Some(1),
            pos_voicing_final_clipped: None,
            pos_voicing_final_unclipped: None,
            pos_voicing_c1: None,
            pos_f0raw: None,
            pos_voicing_clip: None,
        };
        let em = EnergyMeta {
            pos_rms: Some(0),
            pos_log: Some(1),
        };
        PitchDirection::new(PitchDirectionConfig::default(), &sm, &em, 2, 2, time_step).unwrap()
    }

    fn feed(d: &mut PitchDirection, f0: f64, f0env: f64, rms: f64) -> Vec<f64> {
        let mut out = Vec::new();
        d.process_frame(&[f0, f0env, rms, 0.0], &mut out).unwrap();
        out
    }

    #[test]
    fn test_missing_inputs_rejected() {
        let sm = SmootherMeta {
            voicing_cutoff: 0.7,
            pos_f0_final: Some(0),
            pos_f0_final_env: None,
            pos_voicing_final_clipped: None,
            pos_voicing_final_unclipped: None,
            pos_voicing_c1: None,
            pos_f0raw: None,
            pos_voicing_clip: None,
        };
        let em = EnergyMeta {
            pos_rms: Some(0),
            pos_log: None,
        };
        assert!(
            PitchDirection::new(PitchDirectionConfig::default(), &sm, &em, 1, 1, 0.01).is_err()
        );
    }

    #[test]
    fn test_rising_contour_emits_rise_event() {
        let mut d = direction(0.01);
        // init the averaging buffers (ltbs 0.2 s at 10 ms = 20 frames)
        for _ in 0..20 {
            feed(&mut d, 0.0, 120.0, 0.1);
        }
        // need one prior voiced frame so a syllable start is detected
        feed(&mut d, 120.0, 120.0, 0.2);
        let mut f0 = 120.0;
        for _ in 0..30 {
            f0 *= 1.03;
            feed(&mut d, f0, f0, 0.2);
        }
        // back to silence, long enough to close the syllable
        for _ in 0..3 {
            feed(&mut d, 0.0, f0, 0.05);
        }
        let events = d.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "pitch-rise");
    }

    #[test]
    fn test_continuous_direction_rises_inside_syllable() {
        let mut d = direction(0.01);
        for _ in 0..20 {
            feed(&mut d, 0.0, 100.0, 0.1);
        }
        feed(&mut d, 100.0, 100.0, 0.2);
        let mut f0 = 100.0;
        let mut saw_rise = false;
        for _ in 0..30 {
            f0 *= 1.04;
            let out = feed(&mut d, f0, f0, 0.2);
            if out[0] == 1.0 {
                saw_rise = true;
                assert!(out[1] > 0.0, "score must back the direction");
            }
        }
        assert!(saw_rise, "steeply rising pitch must show dir=+1 frames");
    }

    #[test]
    fn test_flat_pitch_stays_flat() {
        let mut d = direction(0.01);
        for _ in 0..20 {
            feed(&mut d, 0.0, 150.0, 0.1);
        }
        feed(&mut d, 150.0, 150.0, 0.2);
        for _ in 0..30 {
            let out = feed(&mut d, 150.0, 150.0, 0.2);
            assert_eq!(out[0], 0.0);
        }
        assert!(d.take_events().is_empty(), "no movement event on flat pitch");
    }
}
