//! Adaptive fuzzy voice-activity detection.
//!
//! Fuses spectral-envelope divergence (against a slowly learned LSP
//! reference), spectral entropy, and short-time log energy into a
//! fuzzy speech score, thresholded with statistics that adapt
//! separately over noise and speech regions. Speech-start and
//! speech-end events are debounced by minimum durations.

use crate::dsp;
use crate::energy::EnergyMeta;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::pitch::smoother::SmootherMeta;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

/// Frames consumed before the initial noise statistics are frozen.
const N_INIT: usize = 100;
/// Length of the fuzzy-score smoothing ring.
const FUZ_BUF: usize = 10;
/// Length of the rolling feature histories for threshold adaptation.
const FT_BUF: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Absolute log-energy floor a speech frame must exceed.
    pub threshold: f64,
    /// Seconds the binary decision must hold before a start event.
    pub minvoicedur: f64,
    /// Seconds of silence before an end event.
    pub minsilencedur: f64,
    /// Bypass all adaptation and decide on the energy floor alone.
    pub disable_dynamic_vad: bool,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: -13.0,
            minvoicedur: 0.1,
            minsilencedur: 0.3,
            disable_dynamic_vad: false,
        }
    }
}

/// Per-feature adaptive statistics: running mean/stddev plus the
/// rolling history they are re-estimated from.
#[derive(Clone)]
struct FeatStats {
    u: f64,
    v: f64,
    hist: Vec<f64>,
    idx: usize,
}

impl FeatStats {
    fn new() -> Self {
        Self {
            u: 0.0,
            v: 0.0,
            hist: vec![0.0; FT_BUF],
            idx: 0,
        }
    }

    fn push(&mut self, x: f64) {
        self.hist[self.idx] = x;
        self.idx += 1;
        if self.idx >= FT_BUF {
            self.idx = 0;
        }
    }

    fn hist_mean(&self) -> f64 {
        self.hist.iter().sum::<f64>() / FT_BUF as f64
    }

    fn hist_stddev(&self, mean: f64) -> f64 {
        let var = self
            .hist
            .iter()
            .map(|&x| (x - mean) * (x - mean))
            .sum::<f64>()
            / FT_BUF as f64;
        var.sqrt()
    }

    /// Slow exponential pull of the frozen statistics towards the
    /// current history.
    fn adapt(&mut self, ar_u: f64, ar_v: f64) {
        let m = self.hist_mean();
        let s = self.hist_stddev(m);
        self.u = (1.0 - ar_u) * self.u + ar_u * m;
        self.v = (1.0 - ar_v) * self.v + ar_v * s;
    }
}

pub struct Vad {
    config: VadConfig,
    input_dim: usize,
    lsp_offset: usize,
    n_lsp: usize,
    voicing_offset: usize,
    e_offset: usize,
    time_step: f64,

    // rise/decay constants for the asymmetric contour smoothing
    ar1: f64,
    ar0: f64,
    ar_u: f64,
    ar_v: f64,

    /// Learned LSP noise reference.
    spec: Vec<f64>,
    ent_0: f64,
    f0v_0: f64,
    e_0: f64,

    n_init: usize,
    noise_ent: FeatStats,
    noise_f0v: FeatStats,
    noise_e: FeatStats,
    n_init_t: usize,
    turn_ent: FeatStats,
    turn_f0v: FeatStats,
    turn_e: FeatStats,

    fuz_hist: Vec<f64>,
    fuz_idx: usize,
    vad_bin: bool,
    turn_sum: f64,
    turn_n: f64,

    has_voice: bool,
    ev_tstart: Option<f64>,
    ev_tstart_old: f64,
    time: f64,
    events: Vec<Event>,
}

/// Initial per-coefficient LSP reference, a flat ramp over [0.2, 3.2).
fn initial_lsp_reference(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| i as f64 * (3.0 / n as f64) + 0.2)
        .collect()
}

impl Vad {
    /// The input frame is the LSP producer's output with the pitch
    /// smoother's and the energy stage's frames appended behind it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: VadConfig,
        lsp_offset: Option<usize>,
        n_lsp: usize,
        lsp_dim: usize,
        smoother_meta: &SmootherMeta,
        smoother_dim: usize,
        energy_meta: &EnergyMeta,
        energy_dim: usize,
        time_step: f64,
    ) -> Result<Self> {
        let lsp_offset = lsp_offset.ok_or(Error::MissingField {
            stage: "vad",
            field: "lsp",
        })?;
        let voicing_offset = lsp_dim
            + smoother_meta.pos_voicing_c1.ok_or(Error::MissingField {
                stage: "vad",
                field: "voicing_c1",
            })?;
        let e_offset = lsp_dim
            + smoother_dim
            + energy_meta.pos_log.ok_or(Error::MissingField {
                stage: "vad",
                field: "log_energy",
            })?;
        if n_lsp == 0 || lsp_offset + n_lsp > lsp_dim {
            return Err(Error::BadConfig {
                stage: "vad",
                reason: format!("lsp field [{lsp_offset}; {n_lsp}] exceeds frame size {lsp_dim}"),
            });
        }
        if time_step <= 0.0 {
            return Err(Error::BadConfig {
                stage: "vad",
                reason: format!("frame period {time_step} must be positive"),
            });
        }
        let period_ms = time_step * 1000.0;
        Ok(Self {
            config,
            input_dim: lsp_dim + smoother_dim + energy_dim,
            lsp_offset,
            n_lsp,
            voicing_offset,
            e_offset,
            time_step,
            ar1: 1.0 - (-period_ms / 20.0).exp(),
            ar0: 1.0 - (-period_ms / 200.0).exp(),
            ar_u: 0.005,
            ar_v: 0.005,
            spec: initial_lsp_reference(n_lsp),
            ent_0: 0.0,
            f0v_0: 0.0,
            e_0: 0.0,
            n_init: 0,
            noise_ent: FeatStats::new(),
            noise_f0v: FeatStats::new(),
            noise_e: FeatStats::new(),
            n_init_t: 0,
            turn_ent: FeatStats::new(),
            turn_f0v: FeatStats::new(),
            turn_e: FeatStats::new(),
            fuz_hist: vec![0.0; FUZ_BUF],
            fuz_idx: 0,
            vad_bin: false,
            turn_sum: 0.0,
            turn_n: 0.0,
            has_voice: false,
            ev_tstart: None,
            ev_tstart_old: 0.0,
            time: 0.0,
            events: Vec::new(),
        })
    }

    /// Speech-start/end events queued since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Emits `name` once `condition` has held longer than `min_dur`
    /// seconds; returns whether the event fired.
    fn debounce(&mut self, condition: bool, min_dur: f64, name: &'static str) -> bool {
        if condition {
            let tstart = *self.ev_tstart.get_or_insert(self.time);
            let dur = self.time - tstart;
            if dur > min_dur {
                self.events.push(Event::new(
                    name,
                    self.time * 1000.0,
                    (self.time - self.ev_tstart_old) * 1000.0,
                ));
                self.ev_tstart_old = self.time;
                self.ev_tstart = None;
                return true;
            }
        } else {
            self.ev_tstart = None;
        }
        false
    }

    /// Entropy sub-score: low entropy relative to the noise floor
    /// indicates structured (speech) spectra, so the bands are inverse.
    fn score_ent(&self, ent: f64) -> f64 {
        let u = self.noise_ent.u;
        let v = self.noise_ent.v;
        let mut s: f64 = if ent < u - 5.0 * v {
            1.0
        } else if ent < u - 3.0 * v {
            0.8
        } else if ent < u - 2.0 * v {
            0.6
        } else if ent < u - v {
            0.4
        } else if ent < u {
            0.2
        } else {
            0.0
        };
        let tu = self.turn_ent.u;
        let tv = self.turn_ent.v;
        if tu > 0.0 && tu + tv < u - 3.0 * v {
            if ent > tu + 3.0 * tv {
                s -= 0.3;
            } else if ent > tu + tv {
                s -= 0.2;
            } else if ent < tu - 0.5 * tv {
                s = 1.0;
            }
        }
        s.max(0.0)
    }

    fn score_e(&self, e: f64) -> f64 {
        let u = self.noise_e.u;
        let v = self.noise_e.v;
        let mut s: f64 = if e < u {
            0.0
        } else if e < u + v {
            0.2
        } else if e < u + 2.0 * v {
            0.6
        } else if e < u + 4.0 * v {
            0.8
        } else {
            1.0
        };
        let tu = self.turn_e.u;
        let tv = self.turn_e.v;
        if tu > 0.0 && tu - 0.5 * tv < u + 2.0 * v {
            if e < tu - 2.0 * tv {
                s -= 0.2;
            } else if e < tu - 0.5 * tv {
                s -= 0.2;
            } else if e > tu + 0.1 * tv {
                s = 1.0;
            }
        }
        s.max(0.0)
    }

    fn score_f0v(&self, f0v: f64) -> f64 {
        let u = self.noise_f0v.u;
        let v = self.noise_f0v.v;
        let mut s: f64 = if f0v < u {
            0.0
        } else if f0v < u + v {
            0.2
        } else if f0v < u + 2.0 * v {
            0.4
        } else if f0v < u + 3.0 * v {
            0.6
        } else if f0v < u + 5.0 * v {
            0.8
        } else {
            1.0
        };
        let tu = self.turn_f0v.u;
        let tv = self.turn_f0v.v;
        if tu > 0.0 && tu - 2.0 * tv < u + 3.0 * v {
            if f0v < tu - 3.0 * tv {
                s -= 0.2;
            } else if f0v < tu - 2.0 * tv {
                s -= 0.2;
            } else if f0v > tu + 0.5 * tv {
                s = 1.0;
            }
        }
        s.max(0.0)
    }
}

impl Stage for Vad {
    fn output_dim(&self) -> usize {
        3
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        if input.len() != self.input_dim {
            return Err(Error::BadDimension {
                stage: "vad",
                got: input.len(),
                reason: "combined lsp+pitch+energy frame does not match configured size",
            });
        }
        let lsp = &input[self.lsp_offset..self.lsp_offset + self.n_lsp];
        let _voicing = input[self.voicing_offset];
        let e_raw = input[self.e_offset];

        output.clear();
        let vad_result;

        if self.config.disable_dynamic_vad {
            let active = e_raw > self.config.threshold;
            let v = if active { 1.0 } else { 0.0 };
            output.extend_from_slice(&[v, v, v]);
            vad_result = active;
        } else {
            // divergence of the frame's LSP vector from the noise reference
            let div: f64 = self
                .spec
                .iter()
                .zip(lsp)
                .map(|(&r, &x)| (r - x) * (r - x))
                .sum();
            let ent_raw = dsp::entropy(lsp);

            // asymmetric smoothing: entropy and divergence decay fast and
            // rise slowly, energy the other way around
            let ent = if ent_raw > self.ent_0 {
                self.ar0 * (ent_raw - self.ent_0) + self.ent_0
            } else {
                self.ar1 * (ent_raw - self.ent_0) + self.ent_0
            };
            let f0v = if div > self.f0v_0 {
                self.ar0 * (div - self.f0v_0) + self.f0v_0
            } else {
                self.ar1 * (div - self.f0v_0) + self.f0v_0
            };
            let e = if e_raw < self.e_0 {
                self.ar0 * (e_raw - self.e_0) + self.e_0
            } else {
                self.ar1 * (e_raw - self.e_0) + self.e_0
            };
            self.ent_0 = ent;
            self.f0v_0 = f0v;
            self.e_0 = e;

            let mut vad_fuz = 0.0;
            let mut vad_smo = 0.0;

            if self.n_init < N_INIT {
                // gather initial noise statistics, skipping the first
                // frames where the smoothers are still settling
                if self.n_init > 10 {
                    self.noise_f0v.u += f0v;
                    self.noise_ent.u += ent;
                    self.noise_e.u += e;
                    self.noise_f0v.push(f0v);
                    self.noise_ent.push(ent);
                    self.noise_e.push(e);
                }
                self.n_init += 1;
                self.vad_bin = false;
                if self.n_init == N_INIT {
                    let nn = (N_INIT - 10) as f64;
                    for st in [
                        &mut self.noise_f0v,
                        &mut self.noise_ent,
                        &mut self.noise_e,
                    ] {
                        st.u /= nn;
                        let var = st.hist[..N_INIT - 10]
                            .iter()
                            .map(|&x| (x - st.u) * (x - st.u))
                            .sum::<f64>()
                            / nn;
                        st.v = var.sqrt();
                    }
                    log::debug!(
                        "vad noise floor: ent {:.3}±{:.3}, div {:.3}±{:.3}, E {:.3}±{:.3}",
                        self.noise_ent.u,
                        self.noise_ent.v,
                        self.noise_f0v.u,
                        self.noise_f0v.v,
                        self.noise_e.u,
                        self.noise_e.v
                    );
                }
            } else {
                let vad_ent = self.score_ent(ent);
                let vad_e = self.score_e(e);
                let vad_f0v = self.score_f0v(f0v);
                vad_fuz = 0.45 * vad_ent + 0.25 * vad_e + 0.30 * vad_f0v;

                self.fuz_hist[self.fuz_idx] = vad_fuz;
                self.fuz_idx += 1;
                if self.fuz_idx >= FUZ_BUF {
                    self.fuz_idx = 0;
                }
                vad_smo = self.fuz_hist.iter().sum::<f64>() / FUZ_BUF as f64;

                if vad_smo > 0.50 && e > self.config.threshold {
                    if !self.vad_bin {
                        self.turn_sum = 0.0;
                        self.turn_n = 0.0;
                    }
                    self.vad_bin = true;
                    self.turn_sum += vad_smo;
                    self.turn_n += 1.0;
                } else {
                    if self.vad_bin && self.turn_n > 0.0 {
                        log::debug!("turn ended, confidence {:.2}", self.turn_sum / self.turn_n);
                    }
                    self.vad_bin = false;
                }

                if !self.vad_bin && vad_fuz < 0.5 {
                    // noise region: adapt thresholds and the LSP reference
                    self.noise_f0v.push(f0v);
                    self.noise_ent.push(ent);
                    self.noise_e.push(e);
                    if self.n_init < FT_BUF {
                        self.n_init += 1;
                    } else {
                        self.noise_ent.adapt(self.ar_u, self.ar_v);
                        self.noise_f0v.adapt(self.ar_u, self.ar_v);
                        self.noise_e.adapt(self.ar_u, self.ar_v);
                    }
                    for (r, &x) in self.spec.iter_mut().zip(lsp) {
                        *r = 0.995 * *r + 0.005 * x;
                    }
                } else if vad_fuz > 0.6 && self.vad_bin && self.turn_n > 20.0 {
                    // stable speech region: adapt the turn statistics
                    self.turn_f0v.push(f0v);
                    self.turn_ent.push(ent);
                    self.turn_e.push(e);
                    if self.n_init_t < FT_BUF {
                        self.n_init_t += 1;
                    } else {
                        self.turn_ent.adapt(self.ar_u, self.ar_v);
                        self.turn_f0v.adapt(self.ar_u, self.ar_v);
                        self.turn_e.adapt(self.ar_u, self.ar_v);
                    }
                }
            }

            output.push(if self.vad_bin { 1.0 } else { 0.0 });
            output.push(vad_fuz);
            output.push(vad_smo);
            vad_result = self.vad_bin;
        }

        if !self.has_voice {
            self.has_voice = self.debounce(vad_result, self.config.minvoicedur, "speech-start");
        } else {
            self.has_voice = !self.debounce(!vad_result, self.config.minsilencedur, "speech-end");
        }
        self.time += self.time_step;
        Ok(())
    }

    fn reset(&mut self) {
        self.spec = initial_lsp_reference(self.n_lsp);
        self.ent_0 = 0.0;
        self.f0v_0 = 0.0;
        self.e_0 = 0.0;
        self.n_init = 0;
        self.noise_ent = FeatStats::new();
        self.noise_f0v = FeatStats::new();
        self.noise_e = FeatStats::new();
        self.n_init_t = 0;
        self.turn_ent = FeatStats::new();
        self.turn_f0v = FeatStats::new();
        self.turn_e = FeatStats::new();
        self.fuz_hist.fill(0.0);
        self.fuz_idx = 0;
        self.vad_bin = false;
        self.turn_sum = 0.0;
        self.turn_n = 0.0;
        self.has_voice = false;
        self.ev_tstart = None;
        self.ev_tstart_old = 0.0;
        self.time = 0.0;
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSP_DIM: usize = 8;

    fn smoother_meta() -> SmootherMeta {
        SmootherMeta {
            voicing_cutoff: 0.7,
            pos_f0_final: Some(0),
            pos_f0_final_env: None,
            pos_voicing_final_clipped: None,
            pos_voicing_final_unclipped: None,
            pos_voicing_c1: Some(1),
            pos_f0raw: None,
            pos_voicing_clip: None,
        }
    }

    fn energy_meta() -> EnergyMeta {
        EnergyMeta {
            pos_rms: Some(0),
            pos_log: Some(1),
        }
    }

    fn vad(config: VadConfig) -> Vad {
        Vad::new(
            config,
            Some(0),
            LSP_DIM,
            LSP_DIM,
            &smoother_meta(),
            2,
            &energy_meta(),
            2,
            0.01,
        )
        .unwrap()
    }

    fn feed(v: &mut Vad, lsp: &[f64], voicing: f64, log_e: f64) -> Vec<f64> {
        let mut frame = lsp.to_vec();
        frame.extend_from_slice(&[0.0, voicing, 0.0, log_e]);
        let mut out = Vec::new();
        v.process_frame(&frame, &mut out).unwrap();
        out
    }

    #[test]
    fn test_missing_lsp_rejected() {
        let r = Vad::new(
            VadConfig::default(),
            None,
            LSP_DIM,
            LSP_DIM,
            &smoother_meta(),
            2,
            &energy_meta(),
            2,
            0.01,
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_energy_only_mode() {
        let cfg = VadConfig {
            disable_dynamic_vad: true,
            threshold: -13.0,
            ..VadConfig::default()
        };
        let mut v = vad(cfg);
        let lsp = initial_lsp_reference(LSP_DIM);
        assert_eq!(feed(&mut v, &lsp, 0.0, -20.0), vec![0.0, 0.0, 0.0]);
        assert_eq!(feed(&mut v, &lsp, 0.9, -2.0), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_event_debounce() {
        // minvoicedur 0.1 s at 10 ms frames: 10 active frames are not
        // enough (duration just reaches 0.09 s), a few more are
        let cfg = VadConfig {
            disable_dynamic_vad: true,
            threshold: 0.0,
            minvoicedur: 0.1,
            minsilencedur: 0.05,
            ..VadConfig::default()
        };
        let mut v = vad(cfg);
        let lsp = initial_lsp_reference(LSP_DIM);
        for _ in 0..10 {
            feed(&mut v, &lsp, 0.9, 1.0);
        }
        assert!(v.take_events().is_empty(), "too short for a start event");
        for _ in 0..3 {
            feed(&mut v, &lsp, 0.9, 1.0);
        }
        let ev = v.take_events();
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].name, "speech-start");
        // drop to silence long enough for the end event
        for _ in 0..8 {
            feed(&mut v, &lsp, 0.0, -1.0);
        }
        let ev = v.take_events();
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].name, "speech-end");
    }

    #[test]
    fn test_adaptive_detection_after_init() {
        let mut v = vad(VadConfig {
            threshold: -30.0,
            ..VadConfig::default()
        });
        let noise_lsp = initial_lsp_reference(LSP_DIM);
        // noise floor: LSP equal to the reference, quiet energy
        for _ in 0..N_INIT {
            let out = feed(&mut v, &noise_lsp, 0.0, 1.0);
            assert_eq!(out[0], 0.0, "init phase must not report speech");
        }
        // more noise after init: still silent
        for _ in 0..20 {
            let out = feed(&mut v, &noise_lsp, 0.0, 1.0);
            assert_eq!(out[0], 0.0);
        }
        // speech: divergent, low-entropy spectrum at high energy
        let mut speech_lsp = vec![1e-4; LSP_DIM];
        speech_lsp[0] = 2.5;
        let mut active = false;
        for _ in 0..15 {
            let out = feed(&mut v, &speech_lsp, 0.9, 10.0);
            assert!((0.0..=1.0).contains(&out[2]));
            if out[0] == 1.0 {
                active = true;
            }
        }
        assert!(active, "clear speech must switch the binary decision on");
    }
}
