//! Canonical wiring of the analysis stages.
//!
//! One `Pipeline` owns every stage and drives them frame by frame from
//! raw mono samples: framer -> window -> FFT -> magnitude, then three
//! branches off the magnitude spectrum (octave scale -> SHS pitch ->
//! smoother -> direction, mel bank -> MFCC and PLP, mel bank -> LPC ->
//! LSP -> voice activity) plus the frame energy both event stages
//! consume.

use crate::cepstral::{Lpc, LpcConfig, Melspec, MelspecConfig, Mfcc, MfccConfig, Plp, PlpConfig};
use crate::energy::{Energy, EnergyConfig};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::pitch::{
    PitchBaseConfig, PitchDirection, PitchDirectionConfig, PitchShs, PitchSmoother,
    PitchSmootherConfig, PitchStage, ShsConfig,
};
use crate::spectral::{
    FftConfig, Magphase, MagphaseConfig, ScaleConfig, SpecScaler, SpectScale, TransformFft,
};
use crate::stage::Stage;
use crate::vad::{Vad, VadConfig};
use crate::window::{WindowConfig, WindowType, Windower};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Analysis frame length in seconds.
    pub frame_size: f64,
    /// Hop between frames in seconds.
    pub frame_step: f64,
    pub window: WindowConfig,
    pub fft: FftConfig,
    pub magphase: MagphaseConfig,
    pub scale: ScaleConfig,
    pub energy: EnergyConfig,
    pub pitch: PitchBaseConfig,
    pub shs: ShsConfig,
    pub smoother: PitchSmootherConfig,
    pub direction: PitchDirectionConfig,
    pub melspec: MelspecConfig,
    pub mfcc: MfccConfig,
    pub plp: PlpConfig,
    pub lpc: LpcConfig,
    pub vad: VadConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_size: 0.025,
            frame_step: 0.010,
            window: WindowConfig {
                win_type: WindowType::Gauss,
                sigma: 0.4,
                ..WindowConfig::default()
            },
            fft: FftConfig::default(),
            magphase: MagphaseConfig::default(),
            scale: ScaleConfig {
                scale: SpectScale::Log,
                log_scale_base: 2.0,
                min_f: 20.0,
                max_f: 8000.0,
                spec_enhance: true,
                spec_smooth: true,
                auditory_weighting: true,
                ..ScaleConfig::default()
            },
            energy: EnergyConfig::default(),
            pitch: PitchBaseConfig {
                min_pitch: 42.0,
                max_pitch: 620.0,
                n_candidates: 6,
                voicing_cutoff: 0.7,
                voicing_c1: true,
                ..PitchBaseConfig::default()
            },
            shs: ShsConfig::default(),
            smoother: PitchSmootherConfig {
                f0_final: true,
                f0_final_env: true,
                voicing_c1: true,
                ..PitchSmootherConfig::default()
            },
            direction: PitchDirectionConfig::default(),
            melspec: MelspecConfig::default(),
            mfcc: MfccConfig::default(),
            plp: PlpConfig::default(),
            lpc: LpcConfig {
                p: 8,
                save_lp_coeff: true,
                lsp: true,
                ..LpcConfig::default()
            },
            vad: VadConfig::default(),
        }
    }
}

/// Everything the pipeline computed for one analysis frame.
#[derive(Debug, Clone, Default)]
pub struct FrameFeatures {
    /// Frame start time in seconds.
    pub time: f64,
    pub energy: Vec<f64>,
    /// Smoothed pitch frame; field layout per `Pipeline::pitch_meta`.
    pub pitch: Vec<f64>,
    pub direction: Vec<f64>,
    pub mfcc: Vec<f64>,
    pub plp: Vec<f64>,
    /// `[binary, fuzzy, smoothed]` voice activity scores.
    pub vad: Vec<f64>,
    /// Speech and pitch movement events that fired on this frame.
    pub events: Vec<Event>,
}

pub struct Pipeline {
    frame_len: usize,
    hop: usize,
    sample_rate: u32,
    frame_idx: u64,
    buf: Vec<f64>,

    windower: Windower,
    fft: TransformFft,
    magphase: Magphase,
    scaler: SpecScaler,
    energy: Energy,
    pitch: PitchStage<PitchShs>,
    smoother: PitchSmoother,
    direction: PitchDirection,
    melspec: Melspec,
    mfcc: Mfcc,
    plp: Plp,
    lpc: Lpc,
    vad: Vad,

    // per-frame scratch
    windowed: Vec<f64>,
    spectrum: Vec<f64>,
    mag: Vec<f64>,
    warped: Vec<f64>,
    pitch_frame: Vec<f64>,
    bands: Vec<f64>,
    lpc_frame: Vec<f64>,
    joined: Vec<f64>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::BadConfig {
                stage: "pipeline",
                reason: "sample rate must be positive".into(),
            });
        }
        let sr = sample_rate as f64;
        let frame_len = (config.frame_size * sr).round() as usize;
        let hop = (config.frame_step * sr).round() as usize;
        if frame_len < 4 || hop == 0 {
            return Err(Error::BadConfig {
                stage: "pipeline",
                reason: format!(
                    "frame of {frame_len} samples with hop {hop} is too short at {sample_rate} Hz"
                ),
            });
        }
        let step = hop as f64 / sr;

        let mut fft_config = config.fft.clone();
        if fft_config.fft_size == 0 {
            fft_config.fft_size = frame_len;
        }
        let fft = TransformFft::new(fft_config);
        let nfft = fft.fft_size();
        // bin spacing of the padded spectrum
        let fs_sec = nfft as f64 / sr;

        let magphase = Magphase::new(config.magphase, nfft)?;
        let n_mag = magphase.output_dim();

        let scaler = SpecScaler::new(config.scale, n_mag, fs_sec)?;
        let detector = PitchShs::new(config.shs, scaler.meta(), scaler.output_dim())?;
        let pitch = PitchStage::new(config.pitch, detector, scaler.output_dim())?;
        let smoother = PitchSmoother::new(config.smoother, pitch.meta(), pitch.output_dim())?;
        let energy = Energy::new(config.energy);
        let direction = PitchDirection::new(
            config.direction,
            smoother.meta(),
            &energy.meta(),
            smoother.output_dim(),
            energy.output_dim(),
            step,
        )?;

        let melspec = Melspec::new(config.melspec, n_mag, fs_sec)?;
        let n_bands = melspec.output_dim();
        let mfcc = Mfcc::new(config.mfcc, n_bands)?;
        let plp = Plp::new(config.plp, n_bands)?;
        // LSPs of the band envelope feed the voice activity detector
        let lpc = Lpc::new(config.lpc, n_bands)?;
        let vad = Vad::new(
            config.vad,
            lpc.lsp_offset(),
            lpc.order(),
            lpc.output_dim(),
            smoother.meta(),
            smoother.output_dim(),
            &energy.meta(),
            energy.output_dim(),
            step,
        )?;

        Ok(Self {
            frame_len,
            hop,
            sample_rate,
            frame_idx: 0,
            buf: Vec::new(),
            windower: Windower::new(config.window),
            fft,
            magphase,
            scaler,
            energy,
            pitch,
            smoother,
            direction,
            melspec,
            mfcc,
            plp,
            lpc,
            vad,
            windowed: Vec::new(),
            spectrum: Vec::new(),
            mag: Vec::new(),
            warped: Vec::new(),
            pitch_frame: Vec::new(),
            bands: Vec::new(),
            lpc_frame: Vec::new(),
            joined: Vec::new(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Frame hop in seconds.
    pub fn frame_step(&self) -> f64 {
        self.hop as f64 / self.sample_rate as f64
    }

    /// Field positions within `FrameFeatures::pitch`.
    pub fn pitch_meta(&self) -> &crate::pitch::smoother::SmootherMeta {
        self.smoother.meta()
    }

    /// Final smoothed F0 of a processed frame, 0 when unvoiced.
    pub fn f0_of(&self, frame: &FrameFeatures) -> f64 {
        self.smoother
            .meta()
            .pos_f0_final
            .and_then(|p| frame.pitch.get(p))
            .copied()
            .unwrap_or(0.0)
    }

    /// Feeds raw mono samples and returns the features of every frame
    /// that completed. Remaining samples are buffered for the next
    /// call; a trailing partial frame is dropped at end of stream.
    pub fn feed(&mut self, samples: &[f64]) -> Result<Vec<FrameFeatures>> {
        self.buf.extend_from_slice(samples);
        let mut frames = Vec::new();
        let mut start = 0;
        while start + self.frame_len <= self.buf.len() {
            let frame: Vec<f64> = self.buf[start..start + self.frame_len].to_vec();
            frames.push(self.process_frame(&frame)?);
            start += self.hop;
        }
        self.buf.drain(..start);
        Ok(frames)
    }

    fn process_frame(&mut self, frame: &[f64]) -> Result<FrameFeatures> {
        let mut out = FrameFeatures {
            time: self.frame_idx as f64 * self.frame_step(),
            ..FrameFeatures::default()
        };
        self.frame_idx += 1;

        self.energy.process_frame(frame, &mut out.energy)?;

        self.windower.process_frame(frame, &mut self.windowed)?;
        self.fft.process_frame(&self.windowed, &mut self.spectrum)?;
        self.magphase.process_frame(&self.spectrum, &mut self.mag)?;

        // pitch branch
        self.scaler.process_frame(&self.mag, &mut self.warped)?;
        self.pitch.process_frame(&self.warped, &mut self.pitch_frame)?;
        self.smoother.process_frame(&self.pitch_frame, &mut out.pitch)?;
        self.joined.clear();
        self.joined.extend_from_slice(&out.pitch);
        self.joined.extend_from_slice(&out.energy);
        self.direction.process_frame(&self.joined, &mut out.direction)?;
        out.events.extend(self.direction.take_events());

        // cepstral branch
        self.melspec.process_frame(&self.mag, &mut self.bands)?;
        self.mfcc.process_frame(&self.bands, &mut out.mfcc)?;
        self.plp.process_frame(&self.bands, &mut out.plp)?;

        // voice activity branch
        self.lpc.process_frame(&self.bands, &mut self.lpc_frame)?;
        self.joined.clear();
        self.joined.extend_from_slice(&self.lpc_frame);
        self.joined.extend_from_slice(&out.pitch);
        self.joined.extend_from_slice(&out.energy);
        self.vad.process_frame(&self.joined, &mut out.vad)?;
        out.events.extend(self.vad.take_events());

        Ok(out)
    }

    /// Drops all stream state, keeping the configuration.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.frame_idx = 0;
        self.windower.reset();
        self.fft.reset();
        self.magphase.reset();
        self.scaler.reset();
        self.energy.reset();
        self.pitch.reset();
        self.smoother.reset();
        self.direction.reset();
        self.melspec.reset();
        self.mfcc.reset();
        self.plp.reset();
        self.lpc.reset();
        self.vad.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, sr: u32, seconds: f64) -> Vec<f64> {
        let n = (sr as f64 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sr as f64).sin())
            .collect()
    }

    #[test]
    fn test_pipeline_tracks_220_hz_sine() {
        let config = PipelineConfig {
            fft: FftConfig { fft_size: 1024 },
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::new(config, 16000).unwrap();
        let frames = pipeline.feed(&sine(220.0, 16000, 1.0)).unwrap();
        assert!(frames.len() > 90);
        for (i, frame) in frames.iter().enumerate().skip(3) {
            let f0 = pipeline.f0_of(frame);
            assert!(
                (f0 - 220.0).abs() <= 2.0,
                "frame {i}: pitch {f0} strayed from 220 Hz"
            );
        }
    }

    #[test]
    fn test_frame_output_dimensions() {
        let mut pipeline = Pipeline::new(PipelineConfig::default(), 16000).unwrap();
        let frames = pipeline.feed(&sine(150.0, 16000, 0.2)).unwrap();
        assert!(!frames.is_empty());
        let f = &frames[0];
        assert_eq!(f.energy.len(), 2);
        assert_eq!(f.vad.len(), 3);
        assert_eq!(f.mfcc.len(), 12);
        assert_eq!(f.plp.len(), 13);
        assert!(!f.pitch.is_empty());
        assert!(f.direction.len() >= 2);
        assert!(f
            .mfcc
            .iter()
            .chain(&f.plp)
            .chain(&f.vad)
            .all(|v| v.is_finite()));
    }

    #[test]
    fn test_streaming_matches_batch() {
        let signal = sine(180.0, 16000, 0.5);
        let mut batch = Pipeline::new(PipelineConfig::default(), 16000).unwrap();
        let batch_frames = batch.feed(&signal).unwrap();

        let mut streamed = Pipeline::new(PipelineConfig::default(), 16000).unwrap();
        let mut stream_frames = Vec::new();
        for chunk in signal.chunks(160) {
            stream_frames.extend(streamed.feed(chunk).unwrap());
        }
        assert_eq!(batch_frames.len(), stream_frames.len());
        for (a, b) in batch_frames.iter().zip(&stream_frames) {
            assert_eq!(a.pitch, b.pitch);
            assert_eq!(a.vad, b.vad);
        }
    }

    #[test]
    fn test_silence_has_no_pitch() {
        let mut pipeline = Pipeline::new(PipelineConfig::default(), 16000).unwrap();
        let frames = pipeline.feed(&vec![0.0; 16000]).unwrap();
        for frame in &frames {
            assert_eq!(pipeline.f0_of(frame), 0.0);
        }
    }

    #[test]
    fn test_reset_restarts_stream() {
        let signal = sine(220.0, 16000, 0.3);
        let mut pipeline = Pipeline::new(PipelineConfig::default(), 16000).unwrap();
        let first = pipeline.feed(&signal).unwrap();
        pipeline.reset();
        let second = pipeline.feed(&signal).unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].pitch, second[0].pitch);
    }
}
