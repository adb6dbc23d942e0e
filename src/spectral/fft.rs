//! Real FFT of a windowed frame into packed half-complex coefficients.
//!
//! Output layout (length = FFT size N): `[DC, Nyquist, re1, im1, re2,
//! im2, ...]`, the packing the magnitude/phase stage consumes.

use crate::dsp::{ceil_to_next_pow2, is_power_of_2};
use crate::error::Result;
use crate::stage::Stage;
use log::warn;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FftConfig {
    /// Requested FFT length; 0 derives it from the first frame. Rounded
    /// up to the next power of two, minimum 4.
    pub fft_size: usize,
}

impl Default for FftConfig {
    fn default() -> Self {
        Self { fft_size: 0 }
    }
}

pub struct TransformFft {
    fft_size: usize,
    planner: Mutex<FftPlanner<f64>>,
    buffer: Vec<Complex<f64>>,
    warned_truncate: bool,
}

impl TransformFft {
    pub fn new(config: FftConfig) -> Self {
        let fft_size = if config.fft_size == 0 {
            0
        } else {
            if !is_power_of_2(config.fft_size) {
                log::debug!(
                    "fft_size {} is not a power of two, rounding up",
                    config.fft_size
                );
            }
            ceil_to_next_pow2(config.fft_size)
        };
        Self {
            fft_size,
            planner: Mutex::new(FftPlanner::new()),
            buffer: Vec::new(),
            warned_truncate: false,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

impl Stage for TransformFft {
    fn output_dim(&self) -> usize {
        self.fft_size
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        if self.fft_size == 0 {
            self.fft_size = ceil_to_next_pow2(input.len());
        }
        let n = self.fft_size;
        if input.len() > n && !self.warned_truncate {
            warn!(
                "FFT size {} smaller than frame length {}, dropping excess samples",
                n,
                input.len()
            );
            self.warned_truncate = true;
        }

        self.buffer.clear();
        self.buffer
            .extend(input.iter().take(n).map(|&x| Complex::new(x, 0.0)));
        self.buffer.resize(n, Complex::new(0.0, 0.0));

        let fft = self.planner.lock().unwrap().plan_fft_forward(n);
        fft.process(&mut self.buffer);

        output.clear();
        output.push(self.buffer[0].re);
        output.push(self.buffer[n / 2].re);
        for k in 1..n / 2 {
            output.push(self.buffer[k].re);
            output.push(self.buffer[k].im);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.warned_truncate = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_rounding() {
        let t = TransformFft::new(FftConfig { fft_size: 400 });
        assert_eq!(t.fft_size(), 512);
        let t = TransformFft::new(FftConfig { fft_size: 3 });
        assert_eq!(t.fft_size(), 4);
    }

    #[test]
    fn test_dc_and_single_tone() {
        // constant signal: all energy in the DC slot
        let mut t = TransformFft::new(FftConfig { fft_size: 16 });
        let mut out = Vec::new();
        t.process_frame(&[1.0; 16], &mut out).unwrap();
        assert_eq!(out.len(), 16);
        assert!((out[0] - 16.0).abs() < 1e-9);
        for v in &out[1..] {
            assert!(v.abs() < 1e-9);
        }

        // cosine at bin 2: energy in the (re, im) pair of bin 2
        let n = 16;
        let sig: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 2.0 * i as f64 / n as f64).cos())
            .collect();
        t.process_frame(&sig, &mut out).unwrap();
        let re2 = out[2 + 2 * 1]; // pair index 2 -> slots [4], [5]
        assert!((re2 - 8.0).abs() < 1e-9, "re2 = {}", re2);
    }

    #[test]
    fn test_zero_padding() {
        let mut t = TransformFft::new(FftConfig { fft_size: 32 });
        let mut out = Vec::new();
        t.process_frame(&[1.0; 10], &mut out).unwrap();
        assert_eq!(out.len(), 32);
        assert!((out[0] - 10.0).abs() < 1e-9);
    }
}
