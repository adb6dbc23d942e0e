//! Spectral front end: FFT, magnitude/phase, frequency-axis warping.

pub mod fft;
pub mod magphase;
pub mod scale;

pub use fft::{FftConfig, TransformFft};
pub use magphase::{Magphase, MagphaseConfig};
pub use scale::{ScaleConfig, ScaleMeta, SpecScaler, SpectScale};
