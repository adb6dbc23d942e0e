//! Filterbank energies and the cepstral stages built on them.

pub mod lpc;
pub mod melspec;
pub mod mfcc;
pub mod plp;

pub use lpc::{Lpc, LpcConfig, LpcMethod};
pub use melspec::{BandwidthMethod, Melspec, MelspecConfig};
pub use mfcc::{Mfcc, MfccConfig};
pub use plp::{Plp, PlpConfig};
