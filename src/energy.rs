//! Short-time frame energy. Feeds the pitch-direction stage (RMS) and
//! the voice-activity detector (log energy).

use crate::error::Result;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

const LOG_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub rms: bool,
    pub log: bool,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self { rms: true, log: true }
    }
}

/// Field positions within the energy output frame.
#[derive(Debug, Clone, Copy)]
pub struct EnergyMeta {
    pub pos_rms: Option<usize>,
    pub pos_log: Option<usize>,
}

pub struct Energy {
    config: EnergyConfig,
    meta: EnergyMeta,
}

impl Energy {
    pub fn new(config: EnergyConfig) -> Self {
        let mut n = 0;
        let pos_rms = config.rms.then(|| {
            let p = n;
            n += 1;
            p
        });
        let pos_log = config.log.then_some(n);
        Self {
            config,
            meta: EnergyMeta { pos_rms, pos_log },
        }
    }

    pub fn meta(&self) -> EnergyMeta {
        self.meta
    }
}

impl Stage for Energy {
    fn output_dim(&self) -> usize {
        self.config.rms as usize + self.config.log as usize
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        output.clear();
        let n = input.len().max(1) as f64;
        let e: f64 = input.iter().map(|&x| x * x).sum::<f64>() / n;
        if self.config.rms {
            output.push(e.sqrt());
        }
        if self.config.log {
            output.push(e.max(LOG_FLOOR).ln());
        }
        Ok(())
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_and_log() {
        let mut e = Energy::new(EnergyConfig::default());
        let mut out = Vec::new();
        e.process_frame(&[1.0, -1.0, 1.0, -1.0], &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert!((out[0] - 1.0).abs() < 1e-12);
        assert!(out[1].abs() < 1e-12);
    }

    #[test]
    fn test_silence_is_floored() {
        let mut e = Energy::new(EnergyConfig { rms: false, log: true });
        let mut out = Vec::new();
        e.process_frame(&[0.0; 8], &mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[0] - LOG_FLOOR.ln()).abs() < 1e-12);
        assert_eq!(e.meta().pos_log, Some(0));
        assert_eq!(e.meta().pos_rms, None);
    }
}
