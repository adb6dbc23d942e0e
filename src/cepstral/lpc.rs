//! Linear prediction coefficients, reflection coefficients and line
//! spectral pairs from a windowed time-domain frame.

use crate::dsp;
use crate::error::{Error, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

const LSP_DELTA1: f64 = 0.2;
const LSP_DELTA2: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LpcMethod {
    Acf,
    Burg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LpcConfig {
    pub method: LpcMethod,
    /// Predictor order.
    pub p: usize,
    pub save_lp_coeff: bool,
    pub save_ref_coeff: bool,
    pub lp_gain: bool,
    pub lsp: bool,
}

impl Default for LpcConfig {
    fn default() -> Self {
        Self {
            method: LpcMethod::Acf,
            p: 8,
            save_lp_coeff: true,
            save_ref_coeff: false,
            lp_gain: false,
            lsp: false,
        }
    }
}

pub struct Lpc {
    config: LpcConfig,
    frame_len: usize,
    acf: Vec<f64>,
    lp_coeff: Vec<f64>,
    ref_coeff: Vec<f64>,
}

impl Lpc {
    pub fn new(config: LpcConfig, frame_len: usize) -> Result<Self> {
        if config.p < 1 {
            return Err(Error::BadConfig {
                stage: "lpc",
                reason: "predictor order must be at least 1".into(),
            });
        }
        if frame_len <= config.p {
            return Err(Error::BadDimension {
                stage: "lpc",
                got: frame_len,
                reason: "frame must be longer than the predictor order",
            });
        }
        if config.lsp && !config.save_lp_coeff {
            return Err(Error::BadConfig {
                stage: "lpc",
                reason: "lsp output needs save_lp_coeff".into(),
            });
        }
        if config.save_ref_coeff && config.method == LpcMethod::Burg {
            return Err(Error::BadConfig {
                stage: "lpc",
                reason: "reflection coefficients are only available with the acf method".into(),
            });
        }
        Ok(Self {
            acf: vec![0.0; config.p + 1],
            lp_coeff: vec![0.0; config.p],
            ref_coeff: vec![0.0; config.p],
            config,
            frame_len,
        })
    }

    /// Predictor order, which is also the LSP count.
    pub fn order(&self) -> usize {
        self.config.p
    }

    /// Offset of the LSP block in the output vector, if enabled.
    pub fn lsp_offset(&self) -> Option<usize> {
        if !self.config.lsp {
            return None;
        }
        let mut off = 0;
        if self.config.save_lp_coeff {
            off += self.config.p;
        }
        if self.config.save_ref_coeff {
            off += self.config.p;
        }
        Some(off)
    }

    fn calc(&mut self, frame: &[f64]) -> f64 {
        match self.config.method {
            LpcMethod::Acf => {
                dsp::auto_corr(frame, &mut self.acf);
                dsp::calc_lpc_acf(
                    &self.acf,
                    &mut self.lp_coeff,
                    if self.config.save_ref_coeff {
                        Some(&mut self.ref_coeff)
                    } else {
                        None
                    },
                )
            }
            LpcMethod::Burg => dsp::calc_lpc_burg(frame, &mut self.lp_coeff),
        }
    }
}

impl Stage for Lpc {
    fn output_dim(&self) -> usize {
        let c = &self.config;
        let mut n = 0;
        if c.save_lp_coeff {
            n += c.p;
        }
        if c.save_ref_coeff {
            n += c.p;
        }
        if c.lp_gain {
            n += 1;
        }
        if c.lsp {
            n += c.p;
        }
        n
    }

    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()> {
        if input.len() != self.frame_len {
            return Err(Error::BadDimension {
                stage: "lpc",
                got: input.len(),
                reason: "frame does not match configured length",
            });
        }
        let gain = self.calc(input);
        output.clear();
        if self.config.save_lp_coeff {
            output.extend_from_slice(&self.lp_coeff);
        }
        if self.config.save_ref_coeff {
            output.extend_from_slice(&self.ref_coeff);
        }
        if self.config.lsp {
            let p = self.config.p;
            let start = output.len();
            output.resize(start + p, 0.0);
            let dst = &mut output[start..start + p];
            let mut roots = lpc_to_lsp(&self.lp_coeff, dst, 10, LSP_DELTA1);
            if roots != p {
                roots = lpc_to_lsp(&self.lp_coeff, dst, 10, LSP_DELTA2);
                if roots != p {
                    for v in dst.iter_mut().skip(roots) {
                        *v = 0.0;
                    }
                }
            }
        }
        if self.config.lp_gain {
            output.push(gain);
        }
        Ok(())
    }

    fn reset(&mut self) {}
}

/// Evaluates the Chebyshev series of `coef` at `x` by the Clenshaw
/// recurrence.
fn cheb_poly_eva(coef: &[f64], x: f64, m: usize) -> f64 {
    let mut b0 = 0.0f64;
    let mut b1 = 0.0f64;
    let x = x * 2.0;
    for k in (1..=m).rev() {
        let tmp = b0;
        b0 = x * b0 - b1 + coef[m - k];
        b1 = tmp;
    }
    -b1 + 0.5 * x * b0 + coef[m]
}

/// Converts LPC coefficients to LSP frequencies (in radians) by
/// locating the roots of the sum and difference polynomials on the
/// unit circle with a grid search plus `nb` bisection steps. Returns
/// the number of roots found.
fn lpc_to_lsp(a: &[f64], freq: &mut [f64], nb: usize, delta: f64) -> usize {
    let lpcrdr = a.len();
    let m = lpcrdr / 2;

    let mut p = vec![0.0f64; m + 1];
    let mut q = vec![0.0f64; m + 1];
    p[0] = 1.0;
    q[0] = 1.0;
    for i in 0..m {
        p[i + 1] = (a[i] + a[lpcrdr - 1 - i]) - p[i];
        q[i + 1] = (a[i] - a[lpcrdr - 1 - i]) + q[i];
    }
    for i in 0..m {
        p[i] *= 2.0;
        q[i] *= 2.0;
    }

    let mut roots = 0usize;
    let mut xr = 0.0f64;
    let mut xl = 1.0f64;

    for j in 0..lpcrdr {
        let pt: &[f64] = if j & 1 == 1 { &q } else { &p };
        let mut psuml = cheb_poly_eva(pt, xl, m);
        let mut flag = true;
        while flag && xr >= -1.0 {
            let mut dd = delta * (1.0 - 0.9 * xl * xl);
            if psuml.abs() < 0.2 {
                dd *= 0.5;
            }
            xr = xl - dd;
            let psumr = cheb_poly_eva(pt, xr, m);
            let temp_psumr = psumr;
            let temp_xr = xr;

            if psumr * psuml < 0.0 {
                roots += 1;
                let mut xm = 0.0;
                for _ in 0..=nb {
                    xm = 0.5 * (xl + xr);
                    let psumm = cheb_poly_eva(pt, xm, m);
                    if psumm * psuml >= 0.0 {
                        psuml = psumm;
                        xl = xm;
                    } else {
                        xr = xm;
                    }
                }
                let xm = xm.clamp(-1.0, 1.0);
                freq[j] = xm.acos();
                xl = xm;
                flag = false;
            } else {
                psuml = temp_psumr;
                xl = temp_xr;
            }
        }
    }
    roots
}
