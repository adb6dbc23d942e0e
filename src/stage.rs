use crate::error::Result;

/// A synchronous per-frame processing stage.
///
/// Every stage is a pure state machine: `process_frame` must be called
/// strictly sequentially for one instance, and instances are never shared
/// between streams. Scheduling, buffering, and threads belong to the
/// embedder.
pub trait Stage {
    /// Dimension of the output frame for a given input dimension.
    fn output_dim(&self) -> usize;

    /// Process one input frame into one output frame.
    /// `output` is cleared and filled to `output_dim()` values.
    fn process_frame(&mut self, input: &[f64], output: &mut Vec<f64>) -> Result<()>;

    /// Drop all state accumulated since stream start.
    fn reset(&mut self);

    /// Called once after the last frame. Most stages have nothing to emit.
    fn flush(&mut self, _output: &mut Vec<f64>) -> Result<()> {
        Ok(())
    }
}
