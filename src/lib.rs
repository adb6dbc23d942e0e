pub mod args;
pub mod audio;
pub mod cepstral;
pub mod config;
pub mod dsp;
pub mod energy;
pub mod error;
pub mod event;
pub mod functionals;
pub mod pipeline;
pub mod pitch;
pub mod spectral;
pub mod stage;
pub mod vad;
pub mod window;

pub use config::CadenceConfig;
pub use error::{Error, Result};
pub use event::Event;
pub use functionals::{Functionals, FunctionalsConfig};
pub use pipeline::{FrameFeatures, Pipeline, PipelineConfig};
pub use stage::Stage;
