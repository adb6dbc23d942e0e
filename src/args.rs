use clap::Parser;

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time audio feature extraction and voice activity detection.")]
pub struct Cli {
    /// Audio file to analyze.
    #[arg(index = 1)]
    pub in_file: String,

    /// JSON pipeline configuration; defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Print the smoothed pitch contour per frame.
    #[arg(long)]
    pub pitch: bool,

    /// Print the voice activity scores per frame.
    #[arg(long)]
    pub vad: bool,

    /// Print MFCC vectors per frame.
    #[arg(long)]
    pub mfcc: bool,

    /// Print PLP cepstra per frame.
    #[arg(long)]
    pub plp: bool,

    /// Print speech and pitch movement events.
    #[arg(long)]
    pub events: bool,

    /// Print functional statistics over the pitch contour at the end.
    #[arg(long)]
    pub functionals: bool,
}

impl Cli {
    /// Whether any per-frame column was selected; with nothing chosen
    /// only the end-of-stream summary is shown.
    pub fn prints_frames(&self) -> bool {
        self.pitch || self.vad || self.mfcc || self.plp
    }
}
