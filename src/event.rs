/// A discrete, timestamped notification raised by the VAD or the
/// pitch-direction stage. The embedder drains these from the owning
/// stage after each processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: &'static str,
    /// Start time of the condition, in milliseconds of stream time.
    pub time_ms: f64,
    /// Duration covered by the event, in milliseconds.
    pub duration_ms: f64,
}

impl Event {
    pub fn new(name: &'static str, time_ms: f64, duration_ms: f64) -> Self {
        Self {
            name,
            time_ms,
            duration_ms,
        }
    }
}
