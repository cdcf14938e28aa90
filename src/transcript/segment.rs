use serde::{Deserialize, Serialize};

/// A timestamped run of text, produced by subtitle parsing or speech
/// recognition. Times are seconds from the start of the media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Text content (may be empty)
    pub text: String,
}

impl Segment {
    /// Seconds covered by the segment
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A merged run of segments displayed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptBlock {
    /// Start of the first merged segment in seconds
    pub start: f64,
    /// End of the last merged segment in seconds
    pub end: f64,
    /// Joined text of all merged segments
    pub text: String,
}
