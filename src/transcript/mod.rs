//! Transcript data model: segments, block merging, Markdown rendering.

pub mod format;
pub mod merge;
pub mod segment;

pub use format::{TranscriptMeta, render_transcript, supported_languages};
pub use merge::merge_segments;
pub use segment::{Segment, TranscriptBlock};
