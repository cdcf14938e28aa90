//! Subtitle handling: track selection and cue parsing.

pub mod parser;
pub mod select;

pub use parser::{SubtitleFormat, parse, parse_timestamp};
pub use select::{
    ChosenTrack, SubtitleCatalog, SubtitleTrack, TrackOrigin, TrackPayload, choose_best_subtitle,
};
