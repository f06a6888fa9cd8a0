mod microphone;
mod playlist;
mod sink;
mod source;

pub use microphone::*;
pub use playlist::*;
pub use sink::*;
pub use source::{CaptureConstraints, LocalTrack, MediaError, MediaSource};
