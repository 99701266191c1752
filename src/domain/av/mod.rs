//! ffprobe/ffmpeg driven audio operations.

pub mod concat;
pub mod convert;
pub mod probe;
pub mod segments;
