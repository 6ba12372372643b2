//! Decoder pipeline
//!
//! Opens a container with FFmpeg, selects the first video and first audio
//! stream, and decodes them on demand. Video frames are converted to packed
//! RGB24 at the source resolution; audio frames can be resampled to
//! interleaved s16 stereo at the source rate. Each stream kind has exactly one
//! reusable frame slot, overwritten by every successful decode.

mod audio;
mod error;
mod frame;
mod source;
mod stream;
mod video;

#[cfg(test)]
pub(crate) mod fixtures;

pub use audio::{AudioPipeline, OUTPUT_BYTES_PER_SAMPLE, OUTPUT_CHANNELS, OUTPUT_SAMPLE_FORMAT};
pub use error::DecoderError;
pub use frame::{VideoFrame, RGB24_BYTES_PER_PIXEL};
pub use source::{frame_delay_for, DecoderOptions, MediaSource, DEFAULT_MAX_CONSECUTIVE_FAILURES};
pub use stream::{MediaKind, Receive, StreamLayout, StreamPipeline, StreamSelection};
pub use video::{VideoPipeline, OUTPUT_PIXEL_FORMAT};
