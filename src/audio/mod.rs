//! Audio output for decoded, resampled PCM

mod output;
mod queue;

pub use output::{AudioError, AudioOutput};
pub use queue::{i16_to_f32, PcmQueue};
