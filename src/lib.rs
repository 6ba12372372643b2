//! Media Player Library
//!
//! Plays a single media file in a window: FFmpeg demux and decode, RGB24
//! conversion, wgpu presentation and optional audio output.

pub mod audio;
pub mod decode;
pub mod gpu_context;
pub mod player;
pub mod settings;
pub mod shaders;
pub mod telemetry;
pub mod video;

pub use audio::{AudioError, AudioOutput, PcmQueue};
pub use decode::{DecoderError, DecoderOptions, MediaKind, MediaSource, StreamLayout, VideoFrame};
pub use gpu_context::GpuContext;
pub use player::{EndOfStream, FrameSink, PlaybackSummary, Player, PlayerError, PlayerState};
pub use settings::{PlayerSettings, SettingsError};
pub use video::{Surface, SurfaceError, SurfaceOptions};
