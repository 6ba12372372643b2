//! Playback loop
//!
//! Drives decode, upload and present on one thread:
//! `Uninitialized -> Running -> Terminated`. The decoder and the surface must
//! both come up for playback to start; on termination the decoder is closed
//! before the surface is released.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::audio::{AudioError, AudioOutput};
use crate::decode::{DecoderError, MediaKind, MediaSource, OUTPUT_CHANNELS};
use crate::settings::PlayerSettings;
use crate::video::{Surface, SurfaceError, SurfaceOptions};

/// Window size used when the source has no video stream
pub const AUDIO_ONLY_SURFACE_SIZE: (u32, u32) = (640, 360);

/// Queued audio beyond this makes the loop wait for the device to catch up
const AUDIO_HIGH_WATER: Duration = Duration::from_millis(500);
const AUDIO_THROTTLE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Uninitialized,
    Running,
    Terminated,
}

/// What happens when the source runs out of frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndOfStream {
    /// Terminate playback
    #[default]
    Stop,
    /// Reopen the source and play it again
    Loop,
}

/// Counts reported when playback ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub video_frames: u64,
    pub audio_frames: u64,
    /// Completed replays under `EndOfStream::Loop`
    pub loops: u32,
}

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error(transparent)]
    Decoder(#[from] DecoderError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    /// `run` was called on a player that already terminated
    #[error("Player has already terminated")]
    Terminated,
}

/// Where decoded frames are presented
pub trait FrameSink {
    fn render_frame(&mut self, rgb: &[u8], width: u32, height: u32, delay: Duration) -> Result<(), SurfaceError>;
    fn process_input(&mut self);
    fn should_close(&self) -> bool;
    fn cleanup(&mut self);
}

impl FrameSink for Surface {
    fn render_frame(&mut self, rgb: &[u8], width: u32, height: u32, delay: Duration) -> Result<(), SurfaceError> {
        Surface::render_frame(self, rgb, width, height, delay)
    }

    fn process_input(&mut self) {
        Surface::process_input(self)
    }

    fn should_close(&self) -> bool {
        Surface::should_close(self)
    }

    fn cleanup(&mut self) {
        Surface::cleanup(self)
    }
}

/// Plays one file in a window
pub struct Player {
    path: PathBuf,
    settings: PlayerSettings,
    state: PlayerState,
    source: MediaSource,
    audio: Option<AudioOutput>,
}

impl Player {
    pub fn new(path: impl Into<PathBuf>, settings: PlayerSettings) -> Self {
        Self {
            path: path.into(),
            settings,
            state: PlayerState::Uninitialized,
            source: MediaSource::new(),
            audio: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Play until the window closes or, with `EndOfStream::Stop`, the stream ends
    pub fn run(&mut self) -> Result<PlaybackSummary, PlayerError> {
        let title = self.settings.window_title.clone();
        let vsync = self.settings.vsync_enabled;
        self.run_with(|width, height| {
            Surface::init(
                width,
                height,
                SurfaceOptions {
                    title,
                    vsync,
                    ..Default::default()
                },
            )
        })
    }

    /// Run with a caller-provided sink, created once the frame size is known
    pub fn run_with<S, F>(&mut self, make_sink: F) -> Result<PlaybackSummary, PlayerError>
    where
        S: FrameSink,
        F: FnOnce(u32, u32) -> Result<S, SurfaceError>,
    {
        if self.state != PlayerState::Uninitialized {
            return Err(PlayerError::Terminated);
        }

        let mut sink = match self.start(make_sink) {
            Ok(sink) => sink,
            Err(err) => {
                self.source.close();
                self.state = PlayerState::Terminated;
                tracing::error!(error = %err, path = %self.path.display(), "Playback failed to start");
                return Err(err);
            }
        };

        self.state = PlayerState::Running;
        let mut summary = PlaybackSummary::default();
        let result = self.play(&mut sink, &mut summary);
        self.shutdown(&mut sink);

        match &result {
            Ok(()) => tracing::info!(
                video_frames = summary.video_frames,
                audio_frames = summary.audio_frames,
                loops = summary.loops,
                "Playback finished"
            ),
            Err(err) => tracing::error!(error = %err, "Playback aborted"),
        }
        result.map(|()| summary)
    }

    fn start<S, F>(&mut self, make_sink: F) -> Result<S, PlayerError>
    where
        S: FrameSink,
        F: FnOnce(u32, u32) -> Result<S, SurfaceError>,
    {
        self.source.open_with(&self.path, self.settings.decoder_options())?;
        let layout = self.source.layout()?;

        let (width, height) = if layout.has_video() {
            (self.source.video_width()?, self.source.video_height()?)
        } else {
            AUDIO_ONLY_SURFACE_SIZE
        };
        let sink = make_sink(width, height)?;

        if self.settings.audio_enabled && layout.has_audio() {
            let sample_rate = self.source.audio_sample_rate()?;
            match AudioOutput::init(sample_rate, OUTPUT_CHANNELS as u16) {
                Ok(output) => self.audio = Some(output),
                Err(err) => tracing::warn!(error = %err, "Audio output unavailable, continuing without sound"),
            }
        }

        tracing::info!(
            path = %self.path.display(),
            width,
            height,
            ?layout,
            audio = self.audio.is_some(),
            end_of_stream = ?self.settings.end_of_stream(),
            "Playback started"
        );
        Ok(sink)
    }

    fn play<S: FrameSink>(&mut self, sink: &mut S, summary: &mut PlaybackSummary) -> Result<(), PlayerError> {
        let end_of_stream = self.settings.end_of_stream();
        let mut frames_this_pass: u64 = 0;

        while !sink.should_close() {
            match self.source.decode_frame()? {
                Some(MediaKind::Video) => {
                    let delay = self.source.frame_delay();
                    if let Some(frame) = self.source.video_frame() {
                        sink.render_frame(frame.data, frame.width, frame.height, delay)?;
                        summary.video_frames += 1;
                        frames_this_pass += 1;
                    }
                }
                Some(MediaKind::Audio) => {
                    summary.audio_frames += 1;
                    frames_this_pass += 1;
                    self.play_audio(sink)?;
                    sink.process_input();
                }
                None => match end_of_stream {
                    // A pass without a single frame would otherwise spin forever
                    EndOfStream::Loop if frames_this_pass > 0 => {
                        self.source.open_with(&self.path, self.settings.decoder_options())?;
                        summary.loops += 1;
                        frames_this_pass = 0;
                        tracing::debug!(loops = summary.loops, "Restarting playback");
                    }
                    _ => {
                        tracing::debug!("End of stream reached");
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    /// Resample the current audio frame and queue it on the device
    fn play_audio<S: FrameSink>(&mut self, sink: &mut S) -> Result<(), PlayerError> {
        let Some(output) = self.audio.as_ref() else {
            return Ok(());
        };

        match self.source.resample_audio() {
            Ok(pcm) => {
                if let Err(err) = output.enqueue(pcm) {
                    tracing::warn!(error = %err, "Dropping audio frame");
                }
            }
            Err(err) if !err.is_fatal() => tracing::warn!(error = %err, "Skipping audio frame"),
            Err(err) => return Err(err.into()),
        }

        while output.queued_duration() > AUDIO_HIGH_WATER && !sink.should_close() {
            std::thread::sleep(AUDIO_THROTTLE_POLL);
            sink.process_input();
        }
        Ok(())
    }

    fn shutdown<S: FrameSink>(&mut self, sink: &mut S) {
        self.source.close();
        if let Some(mut output) = self.audio.take() {
            output.shutdown();
        }
        sink.cleanup();
        self.state = PlayerState::Terminated;
    }
}
