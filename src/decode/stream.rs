//! Stream selection and the per-kind pipeline interface

use ffmpeg_next::media;

use super::DecoderError;

/// The kind of elementary stream a pipeline decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Which sub-pipelines an opened source carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLayout {
    VideoOnly,
    AudioOnly,
    Both,
}

impl StreamLayout {
    /// Derive the layout from the selected stream indices.
    /// Returns None when neither kind was found.
    pub fn from_selection(selection: &StreamSelection) -> Option<Self> {
        match (selection.video, selection.audio) {
            (Some(_), Some(_)) => Some(StreamLayout::Both),
            (Some(_), None) => Some(StreamLayout::VideoOnly),
            (None, Some(_)) => Some(StreamLayout::AudioOnly),
            (None, None) => None,
        }
    }

    pub fn has_video(&self) -> bool {
        matches!(self, StreamLayout::VideoOnly | StreamLayout::Both)
    }

    pub fn has_audio(&self) -> bool {
        matches!(self, StreamLayout::AudioOnly | StreamLayout::Both)
    }
}

/// Stream indices chosen from a container, first match per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSelection {
    pub video: Option<usize>,
    pub audio: Option<usize>,
}

impl StreamSelection {
    /// Scan streams in index order and keep the first video and first audio stream.
    /// Later streams of the same kind are ignored.
    pub fn scan<I>(streams: I) -> Self
    where
        I: IntoIterator<Item = (usize, media::Type)>,
    {
        let mut selection = Self::default();
        for (index, medium) in streams {
            match medium {
                media::Type::Video if selection.video.is_none() => selection.video = Some(index),
                media::Type::Audio if selection.audio.is_none() => selection.audio = Some(index),
                _ => {}
            }
        }
        selection
    }

    pub fn index_of(&self, kind: MediaKind) -> Option<usize> {
        match kind {
            MediaKind::Video => self.video,
            MediaKind::Audio => self.audio,
        }
    }
}

/// Outcome of asking a sub-pipeline for its next frame
#[derive(Debug)]
pub enum Receive {
    /// A complete frame is now in the pipeline's scratch slot
    Frame,
    /// The decoder needs more input (or is fully drained)
    Empty,
    /// The decoder produced something unusable; one failed unit
    Failed(DecoderError),
}

/// Operations the demux loop dispatches to each selected stream
pub trait StreamPipeline {
    /// Which kind of stream this pipeline decodes
    fn kind(&self) -> MediaKind;

    /// Container stream index this pipeline consumes
    fn stream_index(&self) -> usize;

    /// Submit one demultiplexed packet to the codec
    fn send_packet(&mut self, packet: &ffmpeg_next::Packet) -> Result<(), DecoderError>;

    /// Signal end of input so buffered frames can be drained
    fn send_eof(&mut self) -> Result<(), DecoderError>;

    /// Pull the next decoded frame into the scratch slot, if one is ready
    fn receive(&mut self) -> Receive;

    /// Drop the pixel converter or resampler together with its scratch buffer
    fn release_converter(&mut self);

    /// Drop the reusable decode frame
    fn release_frame(&mut self);

    /// Drop the codec context
    fn release_codec(&mut self);
}

/// Classify the result of `receive_frame` into the three receive outcomes
pub(crate) fn classify_receive(kind: MediaKind, result: Result<(), ffmpeg_next::Error>) -> Option<Receive> {
    match result {
        Ok(()) => None,
        Err(ffmpeg_next::Error::Other {
            errno: ffmpeg_next::error::EAGAIN,
        })
        | Err(ffmpeg_next::Error::Eof) => Some(Receive::Empty),
        Err(source) => Some(Receive::Failed(DecoderError::Decode { kind, source })),
    }
}
