//! Decoder error taxonomy

use std::path::PathBuf;

use thiserror::Error;

use super::MediaKind;

/// Errors that can occur while opening or decoding a media source
#[derive(Error, Debug)]
pub enum DecoderError {
    /// The container could not be opened or parsed
    #[error("Failed to open media file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: ffmpeg_next::Error,
    },
    /// Neither a video nor an audio stream exists in the container
    #[error("No video or audio stream found in {0}")]
    NoStream(PathBuf),
    /// No decoder is registered for the stream's codec id
    #[error("Unsupported {kind} codec: {codec}")]
    UnsupportedCodec { kind: MediaKind, codec: String },
    /// A decoder exists but refused the stream parameters
    #[error("Failed to open {kind} codec {codec}: {source}")]
    CodecOpen {
        kind: MediaKind,
        codec: String,
        #[source]
        source: ffmpeg_next::Error,
    },
    /// The pixel converter or resampler could not be created
    #[error("Failed to create {kind} converter: {source}")]
    ConverterInit {
        kind: MediaKind,
        #[source]
        source: ffmpeg_next::Error,
    },
    /// Accessor or decode call on a source that is not open
    #[error("Media source is not open")]
    NotOpen,
    /// The requested stream kind was not selected when the source was opened
    #[error("No {0} stream selected")]
    StreamNotSelected(MediaKind),
    /// A single packet failed to decode (non-fatal)
    #[error("Failed to decode {kind} packet: {source}")]
    Decode {
        kind: MediaKind,
        #[source]
        source: ffmpeg_next::Error,
    },
    /// The container could not deliver the next packet (non-fatal)
    #[error("Failed to read packet: {0}")]
    Demux(#[source] ffmpeg_next::Error),
    /// A decoded frame no longer matches the format captured at open
    #[error("{kind} stream format changed mid-stream: expected {expected}, got {actual}")]
    StreamFormatChanged {
        kind: MediaKind,
        expected: String,
        actual: String,
    },
    /// A resampled audio frame does not fit the fixed scratch buffer
    #[error("Resampled audio frame of {size} bytes exceeds scratch capacity of {capacity} bytes")]
    AudioFrameTooLarge { size: usize, capacity: usize },
    /// Too many packets in a row produced no frame
    #[error("Giving up after {0} consecutive packet decode failures")]
    TooManyDecodeFailures(u32),
    /// Any other FFmpeg failure
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),
}

impl DecoderError {
    /// Whether this error ends playback or only costs a single packet
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DecoderError::Decode { .. }
                | DecoderError::Demux(_)
                | DecoderError::StreamFormatChanged { .. }
                | DecoderError::AudioFrameTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_error_display() {
        let err = DecoderError::StreamNotSelected(MediaKind::Audio);
        assert_eq!(err.to_string(), "No audio stream selected");

        let err = DecoderError::UnsupportedCodec {
            kind: MediaKind::Video,
            codec: "none".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported video codec: none");
    }

    #[test]
    fn test_per_packet_errors_are_not_fatal() {
        let err = DecoderError::Decode {
            kind: MediaKind::Video,
            source: ffmpeg_next::Error::InvalidData,
        };
        assert!(!err.is_fatal());
        assert!(!DecoderError::Demux(ffmpeg_next::Error::InvalidData).is_fatal());
        assert!(DecoderError::TooManyDecodeFailures(64).is_fatal());
        assert!(DecoderError::NotOpen.is_fatal());
    }
}
