//! Video sub-pipeline: codec context, decode frame, RGB24 converter
//!
//! Decoded frames are converted with swscale into a fixed RGB24 layout at
//! the stream's native resolution and then packed (row padding removed)
//! into a scratch buffer that is allocated once when the stream is opened.

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

use super::frame::{pack_rows, VideoFrame, RGB24_BYTES_PER_PIXEL};
use super::stream::{classify_receive, Receive, StreamPipeline};
use super::{DecoderError, MediaKind};

/// Target pixel format of the conversion step
pub const OUTPUT_PIXEL_FORMAT: Pixel = Pixel::RGB24;

pub struct VideoPipeline {
    stream_index: usize,
    codec_name: String,
    width: u32,
    height: u32,
    source_format: Pixel,
    /// Nominal frames per second, when the container declares one
    frame_rate: Option<f64>,
    time_base: f64,

    // Native resources, released by the owning source in a fixed order
    scaler: Option<scaling::Context>,
    rgb_frame: Option<ffmpeg_next::frame::Video>,
    rgb_buffer: Vec<u8>,
    decoded: Option<ffmpeg_next::frame::Video>,
    decoder: Option<ffmpeg_next::decoder::Video>,

    has_frame: bool,
    pts: Option<f64>,
}

impl VideoPipeline {
    /// Resolve a decoder for the stream, open it and build the RGB24 converter
    pub fn open(stream: &ffmpeg_next::format::stream::Stream) -> Result<Self, DecoderError> {
        let parameters = stream.parameters();
        let codec_id = parameters.id();

        let codec = ffmpeg_next::decoder::find(codec_id).ok_or_else(|| DecoderError::UnsupportedCodec {
            kind: MediaKind::Video,
            codec: format!("{:?}", codec_id).to_lowercase(),
        })?;
        let codec_name = codec.name().to_string();

        let decoder = ffmpeg_next::codec::context::Context::from_parameters(parameters)
            .and_then(|context| context.decoder().open_as(codec))
            .and_then(|opened| opened.video())
            .map_err(|source| DecoderError::CodecOpen {
                kind: MediaKind::Video,
                codec: codec_name.clone(),
                source,
            })?;

        let width = decoder.width();
        let height = decoder.height();
        let source_format = decoder.format();

        let time_base = stream.time_base();
        let time_base = if time_base.denominator() != 0 {
            time_base.numerator() as f64 / time_base.denominator() as f64
        } else {
            0.0
        };
        let frame_rate = rational_to_fps(stream.avg_frame_rate()).or_else(|| rational_to_fps(stream.rate()));

        let scaler = scaling::Context::get(
            source_format,
            width,
            height,
            OUTPUT_PIXEL_FORMAT,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|source| DecoderError::ConverterInit {
            kind: MediaKind::Video,
            source,
        })?;

        let rgb_frame = ffmpeg_next::frame::Video::new(OUTPUT_PIXEL_FORMAT, width, height);
        let rgb_buffer = vec![0u8; VideoFrame::expected_size(width, height)];

        tracing::info!(
            stream = stream.index(),
            codec = %codec_name,
            width,
            height,
            pixel_format = ?source_format,
            fps = frame_rate.unwrap_or(0.0),
            "Opened video stream"
        );

        Ok(Self {
            stream_index: stream.index(),
            codec_name,
            width,
            height,
            source_format,
            frame_rate,
            time_base,
            scaler: Some(scaler),
            rgb_frame: Some(rgb_frame),
            rgb_buffer,
            decoded: Some(ffmpeg_next::frame::Video::empty()),
            decoder: Some(decoder),
            has_frame: false,
            pts: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// The most recent converted frame, if one has been decoded
    pub fn frame(&self) -> Option<VideoFrame<'_>> {
        if !self.has_frame || self.scaler.is_none() {
            return None;
        }
        Some(VideoFrame {
            data: &self.rgb_buffer,
            width: self.width,
            height: self.height,
            pts: self.pts,
        })
    }

    /// Run the pixel converter over the freshly decoded frame
    fn convert(&mut self) -> Result<(), DecoderError> {
        let (Some(decoded), Some(scaler), Some(rgb)) =
            (self.decoded.as_ref(), self.scaler.as_mut(), self.rgb_frame.as_mut())
        else {
            return Err(DecoderError::NotOpen);
        };

        // The scratch buffers were sized at open; never scale a different geometry into them
        if decoded.width() != self.width || decoded.height() != self.height || decoded.format() != self.source_format {
            return Err(DecoderError::StreamFormatChanged {
                kind: MediaKind::Video,
                expected: format!("{}x{} {:?}", self.width, self.height, self.source_format),
                actual: format!("{}x{} {:?}", decoded.width(), decoded.height(), decoded.format()),
            });
        }

        scaler.run(decoded, rgb).map_err(|source| DecoderError::Decode {
            kind: MediaKind::Video,
            source,
        })?;

        let row_bytes = self.width as usize * RGB24_BYTES_PER_PIXEL;
        pack_rows(rgb.data(0), rgb.stride(0), row_bytes, self.height as usize, &mut self.rgb_buffer);

        self.pts = decoded
            .timestamp()
            .or_else(|| decoded.pts())
            .map(|ts| ts as f64 * self.time_base);
        self.has_frame = true;
        Ok(())
    }
}

impl StreamPipeline for VideoPipeline {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn stream_index(&self) -> usize {
        self.stream_index
    }

    fn send_packet(&mut self, packet: &ffmpeg_next::Packet) -> Result<(), DecoderError> {
        let decoder = self.decoder.as_mut().ok_or(DecoderError::NotOpen)?;
        decoder.send_packet(packet).map_err(|source| DecoderError::Decode {
            kind: MediaKind::Video,
            source,
        })
    }

    fn send_eof(&mut self) -> Result<(), DecoderError> {
        let decoder = self.decoder.as_mut().ok_or(DecoderError::NotOpen)?;
        decoder.send_eof().map_err(|source| DecoderError::Decode {
            kind: MediaKind::Video,
            source,
        })
    }

    fn receive(&mut self) -> Receive {
        let (Some(decoder), Some(decoded)) = (self.decoder.as_mut(), self.decoded.as_mut()) else {
            return Receive::Empty;
        };
        if let Some(outcome) = classify_receive(MediaKind::Video, decoder.receive_frame(decoded)) {
            return outcome;
        }
        match self.convert() {
            Ok(()) => Receive::Frame,
            Err(err) => Receive::Failed(err),
        }
    }

    fn release_converter(&mut self) {
        self.has_frame = false;
        self.scaler.take();
        self.rgb_frame.take();
        self.rgb_buffer = Vec::new();
    }

    fn release_frame(&mut self) {
        self.decoded.take();
    }

    fn release_codec(&mut self) {
        self.decoder.take();
    }
}

impl Drop for VideoPipeline {
    fn drop(&mut self) {
        self.release_converter();
        self.release_frame();
        self.release_codec();
    }
}

/// Convert an FFmpeg rational frame rate to fps, rejecting unset or degenerate values
pub(crate) fn rational_to_fps(rate: ffmpeg_next::Rational) -> Option<f64> {
    if rate.numerator() > 0 && rate.denominator() > 0 {
        Some(rate.numerator() as f64 / rate.denominator() as f64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    #[test]
    fn test_resized_frame_keeps_previous_picture() {
        ffmpeg_next::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_y4m(dir.path(), "grey.y4m", 32, 16, 25, 1, [128, 128, 128]);
        let mut input = ffmpeg_next::format::input(&path).unwrap();
        let mut pipeline = VideoPipeline::open(&input.stream(0).unwrap()).unwrap();

        let mut packet = ffmpeg_next::Packet::empty();
        packet.read(&mut input).unwrap();
        pipeline.send_packet(&packet).unwrap();
        pipeline.send_eof().unwrap();
        assert!(matches!(pipeline.receive(), Receive::Frame));
        let before = pipeline.frame().unwrap().data.to_vec();
        let format = pipeline.decoded.as_ref().unwrap().format();

        // Same pixel format, twice the width
        pipeline.decoded = Some(ffmpeg_next::frame::Video::new(format, 64, 16));
        let err = pipeline.convert().unwrap_err();
        assert!(matches!(err, DecoderError::StreamFormatChanged { kind: MediaKind::Video, .. }));
        assert!(!err.is_fatal());

        let frame = pipeline.frame().unwrap();
        assert_eq!((frame.width, frame.height), (32, 16));
        assert_eq!(frame.data, before.as_slice());

        // Same geometry, different pixel format
        pipeline.decoded = Some(ffmpeg_next::frame::Video::new(Pixel::RGBA, 32, 16));
        assert!(matches!(
            pipeline.convert(),
            Err(DecoderError::StreamFormatChanged { .. })
        ));
        assert_eq!(pipeline.frame().unwrap().data, before.as_slice());
    }

    #[test]
    fn test_rational_to_fps() {
        assert_eq!(rational_to_fps(ffmpeg_next::Rational::new(30, 1)), Some(30.0));
        let ntsc = rational_to_fps(ffmpeg_next::Rational::new(30000, 1001)).unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(rational_to_fps(ffmpeg_next::Rational::new(0, 1)), None);
        assert_eq!(rational_to_fps(ffmpeg_next::Rational::new(25, 0)), None);
    }
}
