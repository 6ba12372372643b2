//! Audio sub-pipeline: codec context, decode frame, resampler
//!
//! Output is always interleaved signed 16-bit stereo at the source sample
//! rate. The byte scratch that receives resampled PCM has a fixed capacity
//! chosen at open; frames that would overflow it are rejected.

use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;
use ffmpeg_next::software::resampling;
use ffmpeg_next::ChannelLayout;

use super::stream::{classify_receive, Receive, StreamPipeline};
use super::{DecoderError, MediaKind};

/// Sample format produced by the resampler
pub const OUTPUT_SAMPLE_FORMAT: Sample = Sample::I16(SampleType::Packed);
/// Channel count produced by the resampler
pub const OUTPUT_CHANNELS: usize = 2;
/// Bytes per sample in the output format
pub const OUTPUT_BYTES_PER_SAMPLE: usize = 2;

/// Minimum number of samples per channel the PCM scratch can hold
const MIN_SCRATCH_SAMPLES: usize = 16384;

pub struct AudioPipeline {
    stream_index: usize,
    codec_name: String,
    sample_rate: u32,
    channels: u16,
    format: Sample,
    channel_layout: ChannelLayout,
    time_base: f64,

    resampler: Option<resampling::Context>,
    /// Resampler output, allocated once with room for `scratch_samples`
    resampled: Option<ffmpeg_next::frame::Audio>,
    scratch_samples: usize,
    pcm: Vec<u8>,
    decoded: Option<ffmpeg_next::frame::Audio>,
    decoder: Option<ffmpeg_next::decoder::Audio>,

    has_frame: bool,
    pts: Option<f64>,
}

impl AudioPipeline {
    pub fn open(stream: &ffmpeg_next::format::stream::Stream) -> Result<Self, DecoderError> {
        let parameters = stream.parameters();
        let codec_id = parameters.id();

        let codec = ffmpeg_next::decoder::find(codec_id).ok_or_else(|| DecoderError::UnsupportedCodec {
            kind: MediaKind::Audio,
            codec: format!("{:?}", codec_id).to_lowercase(),
        })?;
        let codec_name = codec.name().to_string();

        let decoder = ffmpeg_next::codec::context::Context::from_parameters(parameters)
            .and_then(|context| context.decoder().open_as(codec))
            .and_then(|opened| opened.audio())
            .map_err(|source| DecoderError::CodecOpen {
                kind: MediaKind::Audio,
                codec: codec_name.clone(),
                source,
            })?;

        let sample_rate = decoder.rate();
        let channels = decoder.channels();
        let format = decoder.format();
        // Some containers leave the layout unset; derive the default for the channel count
        let channel_layout = if decoder.channel_layout().is_empty() {
            ChannelLayout::default(i32::from(channels))
        } else {
            decoder.channel_layout()
        };

        let time_base = stream.time_base();
        let time_base = if time_base.denominator() != 0 {
            time_base.numerator() as f64 / time_base.denominator() as f64
        } else {
            0.0
        };

        let resampler = resampling::Context::get(
            format,
            channel_layout,
            sample_rate,
            OUTPUT_SAMPLE_FORMAT,
            ChannelLayout::STEREO,
            sample_rate,
        )
        .map_err(|source| DecoderError::ConverterInit {
            kind: MediaKind::Audio,
            source,
        })?;

        let scratch_samples = (decoder.frame_size() as usize).max(MIN_SCRATCH_SAMPLES);
        let resampled = ffmpeg_next::frame::Audio::new(OUTPUT_SAMPLE_FORMAT, scratch_samples, ChannelLayout::STEREO);
        let pcm = vec![0u8; scratch_samples * OUTPUT_CHANNELS * OUTPUT_BYTES_PER_SAMPLE];

        tracing::info!(
            stream = stream.index(),
            codec = %codec_name,
            sample_rate,
            channels,
            sample_format = ?format,
            scratch_bytes = pcm.len(),
            "Opened audio stream"
        );

        Ok(Self {
            stream_index: stream.index(),
            codec_name,
            sample_rate,
            channels,
            format,
            channel_layout,
            time_base,
            resampler: Some(resampler),
            resampled: Some(resampled),
            scratch_samples,
            pcm,
            decoded: Some(ffmpeg_next::frame::Audio::empty()),
            decoder: Some(decoder),
            has_frame: false,
            pts: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn format(&self) -> Sample {
        self.format
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// Fixed size of the PCM scratch in bytes
    pub fn pcm_capacity(&self) -> usize {
        self.pcm.len()
    }

    /// Presentation time of the current frame in seconds
    pub fn pts(&self) -> Option<f64> {
        self.pts
    }

    /// The most recent decoded frame, in the codec's native sample format
    pub fn frame(&self) -> Option<&ffmpeg_next::frame::Audio> {
        if !self.has_frame {
            return None;
        }
        self.decoded.as_ref()
    }

    /// Convert the current frame to interleaved s16 stereo.
    ///
    /// The returned slice borrows the pipeline's scratch and is overwritten by
    /// the next call.
    pub fn resample(&mut self) -> Result<&[u8], DecoderError> {
        if !self.has_frame {
            return Ok(&[]);
        }
        let (Some(decoded), Some(resampler), Some(output)) =
            (self.decoded.as_mut(), self.resampler.as_mut(), self.resampled.as_mut())
        else {
            return Err(DecoderError::NotOpen);
        };

        // Same rate in and out, so the input sample count bounds the output
        let frame_bytes = OUTPUT_CHANNELS * OUTPUT_BYTES_PER_SAMPLE;
        if decoded.samples() > self.scratch_samples {
            return Err(DecoderError::AudioFrameTooLarge {
                size: decoded.samples() * frame_bytes,
                capacity: self.pcm.len(),
            });
        }

        if decoded.channel_layout().is_empty() {
            decoded.set_channel_layout(self.channel_layout);
        }

        // swr treats the frame's sample count as its capacity
        output.set_samples(self.scratch_samples);
        resampler.run(decoded, output).map_err(|source| DecoderError::Decode {
            kind: MediaKind::Audio,
            source,
        })?;

        let size = (output.samples() * frame_bytes).min(self.pcm.len());
        if size == 0 {
            return Ok(&[]);
        }
        self.pcm[..size].copy_from_slice(&output.data(0)[..size]);
        Ok(&self.pcm[..size])
    }

    fn check_format(&self, frame: &ffmpeg_next::frame::Audio) -> Result<(), DecoderError> {
        if frame.rate() == self.sample_rate && frame.format() == self.format && frame.channels() == self.channels {
            return Ok(());
        }
        Err(DecoderError::StreamFormatChanged {
            kind: MediaKind::Audio,
            expected: format!("{} Hz {} ch {:?}", self.sample_rate, self.channels, self.format),
            actual: format!("{} Hz {} ch {:?}", frame.rate(), frame.channels(), frame.format()),
        })
    }
}

impl StreamPipeline for AudioPipeline {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn stream_index(&self) -> usize {
        self.stream_index
    }

    fn send_packet(&mut self, packet: &ffmpeg_next::Packet) -> Result<(), DecoderError> {
        let decoder = self.decoder.as_mut().ok_or(DecoderError::NotOpen)?;
        decoder.send_packet(packet).map_err(|source| DecoderError::Decode {
            kind: MediaKind::Audio,
            source,
        })
    }

    fn send_eof(&mut self) -> Result<(), DecoderError> {
        let decoder = self.decoder.as_mut().ok_or(DecoderError::NotOpen)?;
        decoder.send_eof().map_err(|source| DecoderError::Decode {
            kind: MediaKind::Audio,
            source,
        })
    }

    fn receive(&mut self) -> Receive {
        let (Some(decoder), Some(decoded)) = (self.decoder.as_mut(), self.decoded.as_mut()) else {
            return Receive::Empty;
        };
        if let Some(outcome) = classify_receive(MediaKind::Audio, decoder.receive_frame(decoded)) {
            return outcome;
        }

        let Some(decoded) = self.decoded.as_ref() else {
            return Receive::Empty;
        };
        if let Err(err) = self.check_format(decoded) {
            self.has_frame = false;
            return Receive::Failed(err);
        }
        let pts = decoded.timestamp().or_else(|| decoded.pts());
        self.pts = pts.map(|ts| ts as f64 * self.time_base);
        self.has_frame = true;
        Receive::Frame
    }

    fn release_converter(&mut self) {
        self.has_frame = false;
        self.resampler.take();
        self.resampled.take();
        self.pcm = Vec::new();
    }

    fn release_frame(&mut self) {
        self.decoded.take();
    }

    fn release_codec(&mut self) {
        self.decoder.take();
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.release_converter();
        self.release_frame();
        self.release_codec();
    }
}
