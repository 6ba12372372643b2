//! Media source: container ownership, stream selection and the demux loop

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::format::Sample;

use super::audio::AudioPipeline;
use super::frame::VideoFrame;
use super::stream::{Receive, StreamLayout, StreamPipeline, StreamSelection};
use super::video::VideoPipeline;
use super::{DecoderError, MediaKind};

/// Default bound on packets in a row that may fail before decoding gives up
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 64;

/// Options applied when opening a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Abort with `TooManyDecodeFailures` once this many packets in a row fail
    pub max_consecutive_failures: u32,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

/// Pacing delay for a nominal frame rate; zero when the rate is unknown or invalid
pub fn frame_delay_for(fps: f64) -> Duration {
    if fps.is_finite() && fps > 0.0 {
        Duration::from_secs_f64(1.0 / fps)
    } else {
        Duration::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemuxState {
    Reading,
    /// Container exhausted, decoders received EOF and are being drained
    Draining,
    Finished,
}

/// Outcome of one demuxer read
#[derive(Debug)]
enum PacketRead {
    Packet,
    EndOfFile,
    Failed(DecoderError),
}

fn classify_read(result: Result<(), ffmpeg_next::Error>) -> PacketRead {
    match result {
        Ok(()) => PacketRead::Packet,
        Err(ffmpeg_next::Error::Eof) => PacketRead::EndOfFile,
        Err(source) => PacketRead::Failed(DecoderError::Demux(source)),
    }
}

/// Everything owned by one open container
struct OpenSource {
    path: PathBuf,
    layout: StreamLayout,
    selection: StreamSelection,
    duration: Option<Duration>,
    video: Option<VideoPipeline>,
    audio: Option<AudioPipeline>,
    input: Option<ffmpeg_next::format::context::Input>,
    state: DemuxState,
    consecutive_failures: u32,
}

/// Iterate the selected sub-pipelines, video first
fn pipelines<'a>(
    video: &'a mut Option<VideoPipeline>,
    audio: &'a mut Option<AudioPipeline>,
) -> impl Iterator<Item = &'a mut dyn StreamPipeline> {
    let video = video.as_mut().map(|p| p as &mut dyn StreamPipeline);
    let audio = audio.as_mut().map(|p| p as &mut dyn StreamPipeline);
    video.into_iter().chain(audio)
}

/// Count one failed packet. Fatal errors pass straight through.
fn note_failure(counter: &mut u32, max_failures: u32, err: DecoderError) -> Result<(), DecoderError> {
    if err.is_fatal() {
        return Err(err);
    }
    *counter += 1;
    tracing::warn!(error = %err, consecutive = *counter, "Skipping undecodable packet");
    if *counter > max_failures {
        return Err(DecoderError::TooManyDecodeFailures(*counter));
    }
    Ok(())
}

impl OpenSource {
    fn open(path: &Path) -> Result<Self, DecoderError> {
        ffmpeg_next::init()?;

        let input = ffmpeg_next::format::input(&path).map_err(|source| DecoderError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let selection = StreamSelection::scan(
            input
                .streams()
                .map(|stream| (stream.index(), stream.parameters().medium())),
        );
        let layout = StreamLayout::from_selection(&selection).ok_or_else(|| DecoderError::NoStream(path.to_path_buf()))?;
        let duration = u64::try_from(input.duration())
            .ok()
            .filter(|micros| *micros > 0)
            .map(Duration::from_micros);

        // Declared after `input` so a failed open drops the pipelines before the container
        let mut source = Self {
            path: path.to_path_buf(),
            layout,
            selection,
            duration,
            video: None,
            audio: None,
            input: None,
            state: DemuxState::Reading,
            consecutive_failures: 0,
        };

        if let Some(index) = selection.video {
            let stream = input.stream(index).ok_or_else(|| DecoderError::NoStream(path.to_path_buf()))?;
            source.video = Some(VideoPipeline::open(&stream)?);
        }
        if let Some(index) = selection.audio {
            let stream = input.stream(index).ok_or_else(|| DecoderError::NoStream(path.to_path_buf()))?;
            source.audio = Some(AudioPipeline::open(&stream)?);
        }
        source.input = Some(input);

        tracing::info!(
            path = %path.display(),
            layout = ?layout,
            video_stream = ?selection.video,
            audio_stream = ?selection.audio,
            duration_secs = duration.map(|d| d.as_secs_f64()).unwrap_or(0.0),
            "Opened media source"
        );
        Ok(source)
    }

    /// Release native resources: converters and scratch, then frames, then
    /// codec contexts, then the container. Safe to call repeatedly.
    fn release(&mut self) {
        for pipeline in pipelines(&mut self.video, &mut self.audio) {
            pipeline.release_converter();
        }
        for pipeline in pipelines(&mut self.video, &mut self.audio) {
            pipeline.release_frame();
        }
        for pipeline in pipelines(&mut self.video, &mut self.audio) {
            pipeline.release_codec();
        }
        self.video = None;
        self.audio = None;
        self.input = None;
        self.state = DemuxState::Finished;
    }

    fn decode_next(&mut self, max_failures: u32) -> Result<Option<MediaKind>, DecoderError> {
        loop {
            if self.state == DemuxState::Finished {
                return Ok(None);
            }

            // Frames already buffered in a codec come out before more input goes in
            if let Some(kind) = self.drain(max_failures)? {
                return Ok(Some(kind));
            }

            if self.state == DemuxState::Draining {
                self.state = DemuxState::Finished;
                tracing::debug!(path = %self.path.display(), "End of stream");
                return Ok(None);
            }

            let input = self.input.as_mut().ok_or(DecoderError::NotOpen)?;
            // The packet lives for this iteration only
            let mut packet = ffmpeg_next::Packet::empty();
            match classify_read(packet.read(input)) {
                PacketRead::Packet => self.submit(packet.stream(), &packet, max_failures)?,
                PacketRead::EndOfFile => self.begin_drain(),
                PacketRead::Failed(err) => note_failure(&mut self.consecutive_failures, max_failures, err)?,
            }
        }
    }

    fn drain(&mut self, max_failures: u32) -> Result<Option<MediaKind>, DecoderError> {
        for pipeline in pipelines(&mut self.video, &mut self.audio) {
            loop {
                match pipeline.receive() {
                    Receive::Frame => {
                        self.consecutive_failures = 0;
                        return Ok(Some(pipeline.kind()));
                    }
                    Receive::Empty => break,
                    Receive::Failed(err) => note_failure(&mut self.consecutive_failures, max_failures, err)?,
                }
            }
        }
        Ok(None)
    }

    fn submit(&mut self, index: usize, packet: &ffmpeg_next::Packet, max_failures: u32) -> Result<(), DecoderError> {
        let Some(pipeline) = pipelines(&mut self.video, &mut self.audio).find(|p| p.stream_index() == index) else {
            return Ok(());
        };
        match pipeline.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(err) => note_failure(&mut self.consecutive_failures, max_failures, err),
        }
    }

    fn begin_drain(&mut self) {
        for pipeline in pipelines(&mut self.video, &mut self.audio) {
            if let Err(err) = pipeline.send_eof() {
                tracing::debug!(kind = %pipeline.kind(), error = %err, "Decoder flush failed");
            }
        }
        self.state = DemuxState::Draining;
    }
}

impl Drop for OpenSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// A single playback session over one container file.
///
/// Owns the demuxer, the selected codec contexts, their converters and the
/// reusable frame slots. Not `Clone`: there is exactly one owner of the
/// native handles.
pub struct MediaSource {
    options: DecoderOptions,
    open: Option<OpenSource>,
}

impl Default for MediaSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSource {
    /// Create a closed source
    pub fn new() -> Self {
        Self {
            options: DecoderOptions::default(),
            open: None,
        }
    }

    /// Open a container with the current options, closing any previous one
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), DecoderError> {
        self.open_with(path, self.options)
    }

    /// Open a container with explicit options, closing any previous one
    pub fn open_with(&mut self, path: impl AsRef<Path>, options: DecoderOptions) -> Result<(), DecoderError> {
        self.close();
        self.options = options;
        self.open = Some(OpenSource::open(path.as_ref())?);
        Ok(())
    }

    /// Release every native resource. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut source) = self.open.take() {
            source.release();
            tracing::debug!(path = %source.path.display(), "Closed media source");
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn options(&self) -> DecoderOptions {
        self.options
    }

    /// Decode until one video or audio frame completes.
    ///
    /// Returns the kind of frame now held in its slot, or `None` at end of
    /// stream. Any view obtained from the previous call is invalidated.
    pub fn decode_frame(&mut self) -> Result<Option<MediaKind>, DecoderError> {
        let max_failures = self.options.max_consecutive_failures;
        self.source_mut()?.decode_next(max_failures)
    }

    /// Latest converted RGB24 frame; None when no video stream is selected
    /// or nothing has been decoded yet
    pub fn video_frame(&self) -> Option<VideoFrame<'_>> {
        self.open.as_ref()?.video.as_ref()?.frame()
    }

    /// Latest decoded audio frame in its native sample format
    pub fn audio_frame(&self) -> Option<&ffmpeg_next::frame::Audio> {
        self.open.as_ref()?.audio.as_ref()?.frame()
    }

    /// Presentation time of the latest audio frame in seconds
    pub fn audio_pts(&self) -> Option<f64> {
        self.open.as_ref()?.audio.as_ref()?.pts()
    }

    /// Resample the current audio frame to interleaved s16 stereo.
    /// Returns an empty slice when no audio frame is pending.
    pub fn resample_audio(&mut self) -> Result<&[u8], DecoderError> {
        self.source_mut()?
            .audio
            .as_mut()
            .ok_or(DecoderError::StreamNotSelected(MediaKind::Audio))?
            .resample()
    }

    pub fn layout(&self) -> Result<StreamLayout, DecoderError> {
        Ok(self.source()?.layout)
    }

    pub fn path(&self) -> Option<&Path> {
        self.open.as_ref().map(|source| source.path.as_path())
    }

    /// Container duration, when known
    pub fn duration(&self) -> Option<Duration> {
        self.open.as_ref()?.duration
    }

    pub fn video_stream_index(&self) -> Option<usize> {
        self.open.as_ref()?.selection.video
    }

    pub fn audio_stream_index(&self) -> Option<usize> {
        self.open.as_ref()?.selection.audio
    }

    /// Name of the decoder in use for a stream kind
    pub fn codec_name(&self, kind: MediaKind) -> Option<&str> {
        let source = self.open.as_ref()?;
        match kind {
            MediaKind::Video => source.video.as_ref().map(|v| v.codec_name()),
            MediaKind::Audio => source.audio.as_ref().map(|a| a.codec_name()),
        }
    }

    pub fn video_width(&self) -> Result<u32, DecoderError> {
        Ok(self.video()?.width())
    }

    pub fn video_height(&self) -> Result<u32, DecoderError> {
        Ok(self.video()?.height())
    }

    /// Nominal frame rate; `Ok(None)` when the container does not declare one
    pub fn frame_rate(&self) -> Result<Option<f64>, DecoderError> {
        Ok(self.video()?.frame_rate())
    }

    /// Per-frame pacing delay (`1 / frame_rate`), zero when unknown
    pub fn frame_delay(&self) -> Duration {
        self.frame_rate()
            .ok()
            .flatten()
            .map(frame_delay_for)
            .unwrap_or(Duration::ZERO)
    }

    pub fn audio_sample_rate(&self) -> Result<u32, DecoderError> {
        Ok(self.audio()?.sample_rate())
    }

    pub fn audio_channels(&self) -> Result<u16, DecoderError> {
        Ok(self.audio()?.channels())
    }

    /// Native sample format of the audio codec
    pub fn audio_format(&self) -> Result<Sample, DecoderError> {
        Ok(self.audio()?.format())
    }

    fn source(&self) -> Result<&OpenSource, DecoderError> {
        self.open.as_ref().ok_or(DecoderError::NotOpen)
    }

    fn source_mut(&mut self) -> Result<&mut OpenSource, DecoderError> {
        self.open.as_mut().ok_or(DecoderError::NotOpen)
    }

    fn video(&self) -> Result<&VideoPipeline, DecoderError> {
        self.source()?
            .video
            .as_ref()
            .ok_or(DecoderError::StreamNotSelected(MediaKind::Video))
    }

    fn audio(&self) -> Result<&AudioPipeline, DecoderError> {
        self.source()?
            .audio
            .as_ref()
            .ok_or(DecoderError::StreamNotSelected(MediaKind::Audio))
    }
}

impl Drop for MediaSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    const RED_YUV: [u8; 3] = [81, 90, 240];

    #[test]
    fn test_two_second_clip_decodes_sixty_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_y4m(dir.path(), "clip.y4m", 320, 240, 30, 60, [128, 128, 128]);

        let mut source = MediaSource::new();
        source.open(&path).unwrap();
        assert_eq!(source.video_width().unwrap(), 320);
        assert_eq!(source.video_height().unwrap(), 240);
        assert_eq!(source.layout().unwrap(), StreamLayout::VideoOnly);
        assert_eq!(source.video_stream_index(), Some(0));
        assert_eq!(source.audio_stream_index(), None);

        let fps = source.frame_rate().unwrap().unwrap();
        assert!((fps - 30.0).abs() < 1e-6);
        let delay = source.frame_delay();
        assert!(delay > Duration::from_millis(33) && delay < Duration::from_millis(34));

        let mut frames = 0;
        while let Some(kind) = source.decode_frame().unwrap() {
            assert_eq!(kind, MediaKind::Video);
            let frame = source.video_frame().unwrap();
            assert!(frame.is_valid());
            frames += 1;
        }
        assert_eq!(frames, 60);
        // Stays at end of stream
        assert!(source.decode_frame().unwrap().is_none());
    }

    #[test]
    fn test_single_colour_frame_converts_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_y4m(dir.path(), "red.y4m", 64, 48, 25, 1, RED_YUV);

        let mut source = MediaSource::new();
        source.open(&path).unwrap();
        assert!(source.video_frame().is_none());
        assert_eq!(source.decode_frame().unwrap(), Some(MediaKind::Video));

        let frame = source.video_frame().unwrap();
        assert_eq!(frame.data.len(), VideoFrame::expected_size(64, 48));
        for pixel in frame.data.chunks_exact(3) {
            assert!(pixel[0] >= 247, "red channel {}", pixel[0]);
            assert!(pixel[1] <= 8, "green channel {}", pixel[1]);
            assert!(pixel[2] <= 8, "blue channel {}", pixel[2]);
        }
    }

    #[test]
    fn test_pcm_wav_is_audio_only() {
        let dir = tempfile::tempdir().unwrap();
        let payload = fixtures::pcm_stereo_second(44100);
        let path = fixtures::write_wav(dir.path(), "tone.wav", 1, 44100, 2, &payload);

        let mut source = MediaSource::new();
        source.open(&path).unwrap();
        assert_eq!(source.layout().unwrap(), StreamLayout::AudioOnly);
        assert_eq!(source.audio_sample_rate().unwrap(), 44100);
        assert_eq!(source.audio_channels().unwrap(), 2);
        assert_eq!(source.audio_format().unwrap(), Sample::I16(ffmpeg_next::format::sample::Type::Packed));
        assert!(source.codec_name(MediaKind::Audio).is_some());
        assert!(source.codec_name(MediaKind::Video).is_none());
        assert!(matches!(
            source.video_width(),
            Err(DecoderError::StreamNotSelected(MediaKind::Video))
        ));
        assert_eq!(source.frame_delay(), Duration::ZERO);

        // Nothing decoded yet
        assert!(source.resample_audio().unwrap().is_empty());

        let mut total = 0;
        while let Some(kind) = source.decode_frame().unwrap() {
            assert_eq!(kind, MediaKind::Audio);
            assert!(source.video_frame().is_none());
            assert!(source.audio_frame().is_some());
            let pcm = source.resample_audio().unwrap();
            assert_eq!(pcm.len() % 4, 0);
            total += pcm.len();
        }
        assert!(total <= payload.len());
        assert!(total >= payload.len() - 4096 * 4);
    }

    #[test]
    fn test_interleaved_container_yields_both_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_av_nut(dir.path(), "mixed.nut", 64, 48, 10, 20, 8000);

        let mut source = MediaSource::new();
        source.open(&path).unwrap();
        assert_eq!(source.layout().unwrap(), StreamLayout::Both);
        assert_eq!(source.video_stream_index(), Some(0));
        assert_eq!(source.audio_stream_index(), Some(1));
        assert_eq!((source.video_width().unwrap(), source.video_height().unwrap()), (64, 48));
        assert_eq!(source.audio_sample_rate().unwrap(), 8000);

        let mut video_frames = 0;
        let mut audio_frames = 0;
        let mut audio_between_video = false;
        let mut last_audio_pts: Option<f64> = None;
        let mut pcm_bytes = 0;
        while let Some(kind) = source.decode_frame().unwrap() {
            match kind {
                MediaKind::Video => {
                    video_frames += 1;
                    assert!(source.video_frame().unwrap().is_valid());
                }
                MediaKind::Audio => {
                    audio_frames += 1;
                    if video_frames > 0 && video_frames < 20 {
                        audio_between_video = true;
                    }
                    let pts = source.audio_pts().unwrap();
                    if let Some(previous) = last_audio_pts {
                        assert!(pts > previous, "audio pts went from {previous} to {pts}");
                    }
                    last_audio_pts = Some(pts);
                    pcm_bytes += source.resample_audio().unwrap().len();
                }
            }
        }

        assert_eq!(video_frames, 20);
        assert_eq!(audio_frames, 20);
        assert!(audio_between_video);
        let expected = 20 * 800 * 4;
        assert!(pcm_bytes <= expected && pcm_bytes >= expected - 800 * 4, "{pcm_bytes} bytes of pcm");
    }

    #[test]
    fn test_unsupported_codec_leaves_source_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_wav(dir.path(), "mystery.wav", 0x7777, 8000, 1, &[0u8; 1600]);

        let mut source = MediaSource::new();
        let err = source.open(&path).unwrap_err();
        assert!(
            matches!(err, DecoderError::UnsupportedCodec { kind: MediaKind::Audio, .. }),
            "unexpected error: {err}"
        );
        assert!(!source.is_open());
        assert!(matches!(source.video_width(), Err(DecoderError::NotOpen)));
        assert!(matches!(source.decode_frame(), Err(DecoderError::NotOpen)));
    }

    #[test]
    fn test_subtitle_only_container_has_no_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_srt(dir.path(), "captions.srt");

        let mut source = MediaSource::new();
        let err = source.open(&path).unwrap_err();
        assert!(matches!(err, DecoderError::NoStream(_)), "unexpected error: {err}");
        assert!(!source.is_open());
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MediaSource::new();
        let err = source.open(dir.path().join("missing.mp4")).unwrap_err();
        assert!(matches!(err, DecoderError::Open { .. }));
        assert!(source.path().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_y4m(dir.path(), "short.y4m", 32, 32, 10, 3, RED_YUV);

        let mut source = MediaSource::new();
        source.close();
        source.open(&path).unwrap();
        assert!(source.is_open());
        assert_eq!(source.path(), Some(path.as_path()));
        source.decode_frame().unwrap();

        source.close();
        source.close();
        assert!(!source.is_open());
        assert!(source.video_frame().is_none());
        assert!(matches!(source.video_height(), Err(DecoderError::NotOpen)));
        assert!(matches!(source.layout(), Err(DecoderError::NotOpen)));
    }

    #[test]
    fn test_reopen_restarts_from_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_y4m(dir.path(), "loop.y4m", 16, 16, 10, 4, RED_YUV);

        let mut source = MediaSource::new();
        let options = DecoderOptions {
            max_consecutive_failures: 3,
        };
        source.open_with(&path, options).unwrap();
        while source.decode_frame().unwrap().is_some() {}

        source.open(&path).unwrap();
        assert_eq!(source.options(), options);
        let mut frames = 0;
        while source.decode_frame().unwrap().is_some() {
            frames += 1;
        }
        assert_eq!(frames, 4);
    }

    #[test]
    fn test_failure_bound() {
        let mut counter = 0;
        let err = || DecoderError::Decode {
            kind: MediaKind::Video,
            source: ffmpeg_next::Error::InvalidData,
        };
        assert!(note_failure(&mut counter, 2, err()).is_ok());
        assert!(note_failure(&mut counter, 2, err()).is_ok());
        assert!(matches!(
            note_failure(&mut counter, 2, err()),
            Err(DecoderError::TooManyDecodeFailures(3))
        ));

        let mut counter = 0;
        assert!(matches!(
            note_failure(&mut counter, 10, DecoderError::NotOpen),
            Err(DecoderError::NotOpen)
        ));
        assert_eq!(counter, 0);
    }

    #[test]
    fn test_read_errors_count_toward_failure_bound() {
        assert!(matches!(classify_read(Ok(())), PacketRead::Packet));
        assert!(matches!(classify_read(Err(ffmpeg_next::Error::Eof)), PacketRead::EndOfFile));

        // A read error that keeps recurring must end decoding instead of retrying forever
        let mut counter = 0;
        let mut outcome = Ok(());
        for _ in 0..4 {
            let PacketRead::Failed(err) = classify_read(Err(ffmpeg_next::Error::Other {
                errno: ffmpeg_next::error::EAGAIN,
            })) else {
                panic!("read error was not classified as a failure");
            };
            assert!(matches!(err, DecoderError::Demux(_)));
            outcome = note_failure(&mut counter, 3, err);
            if outcome.is_err() {
                break;
            }
        }
        assert!(matches!(outcome, Err(DecoderError::TooManyDecodeFailures(4))));
    }

    #[test]
    fn test_frame_delay_for() {
        assert_eq!(frame_delay_for(25.0), Duration::from_millis(40));
        assert_eq!(frame_delay_for(0.0), Duration::ZERO);
        assert_eq!(frame_delay_for(f64::NAN), Duration::ZERO);
        assert_eq!(frame_delay_for(-30.0), Duration::ZERO);
    }
}
