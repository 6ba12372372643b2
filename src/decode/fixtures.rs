//! Synthetic containers written at test time

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write a 4:2:0 YUV4MPEG2 file where every frame is a single colour
pub fn write_y4m(dir: &Path, name: &str, width: u32, height: u32, fps: u32, frames: u32, yuv: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).unwrap();
    writeln!(file, "YUV4MPEG2 W{width} H{height} F{fps}:1 Ip A1:1 C420jpeg").unwrap();

    let luma = vec![yuv[0]; (width * height) as usize];
    let chroma_len = (width.div_ceil(2) * height.div_ceil(2)) as usize;
    let cb = vec![yuv[1]; chroma_len];
    let cr = vec![yuv[2]; chroma_len];
    for _ in 0..frames {
        file.write_all(b"FRAME\n").unwrap();
        file.write_all(&luma).unwrap();
        file.write_all(&cb).unwrap();
        file.write_all(&cr).unwrap();
    }
    path
}

/// Write a RIFF/WAVE file with the given format tag and `payload` as sample data
pub fn write_wav(dir: &Path, name: &str, format_tag: u16, sample_rate: u32, channels: u16, payload: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let bits: u16 = 16;
    let block_align = channels * bits / 8;
    let byte_rate = sample_rate * u32::from(block_align);

    let mut bytes = Vec::with_capacity(44 + payload.len());
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&format_tag.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&bits.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(payload);

    fs::write(&path, bytes).unwrap();
    path
}

/// One second of a stereo s16 ramp at `sample_rate`
pub fn pcm_stereo_second(sample_rate: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(sample_rate as usize * 4);
    for i in 0..sample_rate {
        let sample = ((i % 256) as i16 - 128) * 64;
        payload.extend_from_slice(&sample.to_le_bytes());
        payload.extend_from_slice(&(-sample).to_le_bytes());
    }
    payload
}

/// A subtitle-only container
pub fn write_srt(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "1\n00:00:00,000 --> 00:00:01,000\nHello\n\n2\n00:00:01,000 --> 00:00:02,000\nWorld\n").unwrap();
    path
}

/// Mux raw YUV 4:2:0 video and s16 stereo PCM into one NUT file.
///
/// Every video frame is followed by `sample_rate / fps` samples of audio, so
/// the container holds `frames` packets of each kind.
pub fn write_av_nut(dir: &Path, name: &str, width: u32, height: u32, fps: i32, frames: u32, sample_rate: i32) -> PathBuf {
    use ffmpeg_next::format::{sample, Pixel, Sample};
    use ffmpeg_next::{codec, encoder, frame, ChannelLayout, Packet, Rational};

    ffmpeg_next::init().unwrap();
    let path = dir.join(name);
    let mut output = ffmpeg_next::format::output(&path).unwrap();

    let video_codec = encoder::find(codec::Id::RAWVIDEO).unwrap();
    let mut video = codec::context::Context::new_with_codec(video_codec)
        .encoder()
        .video()
        .unwrap();
    video.set_width(width);
    video.set_height(height);
    video.set_format(Pixel::YUV420P);
    video.set_time_base(Rational::new(1, fps));
    let mut video = video.open_as(video_codec).unwrap();

    let audio_codec = encoder::find(codec::Id::PCM_S16LE).unwrap();
    let mut audio = codec::context::Context::new_with_codec(audio_codec)
        .encoder()
        .audio()
        .unwrap();
    audio.set_rate(sample_rate);
    audio.set_channel_layout(ChannelLayout::STEREO);
    audio.set_format(Sample::I16(sample::Type::Packed));
    audio.set_time_base(Rational::new(1, sample_rate));
    let mut audio = audio.open_as(audio_codec).unwrap();

    {
        let mut stream = output.add_stream(video_codec).unwrap();
        stream.set_parameters(&video);
        stream.set_time_base(Rational::new(1, fps));
        stream.set_rate(Rational::new(fps, 1));
    }
    {
        let mut stream = output.add_stream(audio_codec).unwrap();
        stream.set_parameters(&audio);
        stream.set_time_base(Rational::new(1, sample_rate));
    }
    output.write_header().unwrap();
    let video_time_base = output.stream(0).unwrap().time_base();
    let audio_time_base = output.stream(1).unwrap().time_base();

    let samples_per_frame = (sample_rate / fps) as usize;
    fn write_pending(
        encoder: &mut encoder::Encoder,
        output: &mut ffmpeg_next::format::context::Output,
        index: usize,
        from: Rational,
        to: Rational,
    ) {
        let mut packet = Packet::empty();
        while encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(index);
            packet.rescale_ts(from, to);
            packet.write_interleaved(output).unwrap();
        }
    }

    for i in 0..frames {
        let mut picture = frame::Video::new(Pixel::YUV420P, width, height);
        picture.data_mut(0).fill(128);
        picture.data_mut(1).fill(128);
        picture.data_mut(2).fill(128);
        picture.set_pts(Some(i64::from(i)));
        video.send_frame(&picture).unwrap();
        write_pending(&mut video, &mut output, 0, Rational::new(1, fps), video_time_base);

        let mut chunk = frame::Audio::new(Sample::I16(sample::Type::Packed), samples_per_frame, ChannelLayout::STEREO);
        chunk.set_rate(sample_rate as u32);
        chunk.data_mut(0).fill(0x10);
        chunk.set_pts(Some(i64::from(i) * samples_per_frame as i64));
        audio.send_frame(&chunk).unwrap();
        write_pending(&mut audio, &mut output, 1, Rational::new(1, sample_rate), audio_time_base);
    }

    video.send_eof().unwrap();
    write_pending(&mut video, &mut output, 0, Rational::new(1, fps), video_time_base);
    audio.send_eof().unwrap();
    write_pending(&mut audio, &mut output, 1, Rational::new(1, sample_rate), audio_time_base);

    output.write_trailer().unwrap();
    path
}
