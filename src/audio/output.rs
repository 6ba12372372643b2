//! Audio output device using cpal
//!
//! Interleaved s16 PCM is pushed into a shared `PcmQueue`; the device
//! callback drains it on the audio thread and plays silence on underrun.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::queue::{i16_to_f32, PcmQueue};

/// Seconds of audio the queue holds before dropping the oldest samples
const QUEUE_SECONDS: usize = 2;

/// Errors raised by the audio output
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No default audio output device")]
    NoDevice,
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// Copy queued samples into a device buffer, silence when the lock is unavailable
fn fill_output<T: Copy>(queue: &Mutex<PcmQueue>, data: &mut [T], convert: impl Fn(i16) -> T, silence: T) {
    match queue.lock() {
        Ok(mut queue) => {
            queue.pop_into(data, convert, silence);
        }
        Err(_) => data.fill(silence),
    }
}

/// Output stream on the default device
pub struct AudioOutput {
    queue: Arc<Mutex<PcmQueue>>,
    stream: Option<cpal::Stream>,
    sample_rate: u32,
    channels: u16,
    device_name: String,
}

impl AudioOutput {
    /// Open the default output device at `sample_rate` with `channels` and start playback
    pub fn init(sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::Device(format!("Failed to query output configs: {}", e)))?
            .filter(|c| c.channels() == channels)
            .filter(|c| matches!(c.sample_format(), cpal::SampleFormat::I16 | cpal::SampleFormat::F32))
            .find(|c| c.min_sample_rate().0 <= sample_rate && sample_rate <= c.max_sample_rate().0)
            .ok_or_else(|| {
                AudioError::Device(format!(
                    "{} does not support {} Hz with {} channels",
                    device_name, sample_rate, channels
                ))
            })?
            .with_sample_rate(cpal::SampleRate(sample_rate));

        let capacity = sample_rate as usize * channels as usize * QUEUE_SECONDS;
        let queue = Arc::new(Mutex::new(PcmQueue::new(capacity)));
        let config: cpal::StreamConfig = supported.config();
        let err_fn = |err| tracing::error!("Audio output error: {}", err);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::I16 => {
                let queue = Arc::clone(&queue);
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| fill_output(&queue, data, |s| s, 0),
                    err_fn,
                    None,
                )
            }
            cpal::SampleFormat::F32 => {
                let queue = Arc::clone(&queue);
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| fill_output(&queue, data, i16_to_f32, 0.0),
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(AudioError::Device(format!("Unsupported sample format: {:?}", other)));
            }
        }
        .map_err(|e| AudioError::Stream(format!("Failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(format!("Failed to start output stream: {}", e)))?;

        tracing::info!(
            device = %device_name,
            sample_rate,
            channels,
            sample_format = ?supported.sample_format(),
            "Audio output started"
        );

        Ok(Self {
            queue,
            stream: Some(stream),
            sample_rate,
            channels,
            device_name,
        })
    }

    /// Queue interleaved native-endian s16 PCM for playback
    pub fn enqueue(&self, pcm: &[u8]) -> Result<(), AudioError> {
        if self.stream.is_none() {
            return Err(AudioError::Stream("output has been shut down".to_string()));
        }
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| AudioError::Stream("sample queue poisoned".to_string()))?;
        queue.push_bytes(pcm);
        Ok(())
    }

    /// Bytes waiting to be played
    pub fn queued_bytes(&self) -> usize {
        self.queue.lock().map(|q| q.len() * 2).unwrap_or(0)
    }

    /// Playback time represented by the queued samples
    pub fn queued_duration(&self) -> std::time::Duration {
        let frames = self.queued_bytes() / 2 / self.channels.max(1) as usize;
        std::time::Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }

    /// Discard everything queued
    pub fn clear(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stop the stream and drop queued audio. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.clear();
            tracing::debug!(device = %self.device_name, "Audio output stopped");
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_output_from_queue() {
        let queue = Mutex::new(PcmQueue::new(8));
        queue.lock().unwrap().push_bytes(&[0x00, 0x40]);

        let mut data = [1.0f32; 2];
        fill_output(&queue, &mut data, i16_to_f32, 0.0);
        assert_eq!(data, [i16_to_f32(i16::from_ne_bytes([0x00, 0x40])), 0.0]);
    }

    #[test]
    fn test_audio_error_display() {
        assert_eq!(AudioError::NoDevice.to_string(), "No default audio output device");
        assert_eq!(
            AudioError::Stream("boom".to_string()).to_string(),
            "Audio stream error: boom"
        );
    }
}
