//! Microphone capture using CPAL
//!
//! The stream lives on a dedicated audio thread so the handle handed to the
//! session is `Send`. Samples are converted to i16 and forwarded as chunks.
//! Stopping the handle wakes the thread, which drops the stream; that releases
//! the device and closes the chunk channel.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::capture::{
    AudioChunk, CaptureError, CaptureFormat, CaptureHandle, CaptureProvider, ChunkReceiver,
    ChunkSender,
};

/// Capture provider backed by the default input device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalCaptureProvider;

impl CpalCaptureProvider {
    pub fn new() -> Self {
        Self
    }

    /// Whether a default input device is currently present.
    pub fn is_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }
}

impl CaptureProvider for CpalCaptureProvider {
    fn acquire(
        &self,
        recording_id: Uuid,
    ) -> Result<(Box<dyn CaptureHandle>, ChunkReceiver), CaptureError> {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<AudioChunk>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<CaptureFormat, CaptureError>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(format!("capture-{}", recording_id))
            .spawn(move || {
                let (stream, format) = match open_input_stream(chunk_tx) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CaptureError::PermissionDenied(format!(
                        "Failed to start stream: {}",
                        e
                    ))));
                    return;
                }

                log::info!("Capture {} started: {:?}", recording_id, format);
                let _ = ready_tx.send(Ok(format));

                // Blocks until stop() or until the handle is dropped.
                let _ = stop_rx.recv();

                if let Err(e) = stream.pause() {
                    log::warn!("Capture {}: pause before release failed: {}", recording_id, e);
                }
                drop(stream);
                log::info!("Capture {} released", recording_id);
            })
            .map_err(|e| CaptureError::StreamFailed(e.to_string()))?;

        let format = match ready_rx.recv() {
            Ok(result) => result?,
            Err(_) => {
                return Err(CaptureError::StreamFailed(
                    "audio thread exited before reporting".to_string(),
                ))
            }
        };

        let handle = CpalCaptureHandle {
            format,
            stop_tx,
            thread: Some(thread),
        };

        Ok((Box::new(handle), chunk_rx))
    }
}

/// Handle to an active CPAL capture.
/// Dropping it without calling `stop` still releases the device.
struct CpalCaptureHandle {
    format: CaptureFormat,
    stop_tx: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle for CpalCaptureHandle {
    fn format(&self) -> CaptureFormat {
        self.format
    }

    fn stop(mut self: Box<Self>) -> Result<(), CaptureError> {
        let _ = self.stop_tx.send(());
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| CaptureError::ReleaseFailed("audio thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for CpalCaptureHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

fn open_input_stream(chunk_tx: ChunkSender) -> Result<(Stream, CaptureFormat), CaptureError> {
    let host = cpal::default_host();

    let device = host.default_input_device().ok_or_else(|| {
        CaptureError::PermissionDenied("No audio input device found".to_string())
    })?;

    log::info!("Using audio input device: {:?}", device.name());

    let supported_config = device
        .default_input_config()
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;

    log::info!(
        "Audio config: {} Hz, {} channels, {:?}",
        supported_config.sample_rate().0,
        supported_config.channels(),
        supported_config.sample_format()
    );

    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();
    let format = CaptureFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    let stream = match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(&device, &config, chunk_tx),
        SampleFormat::U16 => build_stream_typed::<u16>(&device, &config, chunk_tx),
        SampleFormat::F32 => build_stream_typed::<f32>(&device, &config, chunk_tx),
        _ => Err(CaptureError::NoSupportedConfig),
    }?;

    Ok((stream, format))
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    chunk_tx: ChunkSender,
) -> Result<Stream, CaptureError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let err_fn = |err| log::error!("Audio stream error: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<i16> = data.iter().map(|&s| sample_to_i16(s)).collect();
                // Receiver gone means the session already moved on.
                let _ = chunk_tx.send(AudioChunk::new(samples));
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::PermissionDenied(e.to_string())
            }
            other => CaptureError::StreamFailed(other.to_string()),
        })
}

/// Convert any sample type to i16 PCM.
fn sample_to_i16<T>(sample: T) -> i16
where
    T: cpal::Sample,
    f32: cpal::FromSample<T>,
{
    let f32_sample = <f32 as cpal::FromSample<T>>::from_sample_(sample);
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}
