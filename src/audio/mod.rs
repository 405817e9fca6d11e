//! Audio module for the voice callout client
//!
//! Capture is an abstract capability (`CaptureProvider`) with a CPAL binding;
//! captured PCM is wrapped into a WAV artifact with hound; playback uses rodio.

mod artifact;
pub mod capture;
mod playback;
pub mod recorder;

pub use artifact::{RecordedAudio, RECORDING_CONTENT_TYPE};
pub use capture::{
    AudioChunk, CaptureError, CaptureFormat, CaptureHandle, CaptureProvider, ChunkReceiver,
    ChunkSender,
};
pub use playback::{PlaybackError, Player, RodioPlayer};
pub use recorder::CpalCaptureProvider;
