//! Capture capability abstraction
//!
//! A `CaptureProvider` grants exclusive access to the microphone and returns a
//! `CaptureHandle` plus a receiver of raw chunks. Stopping the handle releases
//! every device stream; the chunk receiver closes once the last chunk has been
//! delivered.

use tokio::sync::mpsc;
use uuid::Uuid;

/// Sample layout reported when a capture is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
        }
    }
}

/// One fragment of interleaved 16-bit PCM, in capture order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub type ChunkReceiver = mpsc::UnboundedReceiver<AudioChunk>;
pub type ChunkSender = mpsc::UnboundedSender<AudioChunk>;

/// Errors raised while acquiring or releasing the capture device.
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// The capability was refused (no device, permission, busy device).
    PermissionDenied(String),
    NoSupportedConfig,
    StreamFailed(String),
    ReleaseFailed(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::PermissionDenied(e) => write!(f, "Microphone access denied: {}", e),
            CaptureError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            CaptureError::StreamFailed(e) => write!(f, "Audio stream failed: {}", e),
            CaptureError::ReleaseFailed(e) => write!(f, "Failed to release capture device: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Exclusive ownership of an active capture.
pub trait CaptureHandle: Send {
    fn format(&self) -> CaptureFormat;

    /// Stop capturing and release every underlying device stream.
    /// After this returns the chunk receiver drains and then closes.
    fn stop(self: Box<Self>) -> Result<(), CaptureError>;
}

/// Platform capability that hands out capture handles.
pub trait CaptureProvider: Send + Sync + 'static {
    fn acquire(&self, recording_id: Uuid)
        -> Result<(Box<dyn CaptureHandle>, ChunkReceiver), CaptureError>;
}
