//! Recorded audio artifact
//!
//! Captured chunks are wrapped into a single in-memory WAV container, which is
//! what gets played back locally and uploaded to the voice profile service.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use hound::{WavSpec, WavWriter};

use super::capture::{AudioChunk, CaptureFormat};

/// Content type of every assembled artifact.
pub const RECORDING_CONTENT_TYPE: &str = "audio/wav";

/// Playable artifact of one completed recording.
/// Cloning shares the underlying bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAudio {
    bytes: Arc<[u8]>,
    format: CaptureFormat,
    frames: u64,
}

impl RecordedAudio {
    /// Assemble chunks, in order, into one WAV artifact.
    pub fn assemble(format: CaptureFormat, chunks: &[AudioChunk]) -> Result<Self, hound::Error> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        let mut samples: u64 = 0;
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            for chunk in chunks {
                for &sample in &chunk.samples {
                    writer.write_sample(sample)?;
                }
                samples += chunk.len() as u64;
            }
            writer.finalize()?;
        }

        let channels = u64::from(format.channels.max(1));
        Ok(Self {
            bytes: cursor.into_inner().into(),
            format,
            frames: samples / channels,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn content_type(&self) -> &'static str {
        RECORDING_CONTENT_TYPE
    }

    /// Playback length derived from the frame count.
    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / f64::from(self.format.sample_rate))
    }
}
