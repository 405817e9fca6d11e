//! Local playback of recorded and synthesized audio via rodio
//!
//! The output stream must live on the thread that created it, so playback runs
//! on a dedicated audio thread fed through a channel. Each request gets a reply
//! once the clip has been decoded and handed to the output.

use std::io::Cursor;
use std::sync::mpsc::{channel, sync_channel, Sender, SyncSender};
use std::thread;

use rodio::{Decoder, OutputStream, Sink, Source};

#[derive(Debug, Clone)]
pub enum PlaybackError {
    /// No output device, or the audio thread is gone.
    Unavailable,
    /// The clip is not in a format rodio can decode.
    Decode(String),
    /// The output refused the clip.
    Output(String),
}

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackError::Unavailable => write!(f, "Audio output is unavailable"),
            PlaybackError::Decode(e) => write!(f, "Failed to decode audio: {}", e),
            PlaybackError::Output(e) => write!(f, "Failed to play audio: {}", e),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// Plays encoded audio (any container rodio can decode).
/// Blocks until the clip has started or failed.
pub trait Player: Send + Sync + 'static {
    fn play(&self, audio: Vec<u8>) -> Result<(), PlaybackError>;
}

/// Player backed by the default output device.
#[derive(Clone)]
pub struct RodioPlayer {
    tx: Sender<PlayRequest>,
}

type PlayRequest = (Vec<u8>, SyncSender<Result<(), PlaybackError>>);

impl RodioPlayer {
    pub fn new() -> Self {
        let (tx, rx) = channel::<PlayRequest>();

        thread::spawn(move || {
            // Stream must live on this thread
            let (_stream, stream_handle) = match OutputStream::try_default() {
                Ok(output) => output,
                Err(e) => {
                    log::error!("No audio output device found: {}", e);
                    return;
                }
            };

            while let Ok((audio, reply)) = rx.recv() {
                let result = Sink::try_new(&stream_handle)
                    .map_err(|e| PlaybackError::Output(e.to_string()))
                    .and_then(|sink| {
                        let source = Decoder::new(Cursor::new(audio))
                            .map_err(|e| PlaybackError::Decode(e.to_string()))?;
                        sink.append(source.convert_samples::<f32>());
                        // New clips play over old ones rather than queueing behind them
                        sink.detach();
                        Ok(())
                    });
                let _ = reply.send(result);
            }
            log::debug!("Playback thread exiting");
        });

        Self { tx }
    }
}

impl Default for RodioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Player for RodioPlayer {
    fn play(&self, audio: Vec<u8>) -> Result<(), PlaybackError> {
        log::debug!("Queueing {} bytes for playback", audio.len());
        let (reply_tx, reply_rx) = sync_channel(1);
        self.tx
            .send((audio, reply_tx))
            .map_err(|_| PlaybackError::Unavailable)?;
        // Reply is dropped unanswered when the output never opened
        reply_rx.recv().map_err(|_| PlaybackError::Unavailable)?
    }
}
