//! Effect runner for the voice callout client
//!
//! Executes the effects produced by the state machine. Each effect runs on its
//! own tokio task and reports back by sending an `Event` on the loop channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audio::{CaptureHandle, CaptureProvider, ChunkReceiver, Player};
use crate::opener::UrlOpener;
use crate::service::CalloutService;
use crate::settings::AppSettings;
use crate::state_machine::{Effect, Event, PlaybackSource};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);

    /// Release anything still held when the session ends.
    fn release_all(&self) {}
}

/// Delays used by timer effects.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub reveal_delay: Duration,
    pub tick_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for Timings {
    fn from(settings: &AppSettings) -> Self {
        Self {
            reveal_delay: settings.reveal_delay(),
            tick_interval: settings.tick_interval(),
        }
    }
}

type ActiveCaptures = Arc<Mutex<HashMap<Uuid, Box<dyn CaptureHandle>>>>;

fn lock_captures(active: &ActiveCaptures) -> MutexGuard<'_, HashMap<Uuid, Box<dyn CaptureHandle>>> {
    // A panicked holder cannot leave the map half-updated.
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Stop a capture on the blocking pool; the handle may join an audio thread.
fn release_capture(id: Uuid, handle: Box<dyn CaptureHandle>) {
    tokio::task::spawn_blocking(move || match handle.stop() {
        Ok(()) => log::info!("Capture {} released", id),
        Err(e) => log::error!("Capture {}: {}", id, e),
    });
}

/// Forward chunks in order, then report the end of the capture once the
/// provider has closed its side.
fn spawn_chunk_forwarder(id: Uuid, mut chunks: ChunkReceiver, tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(chunk) = chunks.recv().await {
            count += 1;
            if tx.send(Event::ChunkCaptured { id, chunk }).await.is_err() {
                log::debug!("Chunk forwarder {} stopping - channel closed", id);
                return;
            }
        }
        log::debug!("Capture {} drained after {} chunks", id, count);
        let _ = tx.send(Event::CaptureEnded { id }).await;
    });
}

/// Hand a clip to the player off the async workers; the player blocks until
/// the clip starts.
async fn play_clip(player: Arc<dyn Player>, audio: Vec<u8>) -> Result<(), String> {
    match tokio::task::spawn_blocking(move || player.play(audio)).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Effect runner wired to a capture provider, the callout service, local
/// playback, and the system browser.
pub struct SessionEffectRunner {
    capture: Arc<dyn CaptureProvider>,
    service: CalloutService,
    player: Arc<dyn Player>,
    opener: Arc<dyn UrlOpener>,
    timings: Timings,
    active_captures: ActiveCaptures,
}

impl SessionEffectRunner {
    pub fn new(
        capture: Arc<dyn CaptureProvider>,
        service: CalloutService,
        player: Arc<dyn Player>,
        opener: Arc<dyn UrlOpener>,
        timings: Timings,
    ) -> Arc<Self> {
        Arc::new(Self {
            capture,
            service,
            player,
            opener,
            timings,
            active_captures: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Number of captures currently holding a device.
    pub fn active_capture_count(&self) -> usize {
        lock_captures(&self.active_captures).len()
    }
}

impl EffectRunner for SessionEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::AcquireCapture { id } => {
                let capture = self.capture.clone();
                let active = self.active_captures.clone();

                tokio::spawn(async move {
                    log::info!("Requesting microphone for recording {}", id);
                    let acquired = tokio::task::spawn_blocking(move || capture.acquire(id)).await;

                    let (handle, chunks) = match acquired {
                        Ok(Ok(granted)) => granted,
                        Ok(Err(e)) => {
                            log::error!("Failed to acquire microphone: {}", e);
                            let _ = tx
                                .send(Event::CaptureDenied {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                            return;
                        }
                        Err(e) => {
                            log::error!("Capture task failed: {}", e);
                            let _ = tx
                                .send(Event::CaptureDenied {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                            return;
                        }
                    };

                    let format = handle.format();
                    lock_captures(&active).insert(id, handle);

                    // Grant must reach the loop before the first chunk does
                    if tx.send(Event::CaptureGranted { id, format }).await.is_err() {
                        log::warn!("Session gone before capture {} was granted", id);
                        let handle = lock_captures(&active).remove(&id);
                        if let Some(handle) = handle {
                            release_capture(id, handle);
                        }
                        return;
                    }

                    spawn_chunk_forwarder(id, chunks, tx);
                });
            }

            Effect::StopCapture { id } => {
                let handle = lock_captures(&self.active_captures).remove(&id);
                match handle {
                    Some(handle) => release_capture(id, handle),
                    None => log::debug!("StopCapture: no active handle for id={}", id),
                }
            }

            Effect::StartRecordingTick { id } => {
                let active = self.active_captures.clone();
                let period = self.timings.tick_interval;

                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(period);
                    loop {
                        interval.tick().await;
                        let is_active = lock_captures(&active).contains_key(&id);
                        if !is_active {
                            log::debug!("Recording tick stopping - recording {} no longer active", id);
                            break;
                        }
                        if tx.send(Event::RecordingTick { id }).await.is_err() {
                            log::debug!("Recording tick stopping - channel closed");
                            break;
                        }
                    }
                });
            }

            Effect::PlayAudio { audio } => {
                let player = self.player.clone();

                tokio::spawn(async move {
                    log::info!("Playing recording ({:?})", audio.duration());
                    if let Err(err) = play_clip(player, audio.bytes().to_vec()).await {
                        log::error!("Playback failed: {}", err);
                        let _ = tx
                            .send(Event::PlaybackFailed {
                                source: PlaybackSource::Recording,
                                err,
                            })
                            .await;
                    }
                });
            }

            Effect::UploadVoice { id, audio } => {
                let service = self.service.clone();

                tokio::spawn(async move {
                    let event = match service.upload_voice(&audio).await {
                        Ok(profile_id) => Event::UploadOk { id, profile_id },
                        Err(e) => {
                            log::error!("Upload failed: {}", e);
                            Event::UploadFail { id, err: e.into() }
                        }
                    };
                    let _ = tx.send(event).await;
                });
            }

            Effect::SubmitCallout {
                id,
                profile_id,
                message,
            } => {
                let service = self.service.clone();

                tokio::spawn(async move {
                    let event = match service.generate_callout(&profile_id, &message).await {
                        Ok(audio_url) => Event::GenerateOk { id, audio_url },
                        Err(e) => {
                            log::error!("Generation failed: {}", e);
                            Event::GenerateFail { id, err: e.into() }
                        }
                    };
                    let _ = tx.send(event).await;
                });
            }

            Effect::ScheduleReveal { view } => {
                let delay = self.timings.reveal_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    log::debug!("Reveal delay elapsed for {:?}", view);
                    let _ = tx.send(Event::RevealElapsed { view }).await;
                });
            }

            Effect::PlayRemote { audio_url } => {
                let service = self.service.clone();
                let player = self.player.clone();

                tokio::spawn(async move {
                    let result = match service.fetch_audio(&audio_url).await {
                        Ok(bytes) => {
                            log::info!("Playing callout {} ({} bytes)", audio_url, bytes.len());
                            play_clip(player, bytes).await
                        }
                        Err(e) => Err(format!("Failed to fetch callout audio: {}", e)),
                    };
                    if let Err(err) = result {
                        log::error!("{}", err);
                        let _ = tx
                            .send(Event::PlaybackFailed {
                                source: PlaybackSource::Callout,
                                err,
                            })
                            .await;
                    }
                });
            }

            Effect::OpenUrl { audio_url } => {
                // Absolute locators resolve to themselves
                let opened = self
                    .service
                    .resolve(&audio_url)
                    .map_err(|e| format!("Cannot open callout: {}", e))
                    .and_then(|url| self.opener.open(url.as_str()).map_err(|e| e.to_string()));

                if let Err(err) = opened {
                    log::error!("{}", err);
                    tokio::spawn(async move {
                        let _ = tx.send(Event::OpenFailed { err }).await;
                    });
                }
            }

            Effect::EmitUi => {
                // Handled in the session loop, not here
                log::warn!("EmitUi reached the effect runner; ignoring");
            }
        }
    }

    fn release_all(&self) {
        let handles: Vec<_> = lock_captures(&self.active_captures).drain().collect();
        for (id, handle) in handles {
            log::info!("Releasing capture {} on teardown", id);
            if let Err(e) = handle.stop() {
                log::error!("Capture {}: {}", id, e);
            }
        }
    }
}
