//! Session state machine for the voice callout client
//!
//! All session state lives in one `Session` value. Every transition goes
//! through `reduce()`, which returns the next session and a list of effects
//! for the effect runner. Completion events carry the id of the recording or
//! request that produced them; events whose id no longer matches the current
//! phase are dropped.

use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::audio::{AudioChunk, CaptureFormat, RecordedAudio};
use crate::error::SessionError;

/// Message template restored by `ResetForNewCallout`.
pub const DEFAULT_CALLOUT_MESSAGE: &str = "Hi, this is calling to let you know I'm not feeling well today and won't be able to come in to work. I'll keep you updated. Thanks for understanding.";

const MSG_RECORDING: &str = "Recording... Speak naturally and clearly.";
const MSG_MIC_DENIED: &str = "Error: Could not access microphone. Please grant permission.";
const MSG_RECORDING_COMPLETE: &str = "Recording complete! Review and upload your sample.";
const MSG_ASSEMBLY_FAILED: &str = "Error: Could not process the recording. Please record again.";
const MSG_NO_RECORDING: &str = "No recording found. Please record your voice first.";
const MSG_UPLOAD_OK: &str = "Voice sample uploaded successfully!";
const MSG_UPLOAD_NETWORK: &str = "Error uploading file. Please try again.";
const MSG_MISSING_PROFILE: &str = "Please upload a voice sample first.";
const MSG_EMPTY_MESSAGE: &str = "Please enter a callout message.";
const MSG_GENERATE_OK: &str = "Callout generated successfully!";
const MSG_GENERATE_NETWORK: &str = "Error generating callout. Please try again.";
const MSG_PLAY_RECORDING_FAILED: &str = "Error: Could not play the recording.";
const MSG_PLAY_CALLOUT_FAILED: &str = "Error playing callout. Please try again.";
const MSG_OPEN_FAILED: &str = "Error opening callout. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

/// One line in a status region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            text: text.into(),
        }
    }
}

/// Which audio a playback request was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackSource {
    Recording,
    Callout,
}

/// Views revealed after a short display delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    GenerateSection,
    Result { request_id: Uuid },
}

/// Where the session is in its lifecycle.
/// `Arming` and `Stopping` are the two capture suspension points.
#[derive(Debug, Clone)]
pub enum Phase {
    Idle,
    Arming {
        recording_id: Uuid,
    },
    Recording {
        recording_id: Uuid,
        started_at: Instant,
    },
    Stopping {
        recording_id: Uuid,
    },
    Recorded,
    Uploading {
        request_id: Uuid,
    },
    Ready,
    Generating {
        request_id: Uuid,
    },
    Generated {
        request_id: Uuid,
        audio_url: String,
    },
}

/// The single mutable state of one client session.
#[derive(Debug, Clone)]
pub struct Session {
    pub phase: Phase,
    pub capture_format: Option<CaptureFormat>,
    pub captured_chunks: Vec<AudioChunk>,
    pub recorded_audio: Option<RecordedAudio>,
    pub last_recording_elapsed: Option<Duration>,
    pub profile_id: Option<String>,
    pub message: String,
    pub upload_status: Option<StatusMessage>,
    pub generate_status: Option<StatusMessage>,
    pub generate_visible: bool,
    pub result_visible: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            capture_format: None,
            captured_chunks: Vec::new(),
            recorded_audio: None,
            last_recording_elapsed: None,
            profile_id: None,
            message: DEFAULT_CALLOUT_MESSAGE.to_string(),
            upload_status: None,
            generate_status: None,
            generate_visible: false,
            result_visible: false,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recording whose capture is pending, running, or draining.
    pub fn active_recording_id(&self) -> Option<Uuid> {
        match self.phase {
            Phase::Arming { recording_id }
            | Phase::Recording { recording_id, .. }
            | Phase::Stopping { recording_id } => Some(recording_id),
            _ => None,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.active_recording_id().is_some()
    }

    /// Phase to fall back to when a recording attempt ends without a new artifact.
    fn idle_or_recorded(&self) -> Phase {
        if self.recorded_audio.is_some() {
            Phase::Recorded
        } else {
            Phase::Idle
        }
    }
}

/// Events from the user, the capture provider, the service, and timers.
#[derive(Debug, Clone)]
pub enum Event {
    // User actions
    StartRecording,
    StopRecording,
    PlayRecording,
    UploadRecording,
    SetMessage {
        text: String,
    },
    GenerateCallout {
        message: String,
    },
    PlayCallout,
    DownloadCallout,
    ResetForNewCallout,
    /// Session teardown
    Exit,

    // Capture events
    CaptureGranted {
        id: Uuid,
        format: CaptureFormat,
    },
    CaptureDenied {
        id: Uuid,
        err: String,
    },
    ChunkCaptured {
        id: Uuid,
        chunk: AudioChunk,
    },
    /// Capture side closed; every chunk has been delivered
    CaptureEnded {
        id: Uuid,
    },
    /// Display timer while recording
    RecordingTick {
        id: Uuid,
    },

    // Service events
    UploadOk {
        id: Uuid,
        profile_id: String,
    },
    UploadFail {
        id: Uuid,
        err: SessionError,
    },
    GenerateOk {
        id: Uuid,
        audio_url: String,
    },
    GenerateFail {
        id: Uuid,
        err: SessionError,
    },

    /// Reveal delay elapsed
    RevealElapsed {
        view: View,
    },

    // Output events
    /// Audio could not be fetched, decoded, or played
    PlaybackFailed {
        source: PlaybackSource,
        err: String,
    },
    /// Browser could not be launched for the callout
    OpenFailed {
        err: String,
    },
}

/// Effects to be executed after a transition.
#[derive(Debug, Clone)]
pub enum Effect {
    AcquireCapture {
        id: Uuid,
    },
    /// Release every device stream held for this recording
    StopCapture {
        id: Uuid,
    },
    StartRecordingTick {
        id: Uuid,
    },
    PlayAudio {
        audio: RecordedAudio,
    },
    UploadVoice {
        id: Uuid,
        audio: RecordedAudio,
    },
    SubmitCallout {
        id: Uuid,
        profile_id: String,
        message: String,
    },
    ScheduleReveal {
        view: View,
    },
    PlayRemote {
        audio_url: String,
    },
    OpenUrl {
        audio_url: String,
    },
    /// Push a UI snapshot to the adapter
    EmitUi,
}

fn upload_failure_text(err: &SessionError) -> String {
    match err {
        SessionError::ServiceError { message, .. } => format!("Error: {}", message),
        _ => MSG_UPLOAD_NETWORK.to_string(),
    }
}

fn generate_failure_text(err: &SessionError) -> String {
    match err {
        SessionError::ServiceError { message, .. } => format!("Error: {}", message),
        _ => MSG_GENERATE_NETWORK.to_string(),
    }
}

/// Assemble the captured chunks and settle in `Recorded`.
fn finish_recording(mut session: Session, id: Uuid) -> Session {
    let format = session.capture_format.unwrap_or_default();
    match RecordedAudio::assemble(format, &session.captured_chunks) {
        Ok(audio) => {
            log::info!(
                "Recording {} assembled: {} chunks, {:?}, {} bytes",
                id,
                session.captured_chunks.len(),
                audio.duration(),
                audio.len()
            );
            session.recorded_audio = Some(audio);
            session.phase = Phase::Recorded;
            session.upload_status = Some(StatusMessage::success(MSG_RECORDING_COMPLETE));
        }
        Err(e) => {
            let err = SessionError::CaptureFailed(e.to_string());
            log::error!("Recording {}: {}", id, err);
            session.phase = session.idle_or_recorded();
            session.upload_status = Some(StatusMessage::error(MSG_ASSEMBLY_FAILED));
        }
    }
    session
}

/// Reducer: (session, event) -> (next_session, effects)
///
/// Key rules:
/// - Guard every user action on the current phase; out-of-phase actions are no-ops
/// - Ignore completions with stale ids
/// - Local validation failures never produce a network effect
pub fn reduce(mut session: Session, event: Event) -> (Session, Vec<Effect>) {
    use Effect::*;
    use Event::*;

    match (session.phase.clone(), event) {
        // -----------------
        // Recording
        // -----------------
        (Phase::Idle | Phase::Recorded, StartRecording) => {
            let id = Uuid::new_v4();
            session.phase = Phase::Arming { recording_id: id };
            (session, vec![AcquireCapture { id }, EmitUi])
        }
        (Phase::Arming { recording_id }, CaptureGranted { id, format }) if recording_id == id => {
            session.captured_chunks.clear();
            session.capture_format = Some(format);
            session.phase = Phase::Recording {
                recording_id,
                started_at: Instant::now(),
            };
            session.upload_status = Some(StatusMessage::info(MSG_RECORDING));
            (session, vec![StartRecordingTick { id }, EmitUi])
        }
        // A grant nobody waits for any more still owns the device
        (_, CaptureGranted { id, .. }) => {
            log::warn!("Releasing stale capture grant {}", id);
            (session, vec![StopCapture { id }])
        }
        (Phase::Arming { recording_id }, CaptureDenied { id, err }) if recording_id == id => {
            log::warn!("{}", SessionError::PermissionDenied(err));
            session.phase = session.idle_or_recorded();
            session.upload_status = Some(StatusMessage::error(MSG_MIC_DENIED));
            (session, vec![EmitUi])
        }
        (
            Phase::Recording { recording_id, .. } | Phase::Stopping { recording_id },
            ChunkCaptured { id, chunk },
        ) if recording_id == id => {
            session.captured_chunks.push(chunk);
            (session, vec![])
        }
        (Phase::Recording { recording_id, .. }, RecordingTick { id }) if recording_id == id => {
            (session, vec![EmitUi])
        }
        (
            Phase::Recording {
                recording_id,
                started_at,
            },
            StopRecording,
        ) => {
            session.last_recording_elapsed = Some(started_at.elapsed());
            session.phase = Phase::Stopping { recording_id };
            (
                session,
                vec![
                    StopCapture {
                        id: recording_id,
                    },
                    EmitUi,
                ],
            )
        }
        (Phase::Stopping { recording_id }, CaptureEnded { id }) if recording_id == id => {
            (finish_recording(session, id), vec![EmitUi])
        }
        // Device went away mid-recording: keep what was captured
        (
            Phase::Recording {
                recording_id,
                started_at,
            },
            CaptureEnded { id },
        ) if recording_id == id => {
            log::warn!("Capture {} ended without a stop request", id);
            session.last_recording_elapsed = Some(started_at.elapsed());
            (finish_recording(session, id), vec![StopCapture { id }, EmitUi])
        }
        (phase, PlayRecording) => {
            let capturing = matches!(
                phase,
                Phase::Arming { .. } | Phase::Recording { .. } | Phase::Stopping { .. }
            );
            match session.recorded_audio.clone() {
                Some(audio) if !capturing => (session, vec![PlayAudio { audio }]),
                _ => (session, vec![]),
            }
        }

        // -----------------
        // Upload
        // -----------------
        (Phase::Uploading { .. }, UploadRecording) => (session, vec![]),
        (_, UploadRecording) if session.recorded_audio.is_none() => {
            log::warn!("Upload rejected: {}", SessionError::NoRecording);
            session.upload_status = Some(StatusMessage::error(MSG_NO_RECORDING));
            (session, vec![EmitUi])
        }
        (Phase::Recorded, UploadRecording) => match session.recorded_audio.clone() {
            Some(audio) => {
                let id = Uuid::new_v4();
                session.phase = Phase::Uploading { request_id: id };
                (session, vec![UploadVoice { id, audio }, EmitUi])
            }
            None => (session, vec![]),
        },
        (Phase::Uploading { request_id }, UploadOk { id, profile_id }) if request_id == id => {
            log::info!("Voice profile ready: {}", profile_id);
            session.profile_id = Some(profile_id);
            session.phase = Phase::Ready;
            session.upload_status = Some(StatusMessage::success(MSG_UPLOAD_OK));
            (
                session,
                vec![
                    ScheduleReveal {
                        view: View::GenerateSection,
                    },
                    EmitUi,
                ],
            )
        }
        (Phase::Uploading { request_id }, UploadFail { id, err }) if request_id == id => {
            log::error!("Upload failed: {}", err);
            session.phase = Phase::Recorded;
            session.upload_status = Some(StatusMessage::error(upload_failure_text(&err)));
            (session, vec![EmitUi])
        }

        // -----------------
        // Generation
        // -----------------
        (_, SetMessage { text }) => {
            session.message = text;
            (session, vec![EmitUi])
        }
        (Phase::Generating { .. }, GenerateCallout { .. }) => (session, vec![]),
        (phase, GenerateCallout { message }) => {
            session.message = message;
            let trimmed = session.message.trim().to_string();

            if trimmed.is_empty() {
                log::warn!("Generate rejected: {}", SessionError::EmptyMessage);
                session.generate_status = Some(StatusMessage::error(MSG_EMPTY_MESSAGE));
                return (session, vec![EmitUi]);
            }

            let Some(profile_id) = session.profile_id.clone() else {
                log::warn!("Generate rejected: {}", SessionError::MissingProfile);
                session.generate_status = Some(StatusMessage::error(MSG_MISSING_PROFILE));
                return (session, vec![EmitUi]);
            };

            match phase {
                Phase::Ready | Phase::Generated { .. } => {
                    let id = Uuid::new_v4();
                    session.phase = Phase::Generating { request_id: id };
                    session.generate_status = None;
                    session.result_visible = false;
                    (
                        session,
                        vec![
                            SubmitCallout {
                                id,
                                profile_id,
                                message: trimmed,
                            },
                            EmitUi,
                        ],
                    )
                }
                _ => (session, vec![]),
            }
        }
        (Phase::Generating { request_id }, GenerateOk { id, audio_url }) if request_id == id => {
            session.phase = Phase::Generated {
                request_id,
                audio_url,
            };
            session.generate_status = Some(StatusMessage::success(MSG_GENERATE_OK));
            (
                session,
                vec![
                    ScheduleReveal {
                        view: View::Result { request_id },
                    },
                    EmitUi,
                ],
            )
        }
        (Phase::Generating { request_id }, GenerateFail { id, err }) if request_id == id => {
            log::error!("Generation failed: {}", err);
            session.phase = Phase::Ready;
            session.generate_status = Some(StatusMessage::error(generate_failure_text(&err)));
            (session, vec![EmitUi])
        }
        (Phase::Generated { audio_url, .. }, PlayCallout) => (session, vec![PlayRemote { audio_url }]),
        (Phase::Generated { audio_url, .. }, DownloadCallout) => (session, vec![OpenUrl { audio_url }]),
        (Phase::Generated { .. }, ResetForNewCallout) => {
            session.message = DEFAULT_CALLOUT_MESSAGE.to_string();
            session.result_visible = false;
            session.generate_status = None;
            session.phase = Phase::Ready;
            (session, vec![EmitUi])
        }

        // -----------------
        // Reveals
        // -----------------
        (_, RevealElapsed { view: View::GenerateSection }) if session.profile_id.is_some() => {
            session.generate_visible = true;
            (session, vec![EmitUi])
        }
        (
            Phase::Generated { request_id, .. },
            RevealElapsed {
                view: View::Result { request_id: rid },
            },
        ) if request_id == rid => {
            session.result_visible = true;
            (session, vec![EmitUi])
        }

        // -----------------
        // Output failures
        // -----------------
        (_, PlaybackFailed { source, err }) => {
            log::error!("Playback of {:?} failed: {}", source, err);
            match source {
                PlaybackSource::Recording => {
                    session.upload_status = Some(StatusMessage::error(MSG_PLAY_RECORDING_FAILED));
                }
                PlaybackSource::Callout => {
                    session.generate_status = Some(StatusMessage::error(MSG_PLAY_CALLOUT_FAILED));
                }
            }
            (session, vec![EmitUi])
        }
        (_, OpenFailed { err }) => {
            log::error!("Opening callout failed: {}", err);
            session.generate_status = Some(StatusMessage::error(MSG_OPEN_FAILED));
            (session, vec![EmitUi])
        }

        // -----------------
        // Teardown
        // -----------------
        // Active captures are stopped synchronously by the loop via release_all
        (_, Exit) => {
            if let Some(id) = session.active_recording_id() {
                log::info!("Exit with capture {} still active", id);
            }
            (Session::new(), vec![])
        }

        // -----------------
        // Stale or out-of-phase: no transition
        // -----------------
        (_, event) => {
            log::trace!("Ignoring {:?} in {:?}", event, session.phase);
            (session, vec![])
        }
    }
}
