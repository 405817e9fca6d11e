pub mod audio;
pub mod console;
pub mod effects;
pub mod error;
pub mod opener;
pub mod service;
pub mod settings;
pub mod state_machine;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use audio::{CpalCaptureProvider, RodioPlayer};
use effects::{EffectRunner, SessionEffectRunner, Timings};
use opener::SystemOpener;
use service::CalloutService;
use settings::AppSettings;
use state_machine::{reduce, Effect, Event, Phase, Session, StatusMessage};

/// Derived phase shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UiPhase {
    Idle,
    Recording,
    Recorded,
    Uploading,
    Uploaded,
    Generating,
    Generated,
}

/// Which controls accept input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Controls {
    pub record: bool,
    pub stop: bool,
    pub play: bool,
    pub upload: bool,
    pub generate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalloutResult {
    pub audio_src: String,
}

/// UI snapshot pushed to the adapter.
/// Serialized as camelCase JSON: { "phase": "recording", "timer": "03:4", ... }
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub phase: UiPhase,
    pub timer: String,
    pub timer_recording: bool,
    pub controls: Controls,
    pub upload_label: String,
    pub upload_status: Option<StatusMessage>,
    pub generate_visible: bool,
    pub message: String,
    pub loading: bool,
    pub generate_status: Option<StatusMessage>,
    pub result: Option<CalloutResult>,
}

/// Elapsed recording time as `SS:d` (seconds, tenths).
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    format!("{:02}:{}", millis / 1000, (millis % 1000) / 100)
}

/// Convert the session into a UI snapshot
pub fn session_to_ui(session: &Session) -> UiState {
    let capturing = session.is_capturing();
    let has_audio = session.recorded_audio.is_some();

    let phase = match &session.phase {
        Phase::Idle => UiPhase::Idle,
        Phase::Arming { .. } | Phase::Recording { .. } | Phase::Stopping { .. } => {
            UiPhase::Recording
        }
        Phase::Recorded => UiPhase::Recorded,
        Phase::Uploading { .. } => UiPhase::Uploading,
        Phase::Ready => UiPhase::Uploaded,
        Phase::Generating { .. } => UiPhase::Generating,
        Phase::Generated { .. } => UiPhase::Generated,
    };

    let elapsed = match &session.phase {
        Phase::Recording { started_at, .. } => Some(started_at.elapsed()),
        Phase::Arming { .. } => Some(Duration::ZERO),
        _ => session.last_recording_elapsed,
    };

    let result = match &session.phase {
        Phase::Generated { audio_url, .. } if session.result_visible => Some(CalloutResult {
            audio_src: audio_url.clone(),
        }),
        _ => None,
    };

    UiState {
        phase,
        timer: format_elapsed(elapsed.unwrap_or_default()),
        timer_recording: matches!(session.phase, Phase::Recording { .. }),
        controls: Controls {
            record: matches!(session.phase, Phase::Idle | Phase::Recorded),
            stop: matches!(session.phase, Phase::Recording { .. }),
            play: has_audio && !capturing,
            upload: matches!(session.phase, Phase::Recorded),
            generate: matches!(session.phase, Phase::Ready),
        },
        upload_label: if matches!(session.phase, Phase::Uploading { .. }) {
            "Uploading...".to_string()
        } else {
            "Upload Voice Sample".to_string()
        },
        upload_status: session.upload_status.clone(),
        generate_visible: session.generate_visible,
        message: session.message.clone(),
        loading: matches!(session.phase, Phase::Generating { .. }),
        generate_status: session.generate_status.clone(),
        result,
    }
}

/// Receives UI snapshots from the session loop.
pub trait UiSink: Send + Sync + 'static {
    fn emit(&self, ui: &UiState);
}

fn emit_ui_state(ui: &dyn UiSink, session: &Session) {
    let ui_state = session_to_ui(session);
    log::debug!("Emitting UI state: {:?}", serde_json::to_string(&ui_state));
    ui.emit(&ui_state);
}

/// Holds the event sender for dispatching events into the session loop
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Event>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Send an event to the state machine
    pub async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.tx.send(event).await
    }
}

/// Run the session loop until `Exit`; returns the final session.
pub async fn run_session_loop(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
    ui: Arc<dyn UiSink>,
) -> Session {
    let mut session = Session::new();

    emit_ui_state(ui.as_ref(), &session);
    log::info!("Session loop started");

    while let Some(event) = rx.recv().await {
        log::debug!("Received event: {:?}", event);
        let exiting = matches!(event, Event::Exit);

        let old_discriminant = std::mem::discriminant(&session.phase);
        let (next, effects) = reduce(session, event);
        if old_discriminant != std::mem::discriminant(&next.phase) {
            log::info!("Phase transition -> {:?}", next.phase);
        }
        session = next;

        for eff in effects {
            match eff {
                Effect::EmitUi => emit_ui_state(ui.as_ref(), &session),
                other => effect_runner.spawn(other, tx.clone()),
            }
        }

        if exiting {
            log::info!("Exit requested, shutting down session loop");
            effect_runner.release_all();
            break;
        }
    }

    log::info!("Session loop ended");
    session
}

/// Wire the real capture, service, playback, and browser collaborators.
pub fn build_effect_runner(settings: &AppSettings) -> Result<Arc<SessionEffectRunner>, String> {
    let service = CalloutService::new(&settings.base_url, settings.request_timeout())
        .map_err(|e| e.to_string())?;
    log::info!("Using callout service at {}", service.base_url());

    let capture = CpalCaptureProvider::new();
    if !CpalCaptureProvider::is_available() {
        log::warn!("No default input device found; recording will fail");
    }

    Ok(SessionEffectRunner::new(
        Arc::new(capture),
        service,
        Arc::new(RodioPlayer::default()),
        Arc::new(SystemOpener),
        Timings::from(settings),
    ))
}

/// Run an interactive terminal session against the configured service.
pub async fn run(settings: AppSettings) -> Result<(), String> {
    let effect_runner = build_effect_runner(&settings)?;

    let (tx, rx) = mpsc::channel::<Event>(32);
    let handle = SessionHandle::new(tx.clone());
    let ui = Arc::new(console::ConsoleUi::default());

    let session_loop = tokio::spawn(run_session_loop(rx, tx, effect_runner, ui.clone()));

    console::run_console(handle, ui).await;

    session_loop.await.map_err(|e| e.to_string())?;
    Ok(())
}
