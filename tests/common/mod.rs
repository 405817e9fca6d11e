//! Shared harness: a real session loop and effect runner with fake capture,
//! playback, and browser collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use callout_lib::audio::{
    AudioChunk, CaptureError, CaptureFormat, CaptureHandle, CaptureProvider, ChunkReceiver,
    ChunkSender, PlaybackError, Player,
};
use callout_lib::effects::{SessionEffectRunner, Timings};
use callout_lib::opener::{OpenError, UrlOpener};
use callout_lib::service::CalloutService;
use callout_lib::state_machine::{Event, Session};
use callout_lib::{run_session_loop, SessionHandle, UiSink, UiState};

const WAIT: Duration = Duration::from_secs(5);

pub const TEST_FORMAT: CaptureFormat = CaptureFormat {
    sample_rate: 8_000,
    channels: 1,
};

/// Capture provider that replays a fixed set of chunks per recording.
pub struct FakeCapture {
    deny: bool,
    chunks: Vec<Vec<i16>>,
    acquired: AtomicUsize,
    stops: Arc<AtomicUsize>,
}

impl FakeCapture {
    pub fn with_chunks(chunks: Vec<Vec<i16>>) -> Self {
        Self {
            deny: false,
            chunks,
            acquired: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::with_chunks(Vec::new())
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Default for FakeCapture {
    /// Three 100 ms chunks at 8 kHz.
    fn default() -> Self {
        Self::with_chunks(vec![vec![1_000; 800]; 3])
    }
}

struct FakeHandle {
    sender: Option<ChunkSender>,
    stops: Arc<AtomicUsize>,
}

impl CaptureHandle for FakeHandle {
    fn format(&self) -> CaptureFormat {
        TEST_FORMAT
    }

    fn stop(mut self: Box<Self>) -> Result<(), CaptureError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        // Closing the sender ends the chunk stream
        self.sender.take();
        Ok(())
    }
}

impl CaptureProvider for FakeCapture {
    fn acquire(
        &self,
        _recording_id: Uuid,
    ) -> Result<(Box<dyn CaptureHandle>, ChunkReceiver), CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied(
                "NotAllowedError".to_string(),
            ));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        for samples in &self.chunks {
            let _ = tx.send(AudioChunk::new(samples.clone()));
        }
        Ok((
            Box::new(FakeHandle {
                sender: Some(tx),
                stops: self.stops.clone(),
            }),
            rx,
        ))
    }
}

#[derive(Default)]
pub struct FakePlayer {
    fail: bool,
    played: Mutex<Vec<Vec<u8>>>,
}

impl FakePlayer {
    /// A player whose output device is gone.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().unwrap().clone()
    }
}

impl Player for FakePlayer {
    fn play(&self, audio: Vec<u8>) -> Result<(), PlaybackError> {
        if self.fail {
            return Err(PlaybackError::Unavailable);
        }
        self.played.lock().unwrap().push(audio);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOpener {
    fail: bool,
    opened: Mutex<Vec<String>>,
}

impl FakeOpener {
    /// An opener with no browser to launch.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl UrlOpener for FakeOpener {
    fn open(&self, url: &str) -> Result<(), OpenError> {
        if self.fail {
            return Err(OpenError::LaunchFailed("xdg-open not found".to_string()));
        }
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Publishes every snapshot on a watch channel.
struct WatchUi {
    tx: watch::Sender<Option<UiState>>,
}

impl UiSink for WatchUi {
    fn emit(&self, ui: &UiState) {
        self.tx.send_replace(Some(ui.clone()));
    }
}

pub struct Harness {
    pub handle: SessionHandle,
    pub capture: Arc<FakeCapture>,
    pub player: Arc<FakePlayer>,
    pub opener: Arc<FakeOpener>,
    ui: watch::Receiver<Option<UiState>>,
    session: JoinHandle<Session>,
}

impl Harness {
    pub fn start(base_url: &str) -> Self {
        Self::start_with(base_url, FakeCapture::default())
    }

    pub fn start_with(base_url: &str, capture: FakeCapture) -> Self {
        Self::start_with_parts(base_url, capture, FakePlayer::default(), FakeOpener::default())
    }

    pub fn start_with_parts(
        base_url: &str,
        capture: FakeCapture,
        player: FakePlayer,
        opener: FakeOpener,
    ) -> Self {
        let capture = Arc::new(capture);
        let player = Arc::new(player);
        let opener = Arc::new(opener);

        let service = CalloutService::new(base_url, Duration::from_secs(5)).unwrap();
        let runner = SessionEffectRunner::new(
            capture.clone(),
            service,
            player.clone(),
            opener.clone(),
            Timings {
                reveal_delay: Duration::from_millis(10),
                tick_interval: Duration::from_millis(10),
            },
        );

        let (tx, rx) = mpsc::channel::<Event>(32);
        let (ui_tx, ui_rx) = watch::channel(None);
        let ui = Arc::new(WatchUi { tx: ui_tx });
        let session = tokio::spawn(run_session_loop(rx, tx.clone(), runner, ui));

        Self {
            handle: SessionHandle::new(tx),
            capture,
            player,
            opener,
            ui: ui_rx,
            session,
        }
    }

    pub async fn send(&self, event: Event) {
        self.handle.send(event).await.unwrap();
    }

    /// Wait until a snapshot satisfies `pred`, failing after a few seconds.
    pub async fn wait_for(&mut self, what: &str, mut pred: impl FnMut(&UiState) -> bool) -> UiState {
        let wait = self
            .ui
            .wait_for(|state| state.as_ref().map(&mut pred).unwrap_or(false));
        let outcome = match tokio::time::timeout(WAIT, wait).await {
            Ok(Ok(state)) => Ok(state.clone()),
            Ok(Err(_)) => Err("UI channel closed"),
            Err(_) => Err("timed out"),
        };
        match outcome {
            Ok(state) => state.unwrap(),
            Err(reason) => panic!(
                "{} waiting for {}; last state: {:?}",
                reason,
                what,
                *self.ui.borrow()
            ),
        }
    }

    pub fn current(&self) -> UiState {
        self.ui.borrow().clone().unwrap()
    }

    /// Record one sample and wait for the artifact.
    pub async fn record(&mut self) -> UiState {
        self.send(Event::StartRecording).await;
        self.wait_for("recording", |s| s.timer_recording).await;
        self.send(Event::StopRecording).await;
        self.wait_for("recorded", |s| {
            s.controls.upload && s.upload_status.as_ref().map(|m| m.text.contains("complete")).unwrap_or(false)
        })
        .await
    }

    /// Record and upload, ending with the generate step revealed.
    pub async fn record_and_upload(&mut self) -> UiState {
        self.record().await;
        self.send(Event::UploadRecording).await;
        self.wait_for("generate step", |s| s.generate_visible).await
    }

    /// Request teardown and return the final session.
    pub async fn shutdown(self) -> Session {
        self.handle.send(Event::Exit).await.unwrap();
        tokio::time::timeout(WAIT, self.session)
            .await
            .expect("session loop did not stop")
            .unwrap()
    }
}

/// Poll `cond` until it holds, failing after a few seconds.
pub async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
