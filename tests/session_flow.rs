//! End-to-end session tests
//!
//! Drive the real session loop and effect runner against a wiremock server
//! standing in for the voice profile and synthesis endpoints.
//!
//! ```bash
//! cargo test --test session_flow
//! ```

mod common;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use callout_lib::state_machine::{Event, StatusKind, DEFAULT_CALLOUT_MESSAGE};
use callout_lib::UiPhase;
use common::{eventually, FakeCapture, FakeOpener, FakePlayer, Harness};

async fn mount_upload(server: &MockServer, status: u16, body: serde_json::Value, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/upload-voice"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(calls)
        .mount(server)
        .await;
}

async fn mount_generate(server: &MockServer, audio_url: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/generate-callout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "audio_url": audio_url })))
        .expect(calls)
        .mount(server)
        .await;
}

// ============================================================================
// Recording
// ============================================================================

mod recording {
    use super::*;

    #[tokio::test]
    async fn stop_produces_playable_recording() {
        let server = MockServer::start().await;
        let mut h = Harness::start(&server.uri());

        let ui = h.record().await;
        assert_eq!(ui.phase, UiPhase::Recorded);
        assert!(ui.controls.play && ui.controls.record);
        assert!(!ui.timer_recording);
        assert_eq!(h.capture.stops(), 1);

        h.send(Event::PlayRecording).await;
        let player = h.player.clone();
        eventually("local playback", || !player.played().is_empty()).await;
        let played = h.player.played();
        assert_eq!(&played[0][..4], b"RIFF");

        h.shutdown().await;
    }

    #[tokio::test]
    async fn denied_microphone_stays_idle() {
        let server = MockServer::start().await;
        let mut h = Harness::start_with(&server.uri(), FakeCapture::denying());

        h.send(Event::StartRecording).await;
        let ui = h
            .wait_for("permission error", |s| s.upload_status.is_some())
            .await;
        assert_eq!(ui.phase, UiPhase::Idle);
        let status = ui.upload_status.unwrap();
        assert_eq!(status.kind, StatusKind::Error);
        assert!(status.text.contains("microphone"));
        assert!(ui.controls.record);

        h.shutdown().await;
    }

    #[tokio::test]
    async fn rerecording_replaces_artifact() {
        let server = MockServer::start().await;
        let mut h = Harness::start(&server.uri());

        h.record().await;
        h.send(Event::StartRecording).await;
        h.wait_for("second recording", |s| s.timer_recording).await;
        h.send(Event::StopRecording).await;
        h.wait_for("recorded again", |s| s.phase == UiPhase::Recorded && !s.timer_recording)
            .await;

        assert_eq!(h.capture.acquired(), 2);
        let capture = h.capture.clone();
        eventually("both captures released", || capture.stops() == 2).await;

        h.shutdown().await;
    }

    #[tokio::test]
    async fn exit_while_recording_releases_microphone() {
        let server = MockServer::start().await;
        let mut h = Harness::start(&server.uri());

        h.send(Event::StartRecording).await;
        h.wait_for("recording", |s| s.timer_recording).await;

        let capture = h.capture.clone();
        h.shutdown().await;
        // Released before the loop returns
        assert_eq!(capture.stops(), 1);
    }
}

// ============================================================================
// Upload
// ============================================================================

mod upload {
    use super::*;

    #[tokio::test]
    async fn upload_without_recording_sends_nothing() {
        let server = MockServer::start().await;
        mount_upload(&server, 200, json!({ "profile_id": "p1" }), 0).await;
        let mut h = Harness::start(&server.uri());

        h.send(Event::UploadRecording).await;
        let ui = h
            .wait_for("no-recording error", |s| s.upload_status.is_some())
            .await;
        let status = ui.upload_status.unwrap();
        assert_eq!(status.kind, StatusKind::Error);
        assert!(status.text.contains("No recording"));
        assert_eq!(ui.phase, UiPhase::Idle);

        h.shutdown().await;
    }

    #[tokio::test]
    async fn successful_upload_reveals_generate_step() {
        let server = MockServer::start().await;
        mount_upload(&server, 200, json!({ "profile_id": "p1" }), 1).await;
        let mut h = Harness::start(&server.uri());

        let ui = h.record_and_upload().await;
        assert_eq!(ui.phase, UiPhase::Uploaded);
        assert!(ui.controls.generate);
        assert!(!ui.controls.upload);
        assert_eq!(ui.upload_status.unwrap().kind, StatusKind::Success);
        assert_eq!(ui.message, DEFAULT_CALLOUT_MESSAGE);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"audio\""));
        assert!(body.contains("filename=\"voice_sample.wav\""));
        assert!(body.contains("audio/wav"));
        assert!(body.contains("RIFF"));

        h.shutdown().await;
    }

    #[tokio::test]
    async fn server_error_keeps_upload_enabled() {
        let server = MockServer::start().await;
        mount_upload(&server, 500, json!({ "error": "boom" }), 1).await;
        mount_generate(&server, "https://x/y.wav", 0).await;
        let mut h = Harness::start(&server.uri());

        h.record().await;
        h.send(Event::UploadRecording).await;
        let ui = h
            .wait_for("upload failure", |s| {
                s.upload_status.as_ref().map(|m| m.kind == StatusKind::Error).unwrap_or(false)
            })
            .await;

        assert_eq!(ui.phase, UiPhase::Recorded);
        assert!(ui.controls.upload);
        assert_eq!(ui.upload_label, "Upload Voice Sample");
        assert!(ui.upload_status.unwrap().text.contains("boom"));
        assert!(!ui.generate_visible);

        // No profile was stored
        h.send(Event::GenerateCallout {
            message: "hello".to_string(),
        })
        .await;
        let ui = h
            .wait_for("missing profile", |s| s.generate_status.is_some())
            .await;
        assert!(ui.generate_status.unwrap().text.contains("upload a voice sample"));

        h.shutdown().await;
    }

    #[tokio::test]
    async fn unreadable_error_body_uses_generic_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload-voice"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;
        let mut h = Harness::start(&server.uri());

        h.record().await;
        h.send(Event::UploadRecording).await;
        let ui = h
            .wait_for("upload failure", |s| {
                s.upload_status.as_ref().map(|m| m.kind == StatusKind::Error).unwrap_or(false)
            })
            .await;
        assert_eq!(
            ui.upload_status.unwrap().text,
            "Error uploading file. Please try again."
        );

        h.shutdown().await;
    }
}

// ============================================================================
// Generation
// ============================================================================

mod generation {
    use super::*;

    #[tokio::test]
    async fn blank_message_sends_nothing() {
        let server = MockServer::start().await;
        mount_upload(&server, 200, json!({ "profile_id": "p1" }), 1).await;
        mount_generate(&server, "https://x/y.wav", 0).await;
        let mut h = Harness::start(&server.uri());

        h.record_and_upload().await;
        h.send(Event::GenerateCallout {
            message: "   \n".to_string(),
        })
        .await;
        let ui = h
            .wait_for("empty message error", |s| s.generate_status.is_some())
            .await;
        assert_eq!(ui.phase, UiPhase::Uploaded);
        assert_eq!(
            ui.generate_status.unwrap().text,
            "Please enter a callout message."
        );

        h.shutdown().await;
    }

    #[tokio::test]
    async fn generated_callout_downloads_exact_url() {
        let server = MockServer::start().await;
        mount_upload(&server, 200, json!({ "profile_id": "p1" }), 1).await;
        Mock::given(method("POST"))
            .and(path("/api/generate-callout"))
            .and(body_json(json!({ "profile_id": "p1", "message": "Running late" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "audio_url": "https://x/y.wav" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        let mut h = Harness::start(&server.uri());

        h.record_and_upload().await;
        h.send(Event::GenerateCallout {
            message: "  Running late ".to_string(),
        })
        .await;
        let ui = h.wait_for("result view", |s| s.result.is_some()).await;
        assert_eq!(ui.phase, UiPhase::Generated);
        assert_eq!(ui.result.unwrap().audio_src, "https://x/y.wav");
        assert!(!ui.loading);
        assert_eq!(ui.generate_status.unwrap().kind, StatusKind::Success);

        h.send(Event::DownloadCallout).await;
        let opener = h.opener.clone();
        eventually("browser open", || !opener.opened().is_empty()).await;
        assert_eq!(h.opener.opened(), vec!["https://x/y.wav".to_string()]);

        h.shutdown().await;
    }

    #[tokio::test]
    async fn listen_fetches_relative_audio_from_service() {
        let server = MockServer::start().await;
        mount_upload(&server, 200, json!({ "profile_id": "p1" }), 1).await;
        mount_generate(&server, "/static/callouts/out.wav", 1).await;
        Mock::given(method("GET"))
            .and(path("/static/callouts/out.wav"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFFfake".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        let mut h = Harness::start(&server.uri());

        h.record_and_upload().await;
        let message = h.current().message;
        h.send(Event::GenerateCallout { message }).await;
        h.wait_for("result view", |s| s.result.is_some()).await;

        h.send(Event::PlayCallout).await;
        let player = h.player.clone();
        eventually("callout playback", || !player.played().is_empty()).await;
        assert_eq!(h.player.played()[0], b"RIFFfake".to_vec());

        h.shutdown().await;
    }

    #[tokio::test]
    async fn failed_generation_returns_to_ready() {
        let server = MockServer::start().await;
        mount_upload(&server, 200, json!({ "profile_id": "p1" }), 1).await;
        Mock::given(method("POST"))
            .and(path("/api/generate-callout"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "Invalid profile ID" })))
            .expect(1)
            .mount(&server)
            .await;
        let mut h = Harness::start(&server.uri());

        h.record_and_upload().await;
        h.send(Event::GenerateCallout {
            message: "hello".to_string(),
        })
        .await;
        let ui = h
            .wait_for("generation failure", |s| {
                s.generate_status.as_ref().map(|m| m.kind == StatusKind::Error).unwrap_or(false)
            })
            .await;
        assert_eq!(ui.phase, UiPhase::Uploaded);
        assert!(ui.controls.generate);
        assert!(!ui.loading);
        assert_eq!(ui.generate_status.unwrap().text, "Error: Invalid profile ID");
        assert!(ui.result.is_none());

        h.shutdown().await;
    }

    #[tokio::test]
    async fn reset_keeps_profile_for_next_callout() {
        let server = MockServer::start().await;
        mount_upload(&server, 200, json!({ "profile_id": "p1" }), 1).await;
        Mock::given(method("POST"))
            .and(path("/api/generate-callout"))
            .and(body_json(json!({ "profile_id": "p1", "message": DEFAULT_CALLOUT_MESSAGE })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "audio_url": "https://x/y.wav" })),
            )
            .expect(2)
            .mount(&server)
            .await;
        let mut h = Harness::start(&server.uri());

        h.record_and_upload().await;
        h.send(Event::SetMessage {
            text: DEFAULT_CALLOUT_MESSAGE.to_string(),
        })
        .await;
        h.send(Event::GenerateCallout {
            message: DEFAULT_CALLOUT_MESSAGE.to_string(),
        })
        .await;
        h.wait_for("first result", |s| s.result.is_some()).await;

        h.send(Event::SetMessage {
            text: "edited".to_string(),
        })
        .await;
        h.send(Event::ResetForNewCallout).await;
        let ui = h
            .wait_for("reset", |s| s.phase == UiPhase::Uploaded && s.result.is_none())
            .await;
        assert_eq!(ui.message, DEFAULT_CALLOUT_MESSAGE);
        assert!(ui.generate_status.is_none());
        assert!(ui.controls.generate);
        assert!(ui.controls.play);

        // Same profile, no new upload
        h.send(Event::GenerateCallout {
            message: ui.message.clone(),
        })
        .await;
        h.wait_for("second result", |s| s.result.is_some()).await;

        h.shutdown().await;
    }
}

// ============================================================================
// Output failures
// ============================================================================

mod output_failures {
    use super::*;

    fn is_error(status: &Option<callout_lib::state_machine::StatusMessage>) -> bool {
        status.as_ref().map(|m| m.kind == StatusKind::Error).unwrap_or(false)
    }

    #[tokio::test]
    async fn missing_callout_audio_shows_generate_error() {
        let server = MockServer::start().await;
        mount_upload(&server, 200, json!({ "profile_id": "p1" }), 1).await;
        mount_generate(&server, "/missing.wav", 1).await;
        Mock::given(method("GET"))
            .and(path("/missing.wav"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "not found" })))
            .expect(1)
            .mount(&server)
            .await;
        let mut h = Harness::start(&server.uri());

        h.record_and_upload().await;
        let message = h.current().message;
        h.send(Event::GenerateCallout { message }).await;
        h.wait_for("result view", |s| s.result.is_some()).await;

        h.send(Event::PlayCallout).await;
        let ui = h
            .wait_for("playback error", |s| is_error(&s.generate_status))
            .await;
        assert_eq!(
            ui.generate_status.unwrap().text,
            "Error playing callout. Please try again."
        );
        assert_eq!(ui.phase, UiPhase::Generated);
        assert!(h.player.played().is_empty());

        h.shutdown().await;
    }

    #[tokio::test]
    async fn broken_output_shows_recording_error() {
        let server = MockServer::start().await;
        let mut h = Harness::start_with_parts(
            &server.uri(),
            FakeCapture::default(),
            FakePlayer::failing(),
            FakeOpener::default(),
        );

        h.record().await;
        h.send(Event::PlayRecording).await;
        let ui = h
            .wait_for("playback error", |s| is_error(&s.upload_status))
            .await;
        assert_eq!(
            ui.upload_status.unwrap().text,
            "Error: Could not play the recording."
        );
        assert_eq!(ui.phase, UiPhase::Recorded);
        assert!(ui.controls.upload);

        h.shutdown().await;
    }

    #[tokio::test]
    async fn browser_launch_failure_shows_generate_error() {
        let server = MockServer::start().await;
        mount_upload(&server, 200, json!({ "profile_id": "p1" }), 1).await;
        mount_generate(&server, "https://x/y.wav", 1).await;
        let mut h = Harness::start_with_parts(
            &server.uri(),
            FakeCapture::default(),
            FakePlayer::default(),
            FakeOpener::failing(),
        );

        h.record_and_upload().await;
        let message = h.current().message;
        h.send(Event::GenerateCallout { message }).await;
        h.wait_for("result view", |s| s.result.is_some()).await;

        h.send(Event::DownloadCallout).await;
        let ui = h
            .wait_for("open error", |s| is_error(&s.generate_status))
            .await;
        assert_eq!(
            ui.generate_status.unwrap().text,
            "Error opening callout. Please try again."
        );
        // Result stays available for another attempt
        assert_eq!(ui.result.unwrap().audio_src, "https://x/y.wav");

        h.shutdown().await;
    }
}
