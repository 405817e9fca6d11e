//! Terminal adapter
//!
//! Reads one command per line from stdin and turns it into session events.
//! UI snapshots are printed as they change; the recording timer is only shown
//! when a recording ends.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::state_machine::{Event, StatusKind, StatusMessage};
use crate::{SessionHandle, UiSink, UiState};

const HELP: &str = "\
Commands:
  record            start recording a voice sample
  stop              stop recording
  play              play back the recording
  upload            upload the recording as a voice profile
  message <text>    set the callout message
  generate [text]   generate a callout (uses the current message if no text)
  listen            play the generated callout
  download          open the generated callout in the browser
  new               start a new callout with the same voice
  status            show the current session state
  quit              end the session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Record,
    Stop,
    Play,
    Upload,
    Message(String),
    Generate(Option<String>),
    Listen,
    Download,
    New,
    Status,
    Help,
    Quit,
}

/// Parse one input line. Empty lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "record" => Command::Record,
        "stop" => Command::Stop,
        "play" => Command::Play,
        "upload" => Command::Upload,
        "message" | "msg" => Command::Message(rest.to_string()),
        "generate" | "gen" => {
            if rest.is_empty() {
                Command::Generate(None)
            } else {
                Command::Generate(Some(rest.to_string()))
            }
        }
        "listen" => Command::Listen,
        "download" => Command::Download,
        "new" | "reset" => Command::New,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("Unknown command '{}'. Type 'help' for a list.", other)),
    };
    Ok(Some(command))
}

/// Map a command onto a session event. `current_message` is the text the
/// session holds when `generate` is given without arguments.
pub fn command_to_event(command: Command, current_message: &str) -> Option<Event> {
    match command {
        Command::Record => Some(Event::StartRecording),
        Command::Stop => Some(Event::StopRecording),
        Command::Play => Some(Event::PlayRecording),
        Command::Upload => Some(Event::UploadRecording),
        Command::Message(text) => Some(Event::SetMessage { text }),
        Command::Generate(text) => Some(Event::GenerateCallout {
            message: text.unwrap_or_else(|| current_message.to_string()),
        }),
        Command::Listen => Some(Event::PlayCallout),
        Command::Download => Some(Event::DownloadCallout),
        Command::New => Some(Event::ResetForNewCallout),
        Command::Quit => Some(Event::Exit),
        Command::Status | Command::Help => None,
    }
}

fn status_line(label: &str, status: &StatusMessage) -> String {
    let tag = match status.kind {
        StatusKind::Info => "info",
        StatusKind::Success => "ok",
        StatusKind::Error => "error",
    };
    format!("[{}:{}] {}", label, tag, status.text)
}

/// Lines worth printing when moving from `prev` to `next`.
fn changed_lines(prev: Option<&UiState>, next: &UiState) -> Vec<String> {
    let mut lines = Vec::new();

    if prev.map(|p| p.phase) != Some(next.phase) {
        lines.push(format!("-- {:?}", next.phase).to_lowercase());
        if prev.map(|p| p.timer_recording).unwrap_or(false) && !next.timer_recording {
            lines.push(format!("   recorded {}", next.timer));
        }
    }
    // Elapsed readout, once per whole second
    if next.timer_recording {
        let seconds = |ui: &UiState| ui.timer.split(':').next().map(str::to_string);
        let was_recording = prev.map(|p| p.timer_recording).unwrap_or(false);
        if !was_recording || prev.and_then(seconds) != seconds(next) {
            lines.push(format!("   recording {}", next.timer));
        }
    }
    if let Some(status) = &next.upload_status {
        if prev.and_then(|p| p.upload_status.as_ref()) != Some(status) {
            lines.push(status_line("upload", status));
        }
    }
    if next.generate_visible && !prev.map(|p| p.generate_visible).unwrap_or(false) {
        lines.push(format!("Callout message: \"{}\"", next.message));
        lines.push("Type 'generate' to synthesize it, or 'message <text>' to change it.".to_string());
    } else if next.generate_visible && prev.map(|p| p.message != next.message).unwrap_or(false) {
        lines.push(format!("Callout message: \"{}\"", next.message));
    }
    if next.loading && !prev.map(|p| p.loading).unwrap_or(false) {
        lines.push("Generating callout...".to_string());
    }
    if let Some(status) = &next.generate_status {
        if prev.and_then(|p| p.generate_status.as_ref()) != Some(status) {
            lines.push(status_line("generate", status));
        }
    }
    if let Some(result) = &next.result {
        if prev.and_then(|p| p.result.as_ref()) != Some(result) {
            lines.push(format!("Callout ready: {}", result.audio_src));
            lines.push("Type 'listen', 'download', or 'new'.".to_string());
        }
    }
    lines
}

fn describe(ui: &UiState) -> String {
    let controls = &ui.controls;
    let enabled: Vec<&str> = [
        (controls.record, "record"),
        (controls.stop, "stop"),
        (controls.play, "play"),
        (controls.upload, "upload"),
        (controls.generate, "generate"),
    ]
    .iter()
    .filter(|(on, _)| *on)
    .map(|(_, name)| *name)
    .collect();

    let mut out = format!(
        "phase: {:?}\ntimer: {}\navailable: {}",
        ui.phase,
        ui.timer,
        enabled.join(", ")
    );
    if let Some(status) = &ui.upload_status {
        out.push('\n');
        out.push_str(&status_line("upload", status));
    }
    if ui.generate_visible {
        out.push_str(&format!("\nmessage: \"{}\"", ui.message));
    }
    if let Some(status) = &ui.generate_status {
        out.push('\n');
        out.push_str(&status_line("generate", status));
    }
    if let Some(result) = &ui.result {
        out.push_str(&format!("\ncallout: {}", result.audio_src));
    }
    out
}

/// Prints UI changes to stdout and remembers the latest snapshot.
#[derive(Default)]
pub struct ConsoleUi {
    last: Mutex<Option<UiState>>,
}

impl ConsoleUi {
    pub fn snapshot(&self) -> Option<UiState> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl UiSink for ConsoleUi {
    fn emit(&self, ui: &UiState) {
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for line in changed_lines(last.as_ref(), ui) {
            println!("{}", line);
        }
        *last = Some(ui.clone());
    }
}

/// Read commands until `quit` or end of input, then request teardown.
pub async fn run_console(handle: SessionHandle, ui: Arc<ConsoleUi>) {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let snapshot = ui.snapshot();
        match command {
            Command::Help => println!("{}", HELP),
            Command::Status => match &snapshot {
                Some(state) => println!("{}", describe(state)),
                None => println!("Session not started yet"),
            },
            other => {
                let quitting = other == Command::Quit;
                let current = snapshot.map(|s| s.message).unwrap_or_default();
                if let Some(event) = command_to_event(other, &current) {
                    if let Err(e) = handle.send(event).await {
                        log::error!("Session loop is gone: {}", e);
                        return;
                    }
                }
                if quitting {
                    return;
                }
            }
        }
    }

    log::info!("Input closed, ending session");
    if let Err(e) = handle.send(Event::Exit).await {
        log::debug!("Session loop already stopped: {}", e);
    }
}
