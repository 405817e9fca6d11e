//! Opens resource locators in the system browser

use std::process::Command;

#[derive(Debug, Clone)]
pub enum OpenError {
    LaunchFailed(String),
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenError::LaunchFailed(e) => write!(f, "Failed to launch browser: {}", e),
        }
    }
}

impl std::error::Error for OpenError {}

/// Opens a URL in a new browsing context.
pub trait UrlOpener: Send + Sync + 'static {
    fn open(&self, url: &str) -> Result<(), OpenError>;
}

/// Hands the URL to the desktop's default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> Result<(), OpenError> {
        log::info!("Opening {}", url);
        launcher(url)
            .spawn()
            .map(|_| ())
            .map_err(|e| OpenError::LaunchFailed(e.to_string()))
    }
}

#[cfg(target_os = "macos")]
fn launcher(url: &str) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(url);
    cmd
}

#[cfg(target_os = "windows")]
fn launcher(url: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", "", url]);
    cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn launcher(url: &str) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(url);
    cmd
}
