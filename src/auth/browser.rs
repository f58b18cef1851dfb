//! Launching the user's browser at the consent page
//!
//! The flow only needs "ask the OS to open this URL". [`BrowserLauncher`]
//! is the seam; [`SystemBrowser`] runs the platform's URL opener and
//! [`PrintOnly`] does nothing, for headless use where the user copies the
//! printed URL by hand.

use async_trait::async_trait;

/// Outcome of a launch attempt. Informational only: the flow never fails
/// because of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The opener process ran and exited with this code (`None` if killed
    /// by a signal).
    Exited(Option<i32>),
    /// No process was started.
    Skipped,
}

/// Opens a URL for the user.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Opens `url` and waits for the launcher itself (not the browser
    /// session) to finish.
    async fn launch(&self, url: &str) -> std::io::Result<LaunchOutcome>;
}

/// Runs the OS default URL opener: `open` on macOS, the `url.dll` protocol
/// handler on Windows, `xdg-open` elsewhere.
#[derive(Debug, Clone, Default)]
pub struct SystemBrowser {
    program: Option<String>,
}

impl SystemBrowser {
    /// Uses the platform default opener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `program` instead of the platform default; it receives the URL
    /// as its only argument.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    fn command(&self, url: &str) -> tokio::process::Command {
        let (program, args) = match &self.program {
            Some(program) => (program.as_str(), vec![url.to_string()]),
            None => platform_opener(std::env::consts::OS, url),
        };
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        cmd
    }
}

/// Program and arguments that open `url` on `os` (a `std::env::consts::OS`
/// value).
///
/// The URL is always passed as a single argument to a program that is not a
/// shell. Going through `cmd /C start` would let `cmd.exe` split the query
/// string at every `&`.
fn platform_opener(os: &str, url: &str) -> (&'static str, Vec<String>) {
    match os {
        "macos" => ("open", vec![url.to_string()]),
        "windows" => (
            "rundll32",
            vec!["url.dll,FileProtocolHandler".to_string(), url.to_string()],
        ),
        _ => ("xdg-open", vec![url.to_string()]),
    }
}

#[async_trait]
impl BrowserLauncher for SystemBrowser {
    async fn launch(&self, url: &str) -> std::io::Result<LaunchOutcome> {
        let mut cmd = self.command(url);
        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let status = cmd.status().await?;
        Ok(LaunchOutcome::Exited(status.code()))
    }
}

/// Never starts a process.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintOnly;

#[async_trait]
impl BrowserLauncher for PrintOnly {
    async fn launch(&self, _url: &str) -> std::io::Result<LaunchOutcome> {
        Ok(LaunchOutcome::Skipped)
    }
}
