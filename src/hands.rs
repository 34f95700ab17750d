//! Everything that touches the operating system goes through here.
//!
//! Command lines are built per platform by [`Platform`] and executed by a
//! [`CommandRunner`], so tests and `--dry-run` can swap in [`DryRunRunner`]
//! without touching the classifier, dispatcher or task loop.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::google_search_url;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("could not start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// A program plus its arguments. No shell interpolation happens on our side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs a command and hands back its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &ShellCommand) -> Result<String, RunError>;
}

/// Spawns real processes.
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &ShellCommand) -> Result<String, RunError> {
        tracing::info!("[Hands] Executing: {}", command);

        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .output()
            .await
            .map_err(|source| RunError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(RunError::Failed {
                program: command.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Records commands instead of running them. Optionally answers with a fixed
/// stdout or fails every command whose program matches.
#[derive(Default)]
pub struct DryRunRunner {
    commands: Mutex<Vec<ShellCommand>>,
    stdout: String,
    failing_program: Option<String>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdout(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    pub fn failing(program: &str) -> Self {
        Self {
            failing_program: Some(program.to_string()),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<ShellCommand> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, command: &ShellCommand) -> Result<String, RunError> {
        tracing::info!("[Hands] (dry run) {}", command);
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.clone());
        }
        if self.failing_program.as_deref() == Some(command.program.as_str()) {
            return Err(RunError::Failed {
                program: command.program.clone(),
                status: "exit status: 1".to_string(),
                stderr: "dry run failure".to_string(),
            });
        }
        Ok(self.stdout.clone())
    }
}

/// OS family the command lines are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    pub fn open_url(self, url: &str) -> ShellCommand {
        match self {
            // Never through cmd.exe: `&`, `|` and `^` in a URL would split the command
            Platform::Windows => {
                ShellCommand::new("rundll32", ["url.dll,FileProtocolHandler", url])
            }
            Platform::MacOs => ShellCommand::new("open", [url]),
            Platform::Linux => ShellCommand::new("xdg-open", [url]),
        }
    }

    pub fn launch_program(self, command: &str) -> ShellCommand {
        match self {
            Platform::Windows => ShellCommand::new("cmd", ["/C", "start", "", command]),
            _ => ShellCommand::new(command, Vec::<String>::new()),
        }
    }

    pub fn kill_program(self, name: &str) -> ShellCommand {
        match self {
            Platform::Windows => {
                ShellCommand::new("taskkill", ["/IM".to_string(), format!("{}.exe", name), "/F".to_string()])
            }
            _ => ShellCommand::new("pkill", [name]),
        }
    }

    pub fn click(self, x: i32, y: i32) -> ShellCommand {
        match self {
            Platform::Windows => ShellCommand::new(
                "powershell",
                [
                    "-NoProfile".to_string(),
                    "-Command".to_string(),
                    format!(
                        "Add-Type -MemberDefinition '[DllImport(\"user32.dll\")] public static extern bool SetCursorPos(int x, int y); \
                         [DllImport(\"user32.dll\")] public static extern void mouse_event(int f, int dx, int dy, int d, int e);' \
                         -Name U32 -Namespace W; [W.U32]::SetCursorPos({x}, {y}); [W.U32]::mouse_event(2,0,0,0,0); [W.U32]::mouse_event(4,0,0,0,0)"
                    ),
                ],
            ),
            Platform::MacOs => ShellCommand::new("cliclick", [format!("c:{},{}", x, y)]),
            Platform::Linux => ShellCommand::new(
                "xdotool",
                ["mousemove".to_string(), x.to_string(), y.to_string(), "click".to_string(), "1".to_string()],
            ),
        }
    }

    pub fn type_text(self, text: &str) -> ShellCommand {
        match self {
            Platform::Windows => ShellCommand::new(
                "powershell",
                [
                    "-NoProfile".to_string(),
                    "-Command".to_string(),
                    format!(
                        "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.SendKeys]::SendWait('{}')",
                        escape_send_keys(text)
                    ),
                ],
            ),
            Platform::MacOs => ShellCommand::new(
                "osascript",
                [
                    "-e".to_string(),
                    format!(
                        "tell application \"System Events\" to keystroke \"{}\"",
                        text.replace('\\', "\\\\").replace('"', "\\\"")
                    ),
                ],
            ),
            Platform::Linux => ShellCommand::new("xdotool", ["type", "--", text]),
        }
    }

    pub fn screenshot(self, path: &Path) -> ShellCommand {
        let path = path.display().to_string();
        match self {
            Platform::Windows => ShellCommand::new(
                "powershell",
                [
                    "-NoProfile".to_string(),
                    "-Command".to_string(),
                    format!(
                        "Add-Type -AssemblyName System.Windows.Forms,System.Drawing; \
                         $b = [System.Windows.Forms.Screen]::PrimaryScreen.Bounds; \
                         $bmp = New-Object System.Drawing.Bitmap $b.Width, $b.Height; \
                         $g = [System.Drawing.Graphics]::FromImage($bmp); \
                         $g.CopyFromScreen($b.Location, [System.Drawing.Point]::Empty, $b.Size); \
                         $bmp.Save('{}', [System.Drawing.Imaging.ImageFormat]::Png)",
                        path.replace('\'', "''")
                    ),
                ],
            ),
            Platform::MacOs => ShellCommand::new("screencapture", ["-x".to_string(), path]),
            Platform::Linux => ShellCommand::new(
                "import",
                ["-window".to_string(), "root".to_string(), path],
            ),
        }
    }

    /// Tesseract is invoked the same way everywhere.
    pub fn ocr(self, image: &Path, lang: &str) -> ShellCommand {
        ShellCommand::new(
            "tesseract",
            [image.display().to_string(), "stdout".to_string(), "-l".to_string(), lang.to_string()],
        )
    }
}

/// SendKeys treats these characters as modifiers or grouping.
fn escape_send_keys(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => {
                out.push('{');
                out.push(c);
                out.push('}');
            }
            '\'' => out.push_str("''"),
            _ => out.push(c),
        }
    }
    out
}

/// Low-level OS primitives used by the dispatcher and the task loop.
#[derive(Clone)]
pub struct Hands {
    runner: Arc<dyn CommandRunner>,
    platform: Platform,
}

impl Hands {
    pub fn new(runner: Arc<dyn CommandRunner>, platform: Platform) -> Self {
        Self { runner, platform }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub async fn open_url(&self, url: &str) -> Result<(), RunError> {
        self.runner.run(&self.platform.open_url(url)).await.map(drop)
    }

    pub async fn search(&self, query: &str) -> Result<(), RunError> {
        self.open_url(&google_search_url(query)).await
    }

    pub async fn launch_program(&self, command: &str) -> Result<(), RunError> {
        self.runner
            .run(&self.platform.launch_program(command))
            .await
            .map(drop)
    }

    pub async fn kill_program(&self, name: &str) -> Result<(), RunError> {
        self.runner
            .run(&self.platform.kill_program(name))
            .await
            .map(drop)
    }

    pub async fn click(&self, x: i32, y: i32) -> Result<(), RunError> {
        self.runner.run(&self.platform.click(x, y)).await.map(drop)
    }

    pub async fn type_text(&self, text: &str) -> Result<(), RunError> {
        self.runner
            .run(&self.platform.type_text(text))
            .await
            .map(drop)
    }
}
