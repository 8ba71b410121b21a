//! Pane transport: the multiplexer operations the driver consumes.
//!
//! Session lifecycle (create/attach/kill) lives elsewhere; this is only
//! input, capture and existence probing for an already running pane.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use crate::capability::CaptureCapability;
use crate::error::PaneError;

/// Operations on a driven pane, addressed by tmux target (`session:win.pane`).
///
/// Abstracted for testability; [`ShellTmuxTransport`] shells out to tmux and
/// [`SimulatedPane`](crate::mock::SimulatedPane) runs in memory.
pub trait PaneTransport: Send + Sync {
    /// Type `text` into the pane without submitting it.
    fn send_text(&self, target: &str, text: &str) -> Result<(), PaneError>;

    /// Press the submit key (Enter).
    fn send_submit_key(&self, target: &str) -> Result<(), PaneError>;

    /// Every line the multiplexer retains for the pane, scrollback included.
    fn capture_full_history(&self, target: &str) -> Result<Vec<String>, PaneError>;

    /// Only the lines currently in the viewport.
    fn capture_visible(&self, target: &str) -> Result<Vec<String>, PaneError>;

    fn session_exists(&self, target: &str) -> bool;

    fn capability(&self, target: &str) -> Result<CaptureCapability, PaneError>;
}

/// tmux transport that execs the `tmux` binary.
#[derive(Debug, Clone)]
pub struct ShellTmuxTransport {
    binary: String,
}

impl Default for ShellTmuxTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellTmuxTransport {
    pub fn new() -> Self {
        Self {
            binary: "tmux".to_string(),
        }
    }

    /// Use a different tmux binary (e.g. a wrapper with `-L socket`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, PaneError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| self.exec_error(e))?;
        self.check_output(args, output)
    }

    /// Like [`run`](Self::run), writing `input` to the child's stdin.
    fn run_with_stdin(&self, args: &[&str], input: &str) -> Result<String, PaneError> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.exec_error(e))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| PaneError::Command {
                    message: format!("failed to write to {} stdin: {e}", self.binary),
                })?;
        }
        let output = child.wait_with_output().map_err(|e| self.exec_error(e))?;
        self.check_output(args, output)
    }

    fn exec_error(&self, err: std::io::Error) -> PaneError {
        PaneError::Command {
            message: format!("failed to execute {}: {err}", self.binary),
        }
    }

    fn check_output(&self, args: &[&str], output: Output) -> Result<String, PaneError> {
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PaneError::Command {
                message: format!(
                    "{} {} failed with {}: {}",
                    self.binary,
                    args.first().copied().unwrap_or_default(),
                    output.status,
                    stderr.trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a targeted command, reporting `PaneGone` when the pane vanished.
    fn run_targeted(&self, target: &str, args: &[&str]) -> Result<String, PaneError> {
        require_target(target)?;
        let result = self.run(args);
        self.classify(target, result)
    }

    fn classify<T>(&self, target: &str, result: Result<T, PaneError>) -> Result<T, PaneError> {
        result.map_err(|err| {
            if self.session_exists(target) {
                err
            } else {
                PaneError::PaneGone {
                    target: target.to_string(),
                }
            }
        })
    }

    fn capture(&self, target: &str, with_history: bool) -> Result<Vec<String>, PaneError> {
        let mut args = vec!["capture-pane", "-p", "-J", "-t", target];
        if with_history {
            args.extend(["-S", "-"]);
        }
        let text = self.run_targeted(target, &args)?;
        Ok(text.lines().map(str::to_string).collect())
    }
}

impl PaneTransport for ShellTmuxTransport {
    fn send_text(&self, target: &str, text: &str) -> Result<(), PaneError> {
        require_target(target)?;
        let (load, paste) = input_commands(target, text);
        let loaded = self.run_with_stdin(&load, text);
        self.classify(target, loaded)?;
        self.run_targeted(target, &paste)?;
        Ok(())
    }

    fn send_submit_key(&self, target: &str) -> Result<(), PaneError> {
        self.run_targeted(target, &["send-keys", "-t", target, "Enter"])?;
        Ok(())
    }

    fn capture_full_history(&self, target: &str) -> Result<Vec<String>, PaneError> {
        self.capture(target, true)
    }

    fn capture_visible(&self, target: &str) -> Result<Vec<String>, PaneError> {
        self.capture(target, false)
    }

    fn session_exists(&self, target: &str) -> bool {
        if target.trim().is_empty() {
            return false;
        }
        self.run(&["display-message", "-p", "-t", target, "#{pane_id}"])
            .map(|out| !out.trim().is_empty())
            .unwrap_or(false)
    }

    fn capability(&self, target: &str) -> Result<CaptureCapability, PaneError> {
        let out = self.run_targeted(
            target,
            &["display-message", "-p", "-t", target, "#{history_limit}"],
        )?;
        let limit = out.trim().parse::<usize>().map_err(|e| PaneError::Command {
            message: format!("failed to parse history_limit {:?}: {e}", out.trim()),
        })?;
        Ok(CaptureCapability::from_history_limit(limit))
    }
}

const INPUT_BUFFER: &str = "parley";

/// The load and paste invocations that type `text` into `target`.
///
/// The text never appears in argv, where tmux would read a leading `-` as a
/// flag and a trailing `;` as a command separator. `load-buffer -` takes it
/// from stdin. Multi-line input is pasted bracketed so embedded newlines do
/// not submit early.
fn input_commands<'a>(target: &'a str, text: &str) -> (Vec<&'a str>, Vec<&'a str>) {
    let load = vec!["load-buffer", "-b", INPUT_BUFFER, "-"];
    let mut paste = vec!["paste-buffer", "-d", "-b", INPUT_BUFFER, "-t", target];
    if text.contains('\n') {
        paste.insert(1, "-p");
    }
    (load, paste)
}

fn require_target(target: &str) -> Result<(), PaneError> {
    if target.trim().is_empty() {
        return Err(PaneError::Command {
            message: "target is required".to_string(),
        });
    }
    Ok(())
}
