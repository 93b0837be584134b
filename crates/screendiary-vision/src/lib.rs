// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Typed adapters over the external tools the daemon leans on:
//! spectacle (screenshots), xrandr (display topology), KWin scripting
//! via gdbus + journalctl (active window), browser history databases
//! (current domain), tesseract (OCR) and ffmpeg (H.265 encode / frame
//! extraction). Every shell-out runs under a hard timeout.

pub mod active_window;
pub mod browser;
pub mod dedup;
pub mod monitor;
pub mod ocr;
pub mod screenshot;
pub mod video;

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured output of a tool run, with the exit code flattened to -1 on
/// signal death or timeout.
pub(crate) struct ToolOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Run an external tool with a hard timeout. The child is killed when
/// the timeout elapses; `None` is returned only when the process could
/// not be spawned or timed out.
pub(crate) async fn run_tool(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    timeout: Duration,
) -> Option<ToolOutput> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        command.env(key, value);
    }

    let child = command.spawn().ok()?;
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .ok()?
        .ok()?;

    Some(ToolOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
