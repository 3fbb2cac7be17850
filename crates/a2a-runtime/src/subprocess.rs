//! Subprocess plumbing shared by the host-integrated and generic backends.
//!
//! Grounded directly on `ClaudeCliProvider::send`'s spawn/stdin/wait_with_output
//! sequence: spawn via `tokio::process::Command`, write the payload to the
//! child's piped stdin then drop it to close, `wait_with_output().await`, and
//! treat `std::io::ErrorKind::NotFound` as "command not discoverable".

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Result, RuntimeError};

/// Spawn-probe a command's discoverability with a single `--version` call,
/// mirroring `ClaudeCliProvider::resolve_mcp_binary`'s priority-order
/// resolution. Callers cache the result at construction time.
pub async fn is_discoverable(command: &str) -> bool {
    if command.trim().is_empty() {
        return false;
    }
    match Command::new(command)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(mut child) => {
            let _ = child.wait().await;
            true
        }
        Err(e) => e.kind() != std::io::ErrorKind::NotFound,
    }
}

/// Spawn `command` with `args` (no stdin), collect stdout as text.
pub async fn run_with_args(command: &str, args: &[String], timeout: Duration) -> Result<String> {
    let mut cmd = Command::new(command);
    for a in args {
        cmd.arg(a);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    spawn_and_collect(cmd, None, timeout).await
}

/// Spawn `command` (no extra args), write `stdin_payload` to its stdin, then
/// close it and collect stdout as text.
pub async fn run_piped(command: &str, args: &[String], stdin_payload: &str, timeout: Duration) -> Result<String> {
    let mut cmd = Command::new(command);
    for a in args {
        cmd.arg(a);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    spawn_and_collect(cmd, Some(stdin_payload), timeout).await
}

async fn spawn_and_collect(mut cmd: Command, stdin_payload: Option<&str>, timeout: Duration) -> Result<String> {
    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RuntimeError::HostUnavailable(format!("command not found: {e}"))
        } else {
            RuntimeError::Io(e)
        }
    })?;

    if let Some(payload) = stdin_payload {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload.as_bytes()).await?;
            drop(stdin);
        }
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| RuntimeError::Timeout(timeout.as_millis() as u64))??;

    if !output.status.success() {
        return Err(RuntimeError::NonZeroExit {
            code: output.status.code().unwrap_or(1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Pull a response out of subprocess stdout: prefer the generic-mode JSON
/// contract (`response`/`text`/`message`/`result` fields), fall back to the
/// raw text for tools that just print.
pub fn extract_text(stdout: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(stdout) {
        for key in ["response", "text", "message", "result"] {
            if let Some(s) = json.get(key).and_then(|v| v.as_str()) {
                return s.to_string();
            }
        }
    }
    stdout.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_prefers_known_json_fields() {
        assert_eq!(extract_text(r#"{"response": "hi"}"#), "hi");
        assert_eq!(extract_text(r#"{"text": "hey"}"#), "hey");
        assert_eq!(extract_text("plain output"), "plain output");
    }

    #[tokio::test]
    async fn is_discoverable_false_for_nonexistent_binary() {
        assert!(!is_discoverable("definitely-not-a-real-command-xyz").await);
    }
}
