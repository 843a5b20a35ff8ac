//! Executable entry points found on the search path.
//!
//! The executable is spawned once per invocation with the method name as its
//! first argument. The payload is written to stdin and stdout is the result.

use crate::interfaces::{Handler, InvocationError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Handler backed by an executable file.
pub struct ExecutableHandler {
    program: PathBuf,
    method: String,
    working_dir: PathBuf,
}

impl ExecutableHandler {
    pub fn new(program: PathBuf, method: impl Into<String>, working_dir: PathBuf) -> Self {
        Self {
            program,
            method: method.into(),
            working_dir,
        }
    }
}

#[async_trait]
impl Handler for ExecutableHandler {
    async fn invoke(&self, payload: &[u8]) -> Result<Vec<u8>, InvocationError> {
        debug!("Spawning {} {}", self.program.display(), self.method);

        let mut child = Command::new(&self.program)
            .arg(&self.method)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                InvocationError::new(format!(
                    "Failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stdin = child.stdin.take();
        let input = payload.to_vec();
        let writer = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            let result = stdin.write_all(&input).await;
            drop(stdin);
            match result {
                // The program may exit without reading its input
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };

        let (written, output) = tokio::join!(writer, child.wait_with_output());

        let output = output.map_err(|e| {
            InvocationError::new(format!("Failed to wait for {}: {}", self.program.display(), e))
        })?;
        written.map_err(|e| InvocationError::new(format!("Failed to write payload: {}", e)))?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("{} exited with {}", self.program.display(), output.status)
        } else {
            stderr
        };
        Err(InvocationError::new(message))
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_executable_echoes_stdin() {
        let dir = TempDir::new().unwrap();
        let program = script(dir.path(), "echo-handler", "cat");
        let handler = ExecutableHandler::new(program, "handle", dir.path().to_path_buf());

        let result = handler.invoke(b"hello").await.unwrap();
        assert_eq!(result, b"hello");
    }

    #[tokio::test]
    async fn test_executable_receives_method_argument() {
        let dir = TempDir::new().unwrap();
        let program = script(dir.path(), "method-handler", "printf '%s' \"$1\"");
        let handler = ExecutableHandler::new(program, "handleRequest", dir.path().to_path_buf());

        let result = handler.invoke(b"").await.unwrap();
        assert_eq!(result, b"handleRequest");
    }

    #[tokio::test]
    async fn test_executable_failure_uses_stderr() {
        let dir = TempDir::new().unwrap();
        let program = script(dir.path(), "failing", "echo 'bad payload' >&2; exit 3");
        let handler = ExecutableHandler::new(program, "handle", dir.path().to_path_buf());

        let err = handler.invoke(b"x").await.unwrap_err();
        assert_eq!(err.message, "bad payload");
        assert_eq!(err.error_type, "RuntimeError");
    }

    #[tokio::test]
    async fn test_executable_failure_without_stderr() {
        let dir = TempDir::new().unwrap();
        let program = script(dir.path(), "silent", "exit 7");
        let handler = ExecutableHandler::new(program, "handle", dir.path().to_path_buf());

        let err = handler.invoke(b"").await.unwrap_err();
        assert!(err.message.contains("exited with"));
    }

    #[tokio::test]
    async fn test_executable_ignoring_stdin() {
        let dir = TempDir::new().unwrap();
        let program = script(dir.path(), "constant", "printf ok");
        let handler = ExecutableHandler::new(program, "handle", dir.path().to_path_buf());

        let payload = vec![b'a'; 256 * 1024];
        let result = handler.invoke(&payload).await.unwrap();
        assert_eq!(result, b"ok");
    }
}
