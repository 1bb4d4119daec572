//! Python runtime manager for the external trainer.
//!
//! Runs Python subprocesses with a JSON payload on stdin, a per-run
//! environment, a timeout, and a cancellation token. The child is killed
//! whenever the run is abandoned.

use crate::config::PythonConfig;
use crate::error::XdgError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Conventional exit code of a process stopped by Ctrl-C (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Trailing stderr kept for the error message of a failed run.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// Managed Python subprocess runner.
#[derive(Debug, Clone)]
pub struct PythonRuntime {
    python_path: PathBuf,
    venv_path: Option<PathBuf>,
    workdir: PathBuf,
    timeout: Duration,
}

impl PythonRuntime {
    /// Runtime using `python3` from `PATH`.
    pub fn new(workdir: PathBuf) -> Self {
        Self {
            python_path: PathBuf::from("python3"),
            venv_path: None,
            workdir,
            timeout: Duration::from_secs(24 * 3600),
        }
    }

    /// Runtime built from the `[python]` config section. A virtual
    /// environment is auto-detected when none is configured.
    ///
    /// The child runs inside `trainer_dir`, so relative interpreter and venv
    /// paths are made absolute against the launcher's working directory first.
    pub fn from_config(config: &PythonConfig) -> Self {
        let base = std::env::current_dir().unwrap_or_default();
        Self::from_config_in(config, &base)
    }

    fn from_config_in(config: &PythonConfig, base: &Path) -> Self {
        let python_path = match &config.python_path {
            // A bare name is looked up on PATH.
            Some(path) if path.components().count() > 1 => base.join(path),
            Some(path) => path.clone(),
            None => PathBuf::from("python3"),
        };
        let venv_path = match &config.venv_path {
            Some(path) => Some(base.join(path)),
            None => detect_venv(base),
        };
        Self {
            python_path,
            venv_path,
            workdir: config.trainer_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn workdir(&self) -> &PathBuf {
        &self.workdir
    }

    /// Get the effective Python command (accounting for venv).
    pub fn python_cmd(&self) -> PathBuf {
        if let Some(venv) = &self.venv_path {
            let bin_dir = if cfg!(windows) { "Scripts" } else { "bin" };
            venv.join(bin_dir).join("python")
        } else {
            self.python_path.clone()
        }
    }

    /// Run an inline script, writing `input` as JSON to its stdin.
    ///
    /// The child's stdout goes straight to the console. Stderr is forwarded to
    /// the console as it arrives, and its tail is returned in the error when
    /// the script exits non-zero. Cancelling `cancel` kills the child and
    /// yields [`XdgError::Cancelled`]; so does a child that was itself
    /// interrupted.
    pub async fn run_script(
        &self,
        script: &str,
        input: &serde_json::Value,
        envs: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<(), XdgError> {
        let input_json = serde_json::to_vec(input)?;
        debug!(
            script_len = script.len(),
            input_bytes = input_json.len(),
            python = %self.python_cmd().display(),
            "Running Python script"
        );

        let mut command = Command::new(self.python_cmd());
        command
            .args(["-c", script])
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in envs {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| XdgError::python(format!("Failed to spawn Python: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that dies early closes the pipe; its stderr explains why.
            if let Err(e) = stdin.write_all(&input_json).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
            drop(stdin);
        }

        let stderr = child.stderr.take();
        let run = async {
            let tail = async {
                match stderr {
                    Some(pipe) => tee_tail(pipe, tokio::io::stderr(), STDERR_TAIL_BYTES).await,
                    None => Vec::new(),
                }
            };
            let (status, tail) = tokio::join!(child.wait(), tail);
            let status =
                status.map_err(|e| XdgError::python(format!("Failed to wait for Python: {e}")))?;

            if was_interrupted(&status) {
                return Err(XdgError::Cancelled);
            }
            if !status.success() {
                let stderr = String::from_utf8_lossy(&tail);
                return Err(XdgError::python(format!(
                    "Python script failed (exit {status}): {}",
                    stderr.trim()
                )));
            }
            Ok(())
        };

        let finished = tokio::select! {
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(self.timeout, run) => Some(result),
        };

        match finished {
            Some(Ok(result)) => result,
            Some(Err(_)) => {
                let _ = child.kill().await;
                Err(XdgError::Timeout(format!(
                    "Python script timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
            None => {
                debug!(pid = ?child.id(), "Killing Python child on cancellation");
                let _ = child.kill().await;
                Err(XdgError::Cancelled)
            }
        }
    }
}

/// Copy `source` to `sink` as it arrives and return the last `limit` bytes.
async fn tee_tail<R, W>(mut source: R, mut sink: W, limit: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut tail = Vec::with_capacity(limit.min(4096));
    let mut buf = [0u8; 4096];
    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let chunk = &buf[..n];
        // A closed console must not stop the child from being drained.
        let _ = sink.write_all(chunk).await;
        tail.extend_from_slice(chunk);
        if tail.len() > limit {
            let excess = tail.len() - limit;
            tail.drain(..excess);
        }
    }
    let _ = sink.flush().await;
    tail
}

#[cfg(unix)]
fn was_interrupted(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.code() == Some(INTERRUPTED_EXIT_CODE) || status.signal() == Some(2)
}

#[cfg(not(unix))]
fn was_interrupted(status: &std::process::ExitStatus) -> bool {
    status.code() == Some(INTERRUPTED_EXIT_CODE)
}

/// Detect a virtual environment: `$VIRTUAL_ENV`, then `.venv` or `venv`
/// under `base`.
fn detect_venv(base: &Path) -> Option<PathBuf> {
    if let Some(venv) = std::env::var_os("VIRTUAL_ENV") {
        let path = PathBuf::from(venv);
        if path.exists() {
            return Some(path);
        }
    }

    [".venv", "venv"]
        .iter()
        .map(|name| base.join(name))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Subprocess tests need a real interpreter; like interpreter detection
    /// they pass vacuously on machines without one.
    fn python3_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn runtime_in(dir: &Path) -> PythonRuntime {
        PythonRuntime::new(dir.to_path_buf())
    }

    async fn run(runtime: &PythonRuntime, script: &str) -> Result<(), XdgError> {
        runtime
            .run_script(script, &serde_json::json!({}), &[], &CancellationToken::new())
            .await
    }

    #[test]
    fn test_python_cmd_prefers_venv() {
        let runtime = PythonRuntime {
            venv_path: Some(PathBuf::from("/opt/env")),
            ..PythonRuntime::new(PathBuf::from("."))
        };
        let bin_dir = if cfg!(windows) { "Scripts" } else { "bin" };
        assert_eq!(
            runtime.python_cmd(),
            PathBuf::from("/opt/env").join(bin_dir).join("python")
        );
        assert_eq!(
            PythonRuntime::new(PathBuf::from(".")).python_cmd(),
            PathBuf::from("python3")
        );
    }

    #[test]
    fn test_from_config_uses_timeout_and_dir() {
        let config = PythonConfig {
            python_path: Some(PathBuf::from("/usr/bin/python3.11")),
            venv_path: Some(PathBuf::from("/opt/env")),
            trainer_dir: PathBuf::from("/srv/trainer"),
            timeout_secs: 90,
            gating_masks: true,
        };
        let runtime = PythonRuntime::from_config(&config);
        assert_eq!(runtime.timeout, Duration::from_secs(90));
        assert_eq!(runtime.workdir(), &PathBuf::from("/srv/trainer"));
        assert_eq!(runtime.python_path, PathBuf::from("/usr/bin/python3.11"));
        assert_eq!(runtime.venv_path, Some(PathBuf::from("/opt/env")));
    }

    #[test]
    fn test_relative_paths_resolve_against_launcher_dir() {
        let launcher_dir = Path::new("/home/me/experiments");
        let config = PythonConfig {
            python_path: Some(PathBuf::from("tools/python")),
            venv_path: Some(PathBuf::from(".venv")),
            trainer_dir: PathBuf::from("../InternalGating"),
            ..PythonConfig::default()
        };
        let runtime = PythonRuntime::from_config_in(&config, launcher_dir);
        assert_eq!(runtime.python_path, launcher_dir.join("tools/python"));
        assert_eq!(runtime.venv_path, Some(launcher_dir.join(".venv")));
        assert_eq!(runtime.workdir(), &PathBuf::from("../InternalGating"));

        let bare = PythonConfig {
            python_path: Some(PathBuf::from("python3.11")),
            ..PythonConfig::default()
        };
        let runtime = PythonRuntime::from_config_in(&bare, launcher_dir);
        assert_eq!(runtime.python_path, PathBuf::from("python3.11"));
    }

    #[test]
    fn test_detected_venv_is_absolute() {
        if std::env::var_os("VIRTUAL_ENV").is_some() {
            return;
        }
        let launcher_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(launcher_dir.path().join(".venv")).unwrap();

        let runtime = PythonRuntime::from_config_in(&PythonConfig::default(), launcher_dir.path());
        assert_eq!(runtime.venv_path, Some(launcher_dir.path().join(".venv")));
        assert!(runtime.python_cmd().is_absolute());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_venv_next_to_launcher_runs_from_other_trainer_dir() {
        if !python3_available() {
            return;
        }
        let output = std::process::Command::new("python3")
            .args(["-c", "import sys; print(sys.executable)"])
            .output()
            .unwrap();
        let interpreter = PathBuf::from(String::from_utf8(output.stdout).unwrap().trim());

        let launcher_dir = tempfile::tempdir().unwrap();
        let trainer_dir = tempfile::tempdir().unwrap();
        let bin = launcher_dir.path().join(".venv/bin");
        std::fs::create_dir_all(&bin).unwrap();
        let shim = bin.join("python");
        std::os::unix::fs::symlink(&interpreter, &shim).unwrap();

        let config = PythonConfig {
            venv_path: Some(PathBuf::from(".venv")),
            trainer_dir: trainer_dir.path().to_path_buf(),
            ..PythonConfig::default()
        };
        let runtime = PythonRuntime::from_config_in(&config, launcher_dir.path());
        assert_eq!(runtime.python_cmd(), shim);
        run(&runtime, "pass").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_python_error() {
        let runtime = PythonRuntime {
            python_path: PathBuf::from("/nonexistent/python-xdgate"),
            ..PythonRuntime::new(std::env::temp_dir())
        };
        let err = run(&runtime, "pass").await.unwrap_err();
        assert!(matches!(err, XdgError::Python(_)));
    }

    #[tokio::test]
    async fn test_tee_forwards_everything_and_keeps_tail() {
        let input: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut console = Vec::new();
        let tail = tee_tail(&input[..], &mut console, 100).await;
        assert_eq!(console, input);
        assert_eq!(tail, &input[input.len() - 100..]);
    }

    #[tokio::test]
    async fn test_failure_reports_stderr_tail() {
        if !python3_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = run(
            &runtime_in(dir.path()),
            "import logging, sys\nlogging.warning('epoch 1 loss 0.3')\nsys.stderr.write('CUDA out of memory\\n')\nsys.exit(3)",
        )
        .await
        .unwrap_err();
        let XdgError::Python(message) = err else {
            panic!("expected a Python error, got {err:?}");
        };
        assert!(message.contains("epoch 1 loss 0.3"));
        assert!(message.contains("CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_success_with_stderr_output() {
        if !python3_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let script = "import logging, json, sys\n\
                      payload = json.load(sys.stdin)\n\
                      assert payload == {}\n\
                      logging.warning('epoch 1 loss 0.3')\n\
                      print('stdout line')";
        run(&runtime_in(dir.path()), script).await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_code_130_is_cancelled() {
        if !python3_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = run(&runtime_in(dir.path()), "import sys; sys.exit(130)")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_death_by_sigint_is_cancelled() {
        if !python3_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let script = "import os, signal\n\
                      signal.signal(signal.SIGINT, signal.SIG_DFL)\n\
                      os.kill(os.getpid(), signal.SIGINT)";
        let err = run(&runtime_in(dir.path()), script).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_token_kills_running_child() {
        if !python3_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let runtime = runtime_in(dir.path());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = runtime
            .run_script("import time; time.sleep(60)", &serde_json::json!({}), &[], &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        if !python3_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let runtime = PythonRuntime {
            timeout: Duration::from_millis(200),
            ..runtime_in(dir.path())
        };
        let err = run(&runtime, "import time; time.sleep(60)").await.unwrap_err();
        assert!(matches!(err, XdgError::Timeout(_)));
    }
}
