//! Process plumbing shared by the build driver and hook runner, grounded in
//! `sbuild/src/builder.rs`'s `setup_cmd_logging`: stdout/stderr are read on
//! separate threads into one `mpsc` channel, and a third thread drains the
//! channel into the per-package log file while mirroring lines through
//! `tracing::debug!`.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::error::{io_err, Error, Result};

enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Runs `command`, appending combined stdout/stderr to `log_path` and
/// mirroring each line through `tracing::debug!`. Returns an error naming
/// `step` if the command exits non-zero.
pub fn run_logged(mut command: Command, log_path: &Path, package: &str, step: &str) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent.to_path_buf(), e))?;
    }

    let mut child: Child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| io_err(log_path.to_path_buf(), e))?;

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let (tx, rx) = mpsc::channel::<OutputLine>();
    let tx_err = tx.clone();

    let stdout_handle = thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(|l| l.ok()) {
            let _ = tx.send(OutputLine::Stdout(line));
        }
    });
    let stderr_handle = thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
            let _ = tx_err.send(OutputLine::Stderr(line));
        }
    });

    let mut log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| io_err(log_path.to_path_buf(), e))?;

    let drain_handle = thread::spawn(move || {
        while let Ok(line) = rx.recv() {
            let text = match line {
                OutputLine::Stdout(l) => l,
                OutputLine::Stderr(l) => l,
            };
            tracing::debug!("{text}");
            let _ = writeln!(log_file, "{text}");
        }
    });

    stdout_handle.join().expect("stdout reader thread panicked");
    stderr_handle.join().expect("stderr reader thread panicked");
    let status = child.wait().map_err(|e| io_err(log_path.to_path_buf(), e))?;
    drain_handle.join().expect("log drain thread panicked");

    if !status.success() {
        return Err(Error::Build {
            package: package.to_string(),
            step: step.to_string(),
            status: status.code().unwrap_or(-1),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn successful_command_appends_output_to_log() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("pkg-1.0.log");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo hello; echo world 1>&2");

        run_logged(cmd, &log_path, "pkg-1.0", "test-step").unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("hello"));
        assert!(contents.contains("world"));
    }

    #[test]
    fn failing_command_is_a_build_error() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("pkg-1.0.log");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exit 7");

        let err = run_logged(cmd, &log_path, "pkg-1.0", "configure").unwrap_err();
        match err {
            Error::Build { status, step, .. } => {
                assert_eq!(status, 7);
                assert_eq!(step, "configure");
            }
            other => panic!("expected Build error, got {other:?}"),
        }
    }
}
