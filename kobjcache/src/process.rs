/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs::File;
use std::process::{Command, Stdio};
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;

use crate::path::AbsolutePath;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("{label}: failed to start '{program}': {source}")]
    SpawnFailure {
        label: String,
        program: String,
        source: std::io::Error,
    },
    #[error("{label}: '{program}' exited with status {status}")]
    ChildFailure {
        label: String,
        program: String,
        status: String,
    },
    #[error("{label}: '{program}' timed out after {timeout:?}")]
    TimedOut {
        label: String,
        program: String,
        timeout: Duration,
    },
    #[error("{label}: failed to redirect stdout to '{path}': {source}")]
    RedirectFailure {
        label: String,
        path: String,
        source: std::io::Error,
    },
}

/// One subprocess invocation: an argv and a human-readable label used in diagnostics.
pub struct ProcessInvocation<'a> {
    pub argv: &'a [String],
    pub label: &'a str,
    pub stdout_redirect: Option<&'a AbsolutePath>,
    pub timeout: Option<Duration>,
}

/// Blocks until the child exits; non-zero exit, spawn failure, or (if `timeout` is set)
/// exceeding it are all reported as [`ExecError`] so the caller can turn any of them into a
/// fatal diagnostic uniformly.
///
/// `std::process::Child::wait` already retries internally on `EINTR`, so no explicit retry
/// loop is needed here to satisfy that part of the contract.
pub fn spawn_and_wait(invocation: ProcessInvocation<'_>) -> Result<(), ExecError> {
    let ProcessInvocation {
        argv,
        label,
        stdout_redirect,
        timeout,
    } = invocation;
    let program = argv.first().cloned().unwrap_or_default();

    let mut command = Command::new(&program);
    command.args(&argv[1.min(argv.len())..]);

    let stdout = match stdout_redirect {
        Some(path) => {
            let file = create_truncated(path).map_err(|source| ExecError::RedirectFailure {
                label: label.to_owned(),
                path: path.to_string(),
                source,
            })?;
            Stdio::from(file)
        }
        None => Stdio::inherit(),
    };
    command.stdout(stdout);

    info!("{}: spawning '{}'", label, program);
    let mut child = command.spawn().map_err(|source| ExecError::SpawnFailure {
        label: label.to_owned(),
        program: program.clone(),
        source,
    })?;

    let status = match timeout {
        None => child.wait().map_err(|source| ExecError::SpawnFailure {
            label: label.to_owned(),
            program: program.clone(),
            source,
        })?,
        Some(timeout) => wait_with_timeout(&mut child, timeout, label, &program)?,
    };

    debug!("{}: '{}' exited with {:?}", label, program, status.code());
    if status.success() {
        Ok(())
    } else {
        Err(ExecError::ChildFailure {
            label: label.to_owned(),
            program,
            status: format!("{:?}", status.code()),
        })
    }
}

fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
    label: &str,
    program: &str,
) -> Result<std::process::ExitStatus, ExecError> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(|source| ExecError::SpawnFailure {
            label: label.to_owned(),
            program: program.to_owned(),
            source,
        })? {
            return Ok(status);
        }
        if std::time::Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExecError::TimedOut {
                label: label.to_owned(),
                program: program.to_owned(),
                timeout,
            });
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Creates (or truncates) the stdout-redirect target at mode `0o777 & !umask`, matching the
/// original tool's `open(..., 0777)`; the umask still applies, same as a shell redirect would.
#[cfg(unix)]
fn create_truncated(path: &AbsolutePath) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o777)
        .open(path.as_ref())
}

#[cfg(not(unix))]
fn create_truncated(path: &AbsolutePath) -> std::io::Result<File> {
    File::create(path.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_exit_is_ok() {
        let argv = vec!["true".to_string()];
        let result = spawn_and_wait(ProcessInvocation {
            argv: &argv,
            label: "test",
            stdout_redirect: None,
            timeout: None,
        });
        assert!(result.is_ok());
    }

    #[test]
    fn nonzero_exit_is_child_failure() {
        let argv = vec!["false".to_string()];
        let result = spawn_and_wait(ProcessInvocation {
            argv: &argv,
            label: "test",
            stdout_redirect: None,
            timeout: None,
        });
        assert!(matches!(result, Err(ExecError::ChildFailure { .. })));
    }

    #[test]
    fn missing_program_is_spawn_failure() {
        let argv = vec!["kobjcache-definitely-not-a-real-binary".to_string()];
        let result = spawn_and_wait(ProcessInvocation {
            argv: &argv,
            label: "test",
            stdout_redirect: None,
            timeout: None,
        });
        assert!(matches!(result, Err(ExecError::SpawnFailure { .. })));
    }

    #[test]
    fn stdout_redirect_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = AbsolutePath::new(&dir.path().join("out.txt"));
        let argv = vec!["echo".to_string(), "hi".to_string()];
        spawn_and_wait(ProcessInvocation {
            argv: &argv,
            label: "test",
            stdout_redirect: Some(&out),
            timeout: None,
        })
        .unwrap();
        let contents = std::fs::read_to_string(out.as_ref()).unwrap();
        assert_eq!(contents.trim(), "hi");
    }

    #[cfg(unix)]
    #[test]
    fn stdout_redirect_file_is_created_world_writable_modulo_umask() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let out = AbsolutePath::new(&dir.path().join("out.txt"));
        let argv = vec!["true".to_string()];
        spawn_and_wait(ProcessInvocation {
            argv: &argv,
            label: "test",
            stdout_redirect: Some(&out),
            timeout: None,
        })
        .unwrap();

        let mode = std::fs::metadata(out.as_ref()).unwrap().permissions().mode();
        let umask = unsafe {
            let mask = libc::umask(0);
            libc::umask(mask);
            mask as u32
        };
        assert_eq!(mode & 0o777, 0o777 & !umask);
    }

    #[test]
    fn long_running_child_times_out() {
        let argv = vec!["sleep".to_string(), "5".to_string()];
        let result = spawn_and_wait(ProcessInvocation {
            argv: &argv,
            label: "test",
            stdout_redirect: None,
            timeout: Some(Duration::from_millis(50)),
        });
        assert!(matches!(result, Err(ExecError::TimedOut { .. })));
    }
}
