//! Thin wrapper around [`std::process::Command`] for the system utilities the
//! workflow drives.
//!
//! Every invocation captures both output streams so that a failing command can
//! be reported with exactly what it printed.
use crate::error::CommandError;
use std::ffi::OsStr;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Joins a program and its arguments into a printable command line.
pub fn display_command<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

/// Concatenates stdout and stderr of a finished process.
pub fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.trim_end().to_string()
}

/// Runs `program` to completion and returns its combined output.
///
/// A non-zero exit status is turned into a [`CommandError::Failed`] carrying
/// the combined output.
pub fn run<S: AsRef<OsStr>>(program: &str, args: &[S]) -> Result<String, CommandError> {
    run_with_input(program, args, None)
}

/// Like [`run`], but writes `input` to the child's standard input first.
pub fn run_with_input<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    input: Option<&[u8]>,
) -> Result<String, CommandError> {
    let command = display_command(program, args);
    debug!(%command, "running");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

    if let Some(input) = input {
        // Dropping the handle closes the pipe so the child sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .map_err(|source| CommandError::Spawn {
                    command: command.clone(),
                    source,
                })?;
        }
    }

    let output = child
        .wait_with_output()
        .map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;
    let text = combined_output(&output);

    if !output.status.success() {
        debug!(%command, status = %output.status, "command failed");
        return Err(CommandError::Failed {
            command,
            status: output.status,
            output: text,
        });
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        assert_eq!(
            display_command("mount", &["-o", "loop", "a.iso", "/mnt/iso"]),
            "mount -o loop a.iso /mnt/iso"
        );
        assert_eq!(display_command::<&str>("lsblk", &[]), "lsblk");
    }

    #[test]
    fn test_run_captures_both_streams() {
        let output = run("sh", &["-c", "echo out; echo err >&2"]).unwrap();
        assert_eq!(output, "out\nerr");
    }

    #[test]
    fn test_run_reports_failure_output() {
        let err = run("sh", &["-c", "echo boom >&2; exit 3"]).unwrap_err();
        match err {
            CommandError::Failed { status, output, .. } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(output, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_with_input_feeds_stdin() {
        let output = run_with_input("cat", &[] as &[&str], Some(b"o\nn\n")).unwrap();
        assert_eq!(output, "o\nn");
    }

    #[test]
    fn test_run_missing_program() {
        let err = run("bootstick-no-such-program", &["x"]).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
