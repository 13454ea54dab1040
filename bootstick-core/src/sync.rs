//! Copies the mounted image onto the target filesystem with `rsync`.
//!
//! `rsync --info=progress2` reports whole-transfer progress on stdout,
//! rewriting a single line with carriage returns. Those records are parsed
//! and handed to the caller as they arrive.
use crate::command::display_command;
use crate::error::CommandError;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// One `--info=progress2` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyProgress {
    /// Bytes transferred so far.
    pub bytes: u64,
    /// Estimated completion, 0 to 100.
    pub percent: u8,
    /// Current transfer rate as printed by rsync (e.g. "10.00MB/s").
    pub rate: String,
}

/// Parses a record such as `  1,234,567  45%   10.00MB/s    0:00:10 (xfr#3, to-chk=5/20)`.
pub fn parse_progress(record: &str) -> Option<CopyProgress> {
    let mut fields = record.split_whitespace();
    let bytes = fields.next()?.replace(',', "").parse().ok()?;
    let percent = fields.next()?.strip_suffix('%')?.parse().ok()?;
    let rate = fields.next()?.to_string();
    Some(CopyProgress {
        bytes,
        percent,
        rate,
    })
}

/// Feeds every `\r`- or `\n`-terminated record read from `reader` to
/// `on_record`. A trailing record without a terminator is delivered too.
pub fn for_each_record<R, F>(mut reader: R, mut on_record: F) -> std::io::Result<()>
where
    R: Read,
    F: FnMut(&str),
{
    let mut buffer = [0u8; 8192];
    let mut pending = Vec::new();

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        for &byte in &buffer[..n] {
            if byte == b'\r' || byte == b'\n' {
                if !pending.is_empty() {
                    on_record(&String::from_utf8_lossy(&pending));
                    pending.clear();
                }
            } else {
                pending.push(byte);
            }
        }
    }

    if !pending.is_empty() {
        on_record(&String::from_utf8_lossy(&pending));
    }
    Ok(())
}

fn rsync_args(from: &Path, to: &Path) -> Vec<OsString> {
    // The trailing slash copies the contents of `from`, not the directory.
    let mut source = from.as_os_str().to_os_string();
    source.push("/");

    let mut args: Vec<OsString> = [
        "-a",
        "--no-owner",
        "--no-group",
        "--info=progress2",
        "--block-size=8192",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(source);
    args.push(to.as_os_str().to_os_string());
    args
}

/// Recursively copies the contents of `from` into `to`.
///
/// Owner and group are not preserved since FAT32 cannot store them. stderr
/// is collected in a temporary file and reported if rsync fails.
pub fn run<F>(from: &Path, to: &Path, mut on_progress: F) -> Result<()>
where
    F: FnMut(CopyProgress),
{
    let args = rsync_args(from, to);
    let command = display_command("rsync", &args);
    debug!(%command, "running");

    let mut stderr_file = tempfile::tempfile().context("Failed to create a temporary file")?;
    let mut child = Command::new("rsync")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::from(stderr_file.try_clone()?))
        .spawn()
        .map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

    if let Some(stdout) = child.stdout.take() {
        for_each_record(stdout, |record| {
            if let Some(progress) = parse_progress(record) {
                on_progress(progress);
            }
        })?;
    }

    let status = child.wait()?;
    if !status.success() {
        let mut output = String::new();
        stderr_file.seek(SeekFrom::Start(0))?;
        stderr_file.read_to_string(&mut output)?;
        return Err(CommandError::Failed {
            command,
            status,
            output: output.trim_end().to_string(),
        }
        .into());
    }

    Ok(())
}
