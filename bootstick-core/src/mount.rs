//! Mounting, unmounting and mount table queries.
//!
//! Whether something is mounted is answered from `/proc/self/mountinfo`
//! rather than from the wording of `umount` errors, which depends on the
//! locale.
use crate::command;
use crate::error::CommandError;
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

const MOUNTINFO: &str = "/proc/self/mountinfo";

/// One row of the mount table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountEntry {
    pub source: PathBuf,
    pub mount_point: PathBuf,
    pub fstype: String,
}

/// What happened when asked to unmount something.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unmount {
    Unmounted,
    NotMounted,
}

/// Decodes the octal escapes (`\040` for a space) the kernel uses in mount
/// table fields.
fn decode_escapes(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                out.push(value as u8);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parses the contents of a `mountinfo` file.
pub fn parse_mountinfo(contents: &str) -> Vec<MountEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let (left, right) = line.split_once(" - ")?;
            let mount_point = left.split_whitespace().nth(4)?;
            let mut right = right.split_whitespace();
            let fstype = right.next()?;
            let source = right.next()?;
            Some(MountEntry {
                source: PathBuf::from(decode_escapes(source)),
                mount_point: PathBuf::from(decode_escapes(mount_point)),
                fstype: fstype.to_string(),
            })
        })
        .collect()
}

/// Reads the current mount table.
pub fn mount_table() -> Result<Vec<MountEntry>> {
    let contents = fs::read_to_string(MOUNTINFO).context("Failed to read mount table")?;
    Ok(parse_mountinfo(&contents))
}

/// Returns `true` if `target` appears in `table` as either a mounted source
/// device or a mount point.
pub fn is_listed(table: &[MountEntry], target: &Path) -> bool {
    let canonical = fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf());
    table.iter().any(|entry| {
        entry.source == target
            || entry.mount_point == target
            || entry.mount_point == canonical
    })
}

/// Returns `true` if `target` (a device or a directory) is currently mounted.
pub fn is_mounted(target: &Path) -> Result<bool> {
    Ok(is_listed(&mount_table()?, target))
}

/// Unmounts `target`, treating "nothing mounted there" as success.
///
/// The mount table is consulted before running `umount` and again if it
/// fails, so a target that vanished in between is still not an error.
pub fn unmount(target: &Path) -> Result<Unmount> {
    unmount_with(target, is_mounted, |target| {
        command::run("umount", &[target]).map(|_| ())
    })
}

fn unmount_with<M, U>(target: &Path, mut is_mounted: M, umount: U) -> Result<Unmount>
where
    M: FnMut(&Path) -> Result<bool>,
    U: FnOnce(&Path) -> Result<(), CommandError>,
{
    if !is_mounted(target)? {
        return Ok(Unmount::NotMounted);
    }

    match umount(target) {
        Ok(()) => Ok(Unmount::Unmounted),
        Err(CommandError::Failed { .. }) if !is_mounted(target)? => Ok(Unmount::NotMounted),
        Err(e) => Err(e.into()),
    }
}

/// Mounts the block device `source` at `mount_point`.
pub fn mount(source: &Path, mount_point: &Path) -> Result<()> {
    command::run("mount", &[source, mount_point])?;
    Ok(())
}

/// Mounts the image file `image` at `mount_point` through a loop device.
pub fn loop_mount(image: &Path, mount_point: &Path) -> Result<()> {
    command::run(
        "mount",
        &[
            OsStr::new("-o"),
            OsStr::new("loop"),
            image.as_os_str(),
            mount_point.as_os_str(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn umount_failed(target: &Path) -> Result<(), CommandError> {
        Err(CommandError::Failed {
            command: format!("umount {}", target.display()),
            status: ExitStatus::from_raw(32 << 8),
            output: "umount: target is busy.".to_string(),
        })
    }

    const SAMPLE_MOUNTINFO: &str = "\
22 1 259:2 / / rw,relatime shared:1 - ext4 /dev/nvme0n1p2 rw
98 22 8:17 / /mnt/pendrive rw,relatime shared:50 - vfat /dev/sdb1 rw,fmask=0022
99 22 7:0 / /mnt/iso ro,relatime shared:51 - iso9660 /dev/loop0 ro
100 22 8:33 / /media/user/My\\040Stick rw,nosuid shared:52 - vfat /dev/sdc1 rw
";

    #[test]
    fn test_parse_mountinfo() {
        let table = parse_mountinfo(SAMPLE_MOUNTINFO);

        assert_eq!(table.len(), 4);
        assert_eq!(table[1].source, PathBuf::from("/dev/sdb1"));
        assert_eq!(table[1].mount_point, PathBuf::from("/mnt/pendrive"));
        assert_eq!(table[2].fstype, "iso9660");
    }

    #[test]
    fn test_parse_mountinfo_decodes_escapes() {
        let table = parse_mountinfo(SAMPLE_MOUNTINFO);
        assert_eq!(table[3].mount_point, PathBuf::from("/media/user/My Stick"));
    }

    #[test]
    fn test_parse_mountinfo_skips_malformed_lines() {
        let table = parse_mountinfo("garbage\n22 1 259:2 / / rw - ext4\n");
        assert!(table.is_empty());
    }

    #[test]
    fn test_is_listed_matches_source_or_mount_point() {
        let table = parse_mountinfo(SAMPLE_MOUNTINFO);

        assert!(is_listed(&table, Path::new("/dev/sdb1")));
        assert!(is_listed(&table, Path::new("/mnt/iso")));
        assert!(!is_listed(&table, Path::new("/dev/sdd1")));
        assert!(!is_listed(&table, Path::new("/mnt/elsewhere")));
    }

    #[test]
    fn test_decode_escapes() {
        assert_eq!(decode_escapes("a\\040b"), "a b");
        assert_eq!(decode_escapes("tab\\011"), "tab\t");
        assert_eq!(decode_escapes("trailing\\"), "trailing\\");
        assert_eq!(decode_escapes("\\xyz1"), "\\xyz1");
    }

    #[test]
    fn test_unmount_skips_targets_missing_from_table() {
        let mut umount_called = false;
        let result = unmount_with(
            Path::new("/dev/sdb1"),
            |_| Ok(false),
            |_| {
                umount_called = true;
                Ok(())
            },
        );

        assert_eq!(result.unwrap(), Unmount::NotMounted);
        assert!(!umount_called);
    }

    #[test]
    fn test_unmount_success() {
        let result = unmount_with(Path::new("/mnt/iso"), |_| Ok(true), |_| Ok(()));
        assert_eq!(result.unwrap(), Unmount::Unmounted);
    }

    #[test]
    fn test_unmount_failure_after_target_vanished_is_not_mounted() {
        let mut listed = vec![true, false].into_iter();
        let result = unmount_with(
            Path::new("/dev/sdb1"),
            |_| Ok(listed.next().unwrap_or(false)),
            umount_failed,
        );

        assert_eq!(result.unwrap(), Unmount::NotMounted);
    }

    #[test]
    fn test_unmount_failure_while_still_mounted_is_an_error() {
        let result = unmount_with(Path::new("/dev/sdb1"), |_| Ok(true), umount_failed);

        let err = result.unwrap_err();
        assert!(err.to_string().contains("target is busy"));
    }

    #[test]
    fn test_unmount_spawn_failure_is_an_error() {
        let result = unmount_with(
            Path::new("/dev/sdb1"),
            |_| Ok(true),
            |target| {
                Err(CommandError::Spawn {
                    command: format!("umount {}", target.display()),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            },
        );

        assert!(result.is_err());
    }
}
