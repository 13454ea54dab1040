//! Partitioning and formatting of the target device.
use crate::command;
use anyhow::Result;
use std::ffi::OsStr;
use std::path::Path;

/// Keystrokes fed to `fdisk`: new DOS (MBR) table, new primary partition 1,
/// default first and last sector, write.
pub const FDISK_SCRIPT: &[u8] = b"o\nn\np\n1\n\n\nw\n";

/// Writes a fresh MBR partition table holding one primary partition that
/// spans the whole device.
pub fn create_single_partition(device: &Path) -> Result<()> {
    command::run_with_input("fdisk", &[device], Some(FDISK_SCRIPT))?;
    Ok(())
}

/// Formats `partition` as FAT32.
pub fn format_fat32(partition: &Path) -> Result<()> {
    command::run(
        "mkfs.vfat",
        &[
            OsStr::new("-F"),
            OsStr::new("32"),
            partition.as_os_str(),
        ],
    )?;
    Ok(())
}
