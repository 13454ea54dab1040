//! Contains the logic for zeroing the start of a block device.
//!
//! Clearing the first gigabyte removes the old partition table, any boot
//! code and the superblocks of filesystems that lived near the start of the
//! device, so the partitioner starts from a blank disk.
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::debug;

/// How much of the device is zeroed: 1 GiB.
pub const WIPE_LEN: u64 = 1024 * 1024 * 1024;

const BUFFER_SIZE: usize = 1024 * 1024; // 1 MiB

/// Overwrites the first `len` bytes of `device_path` with zeros.
///
/// Devices smaller than `len` are zeroed entirely. The device is opened with
/// `O_DIRECT` so the zeros reach the hardware rather than the page cache, and
/// the file is synced before returning.
///
/// # Arguments
///
/// * `device_path` - Path to the target block device.
/// * `len` - Number of bytes to zero from the start of the device.
/// * `on_start` - Closure called once with the number of bytes that will
///   actually be zeroed.
/// * `on_progress` - Closure called with the number of bytes zeroed so far.
///
/// # Errors
///
/// This function will return an error if the device cannot be opened or an
/// I/O error occurs while writing.
pub fn run<F>(
    device_path: &Path,
    len: u64,
    on_start: impl FnOnce(u64),
    mut on_progress: F,
) -> Result<()>
where
    F: FnMut(u64),
{
    let mut device_file = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_DIRECT) // Use O_DIRECT for unbuffered I/O
        .open(device_path)
        .with_context(|| format!("Failed to open {}", device_path.display()))?;

    let device_len = device_file.seek(SeekFrom::End(0))?;
    device_file.seek(SeekFrom::Start(0))?;
    let len = if device_len > 0 { len.min(device_len) } else { len };
    debug!(device = %device_path.display(), len, "zeroing");
    on_start(len);

    // Align buffer to 512 bytes for O_DIRECT compatibility.
    let block_size = 512;
    let buf = vec![0u8; BUFFER_SIZE + block_size];
    let offset = buf.as_ptr().align_offset(block_size);
    let zeros = &buf[offset..offset + BUFFER_SIZE];

    let mut written: u64 = 0;
    while written < len {
        let chunk = std::cmp::min(BUFFER_SIZE as u64, len - written) as usize;
        // Device sizes are a multiple of the sector size, so the last chunk
        // stays aligned.
        device_file
            .write_all(&zeros[..chunk])
            .with_context(|| format!("Failed to zero {}", device_path.display()))?;
        written += chunk as u64;
        on_progress(written);
    }

    device_file.sync_all()?;
    Ok(())
}
