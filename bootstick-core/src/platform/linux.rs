use crate::command;
use crate::device::{self, Device};
use anyhow::Result;
use tracing::debug;

/// Columns requested from `lsblk`, in the order [`device::parse_lsblk`] reads them.
const LSBLK_COLUMNS: &str = "NAME,SIZE,TRAN";

/// Scans for USB block devices on a Linux system.
///
/// Devices are listed by running `lsblk -o NAME,SIZE,TRAN` and keeping the rows
/// whose transport is `usb`, in the order `lsblk` prints them. Each device is
/// then annotated with the mount point of any of its filesystems that
/// `sysinfo` reports as mounted, so the operator can spot a drive that is in
/// use.
///
/// # Returns
///
/// A `Result<Vec<Device>>` which is a list of discovered [`Device`]s on success,
/// or an error carrying `lsblk`'s output if it could not be run.
pub fn get_usb_devices() -> Result<Vec<Device>> {
    let output = command::run("lsblk", &["-o", LSBLK_COLUMNS])?;
    let mut devices = device::parse_lsblk(&output);

    let disks = sysinfo::Disks::new_with_refreshed_list();
    for device in devices.iter_mut() {
        for disk in disks.iter() {
            let disk_name = disk.name().to_string_lossy();
            let leaf = disk_name.trim_start_matches("/dev/");
            if leaf.starts_with(&device.name) {
                let mp = disk.mount_point().to_string_lossy().to_string();
                if !mp.is_empty() {
                    device.mount_point = mp;
                    break;
                }
            }
        }
    }

    debug!(count = devices.len(), "discovered USB devices");
    Ok(devices)
}
