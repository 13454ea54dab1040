use std::fmt;
use std::path::{Path, PathBuf};

/// Directory under which the kernel exposes block device nodes.
pub const DEVICE_ROOT: &str = "/dev";

/// Represents a USB block device discovered on the system.
///
/// It is populated by the platform-specific discovery functions in the
/// [`crate::platform`] module from the columns reported by `lsblk`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    /// The system path to the device (e.g., `/dev/sdb`).
    pub path: PathBuf,
    /// The kernel-provided name of the device (e.g., "sdb").
    pub name: String,
    /// The human-readable size as reported by `lsblk` (e.g., "14.9G").
    pub size: String,
    /// The transport the device is attached through (e.g., "usb").
    pub transport: String,
    /// The primary mount point of a filesystem on the device, if any.
    pub mount_point: String,
}

impl Device {
    /// Path of the first partition on this device.
    ///
    /// Kernel names that end in a digit (`nvme0n1`, `mmcblk0`) separate the
    /// partition number with a `p`.
    pub fn first_partition(&self) -> PathBuf {
        partition_path(&self.path, 1)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Size: {})", self.path.display(), self.size)?;
        if !self.mount_point.is_empty() {
            write!(f, " [Mounted at {}]", self.mount_point)?;
        }
        Ok(())
    }
}

/// Builds the path of partition `number` on the block device at `device`.
pub fn partition_path(device: &Path, number: u32) -> PathBuf {
    let base = device.to_string_lossy();
    if base.ends_with(|c: char| c.is_ascii_digit()) {
        PathBuf::from(format!("{base}p{number}"))
    } else {
        PathBuf::from(format!("{base}{number}"))
    }
}

/// Parses the output of `lsblk -o NAME,SIZE,TRAN` into USB devices.
///
/// A line yields a device only when it mentions `usb` and carries the three
/// requested columns. Partition rows have an empty transport column and are
/// skipped. The order of the output is preserved.
pub fn parse_lsblk(output: &str) -> Vec<Device> {
    output
        .lines()
        .filter(|line| line.contains("usb"))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let size = fields.next()?;
            let transport = fields.next()?;
            Some(Device {
                path: PathBuf::from(DEVICE_ROOT).join(name),
                name: name.to_string(),
                size: size.to_string(),
                transport: transport.to_string(),
                mount_point: String::new(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LSBLK: &str = "\
NAME        SIZE TRAN
sda         500G usb
└─sda1      500G
sdb          10G usb
nvme0n1   476.9G nvme
├─nvme0n1p1   1G
└─nvme0n1p2 475.9G
";

    #[test]
    fn test_parse_lsblk_keeps_usb_rows_in_order() {
        let devices = parse_lsblk(SAMPLE_LSBLK);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].path, PathBuf::from("/dev/sda"));
        assert_eq!(devices[0].size, "500G");
        assert_eq!(devices[0].transport, "usb");
        assert_eq!(devices[1].name, "sdb");
        assert_eq!(devices[1].size, "10G");
    }

    #[test]
    fn test_parse_lsblk_requires_all_columns() {
        assert!(parse_lsblk("usb0\n").is_empty());
        assert!(parse_lsblk("usbdisk 4G\n").is_empty());
        assert!(parse_lsblk("").is_empty());
    }

    #[test]
    fn test_parse_lsblk_ignores_non_usb_devices() {
        let devices = parse_lsblk("sda 500G sata\nsr0 1024M sata\n");
        assert!(devices.is_empty());
    }

    #[test]
    fn test_partition_path() {
        assert_eq!(
            partition_path(Path::new("/dev/sdb"), 1),
            PathBuf::from("/dev/sdb1")
        );
        assert_eq!(
            partition_path(Path::new("/dev/nvme0n1"), 1),
            PathBuf::from("/dev/nvme0n1p1")
        );
        assert_eq!(
            partition_path(Path::new("/dev/mmcblk0"), 2),
            PathBuf::from("/dev/mmcblk0p2")
        );
    }

    #[test]
    fn test_display() {
        let mut device = parse_lsblk("sdb 14.9G usb").remove(0);
        assert_eq!(device.to_string(), "/dev/sdb (Size: 14.9G)");

        device.mount_point = "/media/stick".to_string();
        assert_eq!(
            device.to_string(),
            "/dev/sdb (Size: 14.9G) [Mounted at /media/stick]"
        );
    }
}
