use bootstick_core::device::parse_lsblk;
use bootstick_core::image::list_iso_files;
use bootstick_core::provision::Plan;
use bootstick_core::select::parse_choice;
use std::fs::File;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_choosing_second_device_and_only_image() {
    let devices = parse_lsblk("sda  500G  usb\nsdb 10G usb\n");
    assert_eq!(devices.len(), 2);

    let device = &devices[parse_choice("2", devices.len()).unwrap()];
    assert_eq!(device.path, PathBuf::from("/dev/sdb"));

    let dir = tempdir().unwrap();
    for name in ["a.iso", "b.ISO", "notes.txt"] {
        File::create(dir.path().join(name)).unwrap();
    }
    let images = list_iso_files(dir.path()).unwrap();
    assert_eq!(images.len(), 1);

    let image = &images[parse_choice("1", images.len()).unwrap()];
    let plan = Plan::new(device, image);

    assert_eq!(plan.partition, PathBuf::from("/dev/sdb1"));
    assert_eq!(plan.image, dir.path().join("a.iso"));
}

#[test]
fn test_out_of_range_choices_are_rejected() {
    let devices = parse_lsblk("sda  500G  usb\nsdb 10G usb\n");

    assert_eq!(parse_choice("0", devices.len()), None);
    assert_eq!(parse_choice("3", devices.len()), None);
}
