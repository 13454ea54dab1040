//! Provides platform-specific functionality.
//!
//! This module contains the logic for interacting with the operating system to
//! perform tasks that are not portable, such as discovering USB block devices.
//!
//! Only Linux is supported: the provisioning workflow depends on `lsblk`,
//! `fdisk`, `mkfs.vfat` and loop mounts.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use self::linux::*;
