//! The core, UI-agnostic library for the `bootstick` utility.
//!
//! `bootstick-core` is designed to be used as a library by any front-end. It
//! finds USB drives and ISO images and turns a drive into a bootable FAT32
//! copy of an image by driving the standard Linux utilities (`lsblk`, `fdisk`,
//! `mkfs.vfat`, `mount`, `rsync`).
//!
//! The library is structured into several key modules:
//! - [`device`]: Contains the `Device` struct and the `lsblk` parser.
//! - [`platform`]: Discovers USB block devices on the running system.
//! - [`image`]: Finds ISO files in a directory.
//! - [`preflight`]: Checks for root privileges and required tools.
//! - [`select`]: Validates the operator's menu answers.
//! - [`provision`]: The ordered, fail-fast workflow that prepares the drive.
//!
//! The primary entry point is [`provision::run`]. It reports progress via a
//! callback, allowing the calling application to display progress in any way
//! it chooses.
//!
//! ## Example: Provisioning a Drive with Progress Reporting
//!
//! ```rust,no_run
//! use bootstick_core::{image, platform, provision};
//! use bootstick_core::provision::{Event, Plan, SystemHost};
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     bootstick_core::preflight::check()?;
//!
//!     let devices = platform::get_usb_devices()?;
//!     let device = devices.first().expect("No USB device found.");
//!     let images = image::list_iso_files(&std::env::current_dir()?)?;
//!     let image = images.first().expect("No ISO file found.");
//!
//!     let plan = Plan::new(device, image);
//!     provision::run(&mut SystemHost, &plan, |event| {
//!         if let Event::StepStarted(step) = event {
//!             println!("{}...", step.description());
//!         }
//!     })?;
//!
//!     println!("Done!");
//!
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod device;
pub mod disk;
pub mod error;
pub mod image;
pub mod mount;
pub mod platform;
pub mod preflight;
pub mod provision;
pub mod select;
pub mod sync;
pub mod wipe;
