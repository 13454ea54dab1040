//! The ordered workflow that turns a USB drive into a bootable copy of an
//! ISO image.
//!
//! Each [`Step`] runs only after every step before it succeeded or ended in a
//! tolerated condition. The first fatal failure stops the workflow and is
//! returned as [`Aborted`]; nothing that already happened is undone.
//!
//! All side effects go through the [`Host`] trait. [`SystemHost`] talks to the
//! real system; the tests drive the workflow with a recording fake.
use crate::device::Device;
use crate::error::Aborted;
use crate::image::ImageFile;
use crate::mount::{self, Unmount};
use crate::sync::{self, CopyProgress};
use crate::{disk, wipe};
use anyhow::{Context, Result, bail};
use std::fmt;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where the new FAT32 partition is mounted while files are copied.
pub const DEFAULT_TARGET_MOUNT: &str = "/mnt/pendrive";
/// Where the ISO image is loop-mounted while files are copied.
pub const DEFAULT_IMAGE_MOUNT: &str = "/mnt/iso";

/// A stage of the workflow, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Wipe,
    Partition,
    UnmountPartition,
    Format,
    PrepareMountPoints,
    MountTarget,
    UnmountImageMountPoint,
    MountImage,
    RelaxImagePermissions,
    Copy,
    Cleanup,
}

impl Step {
    pub const ALL: [Step; 11] = [
        Step::Wipe,
        Step::Partition,
        Step::UnmountPartition,
        Step::Format,
        Step::PrepareMountPoints,
        Step::MountTarget,
        Step::UnmountImageMountPoint,
        Step::MountImage,
        Step::RelaxImagePermissions,
        Step::Copy,
        Step::Cleanup,
    ];

    /// 1-based position of the step in [`Step::ALL`].
    pub fn number(self) -> usize {
        Step::ALL.iter().position(|&s| s == self).unwrap_or(0) + 1
    }

    /// Operator-facing description of what the step does.
    pub fn description(self) -> &'static str {
        match self {
            Step::Wipe => "Erasing existing partitions",
            Step::Partition => "Creating new partition table (MBR)",
            Step::UnmountPartition => "Unmounting target partition",
            Step::Format => "Formatting partition as FAT32",
            Step::PrepareMountPoints => "Creating mount points",
            Step::MountTarget => "Mounting USB drive",
            Step::UnmountImageMountPoint => "Unmounting ISO if mounted",
            Step::MountImage => "Mounting ISO",
            Step::RelaxImagePermissions => "Making ISO readable",
            Step::Copy => "Copying files from ISO to USB drive",
            Step::Cleanup => "Unmounting mount points",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.number(), self.description())
    }
}

/// How a step that did not abort the workflow ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// An expected condition that counts as success, e.g. nothing to unmount.
    Tolerated(String),
    /// A failure of a step that is allowed to fail. The workflow continued.
    Warned(String),
}

/// Progress notifications emitted while the workflow runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    StepStarted(Step),
    StepFinished(Step, StepOutcome),
    /// Bytes the wipe will zero: [`Plan::wipe_len`], or less on a smaller
    /// device.
    WipeStarted(u64),
    /// Bytes zeroed so far.
    WipeProgress(u64),
    CopyProgress(CopyProgress),
}

/// Everything the workflow needs to know, derived from the operator's choice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plan {
    pub device: PathBuf,
    pub partition: PathBuf,
    pub image: PathBuf,
    pub target_mount: PathBuf,
    pub image_mount: PathBuf,
    pub wipe_len: u64,
}

impl Plan {
    /// Builds a plan with the default mount points.
    pub fn new(device: &Device, image: &ImageFile) -> Self {
        Self {
            device: device.path.clone(),
            partition: device.first_partition(),
            image: image.path.clone(),
            target_mount: PathBuf::from(DEFAULT_TARGET_MOUNT),
            image_mount: PathBuf::from(DEFAULT_IMAGE_MOUNT),
            wipe_len: wipe::WIPE_LEN,
        }
    }

    pub fn with_mount_points(mut self, target_mount: PathBuf, image_mount: PathBuf) -> Self {
        self.target_mount = target_mount;
        self.image_mount = image_mount;
        self
    }

    /// Rejects mount points that would mount the image over the target or
    /// make rsync copy into its own source.
    ///
    /// # Errors
    ///
    /// Returns an error if the two mount points are the same directory or one
    /// lies inside the other.
    pub fn validate(&self) -> Result<()> {
        let (target, image) = (&self.target_mount, &self.image_mount);
        if target == image {
            bail!(
                "The target and image mount points are both {}",
                target.display()
            );
        }
        if target.starts_with(image) || image.starts_with(target) {
            bail!(
                "The mount points {} and {} are nested",
                target.display(),
                image.display()
            );
        }
        Ok(())
    }
}

/// The side effects the workflow performs.
pub trait Host {
    /// Zeroes up to `len` bytes, reporting the real length to `on_start`.
    fn wipe(
        &mut self,
        device: &Path,
        len: u64,
        on_start: &mut dyn FnMut(u64),
        on_progress: &mut dyn FnMut(u64),
    ) -> Result<()>;
    fn partition(&mut self, device: &Path) -> Result<()>;
    /// Unmounts a device or mount point. Not being mounted is not an error.
    fn unmount(&mut self, target: &Path) -> Result<Unmount>;
    fn format(&mut self, partition: &Path) -> Result<()>;
    fn create_dir(&mut self, dir: &Path) -> Result<()>;
    fn mount(&mut self, source: &Path, mount_point: &Path) -> Result<()>;
    fn loop_mount(&mut self, image: &Path, mount_point: &Path) -> Result<()>;
    fn make_world_readable(&mut self, path: &Path) -> Result<()>;
    fn copy(
        &mut self,
        from: &Path,
        to: &Path,
        on_progress: &mut dyn FnMut(CopyProgress),
    ) -> Result<()>;
}

/// [`Host`] backed by the running system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemHost;

impl Host for SystemHost {
    fn wipe(
        &mut self,
        device: &Path,
        len: u64,
        on_start: &mut dyn FnMut(u64),
        on_progress: &mut dyn FnMut(u64),
    ) -> Result<()> {
        wipe::run(device, len, on_start, on_progress)
    }

    fn partition(&mut self, device: &Path) -> Result<()> {
        disk::create_single_partition(device)
    }

    fn unmount(&mut self, target: &Path) -> Result<Unmount> {
        mount::unmount(target)
    }

    fn format(&mut self, partition: &Path) -> Result<()> {
        disk::format_fat32(partition)
    }

    fn create_dir(&mut self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))
    }

    fn mount(&mut self, source: &Path, mount_point: &Path) -> Result<()> {
        mount::mount(source, mount_point)
    }

    fn loop_mount(&mut self, image: &Path, mount_point: &Path) -> Result<()> {
        mount::loop_mount(image, mount_point)
    }

    fn make_world_readable(&mut self, path: &Path) -> Result<()> {
        let mut permissions = fs::metadata(path)
            .with_context(|| format!("Failed to read permissions of {}", path.display()))?
            .permissions();
        permissions.set_mode(permissions.mode() | 0o444);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("Failed to change permissions of {}", path.display()))
    }

    fn copy(
        &mut self,
        from: &Path,
        to: &Path,
        on_progress: &mut dyn FnMut(CopyProgress),
    ) -> Result<()> {
        sync::run(from, to, on_progress)
    }
}

fn unmount_outcome(target: &Path, result: Unmount) -> StepOutcome {
    match result {
        Unmount::Unmounted => StepOutcome::Done,
        Unmount::NotMounted => StepOutcome::Tolerated(format!("{} was not mounted", target.display())),
    }
}

/// Unmount whose failure is only reported.
fn unmount_best_effort<H: Host>(host: &mut H, target: &Path) -> StepOutcome {
    match host.unmount(target) {
        Ok(result) => unmount_outcome(target, result),
        Err(e) => {
            warn!(target = %target.display(), "unmount failed: {e:#}");
            StepOutcome::Warned(format!("Failed to unmount {}: {e:#}", target.display()))
        }
    }
}

fn execute<H: Host>(
    host: &mut H,
    plan: &Plan,
    step: Step,
    on_event: &mut dyn FnMut(Event),
) -> Result<StepOutcome> {
    match step {
        Step::Wipe => {
            // Both callbacks forward to `on_event`.
            let on_event = std::cell::RefCell::new(on_event);
            host.wipe(
                &plan.device,
                plan.wipe_len,
                &mut |len| (*on_event.borrow_mut())(Event::WipeStarted(len)),
                &mut |bytes| (*on_event.borrow_mut())(Event::WipeProgress(bytes)),
            )?;
        }
        Step::Partition => host.partition(&plan.device)?,
        Step::UnmountPartition => {
            let result = host.unmount(&plan.partition)?;
            return Ok(unmount_outcome(&plan.partition, result));
        }
        Step::Format => host.format(&plan.partition)?,
        Step::PrepareMountPoints => {
            host.create_dir(&plan.target_mount)?;
            host.create_dir(&plan.image_mount)?;
        }
        Step::MountTarget => host.mount(&plan.partition, &plan.target_mount)?,
        Step::UnmountImageMountPoint => {
            return Ok(unmount_best_effort(host, &plan.image_mount));
        }
        Step::MountImage => host.loop_mount(&plan.image, &plan.image_mount)?,
        Step::RelaxImagePermissions => host.make_world_readable(&plan.image)?,
        Step::Copy => {
            host.copy(&plan.image_mount, &plan.target_mount, &mut |progress| {
                on_event(Event::CopyProgress(progress))
            })?;
        }
        Step::Cleanup => {
            let mut warnings = Vec::new();
            for target in [&plan.image_mount, &plan.target_mount] {
                if let StepOutcome::Warned(reason) = unmount_best_effort(host, target) {
                    warnings.push(reason);
                }
            }
            if !warnings.is_empty() {
                return Ok(StepOutcome::Warned(warnings.join("\n")));
            }
        }
    }
    Ok(StepOutcome::Done)
}

/// Runs every [`Step`] of the workflow against `host` in order.
///
/// `on_event` is called when each step starts and finishes and with progress
/// of the wipe and copy steps.
///
/// # Errors
///
/// Returns [`Aborted`] naming the first step that failed fatally. Later steps,
/// including cleanup, are not run.
pub fn run<H: Host>(
    host: &mut H,
    plan: &Plan,
    mut on_event: impl FnMut(Event),
) -> Result<(), Aborted> {
    for step in Step::ALL {
        info!(%step, "starting");
        on_event(Event::StepStarted(step));

        let outcome = execute(host, plan, step, &mut on_event).map_err(|source| {
            warn!(%step, "aborting: {source:#}");
            Aborted { step, source }
        })?;

        match &outcome {
            StepOutcome::Done => info!(%step, "done"),
            StepOutcome::Tolerated(reason) => info!(%step, "{reason}"),
            StepOutcome::Warned(reason) => warn!(%step, "{reason}"),
        }
        on_event(Event::StepFinished(step, outcome));
    }
    Ok(())
}
