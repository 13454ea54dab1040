//! Error types callers need to tell apart.
//!
//! Everything else in the library propagates through [`anyhow::Result`].
use crate::provision::Step;
use std::process::ExitStatus;
use thiserror::Error;

/// A system utility could not be run or exited unsuccessfully.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to execute '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' failed ({status}):\n{output}")]
    Failed {
        command: String,
        status: ExitStatus,
        output: String,
    },
}

/// A precondition that must hold before anything touches a device.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("This program must be run as root. Please run it with 'sudo'.")]
    NotRoot,

    #[error("'{0}' is not installed. Install it with your package manager (e.g. 'sudo apt-get install {0}').")]
    MissingTool(String),
}

/// The provisioning workflow stopped at `step`.
///
/// Steps before it completed and their effects on the device are left in
/// place.
#[derive(Debug, Error)]
#[error("{step} failed: {source:#}")]
pub struct Aborted {
    pub step: Step,
    #[source]
    pub source: anyhow::Error,
}
