//! Host power-off action.

use std::io;
use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::debug;

/// Errors raised while asking the host to power off.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The power-off program could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        /// Program name
        command: String,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// The power-off program ran but reported failure.
    #[error("{command} failed with {status}")]
    Rejected {
        /// Program name
        command: String,
        /// How the program ended
        status: ExitStatus,
    },
}

/// Something that can power the host off.
pub trait PowerOff {
    /// Request power-off. `Ok` means the host accepted the request.
    fn power_off(&mut self) -> Result<(), ShutdownError>;
}

/// Runs an external program (`poweroff` by default).
#[derive(Clone, Debug)]
pub struct SystemPowerOff {
    command: String,
}

impl SystemPowerOff {
    /// Use `command` instead of `poweroff`.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for SystemPowerOff {
    fn default() -> Self {
        Self::with_command("poweroff")
    }
}

impl PowerOff for SystemPowerOff {
    fn power_off(&mut self) -> Result<(), ShutdownError> {
        debug!(command = %self.command, "requesting power-off");
        let status = Command::new(&self.command)
            .status()
            .map_err(|source| ShutdownError::Spawn {
                command: self.command.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ShutdownError::Rejected {
                command: self.command.clone(),
                status,
            })
        }
    }
}
