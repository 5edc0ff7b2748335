//! Warning relay on a GPIO line
//!
//! The relay is optional hardware. If the pin cannot be claimed at startup
//! the relay stays disabled for the life of the process and every call is a
//! no-op.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{AlertEdge, RelayError};

/// Linux sysfs GPIO root
pub const GPIO_SYSFS_ROOT: &str = "/sys/class/gpio";

/// A digital output line
pub trait OutputPin: Send {
    fn set(&mut self, on: bool) -> Result<(), RelayError>;

    /// Drive low and hand the line back to the system
    fn release(&mut self) -> Result<(), RelayError>;
}

/// GPIO line driven through the sysfs interface
pub struct SysfsPin {
    root: PathBuf,
    pin: u32,
    exported_here: bool,
}

impl SysfsPin {
    pub fn open(pin: u32) -> Result<Self, RelayError> {
        Self::open_at(GPIO_SYSFS_ROOT, pin)
    }

    /// Claim `pin` under an alternative sysfs root
    pub fn open_at(root: impl AsRef<Path>, pin: u32) -> Result<Self, RelayError> {
        let root = root.as_ref().to_path_buf();
        let unavailable = |e: std::io::Error| RelayError::Unavailable {
            pin,
            reason: e.to_string(),
        };

        let mut exported_here = false;
        if !root.join(format!("gpio{}", pin)).exists() {
            fs::write(root.join("export"), pin.to_string()).map_err(unavailable)?;
            exported_here = true;
        }

        let pin_dir = root.join(format!("gpio{}", pin));
        fs::write(pin_dir.join("direction"), "out").map_err(unavailable)?;
        fs::write(pin_dir.join("value"), "0").map_err(unavailable)?;

        Ok(Self {
            root,
            pin,
            exported_here,
        })
    }

    fn value_path(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin)).join("value")
    }
}

impl OutputPin for SysfsPin {
    fn set(&mut self, on: bool) -> Result<(), RelayError> {
        fs::write(self.value_path(), if on { "1" } else { "0" })?;
        Ok(())
    }

    fn release(&mut self) -> Result<(), RelayError> {
        self.set(false)?;
        if self.exported_here {
            fs::write(self.root.join("unexport"), self.pin.to_string())?;
        }
        Ok(())
    }
}

/// Edge-triggered relay with a hardware capability flag
pub struct Relay {
    pin_id: u32,
    pin: Option<Box<dyn OutputPin>>,
    engaged: bool,
}

impl Relay {
    /// Claim the sysfs GPIO line, or come up disabled (logged once)
    pub fn initialize(pin: u32) -> Self {
        match SysfsPin::open(pin) {
            Ok(output) => {
                info!("Relay ready on GPIO {}", pin);
                Self::with_pin(pin, Box::new(output))
            }
            Err(e) => {
                warn!("Relay disabled: {}", e);
                Self::disabled(pin)
            }
        }
    }

    pub fn with_pin(pin_id: u32, pin: Box<dyn OutputPin>) -> Self {
        Self {
            pin_id,
            pin: Some(pin),
            engaged: false,
        }
    }

    pub fn disabled(pin_id: u32) -> Self {
        Self {
            pin_id,
            pin: None,
            engaged: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pin.is_some()
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Engage on a rising edge, disengage on a falling one
    pub fn apply(&mut self, edge: AlertEdge) {
        match edge {
            AlertEdge::Rising if !self.engaged => self.drive(true),
            AlertEdge::Falling if self.engaged => self.drive(false),
            _ => {}
        }
    }

    fn drive(&mut self, on: bool) {
        self.engaged = on;
        if let Some(pin) = self.pin.as_mut() {
            if let Err(e) = pin.set(on) {
                warn!("Relay GPIO {} write failed: {}", self.pin_id, e);
            }
        }
    }

    /// Disengage and release the line. Later calls do nothing.
    pub fn release(&mut self) {
        self.engaged = false;
        if let Some(mut pin) = self.pin.take() {
            match pin.release() {
                Ok(()) => info!("Relay GPIO {} released", self.pin_id),
                Err(e) => warn!("Relay GPIO {} cleanup failed: {}", self.pin_id, e),
            }
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.release();
    }
}
