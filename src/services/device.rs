//! Compute device discovery and binding.
//!
//! The [`BackendSelector`] lists the devices reported by a [`DeviceDriver`]
//! and binds the search to one of them before it starts. Without a binding
//! the search runs on the [`ScalarBackend`].
//!
//! ```ignore
//! let mut selector = BackendSelector::new(Box::new(HostDriver::new()));
//! for device in selector.enumerate_devices() {
//!     println!("[{}]\t{}", device.index, device.name);
//! }
//! selector.bind_device(0)?;
//! ```

use crate::error::{Result, SolverError};
use crate::services::backend::{AcceleratedBackend, ScalarBackend, StepBackend};
use std::fmt;
use std::num::NonZeroUsize;

/// Kind of compute device reported by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Word-parallel evaluation on the host CPU
    Host,
    /// Discrete accelerator
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Host => write!(f, "host"),
            DeviceKind::Gpu => write!(f, "gpu"),
        }
    }
}

/// Informational description of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
    pub kind: DeviceKind,
    pub compute_units: u32,
}

/// Driver seam for device discovery and initialization.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceDriver: Send + Sync {
    /// List available devices. Must not change any device state.
    fn devices(&self) -> Vec<DeviceDescriptor>;

    /// Initialize `device` for use by the search.
    fn bind(&self, device: &DeviceDescriptor) -> std::result::Result<(), String>;
}

/// Driver exposing the host CPU as a single word-parallel device.
#[derive(Debug, Clone)]
pub struct HostDriver {
    compute_units: u32,
}

impl HostDriver {
    pub fn new() -> Self {
        let compute_units = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            compute_units: u32::try_from(compute_units).unwrap_or(u32::MAX),
        }
    }
}

impl Default for HostDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDriver for HostDriver {
    fn devices(&self) -> Vec<DeviceDescriptor> {
        vec![DeviceDescriptor {
            index: 0,
            name: "host bit-parallel".to_string(),
            kind: DeviceKind::Host,
            compute_units: self.compute_units,
        }]
    }

    fn bind(&self, device: &DeviceDescriptor) -> std::result::Result<(), String> {
        tracing::debug!("Binding host device {}", device.name);
        Ok(())
    }
}

/// Enumerates devices and binds the search to one before it starts.
pub struct BackendSelector {
    driver: Box<dyn DeviceDriver>,
    bound: Option<DeviceDescriptor>,
    locked: bool,
}

impl BackendSelector {
    pub fn new(driver: Box<dyn DeviceDriver>) -> Self {
        Self {
            driver,
            bound: None,
            locked: false,
        }
    }

    /// Devices reported by the driver. An empty list is not an error.
    pub fn enumerate_devices(&self) -> Vec<DeviceDescriptor> {
        self.driver.devices()
    }

    /// Bind the device at `index`.
    ///
    /// # Errors
    /// - [`SolverError::AlreadyBound`] once the search has started
    /// - [`SolverError::InvalidDeviceIndex`] if `index` is out of range
    /// - [`SolverError::DeviceInitialization`] if the driver rejects the device
    pub fn bind_device(&mut self, index: usize) -> Result<&DeviceDescriptor> {
        if self.locked {
            return Err(SolverError::AlreadyBound);
        }

        let devices = self.driver.devices();
        let count = devices.len();
        let device = devices
            .into_iter()
            .nth(index)
            .ok_or(SolverError::InvalidDeviceIndex { index, count })?;

        self.driver
            .bind(&device)
            .map_err(SolverError::DeviceInitialization)?;

        tracing::info!("Bound device [{}] {} ({})", index, device.name, device.kind);
        Ok(self.bound.insert(device))
    }

    pub fn bound_device(&self) -> Option<&DeviceDescriptor> {
        self.bound.as_ref()
    }

    /// Freeze the binding and build the backend for the search.
    pub(crate) fn take_backend(&mut self) -> Box<dyn StepBackend> {
        self.locked = true;
        match &self.bound {
            Some(device) => Box::new(AcceleratedBackend::new(device.clone())),
            None => Box::new(ScalarBackend),
        }
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::new(Box::new(HostDriver::new()))
    }
}
