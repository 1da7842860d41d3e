//! Device meshes
//!
//! A [`DeviceMesh`] is the ordered set of devices a stage is assigned to. The
//! order matters: communication lowering walks sender and receiver meshes in
//! mesh order, so every rank derives the same transfer plan.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a physical device
pub type DeviceId = u32;

/// Identifier of a participating process
pub type Rank = usize;

/// Ordered, non-empty, duplicate-free set of devices
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<DeviceId>", into = "Vec<DeviceId>")]
pub struct DeviceMesh {
    devices: Vec<DeviceId>,
}

impl DeviceMesh {
    /// Create a mesh from an ordered device list
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] if the list is empty or contains
    /// the same device twice.
    ///
    /// ```rust
    /// use meshflow_core::mesh::DeviceMesh;
    ///
    /// let mesh = DeviceMesh::new(vec![1, 2]).unwrap();
    /// assert!(mesh.contains(2));
    /// assert!(DeviceMesh::new(vec![]).is_err());
    /// ```
    pub fn new(devices: Vec<DeviceId>) -> Result<Self> {
        if devices.is_empty() {
            return Err(PipelineError::Validation("Device mesh cannot be empty".to_string()));
        }
        for (i, device) in devices.iter().enumerate() {
            if devices[..i].contains(device) {
                return Err(PipelineError::Validation(format!(
                    "Device {} appears twice in mesh {:?}",
                    device, devices
                )));
            }
        }
        Ok(Self { devices })
    }

    /// Mesh containing a single device
    pub fn single(device: DeviceId) -> Self {
        Self { devices: vec![device] }
    }

    /// Devices in mesh order
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn contains(&self, device: DeviceId) -> bool {
        self.devices.contains(&device)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Always false for a constructed mesh; provided for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl TryFrom<Vec<DeviceId>> for DeviceMesh {
    type Error = PipelineError;

    fn try_from(devices: Vec<DeviceId>) -> Result<Self> {
        Self::new(devices)
    }
}

impl From<DeviceMesh> for Vec<DeviceId> {
    fn from(mesh: DeviceMesh) -> Self {
        mesh.devices
    }
}

impl fmt::Display for DeviceMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, device) in self.devices.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", device)?;
        }
        write!(f, "}}")
    }
}
