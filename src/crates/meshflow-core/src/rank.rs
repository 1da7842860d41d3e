//! Rank ↔ device mapping
//!
//! Meshes name *devices*; communicators address *ranks*. A [`RankMapping`]
//! translates between the two and knows which rank the current process is.

use crate::error::{PipelineError, Result};
use crate::mesh::{DeviceId, Rank};

/// Bijection between process ranks and device identifiers
pub trait RankMapping: Send + Sync {
    /// Rank of the current process
    fn local_rank(&self) -> Rank;

    /// Rank owning `device`
    fn device_to_rank(&self, device: DeviceId) -> Result<Rank>;

    /// Device owned by `rank`
    fn rank_to_device(&self, rank: Rank) -> Result<DeviceId>;

    /// Device owned by the current process
    fn local_device(&self) -> Result<DeviceId> {
        self.rank_to_device(self.local_rank())
    }
}

/// Fixed mapping where `devices[rank]` is the device of `rank`
#[derive(Debug, Clone)]
pub struct StaticRankMapping {
    local_rank: Rank,
    devices: Vec<DeviceId>,
}

impl StaticRankMapping {
    /// Create a mapping from an explicit rank-indexed device list
    ///
    /// # Errors
    ///
    /// [`PipelineError::Configuration`] if `local_rank` is out of range or a
    /// device is listed twice.
    pub fn new(local_rank: Rank, devices: Vec<DeviceId>) -> Result<Self> {
        if local_rank >= devices.len() {
            return Err(PipelineError::Configuration(format!(
                "Local rank {} is outside a world of {} ranks",
                local_rank,
                devices.len()
            )));
        }
        for (i, device) in devices.iter().enumerate() {
            if devices[..i].contains(device) {
                return Err(PipelineError::Configuration(format!(
                    "Device {} is assigned to more than one rank",
                    device
                )));
            }
        }
        Ok(Self { local_rank, devices })
    }

    /// Rank `r` owns device `r`
    pub fn identity(local_rank: Rank, world_size: usize) -> Result<Self> {
        Self::new(local_rank, (0..world_size as DeviceId).collect())
    }

    pub fn world_size(&self) -> usize {
        self.devices.len()
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }
}

impl RankMapping for StaticRankMapping {
    fn local_rank(&self) -> Rank {
        self.local_rank
    }

    fn device_to_rank(&self, device: DeviceId) -> Result<Rank> {
        self.devices
            .iter()
            .position(|d| *d == device)
            .ok_or(PipelineError::UnknownDevice(device))
    }

    fn rank_to_device(&self, rank: Rank) -> Result<DeviceId> {
        self.devices.get(rank).copied().ok_or_else(|| {
            PipelineError::Configuration(format!("Rank {} is outside the world", rank))
        })
    }
}
