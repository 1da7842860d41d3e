//! In-process multi-rank simulation
//!
//! [`simulate`] plays every rank of a world inside one process: each rank gets
//! its own [`PipelineExecutor`] on its own tokio task, and the ranks talk
//! through a [`LocalCommunicator`] group. [`lower_pipeline_plan`] computes
//! what the executors would do without running anything.

use crate::communicator::LocalCommunicator;
use crate::config::ExecutorConfig;
use crate::error::{PipelineError, Result};
use crate::executor::{ExecutionMetrics, PipelineExecutor};
use crate::lowering::{lowering_for, TransferDescriptor};
use crate::mesh::{DeviceId, Rank};
use crate::pipeline::Pipeline;
use crate::rank::{RankMapping, StaticRankMapping};
use crate::runner::StageRunnerFactory;
use crate::tensor::Tensor;
use serde::Serialize;
use std::sync::Arc;

/// Result of one rank's executions
#[derive(Debug, Clone)]
pub struct RankReport {
    pub rank: Rank,
    pub device: DeviceId,
    /// Global outputs of the last iteration
    pub outputs: Vec<Tensor>,
    pub metrics: ExecutionMetrics,
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub ranks: Vec<RankReport>,
}

impl SimulationReport {
    /// For each global output, the first concrete copy found in rank order
    pub fn materialized_outputs(&self) -> Vec<Option<Tensor>> {
        let count = self.ranks.first().map_or(0, |r| r.outputs.len());
        (0..count)
            .map(|i| {
                self.ranks
                    .iter()
                    .map(|r| &r.outputs[i])
                    .find(|t| !t.is_placeholder())
                    .cloned()
            })
            .collect()
    }
}

/// Run `iterations` executions of `pipeline` on every rank of `world`
///
/// `world[r]` is the device of rank `r`. All ranks receive the same `inputs`.
///
/// # Errors
///
/// A failure on any rank fails the simulation. Peers of a failed rank observe
/// closed channels; the reported error is the first one that is not such a
/// consequential communication error.
pub async fn simulate(
    pipeline: Arc<Pipeline>,
    world: &[DeviceId],
    factory: Arc<dyn StageRunnerFactory>,
    config: ExecutorConfig,
    inputs: Vec<Tensor>,
    iterations: usize,
) -> Result<SimulationReport> {
    let endpoints = LocalCommunicator::group(world.len());
    tracing::info!(pipeline = %pipeline.name(), world = world.len(), iterations, "Starting simulation");

    let mut handles = Vec::with_capacity(world.len());
    for communicator in endpoints {
        let rank = communicator.rank();
        let mapping = StaticRankMapping::new(rank, world.to_vec())?;
        let device = mapping.local_device()?;
        let mut executor = PipelineExecutor::new(
            Arc::clone(&pipeline),
            Arc::new(mapping),
            Arc::new(communicator),
            Arc::clone(&factory),
        )?
        .with_config(config.clone());
        let inputs = inputs.clone();

        handles.push(tokio::spawn(async move {
            let mut outputs = Vec::new();
            for _ in 0..iterations {
                outputs = executor.run(inputs.clone()).await?;
            }
            Ok::<_, PipelineError>(RankReport {
                rank,
                device,
                outputs,
                metrics: executor.metrics().clone(),
            })
        }));
    }

    let mut ranks = Vec::with_capacity(handles.len());
    let mut errors = Vec::new();
    for (rank, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(Ok(report)) => ranks.push(report),
            Ok(Err(e)) => errors.push(e),
            Err(join) => errors.push(PipelineError::Communication(format!(
                "Rank {} task aborted: {}",
                rank, join
            ))),
        }
    }

    if !errors.is_empty() {
        let root = errors
            .iter()
            .position(|e| !matches!(e, PipelineError::Communication(_)))
            .unwrap_or(0);
        return Err(errors.swap_remove(root));
    }
    Ok(SimulationReport { ranks })
}

/// Lowered transfers of one communication edge
#[derive(Debug, Clone, Serialize)]
pub struct EdgePlan {
    pub edge: String,
    pub senders: Vec<Rank>,
    pub receivers: Vec<Rank>,
    pub transfers: Vec<TransferDescriptor>,
}

/// Stages a device materializes
#[derive(Debug, Clone, Serialize)]
pub struct DeviceMembership {
    pub rank: Rank,
    pub device: DeviceId,
    pub local_stages: Vec<String>,
}

/// Static view of how a pipeline executes on a world
#[derive(Debug, Clone, Serialize)]
pub struct PipelinePlan {
    pub pipeline: String,
    /// Node names in canonical order
    pub order: Vec<String>,
    pub edges: Vec<EdgePlan>,
    pub membership: Vec<DeviceMembership>,
}

/// Lower every edge of `pipeline` for `world` under the configured policy
pub fn lower_pipeline_plan(
    pipeline: &Pipeline,
    world: &[DeviceId],
    config: &ExecutorConfig,
) -> Result<PipelinePlan> {
    let mapping = StaticRankMapping::new(0, world.to_vec())?;
    let lowering = lowering_for(config.lowering);
    let to_ranks = |devices: &[DeviceId]| -> Result<Vec<Rank>> {
        devices.iter().map(|d| mapping.device_to_rank(*d)).collect()
    };

    let edges = pipeline
        .edges()
        .iter()
        .map(|edge| {
            let senders = to_ranks(pipeline.sender_mesh(edge).devices())?;
            let receivers = to_ranks(pipeline.receiver_mesh(edge).devices())?;
            let transfers = lowering.lower(&edge.name, &senders, &receivers)?;
            Ok(EdgePlan {
                edge: edge.name.clone(),
                senders,
                receivers,
                transfers,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let membership = world
        .iter()
        .enumerate()
        .map(|(rank, device)| DeviceMembership {
            rank,
            device: *device,
            local_stages: pipeline
                .stages()
                .iter()
                .filter(|s| s.mesh.contains(*device))
                .map(|s| s.name.clone())
                .collect(),
        })
        .collect();

    Ok(PipelinePlan {
        pipeline: pipeline.name().to_string(),
        order: pipeline
            .nodes()
            .iter()
            .map(|n| pipeline.node_name(*n).to_string())
            .collect(),
        edges,
        membership,
    })
}
