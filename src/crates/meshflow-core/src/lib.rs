//! # meshflow-core - Pipeline execution across device meshes
//!
//! `meshflow-core` runs a computation graph that has been partitioned into
//! **stages**, each assigned to a **device mesh**, on every rank of a
//! distributed world. Every rank executes the same pipeline in the same order;
//! a rank computes the stages whose mesh contains its device and produces
//! metadata-only placeholders for the rest. Values crossing meshes move over
//! **communication edges**, lowered into point-to-point transfers.
//!
//! ## Core Concepts
//!
//! - [`Pipeline`] / [`PipelineBuilder`]: validated graph with a canonical
//!   topological order shared by all ranks
//! - [`StageRunner`]: compiled form of a stage, with a real and a placeholder
//!   entry point
//! - [`CommunicationLowering`]: turns an edge into [`TransferDescriptor`]s
//! - [`Communicator`]: symmetric point-to-point transport
//! - [`PipelineExecutor`]: per-rank driver caching membership and runners
//!
//! ## Execution Model
//!
//! ```text
//! rank 0 (device 0)          rank 1 (device 1)          rank 2 (device 2)
//! ─────────────────          ─────────────────          ─────────────────
//! s1: run          [data]    s1: placeholder  [meta]    s1: placeholder  [meta]
//! v1 -> v2: send to 1, 2     v1 -> v2: recv from 0      v1 -> v2: recv from 0
//! s2: placeholder  [meta]    s2: run          [data]    s2: run          [data]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshflow_core::{simulate, ExecutorConfig, KernelRegistry, Tensor, YamlPipelineDef};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> meshflow_core::Result<()> {
//!     let def = YamlPipelineDef::from_file("pipeline.yaml")?;
//!     let pipeline = Arc::new(def.build()?);
//!
//!     let report = simulate(
//!         pipeline,
//!         &def.world()?,
//!         Arc::new(KernelRegistry::with_builtins()),
//!         ExecutorConfig::default(),
//!         vec![Tensor::from_vec(vec![1.0, 2.0, 3.0])],
//!         1,
//!     )
//!     .await?;
//!
//!     for output in report.materialized_outputs().into_iter().flatten() {
//!         println!("{}", output);
//!     }
//!     Ok(())
//! }
//! ```

pub mod communicator;
pub mod config;
pub mod error;
pub mod executor;
pub mod kernels;
pub mod lowering;
pub mod mesh;
pub mod pipeline;
pub mod rank;
pub mod runner;
pub mod simulation;
pub mod store;
pub mod tensor;
pub mod yaml;

pub use communicator::{Communicator, LocalCommunicator};
pub use config::{ExecutorConfig, LoweringPolicy};
pub use error::{PipelineError, Result};
pub use executor::{ExecutionMetrics, ExecutionResult, PipelineExecutor};
pub use kernels::KernelRegistry;
pub use lowering::{
    lowering_for, CommunicationLowering, EvenSplitLowering, RoundRobinLowering, TransferDescriptor,
};
pub use mesh::{DeviceId, DeviceMesh, Rank};
pub use pipeline::{
    CommunicationEdge, EdgeId, KernelSpec, Pipeline, PipelineBuilder, PipelineNode, Stage, StageId,
    ValueId,
};
pub use rank::{RankMapping, StaticRankMapping};
pub use runner::{FnStageRunner, StageRunner, StageRunnerFactory};
pub use simulation::{lower_pipeline_plan, simulate, PipelinePlan, SimulationReport};
pub use store::ValueStore;
pub use tensor::{DType, Tensor, TensorMeta};
pub use yaml::YamlPipelineDef;
