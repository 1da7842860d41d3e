//! Pipeline executor
//!
//! One [`PipelineExecutor`] runs on every rank. All ranks execute the same
//! pipeline and visit its nodes in the same canonical order; what differs is
//! which stages each rank *materializes*.
//!
//! # Per-node behavior
//!
//! ```text
//! Stage node                           Communication node
//! ──────────                           ──────────────────
//! read inputs from ValueStore          lower edge -> TransferDescriptors
//! get/create cached runner             read producer value as payload
//! local?  ── yes ─> runner.run         for each descriptor, for each receiver:
//!         └─ no ──> runner.placeholder     send_recv(receiver, root, payload)
//! bind outputs in declared order       bind consumer value
//! ```
//!
//! A rank that is neither sender nor receiver of an edge never holds the
//! transferred data: it binds a placeholder with the producer's metadata so
//! that its downstream placeholder stages can still infer shapes.
//!
//! # Caches
//!
//! Membership ("is my device in this stage's mesh") and stage runners are
//! resolved once per stage and kept for the executor's lifetime. Value
//! bindings live for one [`run`](PipelineExecutor::run) only.
//!
//! # Example
//!
//! ```rust,no_run
//! use meshflow_core::communicator::LocalCommunicator;
//! use meshflow_core::executor::PipelineExecutor;
//! use meshflow_core::kernels::KernelRegistry;
//! use meshflow_core::pipeline::Pipeline;
//! use meshflow_core::rank::StaticRankMapping;
//! use meshflow_core::tensor::Tensor;
//! use std::sync::Arc;
//!
//! async fn run_rank(pipeline: Arc<Pipeline>, comm: LocalCommunicator) -> meshflow_core::Result<Vec<Tensor>> {
//!     let mapping = StaticRankMapping::identity(comm.rank(), comm.world_size())?;
//!     let mut executor = PipelineExecutor::new(
//!         pipeline,
//!         Arc::new(mapping),
//!         Arc::new(comm),
//!         Arc::new(KernelRegistry::with_builtins()),
//!     )?;
//!     executor.run(vec![Tensor::from_vec(vec![1.0, 2.0, 3.0])]).await
//! }
//! ```

use crate::communicator::Communicator;
use crate::config::ExecutorConfig;
use crate::error::{PipelineError, Result};
use crate::lowering::{lowering_for, CommunicationLowering};
use crate::mesh::{DeviceId, Rank};
use crate::pipeline::{EdgeId, Pipeline, PipelineNode, StageId};
use crate::rank::RankMapping;
use crate::runner::{StageRunner, StageRunnerFactory};
use crate::store::ValueStore;
use crate::tensor::Tensor;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// Counters accumulated over the executor's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionMetrics {
    /// Completed calls to `run`
    pub executions: u64,
    /// Membership cache misses
    pub membership_resolutions: u64,
    /// Runners built by the factory
    pub runner_constructions: u64,
    /// Stage visits that computed real outputs
    pub local_stage_runs: u64,
    /// Stage visits that produced placeholders
    pub placeholder_stage_runs: u64,
    pub transfers_sent: u64,
    pub transfers_received: u64,
}

/// Outputs of one execution together with every binding it made
#[derive(Debug)]
pub struct ExecutionResult {
    pub outputs: Vec<Tensor>,
    pub bindings: ValueStore,
}

/// Drives one rank through a pipeline
pub struct PipelineExecutor {
    pipeline: Arc<Pipeline>,
    mapping: Arc<dyn RankMapping>,
    communicator: Arc<dyn Communicator>,
    factory: Arc<dyn StageRunnerFactory>,
    lowering: Arc<dyn CommunicationLowering>,
    config: ExecutorConfig,
    local_rank: Rank,
    local_device: DeviceId,
    /// Nodes reaching the global outputs, canonical order
    plan: Vec<PipelineNode>,
    values: ValueStore,
    membership: HashMap<StageId, bool>,
    runners: HashMap<StageId, Arc<dyn StageRunner>>,
    metrics: ExecutionMetrics,
}

impl PipelineExecutor {
    /// Create an executor for the local rank of `mapping`
    ///
    /// # Errors
    ///
    /// Fails if the mapping cannot resolve the local device or any device
    /// referenced by a stage mesh.
    pub fn new(
        pipeline: Arc<Pipeline>,
        mapping: Arc<dyn RankMapping>,
        communicator: Arc<dyn Communicator>,
        factory: Arc<dyn StageRunnerFactory>,
    ) -> Result<Self> {
        let local_rank = mapping.local_rank();
        let local_device = mapping.local_device()?;
        for stage in pipeline.stages() {
            for device in stage.mesh.devices() {
                mapping.device_to_rank(*device)?;
            }
        }
        let plan = pipeline.traverse_to(pipeline.outputs());
        let config = ExecutorConfig::default();

        Ok(Self {
            lowering: lowering_for(config.lowering),
            pipeline,
            mapping,
            communicator,
            factory,
            config,
            local_rank,
            local_device,
            plan,
            values: ValueStore::new(),
            membership: HashMap::new(),
            runners: HashMap::new(),
            metrics: ExecutionMetrics::default(),
        })
    }

    /// Apply a configuration; also selects the configured lowering policy
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.lowering = lowering_for(config.lowering);
        self.config = config;
        self
    }

    /// Substitute a custom lowering strategy
    pub fn with_lowering(mut self, lowering: Arc<dyn CommunicationLowering>) -> Self {
        self.lowering = lowering;
        self
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn local_rank(&self) -> Rank {
        self.local_rank
    }

    pub fn local_device(&self) -> DeviceId {
        self.local_device
    }

    pub fn metrics(&self) -> &ExecutionMetrics {
        &self.metrics
    }

    /// Whether the local device belongs to the stage's mesh
    ///
    /// Resolved on first query and cached for the executor's lifetime.
    pub fn is_local(&mut self, stage: StageId) -> bool {
        if let Some(local) = self.membership.get(&stage) {
            return *local;
        }
        let local = self.pipeline.stage(stage).mesh.contains(self.local_device);
        self.membership.insert(stage, local);
        self.metrics.membership_resolutions += 1;
        local
    }

    /// Execute the pipeline once and return the global outputs
    ///
    /// Outputs of stages that are not local to this rank come back as
    /// placeholders. Bindings are discarded when the call returns; runner and
    /// membership caches are kept.
    ///
    /// # Errors
    ///
    /// Every error is fatal for the execution: wrong input count, unbound
    /// value, runner failure or arity mismatch, empty sender set, transport
    /// failure.
    pub async fn run(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        let result = self.run_and_collect(inputs).await?;
        Ok(result.outputs)
    }

    /// Like [`run`](Self::run) but also hands back the execution's bindings
    pub async fn run_and_collect(&mut self, inputs: Vec<Tensor>) -> Result<ExecutionResult> {
        let span = tracing::info_span!(
            "execute",
            pipeline = %self.pipeline.name(),
            rank = self.local_rank,
            device = self.local_device
        );
        let result = self.execute(inputs).instrument(span).await;
        let bindings = std::mem::take(&mut self.values);

        match result {
            Ok(outputs) => {
                self.metrics.executions += 1;
                Ok(ExecutionResult { outputs, bindings })
            }
            Err(e) => {
                tracing::error!(rank = self.local_rank, error = %e, "Pipeline execution failed");
                Err(e)
            }
        }
    }

    async fn execute(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        let pipeline = Arc::clone(&self.pipeline);
        if inputs.len() != pipeline.inputs().len() {
            return Err(PipelineError::InputArity {
                expected: pipeline.inputs().len(),
                actual: inputs.len(),
            });
        }

        tracing::info!(nodes = self.plan.len(), "Starting execution");
        self.values.clear();
        for (value, tensor) in pipeline.inputs().iter().zip(inputs) {
            self.values.bind(*value, pipeline.value_name(*value), tensor)?;
        }

        let plan = self.plan.clone();
        for node in plan {
            match node {
                PipelineNode::Stage(id) => self.run_stage(id).await?,
                PipelineNode::Communication(id) => self.execute_edge(id).await?,
            }
        }

        let outputs = pipeline
            .outputs()
            .iter()
            .map(|value| {
                self.values
                    .get(*value)
                    .cloned()
                    .ok_or_else(|| PipelineError::unbound(pipeline.value_name(*value), "global outputs"))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            outputs = outputs.len(),
            placeholders = outputs.iter().filter(|t| t.is_placeholder()).count(),
            "Execution finished"
        );
        Ok(outputs)
    }

    fn runner(&mut self, stage: StageId) -> Result<Arc<dyn StageRunner>> {
        if let Some(runner) = self.runners.get(&stage) {
            tracing::trace!(stage = %self.pipeline.stage(stage).name, "Runner cache hit");
            return Ok(Arc::clone(runner));
        }
        let runner = self.factory.create(self.pipeline.stage(stage))?;
        self.runners.insert(stage, Arc::clone(&runner));
        self.metrics.runner_constructions += 1;
        Ok(runner)
    }

    async fn run_stage(&mut self, id: StageId) -> Result<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let stage = pipeline.stage(id);

        let inputs = stage
            .inputs
            .iter()
            .map(|value| {
                self.values
                    .get(*value)
                    .cloned()
                    .ok_or_else(|| PipelineError::unbound(pipeline.value_name(*value), &stage.name))
            })
            .collect::<Result<Vec<_>>>()?;

        let runner = self.runner(id)?;
        let local = self.is_local(id);
        tracing::debug!(stage = %stage.name, mesh = %stage.mesh, local, "Visiting stage");

        let outputs = if local {
            runner.run(&inputs).await
        } else {
            runner.placeholder(&inputs).await
        }
        .map_err(|e| match e {
            PipelineError::StageExecution { error, .. } => PipelineError::stage_execution(&stage.name, error),
            other => PipelineError::stage_execution(&stage.name, other.to_string()),
        })?;

        if outputs.len() != stage.outputs.len() {
            return Err(PipelineError::OutputArity {
                stage: stage.name.clone(),
                expected: stage.outputs.len(),
                actual: outputs.len(),
            });
        }

        for (value, tensor) in stage.outputs.iter().zip(outputs) {
            self.values.bind(*value, pipeline.value_name(*value), tensor)?;
        }

        if local {
            self.metrics.local_stage_runs += 1;
        } else {
            self.metrics.placeholder_stage_runs += 1;
        }
        Ok(())
    }

    async fn execute_edge(&mut self, id: EdgeId) -> Result<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let edge = pipeline.edge(id);

        let to_ranks = |devices: &[DeviceId]| -> Result<Vec<Rank>> {
            devices.iter().map(|d| self.mapping.device_to_rank(*d)).collect()
        };
        let senders = to_ranks(pipeline.sender_mesh(edge).devices())?;
        let receivers = to_ranks(pipeline.receiver_mesh(edge).devices())?;
        let descriptors = self.lowering.lower(&edge.name, &senders, &receivers)?;

        let mut payload = self
            .values
            .get(edge.input)
            .cloned()
            .ok_or_else(|| PipelineError::unbound(pipeline.value_name(edge.input), &edge.name))?;
        let expected = payload.meta().clone();
        let me = self.local_rank;

        for descriptor in &descriptors {
            let root = descriptor.root;
            for &receiver in &descriptor.receivers {
                // The root already holds the payload.
                if receiver == root || (me != root && me != receiver) {
                    continue;
                }
                tracing::debug!(edge = %edge.name, root, receiver, "Transfer");
                self.communicator.send_recv(receiver, root, &mut payload).await?;

                if me == root {
                    self.metrics.transfers_sent += 1;
                } else {
                    self.metrics.transfers_received += 1;
                    if self.config.verify_transfers && payload.meta() != &expected {
                        return Err(PipelineError::TransferMismatch {
                            edge: edge.name.clone(),
                            expected: expected.to_string(),
                            actual: payload.meta().to_string(),
                        });
                    }
                }
            }
        }

        let participates = senders.contains(&me) || receivers.contains(&me);
        let bound = if participates {
            payload
        } else {
            payload.to_placeholder()
        };
        self.values.bind(edge.output, pipeline.value_name(edge.output), bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::DeviceMesh;
    use crate::pipeline::{KernelSpec, PipelineBuilder, Stage};
    use crate::rank::StaticRankMapping;
    use crate::runner::FnStageRunner;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Communicator recording every call and never delivering data
    #[derive(Default)]
    struct RecordingCommunicator {
        calls: Mutex<Vec<(Rank, Rank)>>,
    }

    #[async_trait]
    impl Communicator for RecordingCommunicator {
        async fn send_recv(&self, receiver: Rank, sender: Rank, _tensor: &mut Tensor) -> Result<()> {
            self.calls.lock().unwrap().push((receiver, sender));
            Ok(())
        }
    }

    /// Communicator that overwrites every received payload with `delivered`
    struct ForgingCommunicator {
        delivered: Tensor,
    }

    #[async_trait]
    impl Communicator for ForgingCommunicator {
        async fn send_recv(&self, _receiver: Rank, _sender: Rank, tensor: &mut Tensor) -> Result<()> {
            *tensor = self.delivered.clone();
            Ok(())
        }
    }

    /// Factory counting constructions; every runner doubles its single input
    struct CountingFactory {
        built: Arc<AtomicUsize>,
        outputs: usize,
    }

    impl StageRunnerFactory for CountingFactory {
        fn create(&self, _stage: &Stage) -> Result<Arc<dyn StageRunner>> {
            self.built.fetch_add(1, Ordering::SeqCst);
            let n = self.outputs;
            Ok(Arc::new(FnStageRunner::new(
                move |inputs: &[Tensor]| {
                    let data = inputs[0]
                        .data()
                        .ok_or_else(|| PipelineError::stage_execution("double", "placeholder input"))?;
                    let doubled = Tensor::from_vec(data.iter().map(|x| x * 2.0).collect());
                    Ok(vec![doubled; n])
                },
                move |inputs: &[Tensor]| Ok(vec![inputs[0].meta().clone(); n]),
            )))
        }
    }

    fn mesh(devices: &[u32]) -> DeviceMesh {
        DeviceMesh::new(devices.to_vec()).unwrap()
    }

    /// x -> s1 {0} -> v1 => v2 -> s2 {1, 2} -> y
    fn scenario() -> Arc<Pipeline> {
        let mut b = PipelineBuilder::new("scenario");
        let x = b.add_value("x");
        let v1 = b.add_value("v1");
        let v2 = b.add_value("v2");
        let y = b.add_value("y");
        b.add_stage("s1", mesh(&[0]), &[x], &[v1], KernelSpec::named("double"));
        b.connect(v1, v2);
        b.add_stage("s2", mesh(&[1, 2]), &[v2], &[y], KernelSpec::named("double"));
        b.add_input(x);
        b.add_output(y);
        Arc::new(b.build().unwrap())
    }

    fn executor(
        pipeline: Arc<Pipeline>,
        rank: Rank,
        comm: Arc<RecordingCommunicator>,
        built: Arc<AtomicUsize>,
        outputs: usize,
    ) -> PipelineExecutor {
        PipelineExecutor::new(
            pipeline,
            Arc::new(StaticRankMapping::identity(rank, 3).unwrap()),
            comm,
            Arc::new(CountingFactory { built, outputs }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sender_rank_computes_and_sends() {
        let comm = Arc::new(RecordingCommunicator::default());
        let built = Arc::new(AtomicUsize::new(0));
        let mut exec = executor(scenario(), 0, comm.clone(), built, 1);

        let result = exec
            .run_and_collect(vec![Tensor::from_vec(vec![1.0, 2.0, 3.0])])
            .await
            .unwrap();

        // s1 is local, s2 is not.
        assert!(result.outputs[0].is_placeholder());
        assert_eq!(result.outputs[0].shape(), &[3]);
        let v2 = exec.pipeline().value_id("v2").unwrap();
        assert_eq!(result.bindings.get(v2).and_then(|t| t.data()), Some(&[2.0, 4.0, 6.0][..]));

        assert_eq!(*comm.calls.lock().unwrap(), vec![(1, 0), (2, 0)]);
        assert_eq!(exec.metrics().transfers_sent, 2);
        assert_eq!(exec.metrics().local_stage_runs, 1);
        assert_eq!(exec.metrics().placeholder_stage_runs, 1);
    }

    #[tokio::test]
    async fn test_receiver_rank_only_talks_to_its_root() {
        let comm = Arc::new(RecordingCommunicator::default());
        let built = Arc::new(AtomicUsize::new(0));
        let mut exec = executor(scenario(), 2, comm.clone(), built, 1);

        // The recording communicator delivers nothing, so the verification
        // must not trip on an unchanged placeholder payload.
        let outputs = exec.run(vec![Tensor::from_vec(vec![1.0])]).await;
        assert_eq!(*comm.calls.lock().unwrap(), vec![(2, 0)]);
        // s2 is local on rank 2 but its input stayed a placeholder.
        assert!(matches!(outputs, Err(PipelineError::StageExecution { .. })));
    }

    #[tokio::test]
    async fn test_caches_persist_across_runs() {
        let comm = Arc::new(RecordingCommunicator::default());
        let built = Arc::new(AtomicUsize::new(0));
        let mut exec = executor(scenario(), 0, comm, built.clone(), 1);

        for _ in 0..3 {
            exec.run(vec![Tensor::from_vec(vec![1.0])]).await.unwrap();
        }

        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(exec.metrics().runner_constructions, 2);
        assert_eq!(exec.metrics().membership_resolutions, 2);
        assert_eq!(exec.metrics().executions, 3);
    }

    #[tokio::test]
    async fn test_membership_is_stable() {
        let comm = Arc::new(RecordingCommunicator::default());
        let built = Arc::new(AtomicUsize::new(0));
        let mut exec = executor(scenario(), 1, comm, built, 1);

        for _ in 0..2 {
            assert!(!exec.is_local(StageId(0)));
            assert!(exec.is_local(StageId(1)));
        }
        assert_eq!(exec.metrics().membership_resolutions, 2);
    }

    #[tokio::test]
    async fn test_input_arity_mismatch() {
        let comm = Arc::new(RecordingCommunicator::default());
        let built = Arc::new(AtomicUsize::new(0));
        let mut exec = executor(scenario(), 0, comm.clone(), built.clone(), 1);

        let err = exec.run(vec![]).await.unwrap_err();
        assert!(matches!(err, PipelineError::InputArity { expected: 1, actual: 0 }));
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert!(comm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_output_arity_mismatch() {
        let comm = Arc::new(RecordingCommunicator::default());
        let built = Arc::new(AtomicUsize::new(0));
        let mut exec = executor(scenario(), 0, comm, built, 2);

        let err = exec.run(vec![Tensor::from_vec(vec![1.0])]).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::OutputArity { ref stage, expected: 1, actual: 2 } if stage == "s1"
        ));
    }

    #[tokio::test]
    async fn test_bystander_binds_placeholder() {
        // Rank 3 is outside both meshes of the edge but runs a downstream stage.
        let mut b = PipelineBuilder::new("bystander");
        let x = b.add_value("x");
        let v1 = b.add_value("v1");
        let v2 = b.add_value("v2");
        let y = b.add_value("y");
        let z = b.add_value("z");
        b.add_stage("s1", mesh(&[0]), &[x], &[v1], KernelSpec::named("double"));
        b.connect(v1, v2);
        b.add_stage("s2", mesh(&[1]), &[v2], &[y], KernelSpec::named("double"));
        b.add_stage("s3", mesh(&[2]), &[y], &[z], KernelSpec::named("double"));
        b.add_input(x);
        b.add_output(z);
        let pipeline = Arc::new(b.build().unwrap());

        let comm = Arc::new(RecordingCommunicator::default());
        let mut exec = executor(pipeline, 2, comm.clone(), Arc::new(AtomicUsize::new(0)), 1);
        let err = exec.run(vec![Tensor::from_vec(vec![1.0, 1.0])]).await.unwrap_err();

        // Rank 2 never communicates on the edge; s3 then fails on its
        // placeholder input because y was never sent to rank 2.
        assert!(comm.calls.lock().unwrap().is_empty());
        assert!(matches!(err, PipelineError::StageExecution { ref stage, .. } if stage == "s3"));
    }

    #[tokio::test]
    async fn test_unknown_device_rejected() {
        let mut b = PipelineBuilder::new("far");
        let x = b.add_value("x");
        let y = b.add_value("y");
        b.add_stage("s", mesh(&[9]), &[x], &[y], KernelSpec::named("double"));
        b.add_input(x);
        b.add_output(y);

        let result = PipelineExecutor::new(
            Arc::new(b.build().unwrap()),
            Arc::new(StaticRankMapping::identity(0, 2).unwrap()),
            Arc::new(RecordingCommunicator::default()),
            Arc::new(CountingFactory { built: Arc::new(AtomicUsize::new(0)), outputs: 1 }),
        );
        assert!(matches!(result, Err(PipelineError::UnknownDevice(9))));
    }

    fn receiver_with_forged_payload(verify_transfers: bool) -> PipelineExecutor {
        let comm = ForgingCommunicator { delivered: Tensor::from_vec(vec![5.0, 7.0]) };
        let config = ExecutorConfig { verify_transfers, ..ExecutorConfig::default() };
        PipelineExecutor::new(
            scenario(),
            Arc::new(StaticRankMapping::identity(1, 3).unwrap()),
            Arc::new(comm),
            Arc::new(CountingFactory { built: Arc::new(AtomicUsize::new(0)), outputs: 1 }),
        )
        .unwrap()
        .with_config(config)
    }

    #[tokio::test]
    async fn test_mismatched_transfer_rejected() {
        let mut exec = receiver_with_forged_payload(true);

        // Rank 1 expects v1 as f32[3] but receives f32[2].
        let err = exec.run(vec![Tensor::from_vec(vec![1.0, 2.0, 3.0])]).await.unwrap_err();
        match err {
            PipelineError::TransferMismatch { edge, expected, actual } => {
                assert_eq!(edge, "v1 -> v2");
                assert_eq!(expected, "f32[3]");
                assert_eq!(actual, "f32[2]");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(exec.metrics().local_stage_runs, 0);
    }

    #[tokio::test]
    async fn test_mismatched_transfer_accepted_without_verification() {
        let mut exec = receiver_with_forged_payload(false);

        let result = exec
            .run_and_collect(vec![Tensor::from_vec(vec![1.0, 2.0, 3.0])])
            .await
            .unwrap();

        let v2 = exec.pipeline().value_id("v2").unwrap();
        assert_eq!(result.bindings.get(v2).and_then(|t| t.data()), Some(&[5.0, 7.0][..]));
        assert_eq!(result.outputs[0].data(), Some(&[10.0, 14.0][..]));
        assert_eq!(exec.metrics().transfers_received, 1);
    }
}
