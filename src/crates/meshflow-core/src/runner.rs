//! Stage runners
//!
//! A [`StageRunner`] is the compiled form of one stage. The engine treats it as
//! a black box with two entry points:
//!
//! - [`run`](StageRunner::run): compute real outputs from concrete inputs
//! - [`placeholder`](StageRunner::placeholder): return outputs with the correct
//!   shape and dtype but no data, without computing anything
//!
//! Runners are built by a [`StageRunnerFactory`] the first time a stage is
//! visited and cached by the executor for its whole lifetime.
//!
//! # Example
//!
//! ```rust
//! use meshflow_core::runner::FnStageRunner;
//! use meshflow_core::tensor::Tensor;
//!
//! let doubler = FnStageRunner::new(
//!     |inputs: &[Tensor]| {
//!         let data: Vec<f32> = inputs[0].data().unwrap().iter().map(|x| x * 2.0).collect();
//!         Ok(vec![Tensor::from_vec(data)])
//!     },
//!     |inputs: &[Tensor]| Ok(vec![inputs[0].meta().clone()]),
//! );
//! # let _ = doubler;
//! ```

use crate::error::Result;
use crate::pipeline::Stage;
use crate::tensor::{Tensor, TensorMeta};
use async_trait::async_trait;
use std::sync::Arc;

/// Executable form of a single stage
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Compute the stage's outputs from concrete inputs
    async fn run(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>>;

    /// Produce metadata-only outputs for the given (possibly placeholder) inputs
    ///
    /// Must describe exactly what [`run`](Self::run) would return for inputs
    /// with the same metadata.
    async fn placeholder(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>>;
}

/// Builds a runner from a stage description
pub trait StageRunnerFactory: Send + Sync {
    fn create(&self, stage: &Stage) -> Result<Arc<dyn StageRunner>>;
}

type ComputeFn = dyn Fn(&[Tensor]) -> Result<Vec<Tensor>> + Send + Sync;
type InferFn = dyn Fn(&[Tensor]) -> Result<Vec<TensorMeta>> + Send + Sync;

/// Runner assembled from a compute closure and a shape-inference closure
///
/// The placeholder path calls only the inference closure, so it never touches
/// input data and works on placeholder inputs.
#[derive(Clone)]
pub struct FnStageRunner {
    compute: Arc<ComputeFn>,
    infer: Arc<InferFn>,
}

impl FnStageRunner {
    pub fn new<C, I>(compute: C, infer: I) -> Self
    where
        C: Fn(&[Tensor]) -> Result<Vec<Tensor>> + Send + Sync + 'static,
        I: Fn(&[Tensor]) -> Result<Vec<TensorMeta>> + Send + Sync + 'static,
    {
        Self {
            compute: Arc::new(compute),
            infer: Arc::new(infer),
        }
    }
}

impl std::fmt::Debug for FnStageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStageRunner")
            .field("compute", &"<function>")
            .field("infer", &"<function>")
            .finish()
    }
}

#[async_trait]
impl StageRunner for FnStageRunner {
    async fn run(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        (self.compute)(inputs)
    }

    async fn placeholder(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        Ok((self.infer)(inputs)?
            .into_iter()
            .map(Tensor::placeholder)
            .collect())
    }
}

impl<F> StageRunnerFactory for F
where
    F: Fn(&Stage) -> Result<Arc<dyn StageRunner>> + Send + Sync,
{
    fn create(&self, stage: &Stage) -> Result<Arc<dyn StageRunner>> {
        self(stage)
    }
}
