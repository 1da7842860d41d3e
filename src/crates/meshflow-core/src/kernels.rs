//! Kernel registry
//!
//! A [`KernelRegistry`] maps kernel names to runner builders and acts as the
//! [`StageRunnerFactory`] for pipelines whose stages reference kernels by
//! name, such as those loaded from YAML.
//!
//! # Built-in kernels
//!
//! | Name | Inputs | Outputs | Parameters |
//! |------|--------|---------|------------|
//! | `identity` | n | n | |
//! | `scale` | 1 | 1 | `factor` (number, default 1.0) |
//! | `add` | 2 (same shape) | 1 | |
//! | `relu` | 1 | 1 | |
//! | `sum` | 1 | 1 (shape `[1]`) | |
//!
//! Every built-in keeps the input dtype. Shape inference never reads data, so
//! the placeholder path works on placeholder inputs.
//!
//! ```rust
//! use meshflow_core::kernels::KernelRegistry;
//! use meshflow_core::runner::{FnStageRunner, StageRunner};
//! use std::sync::Arc;
//!
//! let mut registry = KernelRegistry::with_builtins();
//! registry.register("passthrough", |_stage| {
//!     Ok(Arc::new(FnStageRunner::new(
//!         |inputs| Ok(inputs.to_vec()),
//!         |inputs| Ok(inputs.iter().map(|t| t.meta().clone()).collect()),
//!     )) as Arc<dyn StageRunner>)
//! });
//! assert!(registry.has_kernel("passthrough"));
//! ```

use crate::error::{PipelineError, Result};
use crate::pipeline::Stage;
use crate::runner::{FnStageRunner, StageRunner, StageRunnerFactory};
use crate::tensor::{Tensor, TensorMeta};
use std::collections::HashMap;
use std::sync::Arc;

type KernelBuilder = dyn Fn(&Stage) -> Result<Arc<dyn StageRunner>> + Send + Sync;

/// Named kernels available to stages
#[derive(Clone, Default)]
pub struct KernelRegistry {
    kernels: HashMap<String, Arc<KernelBuilder>>,
}

impl KernelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in kernels
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("identity", identity);
        registry.register("scale", scale);
        registry.register("add", add);
        registry.register("relu", relu);
        registry.register("sum", sum);
        registry
    }

    /// Register a kernel, replacing any kernel of the same name
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(&Stage) -> Result<Arc<dyn StageRunner>> + Send + Sync + 'static,
    {
        self.kernels.insert(name.into(), Arc::new(builder));
    }

    pub fn has_kernel(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }

    /// Registered kernel names, sorted
    pub fn kernel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kernels.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelRegistry")
            .field("kernels", &self.kernel_names())
            .finish()
    }
}

impl StageRunnerFactory for KernelRegistry {
    fn create(&self, stage: &Stage) -> Result<Arc<dyn StageRunner>> {
        let builder = self.kernels.get(&stage.kernel.name).ok_or_else(|| {
            PipelineError::UnknownKernel(format!(
                "'{}' used by stage '{}' (available: {})",
                stage.kernel.name,
                stage.name,
                self.kernel_names().join(", ")
            ))
        })?;
        tracing::debug!(stage = %stage.name, kernel = %stage.kernel.name, "Building stage runner");
        builder(stage)
    }
}

fn expect_arity(stage: &Stage, inputs: usize, outputs: usize) -> Result<()> {
    if stage.inputs.len() != inputs || stage.outputs.len() != outputs {
        return Err(PipelineError::Validation(format!(
            "Kernel '{}' takes {} input(s) and {} output(s), stage '{}' declares {} and {}",
            stage.kernel.name,
            inputs,
            outputs,
            stage.name,
            stage.inputs.len(),
            stage.outputs.len()
        )));
    }
    Ok(())
}

fn concrete<'a>(kernel: &str, tensor: &'a Tensor) -> Result<&'a [f32]> {
    tensor
        .data()
        .ok_or_else(|| PipelineError::stage_execution(kernel, "received a placeholder input"))
}

fn dense(kernel: &str, meta: TensorMeta, data: Vec<f32>) -> Result<Tensor> {
    Tensor::new(meta.shape, meta.dtype, data)
        .map_err(|e| PipelineError::stage_execution(kernel, e.to_string()))
}

/// Unary elementwise kernel keeping shape and dtype
fn elementwise<F>(kernel: &'static str, op: F) -> Arc<dyn StageRunner>
where
    F: Fn(f32) -> f32 + Send + Sync + 'static,
{
    Arc::new(FnStageRunner::new(
        move |inputs: &[Tensor]| {
            let data = concrete(kernel, &inputs[0])?;
            let out = data.iter().map(|x| op(*x)).collect();
            Ok(vec![dense(kernel, inputs[0].meta().clone(), out)?])
        },
        |inputs: &[Tensor]| Ok(vec![inputs[0].meta().clone()]),
    ))
}

fn identity(stage: &Stage) -> Result<Arc<dyn StageRunner>> {
    expect_arity(stage, stage.inputs.len(), stage.inputs.len())?;
    Ok(Arc::new(FnStageRunner::new(
        |inputs: &[Tensor]| {
            for input in inputs {
                concrete("identity", input)?;
            }
            Ok(inputs.to_vec())
        },
        |inputs: &[Tensor]| Ok(inputs.iter().map(|t| t.meta().clone()).collect()),
    )))
}

fn scale(stage: &Stage) -> Result<Arc<dyn StageRunner>> {
    expect_arity(stage, 1, 1)?;
    let factor = match stage.kernel.params.get("factor") {
        None => 1.0,
        Some(value) => value.as_f64().ok_or_else(|| {
            PipelineError::Validation(format!(
                "Stage '{}': scale factor must be a number, got {}",
                stage.name, value
            ))
        })? as f32,
    };
    Ok(elementwise("scale", move |x| x * factor))
}

fn relu(stage: &Stage) -> Result<Arc<dyn StageRunner>> {
    expect_arity(stage, 1, 1)?;
    Ok(elementwise("relu", |x| x.max(0.0)))
}

fn add(stage: &Stage) -> Result<Arc<dyn StageRunner>> {
    expect_arity(stage, 2, 1)?;
    fn check(inputs: &[Tensor]) -> Result<TensorMeta> {
        let (lhs, rhs) = (inputs[0].meta(), inputs[1].meta());
        if lhs != rhs {
            return Err(PipelineError::stage_execution(
                "add",
                format!("operand mismatch: {} vs {}", lhs, rhs),
            ));
        }
        Ok(lhs.clone())
    }
    Ok(Arc::new(FnStageRunner::new(
        |inputs: &[Tensor]| {
            let meta = check(inputs)?;
            let lhs = concrete("add", &inputs[0])?;
            let rhs = concrete("add", &inputs[1])?;
            let out = lhs.iter().zip(rhs).map(|(a, b)| a + b).collect();
            Ok(vec![dense("add", meta, out)?])
        },
        |inputs: &[Tensor]| Ok(vec![check(inputs)?]),
    )))
}

fn sum(stage: &Stage) -> Result<Arc<dyn StageRunner>> {
    expect_arity(stage, 1, 1)?;
    let reduced = |input: &Tensor| TensorMeta::new(vec![1], input.dtype());
    Ok(Arc::new(FnStageRunner::new(
        move |inputs: &[Tensor]| {
            let total: f32 = concrete("sum", &inputs[0])?.iter().sum();
            Ok(vec![dense("sum", reduced(&inputs[0]), vec![total])?])
        },
        move |inputs: &[Tensor]| Ok(vec![reduced(&inputs[0])]),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::DeviceMesh;
    use crate::pipeline::{KernelSpec, StageId, ValueId};
    use crate::tensor::DType;
    use serde_json::json;

    fn stage(kernel: KernelSpec, inputs: usize, outputs: usize) -> Stage {
        Stage {
            id: StageId(0),
            name: "s".to_string(),
            mesh: DeviceMesh::single(0),
            inputs: (0..inputs).map(ValueId).collect(),
            outputs: (inputs..inputs + outputs).map(ValueId).collect(),
            kernel,
        }
    }

    async fn run_both(runner: &Arc<dyn StageRunner>, inputs: &[Tensor]) -> (Vec<Tensor>, Vec<Tensor>) {
        let real = runner.run(inputs).await.unwrap();
        let placeholders: Vec<Tensor> = inputs.iter().map(Tensor::to_placeholder).collect();
        let inferred = runner.placeholder(&placeholders).await.unwrap();
        (real, inferred)
    }

    #[tokio::test]
    async fn test_scale_and_placeholder_agree() {
        let registry = KernelRegistry::with_builtins();
        let runner = registry
            .create(&stage(KernelSpec::with_params("scale", json!({"factor": 0.5})), 1, 1))
            .unwrap();

        let input = Tensor::new(vec![2, 2], DType::Bf16, vec![2.0, 4.0, 6.0, 8.0]).unwrap();
        let (real, inferred) = run_both(&runner, &[input]).await;

        assert_eq!(real[0].data(), Some(&[1.0, 2.0, 3.0, 4.0][..]));
        assert_eq!(real[0].meta(), inferred[0].meta());
        assert!(inferred[0].is_placeholder());
    }

    #[tokio::test]
    async fn test_add_rejects_mismatched_operands() {
        let registry = KernelRegistry::with_builtins();
        let runner = registry.create(&stage(KernelSpec::named("add"), 2, 1)).unwrap();

        let ok = runner
            .run(&[Tensor::from_vec(vec![1.0, 2.0]), Tensor::from_vec(vec![3.0, 4.0])])
            .await
            .unwrap();
        assert_eq!(ok[0].data(), Some(&[4.0, 6.0][..]));

        let err = runner
            .placeholder(&[Tensor::from_vec(vec![1.0]), Tensor::from_vec(vec![1.0, 2.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::StageExecution { .. }));
    }

    #[tokio::test]
    async fn test_relu_sum_identity() {
        let registry = KernelRegistry::with_builtins();
        let input = Tensor::from_vec(vec![-1.0, 2.0, -3.0, 4.0]);

        let relu = registry.create(&stage(KernelSpec::named("relu"), 1, 1)).unwrap();
        let (real, _) = run_both(&relu, &[input.clone()]).await;
        assert_eq!(real[0].data(), Some(&[0.0, 2.0, 0.0, 4.0][..]));

        let sum = registry.create(&stage(KernelSpec::named("sum"), 1, 1)).unwrap();
        let (real, inferred) = run_both(&sum, &[input.clone()]).await;
        assert_eq!(real[0].data(), Some(&[2.0][..]));
        assert_eq!(inferred[0].shape(), &[1]);

        let identity = registry.create(&stage(KernelSpec::named("identity"), 2, 2)).unwrap();
        let (real, _) = run_both(&identity, &[input.clone(), input.clone()]).await;
        assert_eq!(real, vec![input.clone(), input]);
    }

    #[tokio::test]
    async fn test_real_run_refuses_placeholders() {
        let registry = KernelRegistry::with_builtins();
        let runner = registry.create(&stage(KernelSpec::named("relu"), 1, 1)).unwrap();
        let err = runner
            .run(&[Tensor::from_vec(vec![1.0]).to_placeholder()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn test_unknown_kernel_and_bad_arity() {
        let registry = KernelRegistry::with_builtins();
        assert!(matches!(
            registry.create(&stage(KernelSpec::named("softmax"), 1, 1)),
            Err(PipelineError::UnknownKernel(_))
        ));
        assert!(matches!(
            registry.create(&stage(KernelSpec::named("add"), 1, 1)),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            registry.create(&stage(KernelSpec::with_params("scale", json!({"factor": "big"})), 1, 1)),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_kernel_names_sorted() {
        assert_eq!(
            KernelRegistry::with_builtins().kernel_names(),
            vec!["add", "identity", "relu", "scale", "sum"]
        );
    }
}
