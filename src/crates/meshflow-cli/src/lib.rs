//! # meshflow-cli
//!
//! Commands behind the `meshflow` binary. Each command returns its report as
//! a string so the binary only has to print it.

use anyhow::{bail, Context, Result};
use meshflow_core::{
    lower_pipeline_plan, simulate, ExecutorConfig, KernelRegistry, LoweringPolicy, Pipeline,
    Tensor, YamlPipelineDef,
};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

/// Load the executor configuration, applying a policy override
pub fn load_config(path: Option<&Path>, policy: Option<LoweringPolicy>) -> Result<ExecutorConfig> {
    let config = match path {
        Some(path) => ExecutorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ExecutorConfig::default(),
    };
    Ok(match policy {
        Some(policy) => config.with_lowering(policy),
        None => config,
    })
}

fn load(file: &Path) -> Result<(YamlPipelineDef, Pipeline)> {
    let def = YamlPipelineDef::from_file(file)
        .with_context(|| format!("Failed to read pipeline {}", file.display()))?;
    let pipeline = def
        .build()
        .with_context(|| format!("Pipeline '{}' is invalid", def.name))?;
    Ok((def, pipeline))
}

/// Check that a definition builds and every kernel it names exists
pub fn validate(file: &Path) -> Result<String> {
    let (def, pipeline) = load(file)?;
    let registry = KernelRegistry::with_builtins();
    for stage in pipeline.stages() {
        if !registry.has_kernel(&stage.kernel.name) {
            bail!(
                "Stage '{}' uses unknown kernel '{}' (available: {})",
                stage.name,
                stage.kernel.name,
                registry.kernel_names().join(", ")
            );
        }
    }
    let world = def.world()?;

    let mut out = String::new();
    writeln!(out, "✓ Pipeline is valid")?;
    writeln!(out, "  Name: {}", pipeline.name())?;
    if let Some(desc) = &def.description {
        writeln!(out, "  Description: {}", desc)?;
    }
    writeln!(out, "  Stages: {}", pipeline.stages().len())?;
    writeln!(out, "  Communication edges: {}", pipeline.edges().len())?;
    writeln!(out, "  Devices: {:?}", world)?;
    Ok(out)
}

/// Show canonical order, lowered transfers and per-device membership
pub fn inspect(file: &Path, config: &ExecutorConfig, json: bool) -> Result<String> {
    let (def, pipeline) = load(file)?;
    let plan = lower_pipeline_plan(&pipeline, &def.world()?, config)?;
    if json {
        return Ok(serde_json::to_string_pretty(&plan)?);
    }

    let mut out = String::new();
    writeln!(out, "Pipeline: {} ({:?})", plan.pipeline, config.lowering)?;
    writeln!(out, "\nExecution order:")?;
    for (i, node) in plan.order.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, node)?;
    }
    writeln!(out, "\nTransfers:")?;
    for edge in &plan.edges {
        writeln!(out, "  {} (senders {:?} -> receivers {:?})", edge.edge, edge.senders, edge.receivers)?;
        for t in &edge.transfers {
            if !t.receivers.is_empty() {
                writeln!(out, "    rank {} -> {:?}", t.root, t.receivers)?;
            }
        }
    }
    writeln!(out, "\nMembership:")?;
    for m in &plan.membership {
        writeln!(out, "  rank {} (device {}): {}", m.rank, m.device, m.local_stages.join(", "))?;
    }
    Ok(out)
}

/// Run the pipeline on every rank of its world inside this process
///
/// `inputs` is a JSON list of tensors; without it the definition's `data`
/// section is used.
pub async fn simulate_file(
    file: &Path,
    config: ExecutorConfig,
    inputs: Option<&str>,
    iterations: usize,
) -> Result<String> {
    let (def, pipeline) = load(file)?;
    let inputs: Vec<Tensor> = match inputs {
        Some(raw) => serde_json::from_str(raw).context("Inputs must be a JSON list of tensors")?,
        None => def.sample_inputs()?,
    };
    let world = def.world()?;

    let report = simulate(
        Arc::new(pipeline),
        &world,
        Arc::new(KernelRegistry::with_builtins()),
        config,
        inputs,
        iterations.max(1),
    )
    .await?;

    let mut out = String::new();
    writeln!(out, "Simulated {} rank(s)", report.ranks.len())?;
    for rank in &report.ranks {
        let m = &rank.metrics;
        writeln!(
            out,
            "  rank {} (device {}): {} local, {} placeholder, {} sent, {} received",
            rank.rank, rank.device, m.local_stage_runs, m.placeholder_stage_runs, m.transfers_sent, m.transfers_received
        )?;
    }
    writeln!(out, "\nOutputs:")?;
    for (name, output) in def.outputs.iter().zip(report.materialized_outputs()) {
        match output {
            Some(tensor) => writeln!(out, "  {} = {}", name, tensor)?,
            None => writeln!(out, "  {} = <not materialized>", name)?,
        }
    }
    Ok(out)
}

/// YAML for a new pipeline from a named template
pub fn template(name: &str, kind: &str) -> Result<String> {
    let yaml = match kind {
        "two-stage" => format!(
            r#"name: {}
description: One producer device feeding two consumer devices
inputs: [x]
outputs: [y]
stages:
  - name: produce
    mesh: [0]
    inputs: [x]
    outputs: [v1]
    kernel: scale
    params: {{ factor: 2.0 }}
  - name: consume
    mesh: [1, 2]
    inputs: [v2]
    outputs: [y]
    kernel: relu
edges:
  - from: v1
    to: v2
data:
  x: {{ shape: [3], data: [1.0, -2.0, 3.0] }}
"#,
            name
        ),
        "fan-out" => format!(
            r#"name: {}
description: Two producer devices feeding three consumer devices
inputs: [x]
outputs: [total]
stages:
  - name: produce
    mesh: [0, 1]
    inputs: [x]
    outputs: [v1]
    kernel: identity
  - name: reduce
    mesh: [2, 3, 4]
    inputs: [v2]
    outputs: [total]
    kernel: sum
edges:
  - from: v1
    to: v2
data:
  x: {{ shape: [4], data: [1.0, 2.0, 3.0, 4.0] }}
"#,
            name
        ),
        other => bail!("Unknown template: {} (expected two-stage or fan-out)", other),
    };
    Ok(yaml)
}
