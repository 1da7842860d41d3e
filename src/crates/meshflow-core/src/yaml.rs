//! YAML-based pipeline definitions
//!
//! ```yaml
//! name: two_stage
//! devices: [0, 1, 2]       # rank i owns devices[i]; optional
//! inputs: [x]
//! outputs: [y]
//! stages:
//!   - name: s1
//!     mesh: [0]
//!     inputs: [x]
//!     outputs: [v1]
//!     kernel: scale
//!     params: { factor: 2.0 }
//!   - name: s2
//!     mesh: [1, 2]
//!     inputs: [v2]
//!     outputs: [y]
//!     kernel: relu
//! edges:
//!   - from: v1
//!     to: v2
//! data:                    # sample inputs for simulation; optional
//!   x: { shape: [3], data: [1.0, 2.0, 3.0] }
//! ```
//!
//! Values are declared implicitly by the first list that names them.

use crate::error::{PipelineError, Result};
use crate::mesh::{DeviceId, DeviceMesh};
use crate::pipeline::{KernelSpec, Pipeline, PipelineBuilder, ValueId};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Top-level YAML pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlPipelineDef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Rank-ordered device list of the world
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DeviceId>>,

    #[serde(default)]
    pub inputs: Vec<String>,

    pub outputs: Vec<String>,

    pub stages: Vec<YamlStageDef>,

    #[serde(default)]
    pub edges: Vec<YamlEdgeDef>,

    /// Sample values for global inputs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, Tensor>,
}

/// Stage definition in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlStageDef {
    pub name: String,
    pub mesh: DeviceMesh,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub kernel: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

/// Communication edge definition in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlEdgeDef {
    pub from: String,
    pub to: String,
}

impl YamlPipelineDef {
    /// Load a definition from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a definition from a YAML string
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Build and validate the pipeline
    pub fn build(&self) -> Result<Pipeline> {
        let mut builder = PipelineBuilder::new(&self.name);
        let mut values: HashMap<String, ValueId> = HashMap::new();
        let mut ids = |builder: &mut PipelineBuilder, list: &[String]| -> Vec<ValueId> {
            list.iter()
                .map(|name| intern(builder, &mut values, name))
                .collect()
        };

        let inputs = ids(&mut builder, &self.inputs);
        for stage in &self.stages {
            let stage_inputs = ids(&mut builder, &stage.inputs);
            let stage_outputs = ids(&mut builder, &stage.outputs);
            builder.add_stage(
                &stage.name,
                stage.mesh.clone(),
                &stage_inputs,
                &stage_outputs,
                KernelSpec::with_params(&stage.kernel, stage.params.clone()),
            );
        }
        for edge in &self.edges {
            let pair = ids(&mut builder, &[edge.from.clone(), edge.to.clone()]);
            builder.connect(pair[0], pair[1]);
        }
        let outputs = ids(&mut builder, &self.outputs);

        for v in inputs {
            builder.add_input(v);
        }
        for v in outputs {
            builder.add_output(v);
        }
        builder.build()
    }

    /// Rank-ordered devices of the world
    ///
    /// Without an explicit `devices` list this is every device named by a
    /// stage mesh, ascending.
    pub fn world(&self) -> Result<Vec<DeviceId>> {
        let used: BTreeSet<DeviceId> = self
            .stages
            .iter()
            .flat_map(|s| s.mesh.devices().iter().copied())
            .collect();
        match &self.devices {
            None => Ok(used.into_iter().collect()),
            Some(devices) => {
                if let Some(missing) = used.iter().find(|d| !devices.contains(d)) {
                    return Err(PipelineError::UnknownDevice(*missing));
                }
                Ok(devices.clone())
            }
        }
    }

    /// Sample tensors for the global inputs, in input order
    pub fn sample_inputs(&self) -> Result<Vec<Tensor>> {
        self.inputs
            .iter()
            .map(|name| {
                self.data.get(name).cloned().ok_or_else(|| {
                    PipelineError::Validation(format!("No data given for input '{}'", name))
                })
            })
            .collect()
    }
}

fn intern(builder: &mut PipelineBuilder, values: &mut HashMap<String, ValueId>, name: &str) -> ValueId {
    if let Some(id) = values.get(name) {
        return *id;
    }
    let id = builder.add_value(name);
    values.insert(name.to_string(), id);
    id
}
