//! Pipeline graph: stages, communication edges and their canonical order
//!
//! A [`Pipeline`] is a computation graph partitioned into **stages**, each
//! assigned to a [`DeviceMesh`]. Values flow between stages either directly
//! (both stages read the same value id) or through a [`CommunicationEdge`],
//! which moves a value produced on one mesh to a stage living on another mesh.
//!
//! # Structure
//!
//! ```text
//!   global input x
//!        │
//!        ▼
//!   ┌──────────┐  v1   ┌───────────────┐  v2   ┌──────────────┐
//!   │ Stage s1 │──────▶│ Edge v1 -> v2 │──────▶│  Stage s2    │──▶ global output y
//!   │ mesh {0} │       │ senders {0}   │       │ mesh {1, 2}  │
//!   └──────────┘       │ recv {1, 2}   │       └──────────────┘
//!                      └───────────────┘
//! ```
//!
//! Pipelines are immutable once built. [`PipelineBuilder::build`] validates
//! the structure and computes a **canonical topological order**: Kahn's
//! algorithm where ties are broken by insertion order. Every rank builds the
//! same pipeline and therefore visits nodes in the same order, which is what
//! keeps point-to-point sends and receives paired across ranks.
//!
//! # Example
//!
//! ```rust
//! use meshflow_core::mesh::DeviceMesh;
//! use meshflow_core::pipeline::{KernelSpec, PipelineBuilder};
//!
//! let mut builder = PipelineBuilder::new("two_stage");
//! let x = builder.add_value("x");
//! let v1 = builder.add_value("v1");
//! let v2 = builder.add_value("v2");
//! let y = builder.add_value("y");
//!
//! builder.add_stage("s1", DeviceMesh::single(0), &[x], &[v1], KernelSpec::named("identity"));
//! builder.connect(v1, v2);
//! builder.add_stage("s2", DeviceMesh::new(vec![1, 2]).unwrap(), &[v2], &[y], KernelSpec::named("relu"));
//! builder.add_input(x);
//! builder.add_output(y);
//!
//! let pipeline = builder.build().unwrap();
//! assert_eq!(pipeline.nodes().len(), 3);
//! ```

use crate::error::{PipelineError, Result};
use crate::mesh::DeviceMesh;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

/// Identity token of a graph value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub usize);

/// Identity token of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(pub usize);

/// Identity token of a communication edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Description of the computation a stage performs
///
/// The engine never interprets the kernel; it is handed to the
/// [`StageRunnerFactory`](crate::runner::StageRunnerFactory) that builds the
/// stage's runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl KernelSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// A unit of local computation assigned to a device mesh
#[derive(Debug, Clone)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub mesh: DeviceMesh,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
    pub kernel: KernelSpec,
}

/// Cross-mesh data dependency
///
/// Moves `input` (an output of `sender_stage`) into `output` (an input of
/// `receiver_stage`). The sender stage's mesh is the sender set, the receiver
/// stage's mesh is the receiver set.
#[derive(Debug, Clone)]
pub struct CommunicationEdge {
    pub id: EdgeId,
    pub name: String,
    pub input: ValueId,
    pub output: ValueId,
    pub sender_stage: StageId,
    pub receiver_stage: StageId,
}

/// A node visited during traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineNode {
    Stage(StageId),
    Communication(EdgeId),
}

/// Validated, immutable pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    value_names: Vec<String>,
    stages: Vec<Stage>,
    edges: Vec<CommunicationEdge>,
    inputs: Vec<ValueId>,
    outputs: Vec<ValueId>,
    /// All nodes in canonical topological order
    order: Vec<PipelineNode>,
    producers: HashMap<ValueId, PipelineNode>,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Global inputs in declared order
    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    /// Global outputs in declared order
    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn edges(&self) -> &[CommunicationEdge] {
        &self.edges
    }

    pub fn stage(&self, id: StageId) -> &Stage {
        &self.stages[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &CommunicationEdge {
        &self.edges[id.0]
    }

    pub fn value_count(&self) -> usize {
        self.value_names.len()
    }

    pub fn value_name(&self, id: ValueId) -> &str {
        &self.value_names[id.0]
    }

    /// Look up a value by name
    pub fn value_id(&self, name: &str) -> Option<ValueId> {
        self.value_names.iter().position(|n| n == name).map(ValueId)
    }

    /// Look up a stage by name
    pub fn stage_by_name(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Mesh of the stage producing the edge's input
    pub fn sender_mesh(&self, edge: &CommunicationEdge) -> &DeviceMesh {
        &self.stage(edge.sender_stage).mesh
    }

    /// Mesh of the stage consuming the edge's output
    pub fn receiver_mesh(&self, edge: &CommunicationEdge) -> &DeviceMesh {
        &self.stage(edge.receiver_stage).mesh
    }

    /// Every node in canonical topological order
    pub fn nodes(&self) -> &[PipelineNode] {
        &self.order
    }

    /// Node producing a value, `None` for global inputs
    pub fn producer(&self, value: ValueId) -> Option<PipelineNode> {
        self.producers.get(&value).copied()
    }

    pub fn node_name(&self, node: PipelineNode) -> &str {
        match node {
            PipelineNode::Stage(id) => &self.stage(id).name,
            PipelineNode::Communication(id) => &self.edge(id).name,
        }
    }

    /// Nodes needed to produce `targets`, in canonical topological order
    ///
    /// The result is a subsequence of [`Pipeline::nodes`], so two ranks asking
    /// for the same targets always get the same sequence regardless of which
    /// stages are local to them.
    pub fn traverse_to(&self, targets: &[ValueId]) -> Vec<PipelineNode> {
        let mut needed: HashSet<PipelineNode> = HashSet::new();
        let mut stack: Vec<ValueId> = targets.to_vec();
        let mut seen_values: HashSet<ValueId> = HashSet::new();

        while let Some(value) = stack.pop() {
            if !seen_values.insert(value) {
                continue;
            }
            if let Some(node) = self.producer(value) {
                if needed.insert(node) {
                    stack.extend(self.node_inputs(node));
                }
            }
        }

        self.order
            .iter()
            .copied()
            .filter(|node| needed.contains(node))
            .collect()
    }

    fn node_inputs(&self, node: PipelineNode) -> Vec<ValueId> {
        match node {
            PipelineNode::Stage(id) => self.stage(id).inputs.clone(),
            PipelineNode::Communication(id) => vec![self.edge(id).input],
        }
    }
}

struct StageDraft {
    name: String,
    mesh: DeviceMesh,
    inputs: Vec<ValueId>,
    outputs: Vec<ValueId>,
    kernel: KernelSpec,
}

#[derive(Clone, Copy)]
enum NodeDraft {
    Stage(usize),
    Edge(usize),
}

/// Incremental pipeline construction
///
/// Mirrors a plain graph builder: values, stages and edges are added freely
/// and all structural checks happen in [`build`](Self::build).
pub struct PipelineBuilder {
    name: String,
    value_names: Vec<String>,
    stages: Vec<StageDraft>,
    edges: Vec<(ValueId, ValueId)>,
    nodes: Vec<NodeDraft>,
    inputs: Vec<ValueId>,
    outputs: Vec<ValueId>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_names: Vec::new(),
            stages: Vec::new(),
            edges: Vec::new(),
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Declare a value; names must be unique
    pub fn add_value(&mut self, name: impl Into<String>) -> ValueId {
        self.value_names.push(name.into());
        ValueId(self.value_names.len() - 1)
    }

    pub fn add_stage(
        &mut self,
        name: impl Into<String>,
        mesh: DeviceMesh,
        inputs: &[ValueId],
        outputs: &[ValueId],
        kernel: KernelSpec,
    ) -> StageId {
        self.stages.push(StageDraft {
            name: name.into(),
            mesh,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            kernel,
        });
        self.nodes.push(NodeDraft::Stage(self.stages.len() - 1));
        StageId(self.stages.len() - 1)
    }

    /// Add a communication edge moving `from` into `to`
    ///
    /// `from` must be produced by a stage and `to` consumed by exactly one
    /// stage; both are checked at build time.
    pub fn connect(&mut self, from: ValueId, to: ValueId) -> EdgeId {
        self.edges.push((from, to));
        self.nodes.push(NodeDraft::Edge(self.edges.len() - 1));
        EdgeId(self.edges.len() - 1)
    }

    pub fn add_input(&mut self, value: ValueId) {
        self.inputs.push(value);
    }

    pub fn add_output(&mut self, value: ValueId) {
        self.outputs.push(value);
    }

    /// Validate and freeze the pipeline
    ///
    /// # Errors
    ///
    /// [`PipelineError::Validation`] when:
    /// - value names repeat, or a value id is unknown
    /// - a global input is listed twice
    /// - a value is produced twice, or a global input is also produced
    /// - a consumed value has no producer and is not a global input
    /// - an edge input is not a stage output, or an edge output is not
    ///   consumed by exactly one stage
    /// - a global output is never produced
    /// - the graph contains a cycle
    pub fn build(self) -> Result<Pipeline> {
        let invalid = |msg: String| PipelineError::Validation(msg);

        let mut names = HashSet::new();
        for name in &self.value_names {
            if !names.insert(name.as_str()) {
                return Err(invalid(format!("Value '{}' is declared twice", name)));
            }
        }

        let value_name = |v: ValueId| -> Result<&str> {
            self.value_names
                .get(v.0)
                .map(String::as_str)
                .ok_or_else(|| invalid(format!("Unknown value id {}", v)))
        };

        for stage in &self.stages {
            for v in stage.inputs.iter().chain(&stage.outputs) {
                value_name(*v)?;
            }
        }
        for (from, to) in &self.edges {
            value_name(*from)?;
            value_name(*to)?;
        }
        for v in self.inputs.iter().chain(&self.outputs) {
            value_name(*v)?;
        }

        // Producers
        let mut producers: HashMap<ValueId, PipelineNode> = HashMap::new();
        let mut global_inputs: HashSet<ValueId> = HashSet::new();
        for v in &self.inputs {
            if !global_inputs.insert(*v) {
                return Err(invalid(format!(
                    "Global input '{}' is declared twice",
                    self.value_names[v.0]
                )));
            }
        }
        let mut record_producer = |v: ValueId, node: PipelineNode, node_name: &str| -> Result<()> {
            if global_inputs.contains(&v) {
                return Err(invalid(format!(
                    "Global input '{}' is also produced by '{}'",
                    self.value_names[v.0], node_name
                )));
            }
            if producers.insert(v, node).is_some() {
                return Err(invalid(format!(
                    "Value '{}' is produced more than once",
                    self.value_names[v.0]
                )));
            }
            Ok(())
        };
        for (i, stage) in self.stages.iter().enumerate() {
            for out in &stage.outputs {
                record_producer(*out, PipelineNode::Stage(StageId(i)), &stage.name)?;
            }
        }
        for (i, (from, to)) in self.edges.iter().enumerate() {
            let edge_name = format!("{} -> {}", self.value_names[from.0], self.value_names[to.0]);
            record_producer(*to, PipelineNode::Communication(EdgeId(i)), &edge_name)?;
        }

        let is_available = |v: &ValueId| producers.contains_key(v) || global_inputs.contains(v);
        for stage in &self.stages {
            if let Some(missing) = stage.inputs.iter().find(|v| !is_available(v)) {
                return Err(invalid(format!(
                    "Stage '{}' reads '{}' which nothing produces",
                    stage.name, self.value_names[missing.0]
                )));
            }
        }
        if let Some(missing) = self.outputs.iter().find(|v| !is_available(v)) {
            return Err(invalid(format!(
                "Global output '{}' is never produced",
                self.value_names[missing.0]
            )));
        }

        // Resolve edge endpoints
        let mut edges = Vec::with_capacity(self.edges.len());
        for (i, (from, to)) in self.edges.iter().enumerate() {
            let name = format!("{} -> {}", self.value_names[from.0], self.value_names[to.0]);
            let sender_stage = match producers.get(from) {
                Some(PipelineNode::Stage(id)) => *id,
                _ => {
                    return Err(invalid(format!(
                        "Edge '{}' must start at a stage output",
                        name
                    )))
                }
            };
            let consumers: Vec<usize> = self
                .stages
                .iter()
                .enumerate()
                .filter(|(_, s)| s.inputs.contains(to))
                .map(|(idx, _)| idx)
                .collect();
            let receiver_stage = match consumers.as_slice() {
                [only] => StageId(*only),
                [] => {
                    return Err(invalid(format!("Edge '{}' output is not consumed by any stage", name)))
                }
                _ => {
                    return Err(invalid(format!(
                        "Edge '{}' output is consumed by {} stages, expected one",
                        name,
                        consumers.len()
                    )))
                }
            };
            edges.push(CommunicationEdge {
                id: EdgeId(i),
                name,
                input: *from,
                output: *to,
                sender_stage,
                receiver_stage,
            });
        }

        let stages: Vec<Stage> = self
            .stages
            .into_iter()
            .enumerate()
            .map(|(i, draft)| Stage {
                id: StageId(i),
                name: draft.name,
                mesh: draft.mesh,
                inputs: draft.inputs,
                outputs: draft.outputs,
                kernel: draft.kernel,
            })
            .collect();

        let nodes: Vec<PipelineNode> = self
            .nodes
            .iter()
            .map(|n| match n {
                NodeDraft::Stage(i) => PipelineNode::Stage(StageId(*i)),
                NodeDraft::Edge(i) => PipelineNode::Communication(EdgeId(*i)),
            })
            .collect();

        let order = canonical_order(&nodes, &stages, &edges, &producers)?;

        Ok(Pipeline {
            name: self.name,
            value_names: self.value_names,
            stages,
            edges,
            inputs: self.inputs,
            outputs: self.outputs,
            order,
            producers,
        })
    }
}

/// Kahn's algorithm with ties broken by insertion position
fn canonical_order(
    nodes: &[PipelineNode],
    stages: &[Stage],
    edges: &[CommunicationEdge],
    producers: &HashMap<ValueId, PipelineNode>,
) -> Result<Vec<PipelineNode>> {
    let position: HashMap<PipelineNode, usize> =
        nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let inputs_of = |node: &PipelineNode| -> Vec<ValueId> {
        match node {
            PipelineNode::Stage(id) => stages[id.0].inputs.clone(),
            PipelineNode::Communication(id) => vec![edges[id.0].input],
        }
    };

    let mut indegree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        let mut deps: Vec<usize> = inputs_of(node)
            .iter()
            .filter_map(|v| producers.get(v))
            .map(|p| position[p])
            .collect();
        deps.sort_unstable();
        deps.dedup();
        indegree[i] = deps.len();
        for d in deps {
            dependents[d].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(Reverse(i)) = ready.pop() {
        order.push(nodes[i]);
        for &j in &dependents[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(PipelineError::Validation(
            "Pipeline contains a dependency cycle".to_string(),
        ));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(devices: &[u32]) -> DeviceMesh {
        DeviceMesh::new(devices.to_vec()).unwrap()
    }

    fn two_stage() -> Pipeline {
        let mut b = PipelineBuilder::new("two_stage");
        let x = b.add_value("x");
        let v1 = b.add_value("v1");
        let v2 = b.add_value("v2");
        let y = b.add_value("y");
        b.add_stage("s1", mesh(&[0]), &[x], &[v1], KernelSpec::named("identity"));
        b.connect(v1, v2);
        b.add_stage("s2", mesh(&[1, 2]), &[v2], &[y], KernelSpec::named("identity"));
        b.add_input(x);
        b.add_output(y);
        b.build().unwrap()
    }

    #[test]
    fn test_edge_endpoints_resolved() {
        let p = two_stage();
        let edge = &p.edges()[0];
        assert_eq!(edge.sender_stage, StageId(0));
        assert_eq!(edge.receiver_stage, StageId(1));
        assert_eq!(p.sender_mesh(edge).devices(), &[0]);
        assert_eq!(p.receiver_mesh(edge).devices(), &[1, 2]);
        assert_eq!(edge.name, "v1 -> v2");
    }

    #[test]
    fn test_duplicate_global_input_rejected() {
        let mut b = PipelineBuilder::new("dup_input");
        let x = b.add_value("x");
        let y = b.add_value("y");
        b.add_stage("s1", mesh(&[0]), &[x], &[y], KernelSpec::named("identity"));
        b.add_input(x);
        b.add_input(x);
        b.add_output(y);

        let err = b.build().unwrap_err();
        assert!(matches!(err, PipelineError::Validation(ref msg) if msg.contains("'x' is declared twice")));
    }

    #[test]
    fn test_order_respects_dependencies_not_insertion() {
        // Insert the consumer before its producer.
        let mut b = PipelineBuilder::new("reversed");
        let x = b.add_value("x");
        let a = b.add_value("a");
        let y = b.add_value("y");
        b.add_stage("late", mesh(&[0]), &[a], &[y], KernelSpec::named("identity"));
        b.add_stage("early", mesh(&[0]), &[x], &[a], KernelSpec::named("identity"));
        b.add_input(x);
        b.add_output(y);
        let p = b.build().unwrap();

        let names: Vec<&str> = p.nodes().iter().map(|n| p.node_name(*n)).collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[test]
    fn test_independent_nodes_keep_insertion_order() {
        let mut b = PipelineBuilder::new("fan");
        let x = b.add_value("x");
        let outs: Vec<ValueId> = (0..4).map(|i| b.add_value(format!("o{}", i))).collect();
        for (i, o) in outs.iter().enumerate() {
            b.add_stage(format!("s{}", i), mesh(&[i as u32]), &[x], &[*o], KernelSpec::named("identity"));
        }
        b.add_input(x);
        for o in &outs {
            b.add_output(*o);
        }
        let p = b.build().unwrap();
        let names: Vec<&str> = p.nodes().iter().map(|n| p.node_name(*n)).collect();
        assert_eq!(names, vec!["s0", "s1", "s2", "s3"]);
    }

    #[test]
    fn test_traverse_to_prunes_unneeded_nodes() {
        let mut b = PipelineBuilder::new("prune");
        let x = b.add_value("x");
        let used = b.add_value("used");
        let unused = b.add_value("unused");
        b.add_stage("keep", mesh(&[0]), &[x], &[used], KernelSpec::named("identity"));
        b.add_stage("drop", mesh(&[0]), &[x], &[unused], KernelSpec::named("identity"));
        b.add_input(x);
        b.add_output(used);
        let p = b.build().unwrap();

        let visited = p.traverse_to(p.outputs());
        assert_eq!(visited, vec![PipelineNode::Stage(StageId(0))]);
    }

    #[test]
    fn test_unproduced_input_rejected() {
        let mut b = PipelineBuilder::new("bad");
        let x = b.add_value("x");
        let y = b.add_value("y");
        b.add_stage("s", mesh(&[0]), &[x], &[y], KernelSpec::named("identity"));
        b.add_output(y);
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("nothing produces"));
    }

    #[test]
    fn test_double_production_rejected() {
        let mut b = PipelineBuilder::new("bad");
        let x = b.add_value("x");
        let y = b.add_value("y");
        b.add_stage("a", mesh(&[0]), &[x], &[y], KernelSpec::named("identity"));
        b.add_stage("b", mesh(&[1]), &[x], &[y], KernelSpec::named("identity"));
        b.add_input(x);
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_edge_from_global_input_rejected() {
        let mut b = PipelineBuilder::new("bad");
        let x = b.add_value("x");
        let x2 = b.add_value("x2");
        let y = b.add_value("y");
        b.connect(x, x2);
        b.add_stage("s", mesh(&[1]), &[x2], &[y], KernelSpec::named("identity"));
        b.add_input(x);
        b.add_output(y);
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("must start at a stage output"));
    }

    #[test]
    fn test_edge_with_two_consumers_rejected() {
        let mut b = PipelineBuilder::new("bad");
        let x = b.add_value("x");
        let v1 = b.add_value("v1");
        let v2 = b.add_value("v2");
        let a = b.add_value("a");
        let c = b.add_value("c");
        b.add_stage("p", mesh(&[0]), &[x], &[v1], KernelSpec::named("identity"));
        b.connect(v1, v2);
        b.add_stage("c1", mesh(&[1]), &[v2], &[a], KernelSpec::named("identity"));
        b.add_stage("c2", mesh(&[2]), &[v2], &[c], KernelSpec::named("identity"));
        b.add_input(x);
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("consumed by 2 stages"));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut b = PipelineBuilder::new("cycle");
        let a = b.add_value("a");
        let c = b.add_value("c");
        b.add_stage("s1", mesh(&[0]), &[c], &[a], KernelSpec::named("identity"));
        b.add_stage("s2", mesh(&[0]), &[a], &[c], KernelSpec::named("identity"));
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_duplicate_value_names_rejected() {
        let mut b = PipelineBuilder::new("dup");
        b.add_value("x");
        b.add_value("x");
        assert!(b.build().is_err());
    }

    #[test]
    fn test_lookup_helpers() {
        let p = two_stage();
        assert_eq!(p.value_id("v2"), Some(ValueId(2)));
        assert_eq!(p.stage_by_name("s2").map(|s| s.id), Some(StageId(1)));
        assert_eq!(p.producer(ValueId(0)), None);
        assert_eq!(p.producer(ValueId(2)), Some(PipelineNode::Communication(EdgeId(0))));
    }
}
