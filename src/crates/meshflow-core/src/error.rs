//! Error types for pipeline construction and execution
//!
//! Every error produced while a pipeline is *running* is fatal: the engine
//! assumes a well-formed pipeline and a well-formed device mapping, so a
//! failure on one rank aborts the whole execution. No retries are attempted and
//! no partial results are returned.
//!
//! # Error Hierarchy
//!
//! ```text
//! PipelineError
//! ├── Validation          - Malformed pipeline definition
//! ├── InputArity          - Wrong number of global inputs
//! ├── UnboundValue        - Value read before it was produced
//! ├── ValueRebound        - Value bound twice in one execution
//! ├── OutputArity         - Runner returned the wrong number of outputs
//! ├── EmptySenderSet      - Communication edge without producer devices
//! ├── StageExecution      - Runner failure, with stage context
//! ├── Communication       - Transport failure
//! ├── TransferMismatch    - Received payload disagrees with expected metadata
//! ├── UnknownKernel       - Kernel name not registered
//! ├── UnknownDevice       - Device id absent from the rank mapping
//! ├── Configuration       - Invalid executor configuration
//! └── Serialization/Yaml/Toml/Io - Wrapped library errors
//! ```
//!
//! # Example
//!
//! ```rust
//! use meshflow_core::error::PipelineError;
//!
//! fn describe(err: &PipelineError) -> &'static str {
//!     match err {
//!         PipelineError::InputArity { .. } => "caller passed the wrong inputs",
//!         PipelineError::UnboundValue { .. } => "traversal order bug",
//!         _ => "fatal pipeline error",
//!     }
//! }
//! ```

use thiserror::Error;

/// Convenience result type using [`PipelineError`]
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error type for all pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline structure validation failed
    ///
    /// Raised by [`PipelineBuilder::build`](crate::pipeline::PipelineBuilder::build)
    /// and by YAML conversion when the definition is not executable.
    #[error("Pipeline validation failed: {0}")]
    Validation(String),

    /// The caller supplied a different number of global inputs than declared
    #[error("Wrong number of inputs: expected {expected}, got {actual}")]
    InputArity {
        /// Declared global input count
        expected: usize,
        /// Supplied input count
        actual: usize,
    },

    /// A value was read before any node produced it
    ///
    /// Indicates a traversal-order bug or a malformed pipeline: a node must
    /// only be visited after all of its producers.
    #[error("Value '{value}' has no binding when visiting '{node}'")]
    UnboundValue {
        /// Name of the unbound value
        value: String,
        /// Node that attempted the read
        node: String,
    },

    /// A value was bound twice within one execution
    #[error("Value '{0}' is already bound in this execution")]
    ValueRebound(String),

    /// A stage runner returned a different number of outputs than declared
    #[error("Stage '{stage}' produced {actual} outputs, expected {expected}")]
    OutputArity {
        /// Stage name
        stage: String,
        /// Declared output count
        expected: usize,
        /// Output count returned by the runner
        actual: usize,
    },

    /// A communication edge has no producer devices
    #[error("Communication edge '{0}' has an empty sender set")]
    EmptySenderSet(String),

    /// A stage runner failed
    #[error("Stage '{stage}' execution failed: {error}")]
    StageExecution {
        /// Stage name
        stage: String,
        /// Error message from the runner
        error: String,
    },

    /// The communicator failed to move a payload
    #[error("Communication failed: {0}")]
    Communication(String),

    /// A received payload does not match the metadata the receiver expected
    #[error("Transfer on edge '{edge}' delivered {actual}, expected {expected}")]
    TransferMismatch {
        /// Edge name
        edge: String,
        /// Expected tensor metadata
        expected: String,
        /// Received tensor metadata
        actual: String,
    },

    /// A stage references a kernel that is not registered
    #[error("Unknown kernel '{0}'")]
    UnknownKernel(String),

    /// A mesh references a device that the rank mapping does not know
    #[error("Device {0} is not part of the rank mapping")]
    UnknownDevice(u32),

    /// Invalid executor or simulation configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create a stage execution error with context
    ///
    /// ```rust
    /// use meshflow_core::error::PipelineError;
    ///
    /// let err = PipelineError::stage_execution("encoder", "shape mismatch");
    /// assert_eq!(err.to_string(), "Stage 'encoder' execution failed: shape mismatch");
    /// ```
    pub fn stage_execution(stage: impl Into<String>, error: impl Into<String>) -> Self {
        Self::StageExecution {
            stage: stage.into(),
            error: error.into(),
        }
    }

    /// Create an unbound value error
    pub fn unbound(value: impl Into<String>, node: impl Into<String>) -> Self {
        Self::UnboundValue {
            value: value.into(),
            node: node.into(),
        }
    }
}
