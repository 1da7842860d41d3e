//! Per-execution value bindings
//!
//! The [`ValueStore`] maps each graph value to the tensor (concrete or
//! placeholder) bound for it during one execution. Bindings are single
//! assignment: the node producing a value binds it once and every consumer
//! reads it afterwards. The store is cleared between executions.

use crate::error::{PipelineError, Result};
use crate::pipeline::ValueId;
use crate::tensor::Tensor;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ValueStore {
    bindings: HashMap<ValueId, Tensor>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` for the current execution
    ///
    /// `name` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ValueRebound`] if `value` is already bound.
    pub fn bind(&mut self, value: ValueId, name: &str, tensor: Tensor) -> Result<()> {
        if self.bindings.contains_key(&value) {
            return Err(PipelineError::ValueRebound(name.to_string()));
        }
        self.bindings.insert(value, tensor);
        Ok(())
    }

    pub fn get(&self, value: ValueId) -> Option<&Tensor> {
        self.bindings.get(&value)
    }

    pub fn contains(&self, value: ValueId) -> bool {
        self.bindings.contains_key(&value)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop every binding
    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}
