//! Host-side tensors and placeholders
//!
//! The engine moves [`Tensor`] values between stages and ranks. A tensor
//! always carries its [`TensorMeta`] (shape and element type); its data is
//! optional. A tensor without data is a *placeholder*: it is what a rank binds
//! for values it never materializes, so that downstream stages can still infer
//! their own output shapes.
//!
//! Element data is held on the host as `f32` regardless of the logical
//! [`DType`]; device storage is the stage runner's concern.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    #[default]
    F32,
    F16,
    Bf16,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
            DType::Bf16 => write!(f, "bf16"),
        }
    }
}

/// Shape and element type of a tensor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorMeta {
    pub shape: Vec<usize>,
    #[serde(default)]
    pub dtype: DType,
}

impl TensorMeta {
    pub fn new(shape: Vec<usize>, dtype: DType) -> Self {
        Self { shape, dtype }
    }

    /// Number of elements described by the shape (1 for a scalar)
    ///
    /// `None` if the element count does not fit in `usize`.
    pub fn numel(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Check that `len` elements fill this shape exactly
    fn check_len(&self, len: usize) -> Result<()> {
        match self.numel() {
            Some(n) if n == len => Ok(()),
            Some(n) => Err(PipelineError::Validation(format!(
                "tensor {} needs {} elements, got {}",
                self, n, len
            ))),
            None => Err(PipelineError::Validation(format!(
                "tensor {} has too many elements",
                self
            ))),
        }
    }
}

impl fmt::Display for TensorMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.dtype, self.shape)
    }
}

/// A tensor that is either concrete (has data) or a placeholder (metadata only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    #[serde(flatten)]
    meta: TensorMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct RawTensor {
    #[serde(flatten)]
    meta: TensorMeta,
    #[serde(default)]
    data: Option<Vec<f32>>,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = String;

    fn try_from(raw: RawTensor) -> std::result::Result<Self, Self::Error> {
        if let Some(data) = &raw.data {
            raw.meta.check_len(data.len()).map_err(|e| e.to_string())?;
        }
        Ok(Self { meta: raw.meta, data: raw.data })
    }
}

impl Tensor {
    /// Create a concrete tensor
    ///
    /// Fails with [`PipelineError::Validation`] if `data.len()` does not
    /// match the element count of `shape`.
    ///
    /// ```rust
    /// use meshflow_core::tensor::{DType, Tensor};
    ///
    /// let t = Tensor::new(vec![2, 2], DType::F32, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    /// assert!(!t.is_placeholder());
    /// assert!(Tensor::new(vec![3], DType::F32, vec![1.0]).is_err());
    /// ```
    pub fn new(shape: Vec<usize>, dtype: DType, data: Vec<f32>) -> Result<Self> {
        let meta = TensorMeta::new(shape, dtype);
        meta.check_len(data.len())?;
        Ok(Self { meta, data: Some(data) })
    }

    /// One-dimensional `f32` tensor holding `data`
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self {
            meta: TensorMeta::new(vec![data.len()], DType::F32),
            data: Some(data),
        }
    }

    /// Metadata-only tensor
    pub fn placeholder(meta: TensorMeta) -> Self {
        Self { meta, data: None }
    }

    pub fn meta(&self) -> &TensorMeta {
        &self.meta
    }

    pub fn shape(&self) -> &[usize] {
        &self.meta.shape
    }

    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    /// Element data, `None` for placeholders
    pub fn data(&self) -> Option<&[f32]> {
        self.data.as_deref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.data.is_none()
    }

    /// Placeholder carrying this tensor's metadata
    pub fn to_placeholder(&self) -> Self {
        Self::placeholder(self.meta.clone())
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Some(data) => write!(f, "{} {:?}", self.meta, data),
            None => write!(f, "{} <placeholder>", self.meta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_keeps_meta() {
        let t = Tensor::new(vec![1, 3], DType::Bf16, vec![1.0, 2.0, 3.0]).unwrap();
        let p = t.to_placeholder();
        assert!(p.is_placeholder());
        assert_eq!(p.meta(), t.meta());
        assert_eq!(p.data(), None);
    }

    #[test]
    fn test_scalar_numel() {
        let meta = TensorMeta::new(vec![], DType::F32);
        assert_eq!(meta.numel(), Some(1));
    }

    #[test]
    fn test_new_reports_length_mismatch() {
        let err = Tensor::new(vec![2, 2], DType::F32, vec![1.0]).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(ref msg) if msg.contains("needs 4 elements, got 1")));
    }

    #[test]
    fn test_huge_shape_is_rejected() {
        let huge = vec![1usize << 32, 1 << 32, 1 << 32];
        assert_eq!(TensorMeta::new(huge.clone(), DType::F32).numel(), None);
        assert!(matches!(
            Tensor::new(huge, DType::F32, vec![1.0]),
            Err(PipelineError::Validation(_))
        ));

        let err = serde_json::from_str::<Tensor>(
            r#"{"shape":[4294967296,4294967296,4294967296],"data":[1.0]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("too many elements"));
    }

    #[test]
    fn test_tensor_yaml_form() {
        let t: Tensor = serde_yaml::from_str("shape: [3]\ndata: [1.0, 2.0, 3.0]").unwrap();
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.data(), Some(&[1.0, 2.0, 3.0][..]));
    }

    #[test]
    fn test_tensor_yaml_rejects_bad_length() {
        let err = serde_yaml::from_str::<Tensor>("shape: [2, 2]\ndata: [1.0]");
        assert!(err.is_err());
    }

    #[test]
    fn test_display() {
        let p = Tensor::placeholder(TensorMeta::new(vec![2], DType::F16));
        assert_eq!(p.to_string(), "f16[2] <placeholder>");
    }
}
