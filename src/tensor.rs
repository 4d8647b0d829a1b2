//! Dynamically typed n-d arrays exchanged with the tensor engine.
//!
//! The engine hands back whatever element type the graph produces, so the
//! estimators need to inspect dtype and rank at runtime before they upcast
//! to `f64`. [`Tensor`] is that runtime-typed value; [`Scalar`] is a score
//! cast back to the precision of the activations it was computed from.

use std::fmt;

use ndarray::{concatenate, ArrayD, ArrayViewD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Element type of a [`Tensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// Unsigned 8-bit integer (raw pixels).
    UInt8,
    /// Signed 32-bit integer.
    Int32,
    /// Single precision float.
    Float32,
    /// Double precision float.
    Float64,
}

impl DType {
    /// Whether this is a floating point type.
    #[must_use]
    pub fn is_floating(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Short lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::UInt8 => "uint8",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed, dynamically ranked array.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    /// `u8` elements.
    UInt8(ArrayD<u8>),
    /// `i32` elements.
    Int32(ArrayD<i32>),
    /// `f32` elements.
    Float32(ArrayD<f32>),
    /// `f64` elements.
    Float64(ArrayD<f64>),
}

/// Run `$body` with `$a` bound to the inner array of whichever variant.
macro_rules! each_variant {
    ($tensor:expr, $a:ident => $body:expr) => {
        match $tensor {
            Tensor::UInt8($a) => $body,
            Tensor::Int32($a) => $body,
            Tensor::Float32($a) => $body,
            Tensor::Float64($a) => $body,
        }
    };
}

macro_rules! impl_from_array {
    ($elem:ty, $variant:ident) => {
        impl From<ArrayD<$elem>> for Tensor {
            fn from(array: ArrayD<$elem>) -> Self {
                Tensor::$variant(array)
            }
        }
    };
}

impl_from_array!(u8, UInt8);
impl_from_array!(i32, Int32);
impl_from_array!(f32, Float32);
impl_from_array!(f64, Float64);

impl Tensor {
    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::UInt8(_) => DType::UInt8,
            Self::Int32(_) => DType::Int32,
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
        }
    }

    /// Array shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        each_variant!(self, a => a.shape())
    }

    /// Number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Size of the leading (batch) dimension, 0 for scalars.
    #[must_use]
    pub fn batch_len(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    /// Convert every element to `f64`.
    #[must_use]
    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            Self::UInt8(a) => a.mapv(f64::from),
            Self::Int32(a) => a.mapv(f64::from),
            Self::Float32(a) => a.mapv(f64::from),
            Self::Float64(a) => a.clone(),
        }
    }

    /// Convert every element to `f32`.
    #[must_use]
    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            Self::UInt8(a) => a.mapv(f32::from),
            Self::Int32(a) => a.mapv(|v| v as f32),
            Self::Float32(a) => a.clone(),
            Self::Float64(a) => a.mapv(|v| v as f32),
        }
    }

    /// Fail with [`Error::Shape`] unless the tensor has exactly `rank` dimensions.
    pub fn expect_rank(&self, name: &str, rank: usize) -> Result<()> {
        if self.ndim() != rank {
            return Err(Error::shape(name, format!("rank {rank}"), self.shape()));
        }
        Ok(())
    }

    /// Fail with [`Error::DType`] unless the tensor is floating point.
    pub fn expect_floating(&self, name: &str) -> Result<()> {
        if !self.dtype().is_floating() {
            return Err(Error::DType {
                tensor: name.to_string(),
                dtype: self.dtype(),
            });
        }
        Ok(())
    }

    /// Split along the batch axis into `num` equally sized chunks.
    ///
    /// Fails if the batch is empty or not evenly divisible by `num`.
    pub fn split(&self, name: &str, num: usize) -> Result<Vec<Tensor>> {
        if num == 0 {
            return Err(Error::Config(format!(
                "cannot split {name} into 0 batches"
            )));
        }
        if self.ndim() == 0 || self.batch_len() == 0 {
            return Err(Error::shape(name, "a non-empty batch", self.shape()));
        }
        let len = self.batch_len();
        if len % num != 0 {
            return Err(Error::shape(
                name,
                format!("batch dimension divisible by {num}"),
                self.shape(),
            ));
        }
        let chunk = len / num;
        let parts: Vec<Tensor> = each_variant!(self, a => a
            .axis_chunks_iter(Axis(0), chunk)
            .map(|c| Tensor::from(c.to_owned()))
            .collect());
        Ok(parts)
    }

    /// Concatenate tensors of one dtype along the batch axis, preserving order.
    pub fn concat(parts: &[Tensor]) -> Result<Tensor> {
        let Some(first) = parts.first() else {
            return Err(Error::shape("concat", "at least one tensor", [0usize; 0]));
        };
        let dtype = first.dtype();
        if let Some(other) = parts.iter().find(|t| t.dtype() != dtype) {
            return Err(Error::Config(format!(
                "cannot concatenate {dtype} and {} tensors",
                other.dtype()
            )));
        }

        macro_rules! gather {
            ($variant:ident) => {{
                let views: Vec<ArrayViewD<'_, _>> = parts
                    .iter()
                    .filter_map(|t| match t {
                        Tensor::$variant(a) => Some(a.view()),
                        _ => None,
                    })
                    .collect();
                Tensor::$variant(concatenate(Axis(0), &views)?)
            }};
        }

        Ok(match dtype {
            DType::UInt8 => gather!(UInt8),
            DType::Int32 => gather!(Int32),
            DType::Float32 => gather!(Float32),
            DType::Float64 => gather!(Float64),
        })
    }

    /// Collapse all trailing dimensions into one feature axis: `[N, ...] -> [N, D]`.
    ///
    /// Rank-2 tensors are returned unchanged; rank-1 becomes `[N, 1]`.
    pub fn flatten_batch(self, name: &str) -> Result<Tensor> {
        if self.ndim() == 2 {
            return Ok(self);
        }
        if self.ndim() == 0 {
            return Err(Error::shape(name, "a batch dimension", self.shape()));
        }
        let n = self.batch_len();
        let features: usize = self.shape()[1..].iter().product();
        let flat = each_variant!(self, a => {
            let data: Vec<_> = a.iter().copied().collect();
            Tensor::from(ArrayD::from_shape_vec(IxDyn(&[n, features]), data)?)
        });
        Ok(flat)
    }
}

/// A scalar score in the precision of its source activations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// Single precision result.
    Float32(f32),
    /// Double precision result.
    Float64(f64),
}

impl Scalar {
    /// Cast a double precision value back to `dtype`.
    #[must_use]
    pub fn from_f64(value: f64, dtype: DType) -> Self {
        match dtype {
            DType::Float32 => Self::Float32(value as f32),
            _ => Self::Float64(value),
        }
    }

    /// Widen to `f64`.
    #[must_use]
    pub fn to_f64(self) -> f64 {
        match self {
            Self::Float32(v) => f64::from(v),
            Self::Float64(v) => v,
        }
    }

    /// Element type of the value.
    #[must_use]
    pub fn dtype(self) -> DType {
        match self {
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array2};

    fn batch(rows: usize, cols: usize) -> Tensor {
        let a = Array::from_shape_fn((rows, cols), |(i, j)| (i * cols + j) as f32);
        Tensor::from(a.into_dyn())
    }

    #[test]
    fn test_split_then_concat_preserves_order() {
        let t = batch(6, 2);
        let parts = t.split("images", 3).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].shape(), &[2, 2]);
        let joined = Tensor::concat(&parts).unwrap();
        assert_eq!(joined, t);
    }

    #[test]
    fn test_split_not_divisible() {
        let t = batch(5, 2);
        let err = t.split("images", 2).unwrap_err();
        assert!(matches!(err, Error::Shape { .. }));
    }

    #[test]
    fn test_split_zero_batches() {
        let t = batch(4, 2);
        assert!(matches!(t.split("images", 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_concat_mixed_dtypes() {
        let a = batch(2, 2);
        let b = Tensor::from(Array2::<f64>::zeros((2, 2)).into_dyn());
        assert!(Tensor::concat(&[a, b]).is_err());
    }

    #[test]
    fn test_flatten_batch() {
        let a = Array::from_shape_fn((2, 1, 1, 3), |(i, _, _, k)| (i * 3 + k) as f64);
        let flat = Tensor::from(a.into_dyn()).flatten_batch("pool").unwrap();
        assert_eq!(flat.shape(), &[2, 3]);
        let values = flat.to_f64();
        assert_eq!(values[[1, 2]], 5.0);
    }

    #[test]
    fn test_flatten_rank_one() {
        let a = Array::from_vec(vec![1.0f32, 2.0, 3.0]);
        let flat = Tensor::from(a.into_dyn()).flatten_batch("logits").unwrap();
        assert_eq!(flat.shape(), &[3, 1]);
    }

    #[test]
    fn test_expect_floating() {
        let t = Tensor::from(Array2::<i32>::zeros((2, 2)).into_dyn());
        let err = t.expect_floating("logits").unwrap_err();
        assert!(err.to_string().contains("logits"));
        assert!(batch(2, 2).expect_floating("logits").is_ok());
    }

    #[test]
    fn test_scalar_cast_back() {
        let s = Scalar::from_f64(1.0 / 3.0, DType::Float32);
        assert_eq!(s.dtype(), DType::Float32);
        assert_eq!(s.to_f64(), f64::from((1.0f64 / 3.0) as f32));
        let d = Scalar::from_f64(0.25, DType::Float64);
        assert_eq!(d, Scalar::Float64(0.25));
    }
}
