//! Scalar type descriptors shared by the metamodel and the expression algebra.

use serde::{Deserialize, Serialize};

/// Scalar data types a field or expression can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32 | ScalarType::Int64 | ScalarType::Float32 | ScalarType::Float64
        )
    }

    /// Check if two scalar types can appear on the two sides of a comparison.
    ///
    /// Numeric types compare across widths via float widening; every other
    /// type only compares with itself.
    pub fn is_comparable_with(&self, other: &ScalarType) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }
}
