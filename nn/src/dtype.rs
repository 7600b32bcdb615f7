use std::fmt::{self, Display};

use half::{bf16, f16};

/// The storage precision of a tensor.
///
/// Every kernel in this crate computes in `f32`, the dtype only decides how
/// many bytes an element costs and how much precision the stored values keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    #[default]
    F32,
    F64,
    I64,
}

impl DType {
    /// Returns the width in bytes of a single element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F16 | DType::BF16 => 2,
            DType::F32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        !matches!(self, DType::I64)
    }

    /// Rounds `x` to the closest value representable with this dtype.
    pub fn round(self, x: f32) -> f32 {
        match self {
            DType::F16 => f16::from_f32(x).to_f32(),
            DType::BF16 => bf16::from_f32(x).to_f32(),
            DType::F32 | DType::F64 => x,
            DType::I64 => x.trunc(),
        }
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I64 => "i64",
        };

        f.write_str(s)
    }
}
