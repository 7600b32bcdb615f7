use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;
use rand_distr::{NormalError, uniform::Error as UniformError};

/// The result type used in the entire layer library.
pub type Result<T> = std::result::Result<T, NnErr>;

/// The layer library's error type.
#[derive(Debug)]
pub enum NnErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    RankMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ParamGenExhausted {
        got: usize,
        expected: usize,
    },
    InvalidConfig(String),
    Distribution(String),
    Shape(ShapeError),
}

impl Display for NnErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NnErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "size mismatch in {what}, got {got} and expected {expected}"),
            NnErr::RankMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "{what} expects a tensor of rank {expected}, got one of rank {got}"
            ),
            NnErr::ParamGenExhausted { got, expected } => write!(
                f,
                "the parameter generator ran out of values, generated {got} of the expected {expected}"
            ),
            NnErr::InvalidConfig(msg) => write!(f, "invalid layer configuration: {msg}"),
            NnErr::Distribution(msg) => write!(f, "invalid initialization distribution: {msg}"),
            NnErr::Shape(e) => write!(f, "shape error: {e}"),
        }
    }
}

impl Error for NnErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NnErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for NnErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<NormalError> for NnErr {
    fn from(value: NormalError) -> Self {
        Self::Distribution(value.to_string())
    }
}

impl From<UniformError> for NnErr {
    fn from(value: UniformError) -> Self {
        Self::Distribution(value.to_string())
    }
}
