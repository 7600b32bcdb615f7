use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use nn::NnErr;
use safetensors::SafeTensorError;

/// The result type of the backbone constructors and loaders.
pub type Result<T> = std::result::Result<T, BackboneErr>;

#[derive(Debug)]
pub enum BackboneErr {
    /// The requested architecture variant doesn't exist.
    UnsupportedVersion(String),
    Nn(NnErr),
    WeightsIo {
        path: PathBuf,
        source: io::Error,
    },
    SafeTensors(SafeTensorError),
    MissingTensor(String),
    TensorShape {
        name: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    UnsupportedDtype {
        name: String,
        dtype: String,
    },
}

impl Display for BackboneErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackboneErr::UnsupportedVersion(version) => {
                write!(f, "unsupported backbone version: {version}")
            }
            BackboneErr::Nn(e) => write!(f, "{e}"),
            BackboneErr::WeightsIo { path, source } => {
                write!(f, "failed to read weights from {}: {source}", path.display())
            }
            BackboneErr::SafeTensors(e) => write!(f, "invalid safetensors file: {e}"),
            BackboneErr::MissingTensor(name) => {
                write!(f, "the weights file has no tensor named {name}")
            }
            BackboneErr::TensorShape {
                name,
                got,
                expected,
            } => write!(
                f,
                "tensor {name} has shape {got:?} but the model expects {expected:?}"
            ),
            BackboneErr::UnsupportedDtype { name, dtype } => {
                write!(f, "tensor {name} is stored as {dtype}, which can't be loaded")
            }
        }
    }
}

impl Error for BackboneErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackboneErr::Nn(e) => Some(e),
            BackboneErr::WeightsIo { source, .. } => Some(source),
            BackboneErr::SafeTensors(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NnErr> for BackboneErr {
    fn from(value: NnErr) -> Self {
        Self::Nn(value)
    }
}

impl From<SafeTensorError> for BackboneErr {
    fn from(value: SafeTensorError) -> Self {
        Self::SafeTensors(value)
    }
}
