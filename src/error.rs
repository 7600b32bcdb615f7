use std::fmt;

use backbones::BackboneErr;
use nn::NnErr;

/// All errors that can occur while assembling or configuring a model.
#[derive(Debug)]
pub enum ModelErr {
    /// Building or loading a backbone failed.
    Backbone(BackboneErr),
    /// Building a head or running a layer failed.
    Nn(NnErr),
    /// Invalid run configuration, caught before building anything.
    Config(String),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ModelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backbone(e) => write!(f, "backbone error: {e}"),
            Self::Nn(e) => write!(f, "layer error: {e}"),
            Self::Config(msg) => write!(f, "invalid config: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "invalid json config: {e}"),
        }
    }
}

impl std::error::Error for ModelErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backbone(e) => Some(e),
            Self::Nn(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Config(_) => None,
        }
    }
}

impl From<BackboneErr> for ModelErr {
    fn from(e: BackboneErr) -> Self {
        Self::Backbone(e)
    }
}

impl From<NnErr> for ModelErr {
    fn from(e: NnErr) -> Self {
        Self::Nn(e)
    }
}

impl From<std::io::Error> for ModelErr {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ModelErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, ModelErr>;
