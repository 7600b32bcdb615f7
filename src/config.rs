use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    models::{DenseNetKanConfig, Vgg16Config},
};

/// Path of an optional JSON `RunConfig` for the binary.
pub const CONFIG_ENV: &str = "BACKBONE_HEADS_CONFIG";
/// Directory pretrained weight files are looked up in when no explicit path is given.
pub const WEIGHTS_DIR_ENV: &str = "BACKBONE_HEADS_WEIGHTS_DIR";
const DEFAULT_WEIGHTS_DIR: &str = "weights";

/// The model the binary builds and reports on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum RunConfig {
    Vgg16(Vgg16Config),
    DensenetKan(DenseNetKanConfig),
}

impl Default for RunConfig {
    /// A randomly initialized VGG16 with a frozen backbone and 20 classes.
    fn default() -> Self {
        Self::Vgg16(Vgg16Config {
            pretrained: false,
            ..Default::default()
        })
    }
}

impl RunConfig {
    /// Reads the configuration from the file named by `BACKBONE_HEADS_CONFIG`,
    /// falling back to the default one when the variable is unset.
    pub fn from_env() -> Result<Self> {
        match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_path(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Returns where the weights file `file_name` is expected when the model
/// configuration doesn't name one.
pub fn default_weights_path(file_name: &str) -> PathBuf {
    let dir = env::var(WEIGHTS_DIR_ENV).unwrap_or_else(|_| DEFAULT_WEIGHTS_DIR.to_string());
    Path::new(&dir).join(file_name)
}
