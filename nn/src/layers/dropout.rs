use crate::{NnErr, Result};

/// Dropout with drop probability `p`.
///
/// There is no training mode, so the layer only keeps its configuration and
/// lets tensors through untouched.
#[derive(Debug, Clone, Copy)]
pub struct Dropout {
    p: f32,
}

impl Dropout {
    pub fn new(p: f32) -> Result<Self> {
        if !(0. ..=1.).contains(&p) {
            return Err(NnErr::InvalidConfig(format!(
                "dropout probability has to be between 0 and 1, got {p}"
            )));
        }

        Ok(Self { p })
    }

    pub fn p(&self) -> f32 {
        self.p
    }
}
