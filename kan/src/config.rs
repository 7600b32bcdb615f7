use nn::{NnErr, Result};
use serde::{Deserialize, Serialize};

/// Hyperparameters of a [`KanLayer`](crate::KanLayer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KanConfig {
    /// Number of grid intervals.
    pub num: usize,
    /// Order of the B-splines.
    pub k: usize,
    /// Magnitude of the noise the splines are initialized to.
    pub noise_scale: f32,
    pub scale_base_mu: f32,
    pub scale_base_sigma: f32,
    pub scale_sp: f32,
    /// Blend between a uniform (1) and a sample-adaptive (0) grid on grid updates.
    pub grid_eps: f32,
    pub grid_range: [f32; 2],
    pub sp_trainable: bool,
    pub sb_trainable: bool,
}

impl Default for KanConfig {
    fn default() -> Self {
        Self {
            num: 5,
            k: 3,
            noise_scale: 0.5,
            scale_base_mu: 0.0,
            scale_base_sigma: 1.0,
            scale_sp: 1.0,
            grid_eps: 0.02,
            grid_range: [-1.0, 1.0],
            sp_trainable: true,
            sb_trainable: true,
        }
    }
}

impl KanConfig {
    /// Number of basis functions each spline is a combination of.
    pub fn num_basis(&self) -> usize {
        self.num + self.k
    }

    /// Checks that a layer can be built out of this configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num == 0 {
            return Err(NnErr::InvalidConfig(
                "a spline grid needs at least one interval".into(),
            ));
        }

        let [low, high] = self.grid_range;
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(NnErr::InvalidConfig(format!(
                "invalid grid range [{low}, {high}]"
            )));
        }

        if !(0. ..=1.).contains(&self.grid_eps) {
            return Err(NnErr::InvalidConfig(format!(
                "grid_eps has to be between 0 and 1, got {}",
                self.grid_eps
            )));
        }

        let scales = [
            self.noise_scale,
            self.scale_base_mu,
            self.scale_base_sigma,
            self.scale_sp,
        ];
        if scales.iter().any(|x| !x.is_finite()) {
            return Err(NnErr::InvalidConfig(
                "spline scales have to be finite".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = KanConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.num_basis(), 8);
    }

    #[test]
    fn rejects_empty_grid() {
        let config = KanConfig {
            num: 0,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_reversed_range() {
        let config = KanConfig {
            grid_range: [1.0, -1.0],
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: KanConfig = serde_json::from_str(r#"{"num": 8, "noise_scale": 0.1}"#).unwrap();

        assert_eq!(config.num, 8);
        assert_eq!(config.noise_scale, 0.1);
        assert_eq!(config.k, 3);
    }
}
