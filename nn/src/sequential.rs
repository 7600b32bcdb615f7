use ndarray::ArrayD;

use crate::{Layer, Module, Param, Result, Tensor, module::scoped};

/// A sequential container: information flows through its layers in the
/// order they were added.
///
/// Each layer has a name, positional containers name them after their index
/// (`0`, `1`, ...) which is how their parameters end up qualified.
#[derive(Debug, Default)]
pub struct Sequential {
    layers: Vec<(String, Layer)>,
}

impl Sequential {
    /// Creates a new `Sequential` whose layers are named after their position.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers
                .into_iter()
                .enumerate()
                .map(|(i, layer)| (i.to_string(), layer))
                .collect(),
        }
    }

    /// Creates a new `Sequential` out of explicitly named layers.
    pub fn named<I, S>(layers: I) -> Self
    where
        I: IntoIterator<Item = (S, Layer)>,
        S: Into<String>,
    {
        Self {
            layers: layers
                .into_iter()
                .map(|(name, layer)| (name.into(), layer))
                .collect(),
        }
    }

    pub fn push<S: Into<String>>(&mut self, name: S, layer: Layer) {
        self.layers.push((name.into(), layer));
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx).map(|(_, layer)| layer)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx).map(|(_, layer)| layer)
    }

    pub fn by_name(&self, name: &str) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|(layer_name, _)| layer_name == name)
            .map(|(_, layer)| layer)
    }

    /// Swaps the layer at `idx` for another one, keeping its name.
    ///
    /// # Arguments
    /// * `idx` - The position of the layer to replace.
    /// * `layer` - The new layer.
    ///
    /// # Returns
    /// The replaced layer or `None` if `idx` is out of bounds.
    pub fn replace(&mut self, idx: usize, layer: Layer) -> Option<Layer> {
        let (_, slot) = self.layers.get_mut(idx)?;
        Some(std::mem::replace(slot, layer))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Layer)> {
        self.layers.iter().map(|(name, layer)| (name.as_str(), layer))
    }
}

impl Module for Sequential {
    fn forward(&self, mut x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        for (_, layer) in &self.layers {
            x = layer.forward(x)?;
        }

        Ok(x)
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        let mut params = Vec::new();
        for (name, layer) in &self.layers {
            params.extend(scoped(name, layer.named_parameters()));
        }

        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        let mut params = Vec::new();
        for (name, layer) in &mut self.layers {
            params.extend(scoped(name, layer.named_parameters_mut()));
        }

        params
    }

    fn named_buffers(&self) -> Vec<(String, &Tensor)> {
        let mut buffers = Vec::new();
        for (name, layer) in &self.layers {
            buffers.extend(scoped(name, layer.named_buffers()));
        }

        buffers
    }

    fn named_buffers_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut buffers = Vec::new();
        for (name, layer) in &mut self.layers {
            buffers.extend(scoped(name, layer.named_buffers_mut()));
        }

        buffers
    }
}
