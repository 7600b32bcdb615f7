//! Loading module weights from safetensors files.
//!
//! Tensors are matched by their qualified module names, so a checkpoint
//! exported from the reference implementations loads as it is.

use std::{fs, path::Path};

use bytemuck::pod_read_unaligned;
use half::{bf16, f16};
use log::{info, warn};
use ndarray::{ArrayD, IxDyn};
use nn::{DType, Module, NnErr, Tensor};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{BackboneErr, Result};

/// Overwrites the parameters and buffers of `module` with the tensors stored in
/// the safetensors file at `path`.
///
/// Every parameter has to be present in the file. Missing buffers keep their
/// current values. Loaded tensors keep the precision they were stored with.
///
/// # Arguments
/// * `module` - The module to load the weights into.
/// * `path` - The weights file.
///
/// # Returns
/// The amount of tensors loaded or an error if the file can't be read or
/// doesn't match the module.
pub fn load_safetensors<M: Module + ?Sized>(module: &mut M, path: &Path) -> Result<usize> {
    let bytes = fs::read(path).map_err(|source| BackboneErr::WeightsIo {
        path: path.to_path_buf(),
        source,
    })?;
    let tensors = SafeTensors::deserialize(&bytes)?;

    let mut loaded = 0;
    for (name, param) in module.named_parameters_mut() {
        let view = lookup(&tensors, &name).ok_or_else(|| BackboneErr::MissingTensor(name.clone()))?;
        load_into(&name, &view, param.tensor_mut())?;
        loaded += 1;
    }

    let mut missing = Vec::new();
    for (name, buffer) in module.named_buffers_mut() {
        match lookup(&tensors, &name) {
            Some(view) => {
                load_into(&name, &view, buffer)?;
                loaded += 1;
            }
            None => missing.push(name),
        }
    }

    if let Some(first) = missing.first() {
        warn!(
            "{} is missing {} buffers (first: {first}), keeping their current values",
            path.display(),
            missing.len()
        );
    }

    info!("loaded {loaded} tensors from {}", path.display());
    Ok(loaded)
}

/// Finds the tensor stored for `name`, falling back to the naming of older
/// DenseNet checkpoints (`norm.1` instead of `norm1`).
fn lookup<'data>(tensors: &SafeTensors<'data>, name: &str) -> Option<TensorView<'data>> {
    if let Ok(view) = tensors.tensor(name) {
        return Some(view);
    }

    legacy_name(name).and_then(|legacy| tensors.tensor(&legacy).ok())
}

fn legacy_name(name: &str) -> Option<String> {
    if !name.contains(".denselayer") {
        return None;
    }

    let (head, leaf) = name.rsplit_once('.')?;
    let (scope, module) = head.rsplit_once('.')?;
    let (stem, index) = module.split_at(module.len().checked_sub(1)?);

    matches!(stem, "norm" | "conv" | "relu")
        .then(|| format!("{scope}.{stem}.{index}.{leaf}"))
}

fn load_into(name: &str, view: &TensorView<'_>, tensor: &mut Tensor) -> Result<()> {
    if view.shape() != tensor.shape() {
        return Err(BackboneErr::TensorShape {
            name: name.to_string(),
            got: view.shape().to_vec(),
            expected: tensor.shape().to_vec(),
        });
    }

    let (values, dtype) = decode(name, view.dtype(), view.data())?;
    let data = ArrayD::from_shape_vec(IxDyn(view.shape()), values).map_err(NnErr::from)?;
    tensor.assign(data, dtype)?;

    Ok(())
}

fn decode(name: &str, dtype: Dtype, bytes: &[u8]) -> Result<(Vec<f32>, DType)> {
    let decoded: (Vec<f32>, DType) = match dtype {
        Dtype::F32 => (read::<f32>(bytes).collect(), DType::F32),
        Dtype::F16 => (read::<f16>(bytes).map(f16::to_f32).collect(), DType::F16),
        Dtype::BF16 => (read::<bf16>(bytes).map(bf16::to_f32).collect(), DType::BF16),
        Dtype::F64 => (read::<f64>(bytes).map(|x| x as f32).collect(), DType::F64),
        Dtype::I64 => (read::<i64>(bytes).map(|x| x as f32).collect(), DType::I64),
        other => {
            return Err(BackboneErr::UnsupportedDtype {
                name: name.to_string(),
                dtype: format!("{other:?}"),
            });
        }
    };

    Ok(decoded)
}

fn read<T: bytemuck::Pod>(bytes: &[u8]) -> impl Iterator<Item = T> + '_ {
    bytes
        .chunks_exact(size_of::<T>())
        .map(pod_read_unaligned::<T>)
}
