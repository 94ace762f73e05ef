use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors, serialize};

use crate::{DocsError, Result};

/// A row-major f32 matrix read back from disk
pub(super) struct Matrix {
    pub data: Vec<f32>,
    pub rows: usize,
    pub dims: usize,
    pub header: HashMap<String, String>,
}

pub(super) fn write_f32_matrix(
    path: &Path,
    name: &str,
    data: &[f32],
    rows: usize,
    dims: usize,
    header: Option<HashMap<String, String>>,
) -> Result<()> {
    let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
    let tensor = TensorView::new(Dtype::F32, vec![rows, dims], &bytes).map_err(|e| {
        DocsError::Serialization(format!("Failed to build tensor '{}': {}", name, e))
    })?;
    let serialized = serialize(std::iter::once((name.to_string(), tensor)), &header)
        .map_err(|e| {
            DocsError::Serialization(format!("Failed to serialize tensor '{}': {}", name, e))
        })?;

    let mut file = File::create(path)?;
    file.write_all(&serialized)?;
    file.sync_all()?;
    Ok(())
}

pub(super) fn read_f32_matrix(path: &Path, name: &str) -> Result<Matrix> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let corrupt = |what: String| {
        DocsError::StorageCorruption(format!("{}: {}", path.display(), what))
    };

    let (_, metadata) =
        SafeTensors::read_metadata(&bytes).map_err(|e| corrupt(e.to_string()))?;
    let header = metadata.metadata().clone().unwrap_or_default();

    let tensors = SafeTensors::deserialize(&bytes).map_err(|e| corrupt(e.to_string()))?;
    let tensor = tensors
        .tensor(name)
        .map_err(|e| corrupt(format!("missing tensor '{}': {}", name, e)))?;
    if tensor.dtype() != Dtype::F32 {
        return Err(corrupt(format!(
            "tensor '{}' has dtype {:?}, expected F32",
            name,
            tensor.dtype()
        )));
    }
    let [rows, dims] = tensor.shape() else {
        return Err(corrupt(format!(
            "tensor '{}' has shape {:?}, expected two dimensions",
            name,
            tensor.shape()
        )));
    };

    let data = tensor
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(Matrix {
        data,
        rows: *rows,
        dims: *dims,
        header,
    })
}
