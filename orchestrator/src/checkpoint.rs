use std::{collections::HashMap, fs, path::Path};

use aggregator::GlobalModel;
use log::info;
use safetensors::{Dtype, SafeTensors, serialize, tensor::TensorView};

use crate::error::{OrchestratorError, Result};

const PARAMS: &str = "params";
const VERSION: &str = "version";

/// Writes the global model to a safetensors file.
///
/// The parameters are stored as a single flat `F32` tensor and the version as metadata.
///
/// # Arguments
/// * `global` - The model to save.
/// * `path` - Where to write it, parent directories are created if missing.
pub fn save<P: AsRef<Path>>(global: &GlobalModel, path: P) -> Result<()> {
    let path = path.as_ref();
    let checkpoint_err = |reason: String| OrchestratorError::Checkpoint {
        path: path.to_path_buf(),
        reason,
    };

    let view = TensorView::new(
        Dtype::F32,
        vec![global.len()],
        bytemuck::cast_slice(global.params()),
    )
    .map_err(|e| checkpoint_err(e.to_string()))?;

    let metadata = HashMap::from([(VERSION.to_string(), global.version().to_string())]);
    let bytes = serialize([(PARAMS, view)], &Some(metadata))
        .map_err(|e| checkpoint_err(e.to_string()))?;

    let io_err = |source| OrchestratorError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    fs::write(path, bytes).map_err(io_err)?;

    info!(
        "saved global model v{} ({} parameters) to {}",
        global.version(),
        global.len(),
        path.display()
    );

    Ok(())
}

/// Reads back a global model written by `save`.
///
/// # Returns
/// The restored model or an error if the file can't be read or doesn't hold a flat `F32`
/// `params` tensor.
pub fn load<P: AsRef<Path>>(path: P) -> Result<GlobalModel> {
    let path = path.as_ref();
    let checkpoint_err = |reason: String| OrchestratorError::Checkpoint {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = fs::read(path).map_err(|source| OrchestratorError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (_, metadata) =
        SafeTensors::read_metadata(&bytes).map_err(|e| checkpoint_err(e.to_string()))?;

    let version = match metadata.metadata() {
        Some(meta) => match meta.get(VERSION) {
            Some(v) => v
                .parse()
                .map_err(|_| checkpoint_err(format!("invalid version '{v}'")))?,
            None => 0,
        },
        None => 0,
    };

    let tensors = SafeTensors::deserialize(&bytes).map_err(|e| checkpoint_err(e.to_string()))?;
    let tensor = tensors
        .tensor(PARAMS)
        .map_err(|e| checkpoint_err(e.to_string()))?;

    if tensor.dtype() != Dtype::F32 {
        return Err(checkpoint_err(format!(
            "expected F32 parameters, found {:?}",
            tensor.dtype()
        )));
    }

    let params = tensor
        .data()
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned::<f32>)
        .collect();

    Ok(GlobalModel::with_version(version, params))
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    #[test]
    fn roundtrips_params_and_version() {
        let path = env::temp_dir().join("fedsim-checkpoint-roundtrip.safetensors");
        let global = GlobalModel::with_version(7, vec![0.5, -1.25, 3.0]);

        save(&global, &path).unwrap();
        let loaded = load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, global);
    }

    #[test]
    fn garbage_is_rejected() {
        let path = env::temp_dir().join("fedsim-checkpoint-garbage.safetensors");
        fs::write(&path, b"not a safetensors file").unwrap();

        let err = load(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert!(matches!(err, OrchestratorError::Checkpoint { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load("/definitely/not/here.safetensors").unwrap_err();
        assert!(matches!(err, OrchestratorError::Io { .. }));
    }
}
