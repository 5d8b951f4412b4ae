use crate::error::{Error, Result};
use crate::model::fetcher::part_path;
use candle_core::pickle;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const PICKLE_EXTENSIONS: &[&str] = &["pkl", "pth", "pt", "bin"];

fn is_pickle(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| PICKLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Returns a safetensors path for `artifact`, converting a PyTorch pickle next to it if needed.
///
/// The pickle is kept: its presence is what stops the next startup from downloading again.
pub fn ensure_safetensors(artifact: &Path) -> Result<PathBuf> {
    if !is_pickle(artifact) {
        return Ok(artifact.to_path_buf());
    }

    let safetensors_file = artifact.with_extension("safetensors");

    // Converted on an earlier run
    if safetensors_file.exists() {
        return Ok(safetensors_file);
    }

    tracing::info!("Converting {:?} to SafeTensors...", artifact);

    let tensors_vec = pickle::read_all(artifact)
        .map_err(|e| Error::ModelLoadFailed(format!("Failed to read PyTorch file: {}", e)))?;

    if tensors_vec.is_empty() {
        return Err(Error::ModelLoadFailed(format!(
            "PyTorch file {:?} contains no tensors",
            artifact
        )));
    }

    tracing::info!("Loading {} tensors from PyTorch model", tensors_vec.len());

    let tensors: HashMap<_, _> = tensors_vec.into_iter().collect();

    let part = part_path(&safetensors_file);
    candle_core::safetensors::save(&tensors, &part)
        .map_err(|e| Error::ModelLoadFailed(format!("Failed to save SafeTensors: {}", e)))?;
    std::fs::rename(&part, &safetensors_file)?;

    tracing::info!("✓ Converted to SafeTensors format");

    Ok(safetensors_file)
}
