use crate::classifier::ResNetClassifier;
use crate::config::{Config, ModelSettings};
use crate::error::{Error, Result};
use crate::model::convert::ensure_safetensors;
use crate::model::{ArtifactFetcher, ArtifactRef, DefaultTransport, Transport};
use candle_core::Device;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Substrings that mark a model exported with GPU-only features being loaded on a CPU host.
///
/// Both come from PyTorch's refusal to deserialize CUDA storages without CUDA ("... If you are
/// running on a CPU-only machine, please use torch.load with map_location ..."). candle itself
/// reads such storages onto the CPU, so these only surface from loaders passed to
/// [`ModelLoader::load_with`] that wrap a PyTorch-side export step.
const DEVICE_MISMATCH_SIGNATURES: &[&str] = &[
    "cpu-only machine",
    "torch.cuda.is_available() is false",
];

/// Maps a load failure onto the error the operator should see.
///
/// Device-incompatibility failures become [`Error::DeviceMismatch`], which carries
/// instructions for producing a CPU-compatible artifact. Anything else is returned untouched.
pub fn classify_load_error(err: Error) -> Error {
    if matches!(err, Error::DeviceMismatch(_)) {
        return err;
    }

    let message = err.to_string();
    let lowered = message.to_lowercase();

    if DEVICE_MISMATCH_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
    {
        tracing::warn!("Model artifact is not usable on this host: {}", message);
        Error::DeviceMismatch(message)
    } else {
        err
    }
}

pub struct ModelLoader<T = DefaultTransport> {
    fetcher: Arc<ArtifactFetcher<T>>,
    artifact: ArtifactRef,
    settings: ModelSettings,
    device: Device,
}

impl ModelLoader<DefaultTransport> {
    pub fn from_config(config: &Config, device: Device) -> Self {
        let settings = config.settings.model.clone();
        let transport = DefaultTransport::new(settings.download_timeout());
        Self::new(transport, config.artifact(), settings, device)
    }
}

impl<T: Transport + 'static> ModelLoader<T> {
    pub fn new(transport: T, artifact: ArtifactRef, settings: ModelSettings, device: Device) -> Self {
        Self {
            fetcher: Arc::new(ArtifactFetcher::new(transport)),
            artifact,
            settings,
            device,
        }
    }

    pub fn artifact(&self) -> &ArtifactRef {
        &self.artifact
    }

    /// Ensures the artifact is on disk and returns its path.
    pub async fn fetch(&self) -> Result<PathBuf> {
        let fetcher = Arc::clone(&self.fetcher);
        let ArtifactRef { url, path } = self.artifact.clone();

        tokio::task::spawn_blocking(move || fetcher.ensure_downloaded(&url, &path).map(|()| path))
            .await
            .map_err(|e| Error::DownloadFailed(format!("Download task failed: {}", e)))?
    }

    /// Fetches the artifact, converts a PyTorch pickle if needed, then builds the configured ResNet.
    pub async fn load_model(&self) -> Result<ResNetClassifier> {
        let settings = self.settings.clone();
        let device = self.device.clone();

        self.load_with(move |artifact| {
            let weights = ensure_safetensors(artifact)?;
            ResNetClassifier::load(&weights, &settings, device)
        })
        .await
    }

    /// Fetches the artifact, then hands its path to `load` on the blocking pool.
    ///
    /// `load` never runs if the fetch fails.
    pub async fn load_with<M, F>(&self, load: F) -> Result<M>
    where
        M: Send + 'static,
        F: FnOnce(&Path) -> Result<M> + Send + 'static,
    {
        let path = self.fetch().await?;

        tracing::info!("Materializing model from {:?}", path);

        tokio::task::spawn_blocking(move || load(&path))
            .await
            .map_err(|e| Error::ModelLoadFailed(format!("Loader task failed: {}", e)))?
            .map_err(classify_load_error)
    }
}
