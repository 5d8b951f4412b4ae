use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("Download failed: {0}")]
	DownloadFailed(String),

	#[error(
		"Model artifact needs GPU features this CPU-only host does not have ({0}). \
		 Re-export the model with CPU-compatible weights (load it on the CPU and save \
		 f32 safetensors), or retrain it, then point model.url at the new artifact."
	)]
	DeviceMismatch(String),

	#[error("Failed to load model: {0}")]
	ModelLoadFailed(String),

	#[error("Invalid input: {0}")]
	InvalidInput(String),

	#[error("Payload too large: {0}")]
	PayloadTooLarge(String),

	#[error("Invalid image: {0}")]
	InvalidImage(String),

	#[error("Inference error: {0}")]
	InferenceError(String),

	#[error("Configuration error: {0}")]
	ConfigError(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	SerializationError(String),
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

impl From<toml::de::Error> for Error {
	fn from(err: toml::de::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, Error>;
