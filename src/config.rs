use crate::error::{Error, Result};
use crate::model::ArtifactRef;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
	/// Where to fetch the artifact from. `hf://owner/repo/file` resolves through the Hub.
	pub url: String,
	pub file_name: String,
	pub arch: String,
	pub labels: Vec<String>,
	pub image_size: usize,
	pub download_timeout_secs: u64,
}

impl Default for ModelSettings {
	fn default() -> Self {
		Self {
			url: String::new(),
			file_name: "model.safetensors".to_string(),
			arch: "resnet34".to_string(),
			labels: Vec::new(),
			image_size: 224,
			download_timeout_secs: 300,
		}
	}
}

impl ModelSettings {
	pub fn download_timeout(&self) -> Duration {
		Duration::from_secs(self.download_timeout_secs)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
	pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			max_upload_bytes: 16 * 1024 * 1024,
		}
	}
}

/// Contents of `config.toml`. Every table is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	pub model: ModelSettings,
	pub server: ServerSettings,
}

impl Settings {
	pub fn parse(content: &str) -> Result<Self> {
		Ok(toml::from_str(content)?)
	}

	fn apply_overrides<F>(&mut self, lookup: F)
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(url) = lookup("CLASSY_MODEL_URL") {
			self.model.url = url;
		}
		if let Some(file_name) = lookup("CLASSY_MODEL_FILE") {
			self.model.file_name = file_name;
		}
		if let Some(arch) = lookup("CLASSY_MODEL_ARCH") {
			self.model.arch = arch;
		}
		if let Some(labels) = lookup("CLASSY_LABELS") {
			self.model.labels = labels
				.split(',')
				.map(str::trim)
				.filter(|l| !l.is_empty())
				.map(String::from)
				.collect();
		}
	}
}

#[derive(Debug, Clone)]
pub struct Config {
	pub data_dir: PathBuf,
	pub models_dir: PathBuf,
	pub config_path: PathBuf,
	pub settings: Settings,
}

impl Config {
	pub fn new() -> Result<Self> {
		let project_dirs = ProjectDirs::from("", "", "classy")
			.ok_or_else(|| Error::ConfigError("Could not determine config directory".to_string()))?;

		Self::at(project_dirs.data_dir().to_path_buf())
	}

	pub fn from_env() -> Result<Self> {
		let mut config = match std::env::var("CLASSY_DATA_DIR") {
			Ok(data_dir) => Self::at(PathBuf::from(data_dir))?,
			Err(_) => Self::new()?,
		};

		config.settings.apply_overrides(|key| std::env::var(key).ok());
		Ok(config)
	}

	fn at(data_dir: PathBuf) -> Result<Self> {
		let models_dir = data_dir.join("models");
		let config_path = data_dir.join("config.toml");

		std::fs::create_dir_all(&data_dir)?;
		std::fs::create_dir_all(&models_dir)?;

		let settings = if config_path.exists() {
			let content = std::fs::read_to_string(&config_path)?;
			Settings::parse(&content)
				.map_err(|e| Error::ConfigError(format!("{}: {}", config_path.display(), e)))?
		} else {
			Settings::default()
		};

		Ok(Self {
			data_dir,
			models_dir,
			config_path,
			settings,
		})
	}

	pub fn artifact(&self) -> ArtifactRef {
		ArtifactRef {
			url: self.settings.model.url.clone(),
			path: self.models_dir.join(&self.settings.model.file_name),
		}
	}
}
