use crate::config::ModelSettings;
use crate::error::{Error, Result};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::resnet;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Five stride-2 stages; anything smaller collapses to an empty feature map.
pub const MIN_IMAGE_SIZE: usize = 32;

/// Full output of one forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub index: usize,
    pub probabilities: Vec<f32>,
}

impl Prediction {
    pub fn confidence(&self) -> f32 {
        self.probabilities.get(self.index).copied().unwrap_or(0.0)
    }
}

/// A loaded, read-only image classifier.
pub trait Classifier: Send + Sync {
    fn predict(&self, image: &DynamicImage) -> Result<Prediction>;

    fn labels(&self) -> &[String];

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    ResNet18,
    ResNet34,
    ResNet50,
}

impl Architecture {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "resnet18" => Ok(Self::ResNet18),
            "resnet34" => Ok(Self::ResNet34),
            "resnet50" => Ok(Self::ResNet50),
            other => Err(Error::ConfigError(format!(
                "Unsupported architecture '{}' (expected resnet18, resnet34 or resnet50)",
                other
            ))),
        }
    }

    fn build(self, nclasses: usize, vb: VarBuilder<'static>) -> candle_core::Result<Func<'static>> {
        match self {
            Self::ResNet18 => resnet::resnet18(nclasses, vb),
            Self::ResNet34 => resnet::resnet34(nclasses, vb),
            Self::ResNet50 => resnet::resnet50(nclasses, vb),
        }
    }
}

pub struct ResNetClassifier {
    name: String,
    model: Func<'static>,
    labels: Vec<String>,
    image_size: usize,
    device: Device,
}

impl ResNetClassifier {
    pub fn load(weights: &Path, settings: &ModelSettings, device: Device) -> Result<Self> {
        if settings.labels.is_empty() {
            return Err(Error::ConfigError(
                "No class labels configured (set model.labels or CLASSY_LABELS)".to_string(),
            ));
        }

        if settings.image_size < MIN_IMAGE_SIZE {
            return Err(Error::ConfigError(format!(
                "image_size must be at least {} (got {})",
                MIN_IMAGE_SIZE, settings.image_size
            )));
        }

        let arch = Architecture::parse(&settings.arch)?;

        tracing::info!("Loading {:?} weights from: {:?}", arch, weights);

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                .map_err(|e| Error::ModelLoadFailed(format!("Failed to load safetensors: {}", e)))?
        };

        let model = arch
            .build(settings.labels.len(), vb)
            .map_err(|e| Error::ModelLoadFailed(format!("Failed to build {:?}: {}", arch, e)))?;

        tracing::info!("Model loaded successfully");
        tracing::info!("  Architecture: {:?}", arch);
        tracing::info!("  Classes: {}", settings.labels.len());
        tracing::info!("  Input size: {}x{}", settings.image_size, settings.image_size);

        let file_name = weights
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name: format!("{} ({})", settings.arch.to_ascii_lowercase(), file_name),
            model,
            labels: settings.labels.clone(),
            image_size: settings.image_size,
            device,
        })
    }
}

impl Classifier for ResNetClassifier {
    fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
        let input = preprocess(image, self.image_size, &self.device)?
            .unsqueeze(0)
            .map_err(|e| Error::InferenceError(format!("Failed to batch input: {}", e)))?;

        let logits = self
            .model
            .forward(&input)
            .map_err(|e| Error::InferenceError(format!("Forward pass failed: {}", e)))?;

        let probabilities = candle_nn::ops::softmax(&logits, D::Minus1)
            .and_then(|p| p.squeeze(0))
            .and_then(|p| p.to_dtype(DType::F32))
            .and_then(|p| p.to_vec1::<f32>())
            .map_err(|e| Error::InferenceError(format!("Failed to read probabilities: {}", e)))?;

        let index = argmax(&probabilities)
            .ok_or_else(|| Error::InferenceError("Model produced no outputs".to_string()))?;

        let label = self.labels.get(index).cloned().ok_or_else(|| {
            Error::InferenceError(format!(
                "Predicted class {} but only {} labels are configured",
                index,
                self.labels.len()
            ))
        })?;

        tracing::debug!("Predicted '{}' ({:.3})", label, probabilities[index]);

        Ok(Prediction {
            label,
            index,
            probabilities,
        })
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Resize-to-fill, scale to [0, 1] and ImageNet-normalize into a `(3, size, size)` tensor.
pub fn preprocess(image: &DynamicImage, size: usize, device: &Device) -> Result<Tensor> {
    let side = size as u32;
    let rgb = image
        .resize_to_fill(side, side, FilterType::Triangle)
        .to_rgb8()
        .into_raw();

    let to_tensor = || -> candle_core::Result<Tensor> {
        let pixels = Tensor::from_vec(rgb, (size, size, 3), device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?;
        let mean = Tensor::new(&IMAGENET_MEAN, device)?.reshape((3, 1, 1))?;
        let std = Tensor::new(&IMAGENET_STD, device)?.reshape((3, 1, 1))?;
        pixels.broadcast_sub(&mean)?.broadcast_div(&std)
    };

    to_tensor().map_err(|e| Error::InferenceError(format!("Failed to preprocess image: {}", e)))
}

fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}
