use crate::classifier::{Classifier, Prediction};
use crate::error::{Error, Result};
use image::DynamicImage;
use serde::Serialize;
use std::sync::Arc;

/// What `/analyze` returns for a successful classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub result: String,
}

/// Owns the one model this process serves. Cloning shares it.
#[derive(Clone)]
pub struct InferenceService {
    model: Arc<dyn Classifier>,
}

impl InferenceService {
    pub fn new(model: impl Classifier + 'static) -> Self {
        Self {
            model: Arc::new(model),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn labels(&self) -> &[String] {
        self.model.labels()
    }

    pub fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
        self.model.predict(image)
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<ClassificationResult> {
        let prediction = self.predict(image)?;
        Ok(ClassificationResult {
            result: prediction.label,
        })
    }
}

/// Decodes uploaded bytes into an image, sniffing the format from the content.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| Error::InvalidImage(e.to_string()))
}
