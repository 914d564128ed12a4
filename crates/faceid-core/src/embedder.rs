//! Face embedder via ONNX Runtime.
//!
//! Converts a cropped face image into a 192-dimensional embedding using a
//! MobileFaceNet-family model, loaded once per session.

use crate::types::Embedding;
use image::{imageops, DynamicImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const MODEL_INPUT_SIZE: usize = 112;
const MODEL_MEAN: f32 = 127.5;
const MODEL_STD: f32 = 127.5; // symmetric normalization to [-1, 1]
/// Fixed embedding dimensionality produced by the model.
pub const EMBEDDING_DIM: usize = 192;
const EMBED_MODEL_VERSION: &str = "mobilefacenet";

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("label list file not found or unreadable: {0}")]
    LabelsNotFound(String),
    #[error("label list file is empty: {0}")]
    EmptyLabels(String),
    #[error("input crop is empty")]
    EmptyInput,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Source of query embeddings for the matcher.
///
/// The production implementation is [`FaceEmbedder`]; tests substitute a
/// deterministic stub so matching logic runs without a model artifact.
pub trait EmbeddingSource {
    /// Extract an embedding from a cropped face image.
    fn embed(&mut self, image: &DynamicImage) -> Result<Embedding, EmbedderError>;

    /// Fixed dimensionality of every embedding this source produces.
    fn dim(&self) -> usize;
}

/// ONNX-backed face embedder.
pub struct FaceEmbedder {
    session: Session,
    labels: Vec<String>,
}

impl FaceEmbedder {
    /// Load the embedding model and its associated label list.
    ///
    /// Both artifacts are read once; the session is reused for every
    /// subsequent [`extract`](Self::extract) call.
    pub fn load(model_path: &str, labels_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let raw_labels = std::fs::read_to_string(labels_path)
            .map_err(|_| EmbedderError::LabelsNotFound(labels_path.to_string()))?;
        let labels = parse_labels(&raw_labels);
        if labels.is_empty() {
            return Err(EmbedderError::EmptyLabels(labels_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            labels = labels.len(),
            "loaded embedding model"
        );

        Ok(Self { session, labels })
    }

    /// Labels loaded alongside the model artifact.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Extract a face embedding from a cropped face image.
    ///
    /// The crop is resized to the fixed 112×112 model input and normalized
    /// before inference. Deterministic for identical input bytes.
    pub fn extract(&mut self, image: &DynamicImage) -> Result<Embedding, EmbedderError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EmbedderError::EmptyInput);
        }

        let resized = image
            .resize_exact(
                MODEL_INPUT_SIZE as u32,
                MODEL_INPUT_SIZE as u32,
                imageops::FilterType::Triangle,
            )
            .to_rgb8();

        let input = Self::preprocess(&resized);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        // L2-normalize the embedding
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw
        };

        Ok(Embedding {
            values,
            model_version: Some(EMBED_MODEL_VERSION.to_string()),
        })
    }

    /// Preprocess a 112×112 RGB crop into a NCHW float tensor.
    fn preprocess(crop: &RgbImage) -> Array4<f32> {
        let size = MODEL_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in crop.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel.0[c] as f32 - MODEL_MEAN) / MODEL_STD;
            }
        }

        tensor
    }
}

impl EmbeddingSource for FaceEmbedder {
    fn embed(&mut self, image: &DynamicImage) -> Result<Embedding, EmbedderError> {
        self.extract(image)
    }

    fn dim(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Parse a label list file: one label per line, blank lines ignored.
fn parse_labels(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
