use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing the model and label artifacts.
    pub model_dir: PathBuf,
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
}

impl Config {
    /// Load configuration from `FACEID_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            model_dir: std::env::var("FACEID_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),
            match_threshold: env_f32(
                "FACEID_MATCH_THRESHOLD",
                faceid_core::DEFAULT_MATCH_THRESHOLD,
            ),
        }
    }

    /// Path to the embedding model.
    pub fn model_path(&self) -> String {
        std::env::var("FACEID_MODEL_PATH").unwrap_or_else(|_| {
            self.model_dir
                .join("mobilefacenet.onnx")
                .to_string_lossy()
                .into_owned()
        })
    }

    /// Path to the label list shipped with the model.
    pub fn labels_path(&self) -> String {
        std::env::var("FACEID_LABELS_PATH").unwrap_or_else(|_| {
            self.model_dir
                .join("labels.txt")
                .to_string_lossy()
                .into_owned()
        })
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
