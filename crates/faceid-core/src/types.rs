use serde::{Deserialize, Serialize};

/// Label reported for a face that matched nothing in the gallery.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Annotation color for a recognized face (RGB).
pub const KNOWN_COLOR: [u8; 3] = [0, 255, 0];
/// Annotation color for an unrecognized face (RGB).
pub const UNKNOWN_COLOR: [u8; 3] = [255, 0, 0];

/// Bounding box of a detected face in frame coordinates.
///
/// Carried on identity records for annotation only; matching never reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Face embedding vector (192-dimensional for the MobileFaceNet-family model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "mobilefacenet").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Number of dimensions in this embedding.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Lower = more similar. Zero for identical vectors.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A registered identity: one reference embedding plus display metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Opaque identifier, assigned by the caller.
    pub id: String,
    /// Display name. May be updated by re-registration.
    pub label: String,
    /// Reference embedding for this identity.
    pub embedding: Embedding,
    /// Last observed bounding box, for annotation only.
    pub location: Option<BoundingBox>,
    /// Display color hint (RGB); cosmetic, not part of matching.
    pub color: [u8; 3],
    /// Opaque caller-defined payload.
    pub extra: Option<serde_json::Value>,
}

/// Result of matching a query embedding against the gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Label of the nearest record, or [`UNKNOWN_LABEL`].
    pub label: String,
    /// Euclidean distance to the nearest record; infinite for an empty gallery.
    pub distance: f32,
    /// Whether the distance fell below the match threshold.
    pub is_known: bool,
}

impl MatchResult {
    /// The no-match result: unknown label at infinite distance.
    pub fn unknown() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            distance: f32::INFINITY,
            is_known: false,
        }
    }

    /// Annotation color hint for the rendering collaborator.
    pub fn color(&self) -> [u8; 3] {
        if self.is_known {
            KNOWN_COLOR
        } else {
            UNKNOWN_COLOR
        }
    }

    /// Overlay text for the rendering collaborator, e.g. `"User 0.42"`.
    pub fn overlay_label(&self) -> String {
        format!("{} {:.2}", self.label, self.distance)
    }
}
