//! Nearest-neighbor face matcher with optional session enrollment.
//!
//! Orchestrates extraction, gallery search, and the threshold decision.
//! Registration of new identities happens here, never in the gallery itself.

use crate::embedder::{EmbedderError, EmbeddingSource};
use crate::gallery::Gallery;
use crate::types::{
    BoundingBox, Embedding, IdentityRecord, MatchResult, UNKNOWN_COLOR, UNKNOWN_LABEL,
};
use image::DynamicImage;
use std::sync::Mutex;
use thiserror::Error;

/// Maximum embedding distance at which two faces count as the same identity.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.0;

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("inference: {0}")]
    Inference(#[from] EmbedderError),
    #[error("invalid embedding: expected {expected} dimensions, got {actual}")]
    InvalidEmbedding { expected: usize, actual: usize },
}

/// Enrollment state for the current recognition session.
///
/// Replaces ambient "add pending" UI state with an explicit value the caller
/// threads through [`FaceMatcher::identify`]. The first unmatched face with a
/// non-empty `extra` payload is registered and the pending flag clears;
/// subsequent calls with the same session leave the gallery alone.
pub struct Enrollment {
    /// Identifier for the record to create, assigned by the caller.
    pub id: String,
    /// Display name for the record to create.
    pub label: String,
    /// Bounding box of the face being enrolled, for annotation only.
    pub location: Option<BoundingBox>,
    /// Opaque payload stored on the created record. Enrollment only fires
    /// when this is present and non-null.
    pub extra: Option<serde_json::Value>,
    pending: bool,
}

impl Enrollment {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            location: None,
            extra: None,
            pending: true,
        }
    }

    pub fn with_location(mut self, location: BoundingBox) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Whether this session is still waiting to enroll an identity.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    fn has_extra(&self) -> bool {
        matches!(&self.extra, Some(v) if !v.is_null())
    }
}

/// Matches face crops against the identity gallery.
///
/// Owns the gallery and serializes inference through a single lock, so a
/// matcher shared across frame-processing threads stays consistent.
pub struct FaceMatcher<E> {
    embedder: Mutex<E>,
    gallery: Gallery,
    threshold: f32,
    embedding_dim: usize,
}

impl<E: EmbeddingSource> FaceMatcher<E> {
    pub fn new(embedder: E, threshold: f32) -> Self {
        let embedding_dim = embedder.dim();
        Self {
            embedder: Mutex::new(embedder),
            gallery: Gallery::new(),
            threshold,
            embedding_dim,
        }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Identify the face in `image` against the gallery.
    ///
    /// Synchronous and blocking: extraction runs inline, then every gallery
    /// record is scored by Euclidean distance and the single minimum decides
    /// the result. When `enrollment` is pending, its `extra` payload is
    /// non-empty, and the face matched nothing, the query embedding is
    /// registered as a new identity and the pending flag clears.
    ///
    /// Extraction failure propagates unchanged; it means "no result for this
    /// frame", never "unknown identity".
    pub fn identify(
        &self,
        image: &DynamicImage,
        enrollment: Option<&mut Enrollment>,
    ) -> Result<MatchResult, MatcherError> {
        let query = {
            let mut embedder = lock(&self.embedder);
            embedder.embed(image)?
        };

        let result = self.nearest(&query);
        tracing::debug!(
            label = %result.label,
            distance = result.distance,
            is_known = result.is_known,
            "match decision"
        );

        if let Some(enrollment) = enrollment {
            if enrollment.pending && enrollment.has_extra() && !result.is_known {
                let record = IdentityRecord {
                    id: enrollment.id.clone(),
                    label: enrollment.label.clone(),
                    embedding: query,
                    location: enrollment.location.clone(),
                    color: UNKNOWN_COLOR,
                    extra: enrollment.extra.clone(),
                };
                self.register(&enrollment.label, record)?;
                enrollment.pending = false;
                tracing::info!(label = %enrollment.label, "enrolled new identity");
            }
        }

        Ok(result)
    }

    /// Register a record under `label`, validating its dimensionality.
    ///
    /// This is the registration boundary: a record whose embedding does not
    /// match the extractor's output size never reaches the gallery.
    pub fn register(&self, label: &str, record: IdentityRecord) -> Result<(), MatcherError> {
        let actual = record.embedding.dim();
        if actual != self.embedding_dim {
            tracing::warn!(
                label,
                expected = self.embedding_dim,
                actual,
                "rejected registration with mismatched embedding"
            );
            return Err(MatcherError::InvalidEmbedding {
                expected: self.embedding_dim,
                actual,
            });
        }
        self.gallery.register(label, record);
        Ok(())
    }

    /// Nearest-neighbor scan over a gallery snapshot.
    ///
    /// Strict `<` keeps the first-seen record on exact distance ties, so the
    /// result is deterministic across runs.
    fn nearest(&self, query: &Embedding) -> MatchResult {
        let records = self.gallery.snapshot();

        let mut best: Option<(usize, f32)> = None;
        for (i, record) in records.iter().enumerate() {
            let distance = query.euclidean_distance(&record.embedding);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((i, distance)),
            }
        }

        match best {
            Some((idx, distance)) if distance < self.threshold => MatchResult {
                label: records[idx].label.clone(),
                distance,
                is_known: true,
            },
            Some((_, distance)) => MatchResult {
                label: UNKNOWN_LABEL.to_string(),
                distance,
                is_known: false,
            },
            None => MatchResult::unknown(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use serde_json::json;

    /// Deterministic stand-in for the ONNX embedder: the embedding is the
    /// crop's top-left red channel, so tests place crops at chosen distances.
    struct StubSource;

    impl EmbeddingSource for StubSource {
        fn embed(&mut self, image: &DynamicImage) -> Result<Embedding, EmbedderError> {
            let px = image.to_rgb8().get_pixel(0, 0).0[0];
            Ok(Embedding {
                values: vec![px as f32, 0.0],
                model_version: None,
            })
        }

        fn dim(&self) -> usize {
            2
        }
    }

    /// Embedder whose every extraction fails.
    struct FailingSource;

    impl EmbeddingSource for FailingSource {
        fn embed(&mut self, _image: &DynamicImage) -> Result<Embedding, EmbedderError> {
            Err(EmbedderError::EmptyInput)
        }

        fn dim(&self) -> usize {
            2
        }
    }

    fn crop(red: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([red, 0, 0])))
    }

    fn record(id: &str, label: &str, values: Vec<f32>) -> IdentityRecord {
        IdentityRecord {
            id: id.to_string(),
            label: label.to_string(),
            embedding: Embedding { values, model_version: None },
            location: None,
            color: UNKNOWN_COLOR,
            extra: None,
        }
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let matcher = FaceMatcher::new(StubSource, DEFAULT_MATCH_THRESHOLD);
        let result = matcher.identify(&crop(42), None).unwrap();
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert!(result.distance.is_infinite());
        assert!(!result.is_known);
        assert!(matcher.gallery().is_empty());
    }

    #[test]
    fn test_exact_match_is_known_at_zero_distance() {
        let matcher = FaceMatcher::new(StubSource, DEFAULT_MATCH_THRESHOLD);
        matcher.register("user", record("1", "user", vec![5.0, 0.0])).unwrap();

        let result = matcher.identify(&crop(5), None).unwrap();
        assert!(result.is_known);
        assert_eq!(result.label, "user");
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn test_distance_above_threshold_is_unknown() {
        let matcher = FaceMatcher::new(StubSource, DEFAULT_MATCH_THRESHOLD);
        matcher.register("user", record("1", "user", vec![6.5, 0.0])).unwrap();

        // Query at distance 1.5 from the single record.
        let result = matcher.identify(&crop(5), None).unwrap();
        assert!(!result.is_known);
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert!((result.distance - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_enrollment_registers_first_unmatched_face() {
        let matcher = FaceMatcher::new(StubSource, DEFAULT_MATCH_THRESHOLD);
        let mut session = Enrollment::new("0", "User").with_extra(json!({"source": "frame"}));

        let first = matcher.identify(&crop(10), Some(&mut session)).unwrap();
        assert!(!first.is_known);
        assert!(!session.is_pending());
        assert_eq!(matcher.gallery().len(), 1);

        let snapshot = matcher.gallery().snapshot();
        assert_eq!(snapshot[0].label, "User");
        assert_eq!(snapshot[0].embedding.values, vec![10.0, 0.0]);
        assert_eq!(snapshot[0].extra, Some(json!({"source": "frame"})));

        // The same face now matches the enrolled identity.
        let second = matcher.identify(&crop(10), Some(&mut session)).unwrap();
        assert!(second.is_known);
        assert_eq!(second.label, "User");
    }

    #[test]
    fn test_no_enrollment_without_extra() {
        let matcher = FaceMatcher::new(StubSource, DEFAULT_MATCH_THRESHOLD);
        let mut session = Enrollment::new("0", "User");

        matcher.identify(&crop(10), Some(&mut session)).unwrap();
        assert!(matcher.gallery().is_empty());
        assert!(session.is_pending());
    }

    #[test]
    fn test_null_extra_counts_as_empty() {
        let matcher = FaceMatcher::new(StubSource, DEFAULT_MATCH_THRESHOLD);
        let mut session = Enrollment::new("0", "User").with_extra(json!(null));

        matcher.identify(&crop(10), Some(&mut session)).unwrap();
        assert!(matcher.gallery().is_empty());
        assert!(session.is_pending());
    }

    #[test]
    fn test_no_double_registration_on_known_match() {
        let matcher = FaceMatcher::new(StubSource, DEFAULT_MATCH_THRESHOLD);
        matcher
            .register("user", record("1", "user", vec![10.0, 0.0]))
            .unwrap();

        let mut session = Enrollment::new("0", "duplicate").with_extra(json!({"k": "v"}));
        let result = matcher.identify(&crop(10), Some(&mut session)).unwrap();

        assert!(result.is_known);
        assert!(session.is_pending());
        assert_eq!(matcher.gallery().len(), 1);
        // The existing record keeps its metadata.
        let snapshot = matcher.gallery().snapshot();
        assert_eq!(snapshot[0].id, "1");
        assert_eq!(snapshot[0].label, "user");
    }

    #[test]
    fn test_tie_break_picks_first_registered() {
        let matcher = FaceMatcher::new(StubSource, 2.0);
        // Both records sit at distance 1.0 from a query at the origin.
        matcher.register("first", record("1", "first", vec![1.0, 0.0])).unwrap();
        matcher.register("second", record("2", "second", vec![-1.0, 0.0])).unwrap();

        for _ in 0..10 {
            let result = matcher.identify(&crop(0), None).unwrap();
            assert!(result.is_known);
            assert_eq!(result.label, "first");
            assert!((result.distance - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_extraction_failure_propagates_without_registration() {
        let matcher = FaceMatcher::new(FailingSource, DEFAULT_MATCH_THRESHOLD);
        let mut session = Enrollment::new("0", "User").with_extra(json!({"k": "v"}));

        let err = matcher.identify(&crop(10), Some(&mut session)).unwrap_err();
        assert!(matches!(
            err,
            MatcherError::Inference(EmbedderError::EmptyInput)
        ));
        assert!(matcher.gallery().is_empty());
        assert!(session.is_pending());
    }

    #[test]
    fn test_register_rejects_mismatched_dimensionality() {
        let matcher = FaceMatcher::new(StubSource, DEFAULT_MATCH_THRESHOLD);
        let err = matcher
            .register("user", record("1", "user", vec![1.0, 2.0, 3.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            MatcherError::InvalidEmbedding { expected: 2, actual: 3 }
        ));
        assert!(matcher.gallery().is_empty());
    }

    #[test]
    fn test_enrollment_record_carries_location() {
        let matcher = FaceMatcher::new(StubSource, DEFAULT_MATCH_THRESHOLD);
        let mut session = Enrollment::new("0", "User")
            .with_extra(json!({"k": "v"}))
            .with_location(BoundingBox { x: 10.0, y: 20.0, width: 64.0, height: 64.0 });

        matcher.identify(&crop(10), Some(&mut session)).unwrap();

        let snapshot = matcher.gallery().snapshot();
        let location = snapshot[0].location.as_ref().unwrap();
        assert_eq!(location.x, 10.0);
        assert_eq!(location.height, 64.0);
    }
}
