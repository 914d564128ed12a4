//! faceid-core — On-device face recognition matching core.
//!
//! Turns a detected face crop into an identity decision: a MobileFaceNet-family
//! model (via ONNX Runtime) produces a fixed-length embedding, which is scored
//! against an in-memory gallery of registered identities by Euclidean distance.
//! Face detection, camera capture, and overlay rendering are the host's job;
//! this crate only consumes crops and produces labeled, scored results.

pub mod embedder;
pub mod gallery;
pub mod matcher;
pub mod types;

pub use embedder::{EmbedderError, EmbeddingSource, FaceEmbedder, EMBEDDING_DIM};
pub use gallery::Gallery;
pub use matcher::{Enrollment, FaceMatcher, MatcherError, DEFAULT_MATCH_THRESHOLD};
pub use types::{BoundingBox, Embedding, IdentityRecord, MatchResult};
