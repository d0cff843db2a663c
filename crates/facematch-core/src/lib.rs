//! facematch-core: known-face index and descriptor matching.
//!
//! Holds the in-memory index of known face descriptors, the flat
//! nearest-neighbour matcher with its acceptance policy, and the
//! SCRFD + ArcFace extraction capability running on ONNX Runtime.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod index;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use extractor::{decode_image, DescriptorExtractor, ExtractError, FaceExtractor};
pub use index::{KnownFace, KnownFaceIndex, KnownFaceIndexBuilder};
pub use matcher::{
    find_best_match, FlatMatcher, MatchCandidate, MatchPolicy, Matcher, DEFAULT_MATCH_THRESHOLD,
};
pub use types::{BoundingBox, DistanceMetric, Embedding};
