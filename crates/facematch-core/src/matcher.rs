use crate::index::KnownFaceIndex;
use crate::types::{DistanceMetric, Embedding};
use serde::{Deserialize, Serialize};

/// Acceptance threshold for Euclidean distance. Tuned for one descriptor
/// space; retune it when the extraction model or metric changes.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Best candidate found for a probe descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    /// `None` when there was nothing to compare against.
    pub identity_key: Option<String>,
    pub distance: f32,
}

impl MatchCandidate {
    /// Distance reported alongside the "no match possible" sentinel.
    pub const NO_MATCH_DISTANCE: f32 = 1.0;

    pub fn none() -> Self {
        Self {
            identity_key: None,
            distance: Self::NO_MATCH_DISTANCE,
        }
    }
}

/// Strategy for comparing a probe descriptor against the known-face index.
pub trait Matcher {
    fn best_match(&self, probe: &Embedding, index: &KnownFaceIndex) -> MatchCandidate;
}

/// Linear scan over every entry. O(n·d) per query.
///
/// The entry with strictly minimal distance wins; on ties the entry
/// inserted first wins. Probe and entries must have the same length (see
/// [`KnownFaceIndex::descriptor_len`]); a mismatch compares only the common
/// prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatMatcher {
    pub metric: DistanceMetric,
}

impl FlatMatcher {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }
}

impl Matcher for FlatMatcher {
    fn best_match(&self, probe: &Embedding, index: &KnownFaceIndex) -> MatchCandidate {
        let mut best_distance = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, face) in index.all().iter().enumerate() {
            let distance = self.metric.distance(probe, &face.descriptor);
            tracing::trace!(key = %face.identity_key, distance, "candidate");
            if distance < best_distance {
                best_distance = distance;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) => MatchCandidate {
                identity_key: Some(index.all()[idx].identity_key.clone()),
                distance: best_distance,
            },
            None => MatchCandidate::none(),
        }
    }
}

/// Euclidean flat scan, the default matching strategy.
pub fn find_best_match(query: &Embedding, index: &KnownFaceIndex) -> MatchCandidate {
    FlatMatcher::new(DistanceMetric::Euclidean).best_match(query, index)
}

/// Metric and acceptance threshold, kept together since one is tuned for the other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_threshold() -> f32 {
    DEFAULT_MATCH_THRESHOLD
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl MatchPolicy {
    pub fn matcher(&self) -> FlatMatcher {
        FlatMatcher::new(self.metric)
    }

    /// Threshold gate: a candidate is reliable when it names an identity
    /// and its distance does not exceed the threshold.
    pub fn accepts(&self, candidate: &MatchCandidate) -> bool {
        candidate.identity_key.is_some() && candidate.distance <= self.threshold
    }
}
