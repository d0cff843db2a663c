//! Per-request flow: extract, match, gate, look up, respond.

use crate::engine::{EngineError, EngineHandle};
use facematch_core::{KnownFaceIndex, MatchPolicy, Matcher};
use facematch_store::{DocumentStore, IdentityRecord, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("record lookup failed: {0}")]
    Store(#[from] StoreError),
    #[error("descriptor length {probe} does not match indexed length {indexed}")]
    DescriptorLength { probe: usize, indexed: usize },
}

/// One accepted match: the record's display fields plus the distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMatch {
    #[serde(flatten)]
    pub record: IdentityRecord,
    pub distance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResponse {
    pub matches: Vec<IdentityMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Ok,
    ServerError,
}

/// Response body plus the status the transport should report.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub status: UploadStatus,
    pub body: MatchResponse,
}

impl UploadOutcome {
    pub fn empty() -> Self {
        Self {
            status: UploadStatus::Ok,
            body: MatchResponse::default(),
        }
    }

    pub fn server_error() -> Self {
        Self {
            status: UploadStatus::ServerError,
            body: MatchResponse::default(),
        }
    }

    pub fn matched(found: IdentityMatch) -> Self {
        Self {
            status: UploadStatus::Ok,
            body: MatchResponse {
                matches: vec![found],
            },
        }
    }
}

/// Serving-phase state. The index is frozen; everything here is read-only
/// and shared across concurrent requests.
pub struct RequestPipeline {
    index: KnownFaceIndex,
    engine: EngineHandle,
    records: Arc<dyn DocumentStore>,
    policy: MatchPolicy,
}

impl RequestPipeline {
    pub fn new(
        index: KnownFaceIndex,
        engine: EngineHandle,
        records: Arc<dyn DocumentStore>,
        policy: MatchPolicy,
    ) -> Self {
        Self {
            index,
            engine,
            records,
            policy,
        }
    }

    pub fn index(&self) -> &KnownFaceIndex {
        &self.index
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Handle one upload. Always produces a well-formed outcome; failures
    /// are logged here and reported only as a bare server-error status.
    pub async fn handle_upload(&self, image: Option<Vec<u8>>) -> UploadOutcome {
        let Some(bytes) = image else {
            tracing::debug!("upload without image");
            return UploadOutcome::empty();
        };

        let started = Instant::now();
        let size = bytes.len();
        match self.try_match(bytes).await {
            Ok(Some(found)) => {
                tracing::info!(
                    label = %found.record.label,
                    distance = found.distance,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "match found"
                );
                UploadOutcome::matched(found)
            }
            Ok(None) => {
                tracing::info!(
                    bytes = size,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "no match"
                );
                UploadOutcome::empty()
            }
            Err(e) => {
                tracing::error!(error = %e, bytes = size, "upload failed");
                UploadOutcome::server_error()
            }
        }
    }

    async fn try_match(&self, bytes: Vec<u8>) -> Result<Option<IdentityMatch>, RequestError> {
        let Some(probe) = self.engine.extract(bytes).await? else {
            tracing::debug!("no face detected in upload");
            return Ok(None);
        };

        if let Some(indexed) = self.index.descriptor_len() {
            if probe.len() != indexed {
                return Err(RequestError::DescriptorLength {
                    probe: probe.len(),
                    indexed,
                });
            }
        }

        let candidate = self.policy.matcher().best_match(&probe, &self.index);
        if !self.policy.accepts(&candidate) {
            tracing::info!(
                key = ?candidate.identity_key,
                distance = candidate.distance,
                threshold = self.policy.threshold,
                "best candidate rejected"
            );
            return Ok(None);
        }
        let Some(key) = candidate.identity_key else {
            return Ok(None);
        };

        match self.records.get(&key).await? {
            Some(record) => Ok(Some(IdentityMatch {
                record,
                distance: round_distance(candidate.distance),
            })),
            None => {
                tracing::warn!(key = %key, "matched identity has no record");
                Ok(None)
            }
        }
    }
}

/// Round to 3 decimal places.
fn round_distance(distance: f32) -> f64 {
    (f64::from(distance) * 1000.0).round() / 1000.0
}
