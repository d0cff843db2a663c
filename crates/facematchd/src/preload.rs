//! Preload phase: build the known-face index from the object store.
//!
//! Every listed object is folded into one [`ObjectOutcome`]. Only a failed
//! listing aborts the preload; a bad object is recorded and skipped.

use crate::engine::{EngineError, EngineHandle};
use facematch_core::{Embedding, KnownFaceIndex, KnownFaceIndexBuilder};
use facematch_store::{ObjectStore, StoreError};
use futures::stream::{self, StreamExt};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreloadError {
    #[error("failed to list known faces under {prefix:?}: {source}")]
    List {
        prefix: String,
        #[source]
        source: StoreError,
    },
}

/// Errors isolated to a single object.
#[derive(Error, Debug)]
enum ItemError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// What happened to one listed object.
#[derive(Debug, Clone, PartialEq)]
pub enum PreloadOutcome {
    Added,
    SkippedNotImage { content_type: String },
    SkippedNoFace,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectOutcome {
    pub name: String,
    pub identity_key: String,
    pub outcome: PreloadOutcome,
}

/// Per-object outcomes, in completion order.
#[derive(Debug, Clone, Default)]
pub struct PreloadReport {
    pub outcomes: Vec<ObjectOutcome>,
}

impl PreloadReport {
    fn count(&self, pred: impl Fn(&PreloadOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn added(&self) -> usize {
        self.count(|o| matches!(o, PreloadOutcome::Added))
    }

    pub fn skipped_not_image(&self) -> usize {
        self.count(|o| matches!(o, PreloadOutcome::SkippedNotImage { .. }))
    }

    pub fn skipped_no_face(&self) -> usize {
        self.count(|o| matches!(o, PreloadOutcome::SkippedNoFace))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PreloadOutcome::Failed { .. }))
    }
}

/// Identity key for an object: last path segment without its final extension.
pub fn identity_key(name: &str) -> String {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

/// Build the known-face index from every object under `prefix`.
///
/// Up to `concurrency` objects are fetched and extracted at once; entries are
/// appended in completion order.
pub async fn preload(
    store: &dyn ObjectStore,
    prefix: &str,
    engine: &EngineHandle,
    concurrency: usize,
) -> Result<(KnownFaceIndex, PreloadReport), PreloadError> {
    let started = Instant::now();
    tracing::info!(prefix, "preloading known faces");

    let entries = store.list(prefix).await.map_err(|source| PreloadError::List {
        prefix: prefix.to_string(),
        source,
    })?;
    tracing::info!(objects = entries.len(), "listed known-face objects");

    let (builder, report) = stream::iter(entries)
        .map(|entry| async move {
            let identity_key = identity_key(&entry.name);
            let (descriptor, outcome) = match process_object(store, engine, &entry.name).await {
                Ok(result) => result,
                Err(e) => (None, PreloadOutcome::Failed { reason: e.to_string() }),
            };
            (
                ObjectOutcome {
                    name: entry.name,
                    identity_key,
                    outcome,
                },
                descriptor,
            )
        })
        .buffer_unordered(concurrency.max(1))
        .fold(
            (KnownFaceIndexBuilder::new(), PreloadReport::default()),
            |(mut builder, mut report), (item, descriptor)| async move {
                log_outcome(&item);
                if let Some(descriptor) = descriptor {
                    builder.append(item.identity_key.clone(), descriptor);
                }
                report.outcomes.push(item);
                (builder, report)
            },
        )
        .await;

    let index = builder.freeze();
    tracing::info!(
        known_faces = index.len(),
        added = report.added(),
        skipped_not_image = report.skipped_not_image(),
        skipped_no_face = report.skipped_no_face(),
        failed = report.failed(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "preload finished"
    );

    Ok((index, report))
}

async fn process_object(
    store: &dyn ObjectStore,
    engine: &EngineHandle,
    name: &str,
) -> Result<(Option<Embedding>, PreloadOutcome), ItemError> {
    let metadata = store.metadata(name).await?;
    if !metadata.is_image() {
        let content_type = metadata.content_type.unwrap_or_default();
        return Ok((None, PreloadOutcome::SkippedNotImage { content_type }));
    }

    let bytes = store.download(name).await?;
    tracing::debug!(name, size = metadata.size, bytes = bytes.len(), "downloaded");

    match engine.extract(bytes).await? {
        Some(descriptor) => Ok((Some(descriptor), PreloadOutcome::Added)),
        None => Ok((None, PreloadOutcome::SkippedNoFace)),
    }
}

fn log_outcome(item: &ObjectOutcome) {
    let (name, key) = (item.name.as_str(), item.identity_key.as_str());
    match &item.outcome {
        PreloadOutcome::Added => tracing::info!(name, key, "known face loaded"),
        PreloadOutcome::SkippedNotImage { content_type } => {
            tracing::info!(name, content_type = content_type.as_str(), "skipped: not an image")
        }
        PreloadOutcome::SkippedNoFace => tracing::warn!(name, "skipped: no face detected"),
        PreloadOutcome::Failed { reason } => tracing::warn!(name, key, reason = reason.as_str(), "failed to load known face"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::test_support::{png, FakeExtractor, MemoryObject, MemoryObjectStore};

    fn engine() -> EngineHandle {
        spawn_engine(
            FakeExtractor::new([
                (1, vec![1.0, 0.0]),
                (2, vec![0.0, 1.0]),
                (3, vec![0.5, 0.5]),
            ]),
            4,
        )
        .unwrap()
    }

    fn outcome_of<'a>(report: &'a PreloadReport, key: &str) -> &'a PreloadOutcome {
        &report
            .outcomes
            .iter()
            .find(|o| o.identity_key == key)
            .expect("outcome recorded")
            .outcome
    }

    #[test]
    fn test_identity_key() {
        assert_eq!(identity_key("img/alice.jpg"), "alice");
        assert_eq!(identity_key("img/nested/bob.png"), "bob");
        assert_eq!(identity_key("img/a.b.png"), "a.b");
        assert_eq!(identity_key("img/noext"), "noext");
        assert_eq!(identity_key("carol.jpeg"), "carol");
        assert_eq!(identity_key("img/.hidden"), ".hidden");
    }

    #[tokio::test]
    async fn test_partial_failures_are_isolated() {
        let store = MemoryObjectStore::new(vec![
            MemoryObject::image("img/alice.png", png(1)),
            MemoryObject::image("img/notes.txt", b"text".to_vec()).with_content_type(Some("text/plain")),
            MemoryObject::image("img/bob.png", png(2)),
            MemoryObject::broken("img/corrupt.jpg"),
            MemoryObject::image("img/carol.png", png(3)),
        ]);

        let (index, report) = preload(&store, "img/", &engine(), 2).await.unwrap();

        assert_eq!(index.len(), 3);
        let mut keys: Vec<&str> = index.all().iter().map(|f| f.identity_key.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["alice", "bob", "carol"]);

        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.added(), 3);
        assert_eq!(report.skipped_not_image(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            outcome_of(&report, "notes"),
            &PreloadOutcome::SkippedNotImage { content_type: "text/plain".into() }
        );
        assert!(matches!(outcome_of(&report, "corrupt"), PreloadOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_extractor_panic_is_isolated() {
        let store = MemoryObjectStore::new(vec![
            MemoryObject::image("img/alice.png", png(1)),
            MemoryObject::image("img/bob.png", png(2)),
            MemoryObject::image("img/carol.png", png(3)),
            MemoryObject::image("img/dave.png", png(4)),
        ]);
        let engine = spawn_engine(
            FakeExtractor::new([
                (1, vec![1.0, 0.0]),
                (3, vec![0.5, 0.5]),
                (4, vec![0.0, 1.0]),
            ])
            .panicking_on(2),
            4,
        )
        .unwrap();

        let (index, report) = preload(&store, "img/", &engine, 1).await.unwrap();

        assert_eq!(index.len(), 3);
        assert!(matches!(outcome_of(&report, "bob"), PreloadOutcome::Failed { .. }));
        for key in ["alice", "carol", "dave"] {
            assert_eq!(outcome_of(&report, key), &PreloadOutcome::Added);
        }
    }

    #[tokio::test]
    async fn test_no_face_and_undecodable_objects() {
        let store = MemoryObjectStore::new(vec![
            MemoryObject::image("img/landscape.png", png(40)),
            MemoryObject::image("img/garbage.png", b"not really a png".to_vec()),
            MemoryObject::image("img/alice.png", png(1)),
        ]);

        let (index, report) = preload(&store, "img/", &engine(), 1).await.unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(outcome_of(&report, "landscape"), &PreloadOutcome::SkippedNoFace);
        assert!(matches!(outcome_of(&report, "garbage"), PreloadOutcome::Failed { .. }));
        assert_eq!(outcome_of(&report, "alice"), &PreloadOutcome::Added);
    }

    #[tokio::test]
    async fn test_missing_content_type_is_not_an_image() {
        let store = MemoryObjectStore::new(vec![
            MemoryObject::image("img/alice.png", png(1)).with_content_type(None),
        ]);

        let (index, report) = preload(&store, "img/", &engine(), 4).await.unwrap();

        assert!(index.is_empty());
        assert_eq!(
            outcome_of(&report, "alice"),
            &PreloadOutcome::SkippedNotImage { content_type: String::new() }
        );
    }

    #[tokio::test]
    async fn test_duplicate_keys_both_loaded() {
        let store = MemoryObjectStore::new(vec![
            MemoryObject::image("img/alice.png", png(1)),
            MemoryObject::image("img/2024/alice.jpg", png(2)),
        ]);

        let (index, _) = preload(&store, "img/", &engine(), 4).await.unwrap();

        assert_eq!(index.len(), 2);
        assert!(index.all().iter().all(|f| f.identity_key == "alice"));
    }

    #[tokio::test]
    async fn test_prefix_filters_objects() {
        let store = MemoryObjectStore::new(vec![
            MemoryObject::image("img/alice.png", png(1)),
            MemoryObject::image("thumbs/alice.png", png(2)),
        ]);

        let (index, report) = preload(&store, "img/", &engine(), 4).await.unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(index.all()[0].descriptor.values, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let store = MemoryObjectStore {
            fail_list: true,
            ..Default::default()
        };

        let err = preload(&store, "img/", &engine(), 4).await.unwrap_err();
        assert!(matches!(err, PreloadError::List { .. }));
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryObjectStore::default();
        let (index, report) = preload(&store, "img/", &engine(), 4).await.unwrap();
        assert!(index.is_empty());
        assert!(report.outcomes.is_empty());
    }
}
