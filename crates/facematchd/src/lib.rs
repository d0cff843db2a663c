//! facematchd: preloads known faces, then serves face matching over HTTP.
//!
//! Startup is two strictly ordered phases: the preload builds and freezes
//! the known-face index, and only then does the HTTP listener come up.

pub mod config;
pub mod engine;
pub mod pipeline;
pub mod preload;
pub mod server;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use config::Config;
use engine::{spawn_engine, EngineHandle, ENGINE_QUEUE_DEPTH};
use facematch_core::FaceExtractor;
use facematch_store::{LocalObjectStore, SqliteDocumentStore};
use pipeline::RequestPipeline;
use std::sync::Arc;

/// Load the ONNX models and start the engine thread.
pub fn start_engine(config: &Config) -> Result<EngineHandle> {
    let extractor = FaceExtractor::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    tracing::info!(model_dir = %config.model_dir.display(), "models loaded");
    Ok(spawn_engine(extractor, ENGINE_QUEUE_DEPTH)?)
}

/// Preload phase. Returns the serving pipeline once the index is frozen.
pub async fn prepare(config: &Config, engine: EngineHandle) -> Result<Arc<RequestPipeline>> {
    let objects = LocalObjectStore::new(&config.store_root);
    let (index, report) = preload::preload(
        &objects,
        &config.known_prefix,
        &engine,
        config.preload_concurrency,
    )
    .await?;
    if index.is_empty() {
        tracing::warn!(
            objects = report.outcomes.len(),
            "no known faces loaded; every upload will return no match"
        );
    }

    let records = SqliteDocumentStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening record store {}", config.db_path.display()))?;

    Ok(Arc::new(RequestPipeline::new(
        index,
        engine,
        Arc::new(records),
        config.match_policy(),
    )))
}

/// Run the daemon until shutdown.
pub async fn run(config: Config) -> Result<()> {
    tracing::info!(
        bind = %config.bind,
        store_root = %config.store_root.display(),
        prefix = %config.known_prefix,
        metric = %config.metric,
        threshold = config.match_threshold,
        "facematchd starting"
    );

    let engine = start_engine(&config)?;
    let pipeline = prepare(&config, engine).await?;
    let app = server::create_app(pipeline, config.max_upload_bytes);
    server::serve(app, &config.bind)
        .await
        .with_context(|| format!("serving on {}", config.bind))
}
