use facematch_core::{decode_image, DescriptorExtractor, Embedding, ExtractError};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Pending extraction requests before callers start waiting on the queue.
pub const ENGINE_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("extractor panicked: {0}")]
    Panicked(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from async tasks to the engine thread.
enum EngineRequest {
    Extract {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Option<Embedding>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode image bytes and extract at most one face descriptor.
    ///
    /// `Ok(None)` means the image decoded but no face was found.
    pub async fn extract(&self, image: Vec<u8>) -> Result<Option<Embedding>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Extract {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The extractor holds ONNX sessions that need exclusive access, so every
/// extraction is serialised through this thread. A panic while handling one
/// request is reported to that caller as [`EngineError::Panicked`]. The
/// thread exits once every handle has been dropped.
pub fn spawn_engine<E>(extractor: E, queue_depth: usize) -> Result<EngineHandle, EngineError>
where
    E: DescriptorExtractor + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));
    let mut extractor = extractor;

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { image, reply } => {
                        // A panic fails this request only; the thread keeps serving.
                        let result = panic::catch_unwind(AssertUnwindSafe(|| {
                            run_extract(&mut extractor, &image)
                        }))
                        .unwrap_or_else(|payload| {
                            let message = panic_message(&*payload);
                            tracing::error!(bytes = image.len(), panic = %message, "extractor panicked");
                            Err(EngineError::Panicked(message))
                        });
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn run_extract<E: DescriptorExtractor>(
    extractor: &mut E,
    bytes: &[u8],
) -> Result<Option<Embedding>, EngineError> {
    let started = Instant::now();
    let image = decode_image(bytes)?;
    let descriptor = extractor.extract(&image)?;

    tracing::debug!(
        bytes = bytes.len(),
        width = image.width(),
        height = image.height(),
        face = descriptor.is_some(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "extract done"
    );
    Ok(descriptor)
}
