//! Media conversion module.
//!
//! Per-file orchestration of the probe → select → synthesize → supervise
//! pipeline, plus a bounded worker pool for batch runs. Each conversion
//! owns its own encoder process and policy snapshot; nothing mutable is
//! shared between concurrent conversions.

mod manager;

pub use manager::{ConversionManager, ConversionReport, ProcessOutcome};

use anyhow::anyhow;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Container extensions accepted as conversion sources.
pub const VALID_INPUT_EXTENSIONS: &[&str] = &[
    "mkv", "avi", "mov", "wmv", "flv", "ts", "m2ts", "mpg", "mpeg", "vob", "webm", "3gp", "ogv",
    "divx", "iso",
];

/// Extensions the converter can produce (and re-process when configured).
pub const VALID_OUTPUT_EXTENSIONS: &[&str] = &["mp4", "m4v"];

/// Convert many files with bounded concurrency.
///
/// One permit per running conversion; each runs on the blocking pool with
/// its own supervisor and process. The shared cancellation signal stops
/// every conversion promptly.
pub async fn process_batch(
    manager: Arc<ConversionManager>,
    inputs: Vec<PathBuf>,
    jobs: usize,
    cancel: Arc<AtomicBool>,
) -> Vec<(PathBuf, anyhow::Result<ProcessOutcome>)> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(jobs.max(1)));
    let mut handles = Vec::new();

    for input in inputs {
        let manager = Arc::clone(&manager);
        let semaphore = Arc::clone(&semaphore);
        let cancel = Arc::clone(&cancel);

        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (input, Err(anyhow!("worker pool closed"))),
            };

            let result = tokio::task::spawn_blocking({
                let manager = Arc::clone(&manager);
                let cancel = Arc::clone(&cancel);
                let input = input.clone();
                move || {
                    manager.process_file(&input, cancel, |event| {
                        tracing::trace!(
                            timecode = event.timecode,
                            fps = event.fps,
                            speed = %event.speed,
                            "progress"
                        );
                    })
                }
            })
            .await;

            let result = match result {
                Ok(result) => result,
                Err(e) => Err(anyhow!("conversion task panicked: {e}")),
            };
            (input, result)
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(pair) => results.push(pair),
            Err(e) => tracing::error!("failed to join conversion task: {e}"),
        }
    }
    results
}
