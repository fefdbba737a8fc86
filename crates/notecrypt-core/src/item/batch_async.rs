//! Chunked batch decryption on tokio's blocking pool.
//!
//! Decryption is CPU-bound, so each chunk runs in `spawn_blocking`. Without
//! fail-fast, chunks run concurrently (bounded by the available parallelism)
//! and their reports are merged in input order. With fail-fast, chunks run
//! one after another so that nothing past the first failing chunk is touched.
//!
//! Items always come back to the caller, in input order, whether or not the
//! batch succeeded: decrypted items hold their plaintext, everything else
//! keeps its ciphertext.

use std::mem;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, warn};

use super::{BatchError, BatchReport, ItemKeyManager, ItemPayload};
use crate::crypto::{CryptoProvider, MasterKeys};

/// Items returned from a chunked batch, in input order, with the outcome.
#[derive(Debug)]
pub struct ChunkedBatch {
    pub items: Vec<ItemPayload>,
    pub result: Result<BatchReport, BatchError>,
}

impl ChunkedBatch {
    /// Split into the items and the merged report, or the first error.
    pub fn into_parts(self) -> (Vec<ItemPayload>, Result<BatchReport, BatchError>) {
        (self.items, self.result)
    }
}

async fn run_chunk<P: CryptoProvider + 'static>(
    manager: Arc<ItemKeyManager<P>>,
    keys: Arc<MasterKeys>,
    chunk: Vec<ItemPayload>,
    throw_on_error: bool,
) -> ChunkedBatch {
    // Shared so the items survive a panicking worker
    let shared = Arc::new(Mutex::new(chunk));
    let worker_items = Arc::clone(&shared);

    let joined = tokio::task::spawn_blocking(move || {
        let mut items = worker_items.lock().unwrap_or_else(PoisonError::into_inner);
        manager.decrypt_multiple_items(&mut items, &keys, throw_on_error)
    })
    .await;

    let items = mem::take(&mut *shared.lock().unwrap_or_else(PoisonError::into_inner));
    let result = joined
        .map_err(|e| BatchError::Worker(format!("Chunk decryption task failed: {e}")))
        .and_then(|result| result);
    ChunkedBatch { items, result }
}

fn split_chunks(items: Vec<ItemPayload>, chunk_size: usize) -> Vec<Vec<ItemPayload>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(chunk_size).collect());
    }
    chunks
}

fn offset_error(err: BatchError, offset: usize) -> BatchError {
    match err {
        BatchError::Item {
            index,
            uuid,
            source,
        } => BatchError::Item {
            index: index + offset,
            uuid,
            source,
        },
        other @ BatchError::Worker(_) => other,
    }
}

/// Decrypt `items` in chunks of `chunk_size` without blocking the runtime.
///
/// A `chunk_size` of zero is treated as one. On error the result carries the
/// first failure (by input order) and `items` still holds every item.
#[instrument(level = "debug", skip(manager, items, keys), fields(count = items.len()))]
pub async fn decrypt_items_chunked<P: CryptoProvider + 'static>(
    manager: Arc<ItemKeyManager<P>>,
    items: Vec<ItemPayload>,
    keys: Arc<MasterKeys>,
    chunk_size: usize,
    throw_on_error: bool,
) -> ChunkedBatch {
    let chunk_size = chunk_size.max(1);
    let total = items.len();
    let chunks = split_chunks(items, chunk_size);
    debug!(chunks = chunks.len(), chunk_size, "Decrypting batch in chunks");

    let mut out = Vec::with_capacity(total);
    let mut report = BatchReport::default();
    let mut first_error = None;

    if throw_on_error {
        let mut chunks = chunks.into_iter().enumerate();
        for (n, chunk) in chunks.by_ref() {
            let done = run_chunk(Arc::clone(&manager), Arc::clone(&keys), chunk, true).await;
            out.extend(done.items);
            match done.result {
                Ok(chunk_report) => report.merge(chunk_report),
                Err(err) => {
                    first_error = Some(offset_error(err, n * chunk_size));
                    break;
                }
            }
        }
        // Untouched chunks go back as they came
        out.extend(chunks.flat_map(|(_, chunk)| chunk));
    } else {
        let concurrency = std::thread::available_parallelism().map_or(4, NonZeroUsize::get);
        let results: Vec<ChunkedBatch> = stream::iter(chunks)
            .map(|chunk| run_chunk(Arc::clone(&manager), Arc::clone(&keys), chunk, false))
            .buffered(concurrency)
            .collect()
            .await;

        for done in results {
            out.extend(done.items);
            match done.result {
                Ok(chunk_report) => report.merge(chunk_report),
                Err(err) => {
                    warn!(error = %err, "Chunk failed; its items are returned undecrypted");
                    first_error.get_or_insert(err);
                }
            }
        }
    }

    if let Some(err) = first_error {
        return ChunkedBatch {
            items: out,
            result: Err(err),
        };
    }

    debug!(
        decrypted = report.decrypted,
        failed = report.failed,
        skipped = report.skipped,
        "Chunked batch decrypted"
    );
    ChunkedBatch {
        items: out,
        result: Ok(report),
    }
}
