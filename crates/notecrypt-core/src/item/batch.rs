//! Batch decryption with per-item failure isolation.
//!
//! Deleted items and items whose content is not a string are skipped. A
//! failing item is flagged `errorDecrypting` and the batch moves on, unless
//! the caller asked for fail-fast, in which case the first failure is
//! returned.

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::{ItemKeyManager, ItemPayload};
use crate::crypto::{CryptoProvider, MasterKeys};
use crate::envelope::{DecryptError, DecryptErrorKind};

/// A batch stopped on its first failure.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to decrypt item {uuid} (index {index}): {source}")]
    Item {
        index: usize,
        uuid: String,
        #[source]
        source: DecryptError,
    },

    /// A worker running part of the batch panicked or was cancelled.
    #[error("Batch worker failed: {0}")]
    Worker(String),
}

/// One item the batch could not decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub uuid: String,
    pub kind: DecryptErrorKind,
}

/// Outcome counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub decrypted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.decrypted + self.failed + self.skipped
    }

    /// True when no item failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    pub fn merge(&mut self, other: Self) {
        self.decrypted += other.decrypted;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }

    fn record(&mut self, uuid: &str, outcome: &Outcome) {
        match outcome {
            Outcome::Decrypted => self.decrypted += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(err) => {
                self.failed += 1;
                self.failures.push(ItemFailure {
                    uuid: uuid.to_owned(),
                    kind: err.kind(),
                });
            }
        }
    }
}

enum Outcome {
    Decrypted,
    Skipped,
    Failed(DecryptError),
}

impl<P: CryptoProvider> ItemKeyManager<P> {
    fn decrypt_one(&self, item: &mut ItemPayload, keys: &MasterKeys) -> Outcome {
        if item.deleted || !item.content.is_string() {
            return Outcome::Skipped;
        }
        match self.apply_decryption(item, keys) {
            Ok(()) => Outcome::Decrypted,
            Err(err) => Outcome::Failed(err),
        }
    }

    /// Decrypt `items` in place, one after another.
    #[instrument(level = "debug", skip(self, items, keys), fields(count = items.len()))]
    pub fn decrypt_multiple_items(
        &self,
        items: &mut [ItemPayload],
        keys: &MasterKeys,
        throw_on_error: bool,
    ) -> Result<BatchReport, BatchError> {
        let mut report = BatchReport::default();

        for (index, item) in items.iter_mut().enumerate() {
            let outcome = match self.decrypt_one(item, keys) {
                Outcome::Failed(err) if throw_on_error => {
                    return Err(BatchError::Item {
                        index,
                        uuid: item.uuid.clone(),
                        source: err,
                    });
                }
                Outcome::Failed(err) => {
                    warn!(uuid = %item.uuid, error = %err, "Error decrypting item");
                    Outcome::Failed(err)
                }
                other => other,
            };
            report.record(&item.uuid, &outcome);
        }

        debug!(
            decrypted = report.decrypted,
            failed = report.failed,
            skipped = report.skipped,
            "Batch decrypted"
        );
        Ok(report)
    }
}

impl<P: CryptoProvider> ItemKeyManager<P> {
    /// Decrypt `items` in place across the rayon thread pool.
    ///
    /// Per-item semantics match [`decrypt_multiple_items`](Self::decrypt_multiple_items).
    /// With `throw_on_error`, items running concurrently with the failing one
    /// may still be decrypted; the error reported is the failure with the
    /// lowest index.
    #[instrument(level = "debug", skip(self, items, keys), fields(count = items.len()))]
    pub fn decrypt_multiple_items_parallel(
        &self,
        items: &mut [ItemPayload],
        keys: &MasterKeys,
        throw_on_error: bool,
    ) -> Result<BatchReport, BatchError> {
        let outcomes: Vec<Outcome> = items
            .par_iter_mut()
            .map(|item| self.decrypt_one(item, keys))
            .collect();

        let mut report = BatchReport::default();
        for (index, (item, outcome)) in items.iter().zip(outcomes).enumerate() {
            if let Outcome::Failed(err) = &outcome {
                if throw_on_error {
                    return Err(BatchError::Item {
                        index,
                        uuid: item.uuid.clone(),
                        source: err.clone(),
                    });
                }
                warn!(uuid = %item.uuid, error = %err, "Error decrypting item");
            }
            report.record(&item.uuid, &outcome);
        }

        debug!(
            decrypted = report.decrypted,
            failed = report.failed,
            skipped = report.skipped,
            "Parallel batch decrypted"
        );
        Ok(report)
    }
}
