//! Parallel feature extraction over a fixed-size worker pool.
//!
//! Extraction is the only parallel step of a run: workers pull patch
//! indices from a shared atomic counter, and the pool is joined before any
//! graph building starts. Extraction and optimization never interleave.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::error::{AlignError, Result};
use crate::matching::DescriptorSet;

use super::Patch;

/// Computes one patch image's descriptor set.
///
/// Implementations are expected to check their own disk cache before
/// recomputing and to serialize any memory-budget bookkeeping internally;
/// the driver calls `extract` from multiple worker threads but shares no
/// other mutable state across them.
pub trait DescriptorExtractor: Send + Sync {
    /// Extract descriptors for one patch image, in local pixel coordinates.
    fn extract(&self, patch: &Patch) -> std::io::Result<DescriptorSet>;
}

/// Extract descriptor sets for all patches, in patch order.
///
/// `threads` of 0 means one worker per available hardware thread. Any
/// extraction failure aborts the run with the offending patch identified.
pub fn extract_features(
    patches: &[Patch],
    extractor: &dyn DescriptorExtractor,
    threads: usize,
) -> Result<Vec<DescriptorSet>> {
    if patches.is_empty() {
        return Ok(Vec::new());
    }

    let workers = if threads == 0 {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        threads
    }
    .min(patches.len());

    let next = AtomicUsize::new(0);
    let (tx, rx) = crossbeam_channel::unbounded();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || loop {
                let i = next.fetch_add(1, Ordering::SeqCst);
                if i >= patches.len() {
                    break;
                }
                let result = extractor.extract(&patches[i]);
                if tx.send((i, result)).is_err() {
                    break;
                }
            });
        }
    });
    drop(tx);

    let mut sets: Vec<Option<DescriptorSet>> = vec![None; patches.len()];
    for (i, result) in rx {
        match result {
            Ok(set) => {
                log::debug!("patch {}: {} descriptors", patches[i].id, set.len());
                sets[i] = Some(set);
            }
            Err(source) => {
                return Err(AlignError::Extraction {
                    patch_id: patches[i].id,
                    source,
                });
            }
        }
    }

    // every slot was filled exactly once by the pool
    Ok(sets.into_iter().map(|s| s.unwrap_or_default()).collect())
}
