//! First-expire-first-out batch selection.

use ledger_store::Batch;

/// Picks the batch an OUT of `requested` units should draw from.
///
/// Only batches that can cover the whole request are candidates; the request
/// is never split across lots. Among candidates the earliest expiry wins,
/// undated lots come after every dated one, and ties go to the oldest lot
/// (see [`Batch::fefo_cmp`]). Returns `None` when no single batch suffices,
/// even if the combined quantity would.
pub fn select_batch(batches: &[Batch], requested: i64) -> Option<&Batch> {
    batches
        .iter()
        .filter(|b| b.quantity > 0 && b.quantity >= requested)
        .min_by(|a, b| a.fefo_cmp(b))
}
