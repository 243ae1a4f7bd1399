//! Checkpoint retention selection.

use std::collections::BTreeSet;

/// Pick the checkpoints to delete so that at most `max_checkpoints` remain.
///
/// `ids_newest_first` must be sorted most recent first. Protected ids are never
/// selected, even when that leaves more than `max_checkpoints` in place.
pub fn select_for_pruning<'a>(
    ids_newest_first: &'a [String],
    max_checkpoints: usize,
    protected: &BTreeSet<String>,
) -> Vec<&'a str> {
    ids_newest_first
        .iter()
        .skip(max_checkpoints)
        .filter(|id| !protected.contains(*id))
        .map(String::as_str)
        .collect()
}
