//! Version selection over one entity's history
//!
//! A history is the ordered (by `valid_from`) list of every version ever
//! created for an id. These helpers are shared by the store, the query
//! engine and the validator.

use super::Entity;
use crate::types::Timestamp;

/// The open version, if any. When (invalid) data holds several, the latest is
/// returned.
pub fn current<E: Entity>(history: &[E]) -> Option<&E> {
    history.iter().rev().find(|v| v.is_current())
}

/// Index of the open version, if any
pub fn current_index<E: Entity>(history: &[E]) -> Option<usize> {
    history.iter().rposition(|v| v.is_current())
}

/// The version active at `t`
pub fn active_at<E: Entity>(history: &[E], t: Timestamp) -> Option<&E> {
    history.iter().rev().find(|v| v.is_active_at(t))
}

/// The latest version whose window overlaps `[start, end)`
pub fn overlapping<E: Entity>(
    history: &[E],
    start: Timestamp,
    end: Timestamp,
    now: Timestamp,
) -> Option<&E> {
    history.iter().rev().find(|v| v.overlaps(start, end, now))
}

/// Number of open versions
pub fn count_current<E: Entity>(history: &[E]) -> usize {
    history.iter().filter(|v| v.is_current()).count()
}

/// Sort versions by `valid_from`, keeping insertion order for ties
pub fn sort<E: Entity>(history: &mut [E]) {
    history.sort_by_key(|v| v.valid_from());
}
