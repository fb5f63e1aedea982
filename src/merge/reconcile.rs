//! Folding the scalar aggregates of a merged group into its destination.

use sea_orm::prelude::DateTimeWithTimeZone;

use crate::models::group;

/// Aggregates the destination group should hold after absorbing the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub first_seen: DateTimeWithTimeZone,
    pub last_seen: DateTimeWithTimeZone,
    pub times_seen: i32,
    pub num_comments: i32,
    /// Counters that would have overflowed and kept their prior value.
    pub overflowed: Vec<&'static str>,
}

/// Earliest first_seen, latest last_seen, summed counters.
///
/// A sum that does not fit leaves that counter at the destination's value.
pub fn reconcile(source: &group::Model, destination: &group::Model) -> Reconciliation {
    let mut overflowed = Vec::new();

    let times_seen = checked_sum(destination.times_seen, source.times_seen).unwrap_or_else(|| {
        overflowed.push("times_seen");
        destination.times_seen
    });
    let num_comments =
        checked_sum(destination.num_comments, source.num_comments).unwrap_or_else(|| {
            overflowed.push("num_comments");
            destination.num_comments
        });

    Reconciliation {
        first_seen: source.first_seen.min(destination.first_seen),
        last_seen: source.last_seen.max(destination.last_seen),
        times_seen,
        num_comments,
        overflowed,
    }
}

/// Sum that rejects results outside the counter column's range.
pub fn checked_sum(prior: i32, addend: i32) -> Option<i32> {
    prior.checked_add(addend).filter(|total| *total >= 0)
}
