//! Sorting and deduplication of time-keyed rows

use std::collections::BTreeMap;

use crate::TimeKeyed;

/// Sort rows ascending by timestamp, keeping one row per timestamp.
///
/// When several rows share a timestamp the one seen last wins, so callers
/// feed older sources first.
pub fn merge_rows<T, I>(rows: I) -> Vec<T>
where
    T: TimeKeyed,
    I: IntoIterator<Item = T>,
{
    let mut by_time = BTreeMap::new();
    for row in rows {
        by_time.insert(row.timestamp(), row);
    }
    by_time.into_values().collect()
}
