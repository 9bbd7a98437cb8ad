// 🔍 Deduplication - collapse repeated submissions to the most recent one
//
// The form can be submitted many times for the same (branch, pub) pair;
// only the latest submission describes the location as it is today.

use std::collections::BTreeMap;

/// Keep one row per key: the one with the greatest timestamp.
///
/// Equal timestamps resolve to the row that comes later in input order.
/// Output is ordered by key, so the result does not depend on hash order.
pub fn latest_per_key<T, K, S>(
    rows: impl IntoIterator<Item = T>,
    key_of: impl Fn(&T) -> K,
    timestamp_of: impl Fn(&T) -> S,
) -> Vec<T>
where
    K: Ord,
    S: PartialOrd,
{
    let mut latest: BTreeMap<K, T> = BTreeMap::new();

    for row in rows {
        let key = key_of(&row);
        match latest.get_mut(&key) {
            Some(current) => {
                if timestamp_of(&row) >= timestamp_of(current) {
                    *current = row;
                }
            }
            None => {
                latest.insert(key, row);
            }
        }
    }

    latest.into_values().collect()
}

/// Number of rows that `latest_per_key` would discard
pub fn superseded_count(input_rows: usize, kept_rows: usize) -> usize {
    input_rows.saturating_sub(kept_rows)
}
