//! Set operations on sorted time axes used by the cascade correlator.

/// Which index of a run of equal values is reported by [`unique_with_index`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DedupIndex {
    First,
    Last,
}

impl Default for DedupIndex {
    fn default() -> Self {
        DedupIndex::First
    }
}

/// Unique values of a non-decreasing slice together with one index per value.
///
/// With `DedupIndex::First` the index is the first position the value occurs
/// at, with `DedupIndex::Last` the last one.
pub fn unique_with_index(values: &[i64], tie_break: DedupIndex) -> (Vec<i64>, Vec<usize>) {
    let mut unique = Vec::with_capacity(values.len());
    let mut index = Vec::with_capacity(values.len());

    for (i, &v) in values.iter().enumerate() {
        match unique.last() {
            Some(&last) if last == v => {
                if tie_break == DedupIndex::Last {
                    if let Some(idx) = index.last_mut() {
                        *idx = i;
                    }
                }
            }
            _ => {
                unique.push(v);
                index.push(i);
            }
        }
    }
    (unique, index)
}

/// Matches the values of `y` with the values of `y + shift`.
///
/// `y` must be strictly increasing. Returns the pairs `(i1, i2)` such that
/// `y[i1] == y[i2] + shift`, ordered by `i1`. This is a plain two pointer
/// merge so it runs in `O(len(y))`.
pub fn intersect_shifted(y: &[i64], shift: i64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let (mut i1, mut i2) = (0, 0);

    while i1 < y.len() && i2 < y.len() {
        let a = y[i1];
        let b = y[i2] + shift;
        if a < b {
            i1 += 1;
        } else if a > b {
            i2 += 1;
        } else {
            pairs.push((i1, i2));
            i1 += 1;
            i2 += 1;
        }
    }
    pairs
}
