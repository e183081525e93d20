//! Magnitude-ranked selection without sorting
use std::cmp::Ordering;

use linfa::Float;
use ndarray::{ArrayBase, Data, Ix1};

/// Find the value of rank `k` when `values` are ranked by descending magnitude
///
/// This returns the element which would sit at position `k` (1-indexed) after sorting `values`
/// by decreasing absolute value. The element keeps its sign. Only the index buffer `idx` is
/// reordered, the values are left untouched. NaN entries rank below all other values.
///
/// The selection is done with `select_nth_unstable_by`, which is linear on average. When the
/// pivot is closer to the bottom of the ranking, the search runs from the small magnitudes
/// upwards and looks for rank `n - k + 1` instead.
///
/// # Panics
///
/// If `k` is not in `1..=n` or `idx` is shorter than `values`.
pub fn pivot<F: Float, D: Data<Elem = F>>(
    values: &ArrayBase<D, Ix1>,
    idx: &mut [usize],
    k: usize,
) -> F {
    let n = values.len();
    assert!(
        (1..=n).contains(&k),
        "rank {} is outside of the range 1..={}",
        k,
        n
    );
    assert!(idx.len() >= n, "index buffer is too small");

    let idx = &mut idx[..n];
    for (i, slot) in idx.iter_mut().enumerate() {
        *slot = i;
    }

    let by_magnitude = |a: &usize, b: &usize| magnitude_cmp(values[*a], values[*b]);
    let pos = if k < n - k + 1 {
        idx.select_nth_unstable_by(k - 1, |a, b| by_magnitude(b, a));
        k - 1
    } else {
        idx.select_nth_unstable_by(n - k, by_magnitude);
        n - k
    };

    values[idx[pos]]
}

/// Compare by absolute value, NaN ranks below every other magnitude
fn magnitude_cmp<F: Float>(a: F, b: F) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.abs().partial_cmp(&b.abs()).unwrap_or(Ordering::Equal),
    }
}
