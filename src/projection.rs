//! Projection onto the L0 ball
//!
//! The L0 ball of radius `k` is the set of vectors (or matrices with groups of entries) with at
//! most `k` nonzero elements (or groups). Projecting onto it keeps the `k` entries of largest
//! magnitude. Entries tied with the pivot magnitude are broken uniformly at random, so the
//! result is a nearest feasible point without any bias from the iteration order.
use linfa::Float;
use ndarray::{Array1, ArrayBase, Axis, DataMut, Ix1, Ix2, Zip};
use rand::{seq::SliceRandom, Rng};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, VdaError};
use crate::pivot::pivot;

/// Reusable buffers for the projection onto the L0 ball
///
/// The buffers are allocated once for a problem dimension `n` and mutated in place by every
/// projection of at most `n` entries or groups. A projector must not be shared between
/// concurrently running fits.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct L0Projection<F> {
    idx: Vec<usize>,
    scores: Array1<F>,
    sample: Vec<usize>,
}

impl<F: Float> L0Projection<F> {
    /// Allocate buffers for projections of up to `n` entries or groups
    pub fn new(n: usize) -> Self {
        L0Projection {
            idx: vec![0; n],
            scores: Array1::zeros(n),
            sample: Vec::with_capacity(n),
        }
    }

    /// Largest number of entries or groups this projector can handle
    pub fn capacity(&self) -> usize {
        self.idx.len()
    }

    /// Project `x` in place onto the set of vectors with at most `k` nonzero entries
    ///
    /// A vector is left untouched for `k >= x.len()` and zeroed for `k == 0`. Otherwise every
    /// entry with a magnitude below the `k`-th largest magnitude is set to zero. When more than
    /// `k` nonzero entries share the boundary magnitude, a uniform random subset of the tied
    /// entries is dropped so that exactly `k` survive. NaN entries are always set to zero.
    pub fn project<R: Rng, D: DataMut<Elem = F>>(
        &mut self,
        x: &mut ArrayBase<D, Ix1>,
        k: usize,
        rng: &mut R,
    ) {
        let n = x.len();
        assert!(
            n <= self.capacity(),
            "projection buffers hold {} entries, but {} are required",
            self.capacity(),
            n
        );

        if k >= n {
            return;
        }
        if k == 0 {
            x.fill(F::zero());
            return;
        }

        let threshold = pivot(x, &mut self.idx, k).abs();
        x.mapv_inplace(|v| {
            if v.is_nan() || v.abs() < threshold {
                F::zero()
            } else {
                v
            }
        });

        let dropped = select_ties(&mut self.sample, n, k, threshold, |i| x[i].abs(), rng);
        for &i in dropped {
            x[i] = F::zero();
        }
    }

    /// Project `x` in place onto the set of matrices with at most `k` nonzero groups
    ///
    /// Groups are the rows (`Axis(0)`) or columns (`Axis(1)`) of `x`, scored by their
    /// Euclidean norm. Dropping a group zeroes the complete row or column, kept groups are
    /// left unchanged. Ties are resolved in the same way as in [`project`](Self::project).
    ///
    /// Returns [`InvalidAxis`](VdaError::InvalidAxis) for any other axis.
    pub fn project_groups<R: Rng, D: DataMut<Elem = F>>(
        &mut self,
        x: &mut ArrayBase<D, Ix2>,
        k: usize,
        axis: Axis,
        rng: &mut R,
    ) -> Result<()> {
        if axis.index() > 1 {
            return Err(VdaError::InvalidAxis(axis.index()));
        }

        let n = x.len_of(axis);
        assert!(
            n <= self.capacity(),
            "projection buffers hold {} groups, but {} are required",
            self.capacity(),
            n
        );

        if k >= n {
            return Ok(());
        }
        if k == 0 {
            x.fill(F::zero());
            return Ok(());
        }

        let mut scores = self.scores.slice_mut(ndarray::s![..n]);
        Zip::from(&mut scores)
            .and(x.lanes(Axis(1 - axis.index())))
            .for_each(|score, lane| *score = lane.dot(&lane).sqrt());

        let threshold = pivot(&scores, &mut self.idx, k);
        for (mut lane, score) in x.axis_iter_mut(axis).zip(scores.iter()) {
            if score.is_nan() || *score < threshold {
                lane.fill(F::zero());
            }
        }

        let dropped = select_ties(&mut self.sample, n, k, threshold, |i| scores[i], rng);
        for &i in dropped {
            x.index_axis_mut(axis, i).fill(F::zero());
        }

        Ok(())
    }
}

/// Collect the nonzero entries tied with `threshold` into `sample` and return a uniform random
/// selection of them, as many as there are survivors beyond `k`.
fn select_ties<'a, F: Float, R: Rng>(
    sample: &'a mut Vec<usize>,
    n: usize,
    k: usize,
    threshold: F,
    magnitude: impl Fn(usize) -> F,
    rng: &mut R,
) -> &'a [usize] {
    sample.clear();
    let mut survivors = 0usize;
    for i in 0..n {
        let m = magnitude(i);
        if m > F::zero() && m >= threshold {
            survivors += 1;
            if m == threshold {
                sample.push(i);
            }
        }
    }

    let excess = survivors.saturating_sub(k);
    if excess == 0 {
        return &[];
    }
    let (chosen, _) = sample.partial_shuffle(rng, excess);
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use ndarray_rand::{rand_distr::Uniform, RandomExt};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn nnz(x: &Array1<f64>) -> usize {
        x.iter().filter(|v| **v != 0.).count()
    }

    #[test]
    fn keeps_largest_magnitudes() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut proj = L0Projection::new(8);
        let mut x = array![3., -1., 4., -1., 5., -9., 2., -6.];
        proj.project(&mut x, 3, &mut rng);

        assert_eq!(x, array![0., 0., 0., 0., 5., -9., 0., -6.]);
    }

    #[test]
    fn trivial_radius() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut proj = L0Projection::new(4);
        let orig = array![1., -2., 3., 0.5];

        let mut x = orig.clone();
        proj.project(&mut x, 4, &mut rng);
        assert_eq!(x, orig);
        proj.project(&mut x, 10, &mut rng);
        assert_eq!(x, orig);

        proj.project(&mut x, 0, &mut rng);
        assert_eq!(x, Array1::zeros(4));
    }

    #[test]
    fn ties_keep_exactly_k() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut proj = L0Projection::new(4);
        for _ in 0..100 {
            let mut x = array![5., 5., 5., 5.];
            proj.project(&mut x, 2, &mut rng);

            assert_eq!(nnz(&x), 2);
            assert!(x.iter().all(|v| *v == 0. || *v == 5.));
        }
    }

    #[test]
    fn ties_are_dropped_uniformly() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let mut proj = L0Projection::new(5);
        let trials = 4000;
        let mut dropped = [0usize; 5];
        for _ in 0..trials {
            // index 0 is strictly larger, the remaining four tie at the boundary
            let mut x = array![9., -2., 2., 2., -2.];
            proj.project(&mut x, 3, &mut rng);

            assert_abs_diff_eq!(x[0], 9.);
            for (i, v) in x.iter().enumerate() {
                if *v == 0. {
                    dropped[i] += 1;
                }
            }
        }

        assert_eq!(dropped[0], 0);
        // two out of four tied entries are dropped in every trial
        for count in &dropped[1..] {
            let freq = *count as f64 / trials as f64;
            assert!((freq - 0.5).abs() < 0.05, "frequency {}", freq);
        }
    }

    #[test]
    fn feasible_and_idempotent() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let mut proj = L0Projection::new(30);
        for k in 0..30 {
            let mut x = Array1::random_using(30, Uniform::new(-1., 1.), &mut rng);
            // force a few exact zeros and ties
            x[0] = 0.;
            x[1] = 0.25;
            x[2] = -0.25;
            let orig = x.clone();
            let orig_nnz = nnz(&orig);

            proj.project(&mut x, k, &mut rng);
            assert_eq!(nnz(&x), k.min(orig_nnz));

            let kept_min = x
                .iter()
                .filter(|v| **v != 0.)
                .fold(f64::INFINITY, |acc, v| acc.min(v.abs()));
            let dropped_max = orig
                .iter()
                .zip(x.iter())
                .filter(|(_, v)| **v == 0.)
                .fold(0f64, |acc, (o, _)| acc.max(o.abs()));
            assert!(kept_min >= dropped_max);

            let once = x.clone();
            proj.project(&mut x, k, &mut rng);
            assert_eq!(x, once);
        }
    }

    #[test]
    fn nan_entries_are_dropped() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut proj = L0Projection::new(40);
        for nans in [3, 20, 38].iter() {
            let mut x = Array1::random_using(40, Uniform::new(-1., 1.), &mut rng);
            for i in 0..*nans {
                x[(7 * i) % 40] = f64::NAN;
            }
            let finite = x.iter().filter(|v| !v.is_nan()).count();

            proj.project(&mut x, 5, &mut rng);
            assert!(x.iter().all(|v| !v.is_nan()));
            assert_eq!(nnz(&x), finite.min(5));
        }
    }

    #[test]
    fn nan_groups_are_dropped() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut proj = L0Projection::new(4);
        let mut x = array![[1., f64::NAN], [3., 0.], [f64::NAN, 0.], [-2., 2.]];
        proj.project_groups(&mut x, 2, Axis(0), &mut rng).unwrap();

        assert_eq!(x, array![[0., 0.], [3., 0.], [0., 0.], [-2., 2.]]);
    }

    #[test]
    fn fewer_nonzeros_than_radius() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut proj = L0Projection::new(6);
        let mut x = array![0., 1., 0., 0., -3., 0.];
        proj.project(&mut x, 4, &mut rng);

        assert_eq!(x, array![0., 1., 0., 0., -3., 0.]);
    }

    #[test]
    fn groups_by_row() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut proj = L0Projection::new(4);
        let mut x = array![[1., 1.], [3., 0.], [0., -0.5], [-2., 2.]];
        proj.project_groups(&mut x, 2, Axis(0), &mut rng).unwrap();

        assert_eq!(x, array![[0., 0.], [3., 0.], [0., 0.], [-2., 2.]]);
    }

    #[test]
    fn groups_by_column() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut proj = L0Projection::new(3);
        let mut x = array![[1., 0., 4.], [1., 2., 0.]];
        proj.project_groups(&mut x, 1, Axis(1), &mut rng).unwrap();

        assert_eq!(x, array![[0., 0., 4.], [0., 0., 0.]]);
    }

    #[test]
    fn grouped_rows_unchanged_or_zero() {
        let mut rng = Xoshiro256Plus::seed_from_u64(11);
        let mut proj = L0Projection::new(20);
        let orig: Array2<f64> = Array2::random_using((20, 3), Uniform::new(-1., 1.), &mut rng);
        for k in 0..=20 {
            let mut x = orig.clone();
            proj.project_groups(&mut x, k, Axis(0), &mut rng).unwrap();

            let mut kept = 0;
            for (row, orig_row) in x.rows().into_iter().zip(orig.rows()) {
                if row.iter().all(|v| *v == 0.) {
                    continue;
                }
                assert_eq!(row, orig_row);
                kept += 1;
            }
            assert_eq!(kept, k);
        }
    }

    #[test]
    fn grouped_ties() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut proj = L0Projection::new(3);
        for _ in 0..50 {
            let mut x = array![[3., 4.], [0., 5.], [-5., 0.]];
            proj.project_groups(&mut x, 2, Axis(0), &mut rng).unwrap();

            let zero_rows = x
                .rows()
                .into_iter()
                .filter(|r| r.iter().all(|v| *v == 0.))
                .count();
            assert_eq!(zero_rows, 1);
        }
    }

    #[test]
    fn invalid_axis() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut proj = L0Projection::<f64>::new(2);
        let mut x = Array2::zeros((2, 2));

        assert!(matches!(
            proj.project_groups(&mut x, 1, Axis(2), &mut rng),
            Err(VdaError::InvalidAxis(2))
        ));
    }
}
