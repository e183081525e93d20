use linfa::Float;
use ndarray::{s, Array2, ArrayBase, ArrayView2, ArrayViewMut2, Axis, Data, Ix2};
use ndarray_rand::{rand_distr::Uniform, RandomExt};
use rand::Rng;

use crate::error::{Result, VdaError};
use crate::projection::L0Projection;

/// Vertices of a regular simplex with `c` unit-norm vertices in `c - 1` dimensions
///
/// Row `j` of the returned `(c, c - 1)` matrix is the vertex encoding class `j`. For two
/// classes the vertices are `1` and `-1`. Every pair of vertices has the same distance.
///
/// Returns [`NotEnoughClasses`](VdaError::NotEnoughClasses) for `c < 2`.
pub fn simplex_vertices<F: Float>(c: usize) -> Result<Array2<F>> {
    if c < 2 {
        return Err(VdaError::NotEnoughClasses(c));
    }

    let cf = F::cast(c);
    let d = cf - F::one();
    let mut vertices = Array2::zeros((c, c - 1));

    vertices.row_mut(0).fill(F::one() / d.sqrt());
    let shift = -(F::one() + cf.sqrt()) / d.powf(F::cast(1.5));
    let scale = (cf / d).sqrt();
    for j in 1..c {
        let mut row = vertices.row_mut(j);
        row.fill(shift);
        row[j - 1] += scale;
    }

    Ok(vertices)
}

/// State of a sparse vertex discriminant problem
///
/// The problem owns the design matrix (with a trailing column of ones when an intercept is
/// modelled), the encoded responses, three coefficient arrays of shape `(p [+ 1], c - 1)` and
/// the residual and gradient buffers. The intercept row is the last row and is never subject
/// to the sparsity projection.
///
/// The solver mutates the problem in place, the current and projected coefficients are its
/// output. Buffers are rewritten on every evaluation and hold no state across fits.
#[derive(Debug, Clone)]
pub struct VdaProblem<F: Float> {
    pub(crate) x: Array2<F>,
    pub(crate) y: Array2<F>,
    pub(crate) intercept: bool,

    pub(crate) coeff: Array2<F>,
    pub(crate) coeff_prev: Array2<F>,
    pub(crate) proj: Array2<F>,

    pub(crate) res_main: Array2<F>,
    pub(crate) res_weighted: Array2<F>,
    pub(crate) res_dist: Array2<F>,
    pub(crate) grad: Array2<F>,

    projection: L0Projection<F>,
}

impl<F: Float> VdaProblem<F> {
    /// Set up a problem for the records `x` with shape `(n_samples, n_features)` and encoded
    /// responses `y` with shape `(n_samples, n_dims)`
    ///
    /// All coefficient arrays start at zero.
    pub fn new<D: Data<Elem = F>>(
        x: &ArrayBase<D, Ix2>,
        y: Array2<F>,
        intercept: bool,
    ) -> Result<Self> {
        let (n, p) = x.dim();
        if n != y.nrows() {
            return Err(VdaError::MismatchedShapes(n, y.nrows()));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(VdaError::InvalidValues);
        }

        let ncoeff = p + intercept as usize;
        let mut design = Array2::ones((n, ncoeff));
        design.slice_mut(s![.., ..p]).assign(x);

        let shape = (ncoeff, y.ncols());
        Ok(VdaProblem {
            x: design,
            intercept,
            coeff: Array2::zeros(shape),
            coeff_prev: Array2::zeros(shape),
            proj: Array2::zeros(shape),
            res_main: Array2::zeros(y.raw_dim()),
            res_weighted: Array2::zeros(y.raw_dim()),
            res_dist: Array2::zeros(shape),
            grad: Array2::zeros(shape),
            projection: L0Projection::new(p),
            y,
        })
    }

    pub fn nsamples(&self) -> usize {
        self.x.nrows()
    }

    /// Number of coefficient rows subject to sparsity, i.e. without the intercept
    pub fn npredictors(&self) -> usize {
        self.x.ncols() - self.intercept as usize
    }

    /// Number of response dimensions
    pub fn ndims(&self) -> usize {
        self.y.ncols()
    }

    pub fn has_intercept(&self) -> bool {
        self.intercept
    }

    /// Design matrix, including the column of ones for the intercept
    pub fn design(&self) -> ArrayView2<'_, F> {
        self.x.view()
    }

    pub fn responses(&self) -> ArrayView2<'_, F> {
        self.y.view()
    }

    pub fn coefficients(&self) -> ArrayView2<'_, F> {
        self.coeff.view()
    }

    pub fn coefficients_mut(&mut self) -> ArrayViewMut2<'_, F> {
        self.coeff.view_mut()
    }

    /// Projected (feasible) coefficients from the latest projection
    pub fn projected(&self) -> ArrayView2<'_, F> {
        self.proj.view()
    }

    /// Gradient from the latest evaluation of the objective
    pub fn gradient(&self) -> ArrayView2<'_, F> {
        self.grad.view()
    }

    /// Convert a sparsity fraction `s` into the number of predictors kept nonzero,
    /// `round((1 - s) * p)`
    pub fn sparsity_to_k(&self, sparsity: F) -> usize {
        let p = F::cast(self.npredictors());
        ((F::one() - sparsity) * p)
            .round()
            .max(F::zero())
            .to_usize()
            .unwrap_or(0)
    }

    /// Copy the coefficients into the projected coefficients and project their predictor rows
    /// onto the set with `k` nonzero predictors
    ///
    /// A single response dimension is projected elementwise, otherwise complete rows are kept or
    /// dropped.
    pub fn project<R: Rng>(&mut self, k: usize, rng: &mut R) -> Result<()> {
        self.proj.assign(&self.coeff);

        let p = self.npredictors();
        let mut predictors = self.proj.slice_mut(s![..p, ..]);
        if predictors.ncols() == 1 {
            self.projection
                .project(&mut predictors.column_mut(0), k, rng);
            Ok(())
        } else {
            self.projection
                .project_groups(&mut predictors, k, Axis(0), rng)
        }
    }

    /// Set the projected coefficients to zero, except for the intercept which follows the
    /// current coefficients
    ///
    /// With this reference point the distance penalty becomes a ridge penalty.
    pub fn shrink(&mut self) {
        let p = self.npredictors();
        self.proj.fill(F::zero());
        if self.intercept {
            self.proj.row_mut(p).assign(&self.coeff.row(p));
        }
    }

    /// Fill the coefficients with uniform noise in `[-1, 1)` and forget the previous iterate
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        self.coeff = Array2::random_using(
            self.coeff.raw_dim(),
            Uniform::new(-F::one(), F::one()),
            rng,
        );
        self.coeff_prev.assign(&self.coeff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn simplex_two_classes() {
        let v = simplex_vertices::<f64>(2).unwrap();
        assert_abs_diff_eq!(v, array![[1.], [-1.]], epsilon = 1e-12);
    }

    #[test]
    fn simplex_is_regular() {
        for c in 2..7 {
            let v = simplex_vertices::<f64>(c).unwrap();
            assert_eq!(v.dim(), (c, c - 1));

            let gram = v.dot(&v.t());
            let off = -1. / (c as f64 - 1.);
            for i in 0..c {
                for j in 0..c {
                    let expected = if i == j { 1. } else { off };
                    assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn simplex_needs_two_classes() {
        assert!(matches!(
            simplex_vertices::<f64>(1),
            Err(VdaError::NotEnoughClasses(1))
        ));
    }

    #[test]
    fn problem_shapes() {
        let x = Array2::<f64>::zeros((5, 3));
        let y = Array2::zeros((5, 2));
        let problem = VdaProblem::new(&x, y.clone(), true).unwrap();

        assert_eq!(problem.design().dim(), (5, 4));
        assert_eq!(problem.coefficients().dim(), (4, 2));
        assert_eq!(problem.projected().dim(), (4, 2));
        assert_eq!(problem.npredictors(), 3);
        assert!(problem.design().column(3).iter().all(|v| *v == 1.));

        let problem = VdaProblem::new(&x, y, false).unwrap();
        assert_eq!(problem.coefficients().dim(), (3, 2));
    }

    #[test]
    fn problem_rejects_bad_input() {
        let x = Array2::<f64>::zeros((5, 3));
        assert!(matches!(
            VdaProblem::new(&x, Array2::zeros((4, 1)), true),
            Err(VdaError::MismatchedShapes(5, 4))
        ));

        let mut x = x;
        x[[1, 1]] = f64::NAN;
        assert!(matches!(
            VdaProblem::new(&x, Array2::zeros((5, 1)), true),
            Err(VdaError::InvalidValues)
        ));
    }

    #[test]
    fn sparsity_rounding() {
        let x = Array2::<f64>::zeros((2, 20));
        let problem = VdaProblem::new(&x, Array2::zeros((2, 1)), true).unwrap();

        assert_eq!(problem.sparsity_to_k(0.), 20);
        assert_eq!(problem.sparsity_to_k(0.8), 4);
        assert_eq!(problem.sparsity_to_k(0.99), 0);
        assert_eq!(problem.sparsity_to_k(1.), 0);
    }

    #[test]
    fn projection_skips_intercept() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array2::<f64>::zeros((2, 3));
        let mut problem = VdaProblem::new(&x, Array2::zeros((2, 2)), true).unwrap();
        problem
            .coefficients_mut()
            .assign(&array![[1., 1.], [0.1, 0.], [-3., 2.], [0.01, 0.01]]);
        problem.project(1, &mut rng).unwrap();

        assert_eq!(
            problem.projected(),
            array![[0., 0.], [0., 0.], [-3., 2.], [0.01, 0.01]]
        );

        problem.shrink();
        assert_eq!(
            problem.projected(),
            array![[0., 0.], [0., 0.], [0., 0.], [0.01, 0.01]]
        );
    }
}
