//! Numerical backends for the majorization-minimization step
//!
//! Every backend decreases the surrogate
//! ```ignore
//! a^2/2 |Y_shifted - X B|^2 + rho/2 |B - P|^2
//! ```
//! where the shifted responses move every sample by its deadzone and `P` is the latest
//! projection of the coefficients. Both terms majorize the corresponding terms of the
//! objective at the current coefficients, so a step decreasing the surrogate decreases the
//! objective as well.
use linfa::Float;
use linfa_linalg::{
    cholesky::Cholesky,
    triangular::{SolveTriangularInplace, UPLO},
};
use ndarray::{linalg::general_mat_mul, Array2};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, VdaError};
use crate::objective::evaluate_objective;
use crate::problem::VdaProblem;

/// Interface of a backend driven by the annealing solver
///
/// The solver calls [`update`](Backend::update) once per inner iteration. The hooks are fired
/// whenever the penalty or the sparsity level changes and let a backend refresh cached
/// factorizations.
pub trait Backend<F: Float> {
    /// Perform a single surrogate minimizing update of the coefficients in place
    fn update(&mut self, problem: &mut VdaProblem<F>, epsilon: F, rho: F, k: usize)
        -> Result<()>;

    fn on_sparsity_change(&mut self, _problem: &VdaProblem<F>, _k: usize) -> Result<()> {
        Ok(())
    }

    fn on_penalty_change(&mut self, _problem: &VdaProblem<F>, _rho: F) -> Result<()> {
        Ok(())
    }
}

/// Available backends
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Steepest descent with an exact line search on the surrogate
    SteepestDescent,
    /// Exact minimization of the surrogate with a cached Cholesky factorization
    Cholesky,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Cholesky
    }
}

impl Algorithm {
    /// Allocate the state of the selected backend for `problem`
    pub fn init<F: Float>(&self, problem: &VdaProblem<F>) -> AlgorithmState<F> {
        match self {
            Algorithm::SteepestDescent => {
                AlgorithmState::SteepestDescent(SteepestDescent::new(problem))
            }
            Algorithm::Cholesky => AlgorithmState::Cholesky(CholeskyMM::new(problem)),
        }
    }
}

/// State of one of the backends in [`Algorithm`]
#[derive(Debug, Clone)]
pub enum AlgorithmState<F: Float> {
    SteepestDescent(SteepestDescent<F>),
    Cholesky(CholeskyMM<F>),
}

impl<F: Float> Backend<F> for AlgorithmState<F> {
    fn update(
        &mut self,
        problem: &mut VdaProblem<F>,
        epsilon: F,
        rho: F,
        k: usize,
    ) -> Result<()> {
        match self {
            AlgorithmState::SteepestDescent(b) => b.update(problem, epsilon, rho, k),
            AlgorithmState::Cholesky(b) => b.update(problem, epsilon, rho, k),
        }
    }

    fn on_sparsity_change(&mut self, problem: &VdaProblem<F>, k: usize) -> Result<()> {
        match self {
            AlgorithmState::SteepestDescent(b) => b.on_sparsity_change(problem, k),
            AlgorithmState::Cholesky(b) => b.on_sparsity_change(problem, k),
        }
    }

    fn on_penalty_change(&mut self, problem: &VdaProblem<F>, rho: F) -> Result<()> {
        match self {
            AlgorithmState::SteepestDescent(b) => b.on_penalty_change(problem, rho),
            AlgorithmState::Cholesky(b) => b.on_penalty_change(problem, rho),
        }
    }
}

/// Steepest descent on the surrogate
///
/// Moves along the negative gradient `G` with the step length minimizing the quadratic
/// surrogate exactly, `|G|^2 / (a^2 |X G|^2 + rho |G|^2)`.
#[derive(Debug, Clone)]
pub struct SteepestDescent<F> {
    xg: Array2<F>,
}

impl<F: Float> SteepestDescent<F> {
    pub fn new(problem: &VdaProblem<F>) -> Self {
        SteepestDescent {
            xg: Array2::zeros(problem.y.raw_dim()),
        }
    }
}

impl<F: Float> Backend<F> for SteepestDescent<F> {
    fn update(
        &mut self,
        problem: &mut VdaProblem<F>,
        epsilon: F,
        rho: F,
        _k: usize,
    ) -> Result<()> {
        let res = evaluate_objective(problem, epsilon, rho);
        if res.gradient <= F::zero() {
            return Ok(());
        }

        general_mat_mul(F::one(), &problem.x, &problem.grad, F::zero(), &mut self.xg);
        let a2 = F::one() / F::cast(problem.nsamples());
        let curvature = a2 * self.xg.iter().fold(F::zero(), |acc, v| acc + *v * *v)
            + rho * res.gradient;
        let step = res.gradient / curvature;

        problem.coeff.scaled_add(-step, &problem.grad);
        Ok(())
    }
}

/// Exact surrogate minimization
///
/// The minimizer of the surrogate is `B - H^-1 G` with `H = a^2 X^t X + rho I`. The Gram
/// matrix is computed once, the Cholesky factor of `H` whenever the penalty changes.
#[derive(Debug, Clone)]
pub struct CholeskyMM<F> {
    gram: Array2<F>,
    factor: Option<(F, Array2<F>)>,
    step: Array2<F>,
}

impl<F: Float> CholeskyMM<F> {
    pub fn new(problem: &VdaProblem<F>) -> Self {
        let a2 = F::one() / F::cast(problem.nsamples());
        let gram = problem.x.t().dot(&problem.x) * a2;

        CholeskyMM {
            gram,
            factor: None,
            step: Array2::zeros(problem.coeff.raw_dim()),
        }
    }

    /// Penalty of the cached factorization
    pub fn penalty(&self) -> Option<F> {
        self.factor.as_ref().map(|(rho, _)| *rho)
    }

    fn factorize(&mut self, rho: F) -> Result<()> {
        let mut h = self.gram.clone();
        h.diag_mut().mapv_inplace(|v| v + rho);
        let lower = h.cholesky()?;

        tracing::debug!("refactorized surrogate hessian for rho = {}", rho);
        self.factor = Some((rho, lower));
        Ok(())
    }
}

impl<F: Float> Backend<F> for CholeskyMM<F> {
    fn update(
        &mut self,
        problem: &mut VdaProblem<F>,
        epsilon: F,
        rho: F,
        _k: usize,
    ) -> Result<()> {
        match self.penalty() {
            None => return Err(VdaError::UninitializedBackend),
            Some(cached) if cached != rho => self.factorize(rho)?,
            _ => {}
        }
        let lower = match &self.factor {
            Some((_, lower)) => lower,
            None => return Err(VdaError::UninitializedBackend),
        };

        evaluate_objective(problem, epsilon, rho);
        self.step.assign(&problem.grad);
        lower.solve_triangular_inplace(&mut self.step, UPLO::Lower)?;
        lower.t().solve_triangular_inplace(&mut self.step, UPLO::Upper)?;

        problem.coeff -= &self.step;
        Ok(())
    }

    fn on_penalty_change(&mut self, _problem: &VdaProblem<F>, rho: F) -> Result<()> {
        if self.penalty() != Some(rho) {
            self.factorize(rho)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::evaluate_objective;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use ndarray_rand::{rand_distr::Uniform, RandomExt};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn random_problem(rng: &mut Xoshiro256Plus) -> VdaProblem<f64> {
        let x: Array2<f64> = Array2::random_using((30, 5), Uniform::new(-1., 1.), rng);
        let y: Array2<f64> = Array2::random_using((30, 2), Uniform::new(-1., 1.), rng);
        let mut problem = VdaProblem::new(&x, y, true).unwrap();
        problem.randomize(rng);
        problem.project(2, rng).unwrap();
        problem
    }

    fn assert_descent<B: Backend<f64>>(backend: &mut B, problem: &mut VdaProblem<f64>) {
        let (epsilon, rho) = (0.2, 1.5);
        let before = evaluate_objective(problem, epsilon, rho).objective;
        backend.update(problem, epsilon, rho, 2).unwrap();
        let after = evaluate_objective(problem, epsilon, rho).objective;
        assert!(after < before, "{} >= {}", after, before);
    }

    #[test]
    fn steepest_descent_decreases_objective() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut problem = random_problem(&mut rng);
        let mut backend = Algorithm::SteepestDescent.init(&problem);
        assert_descent(&mut backend, &mut problem);
    }

    #[test]
    fn cholesky_decreases_objective() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut problem = random_problem(&mut rng);
        let mut backend = Algorithm::Cholesky.init(&problem);
        backend.on_penalty_change(&problem, 1.5).unwrap();
        assert_descent(&mut backend, &mut problem);
    }

    #[test]
    fn cholesky_requires_factorization() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut problem = random_problem(&mut rng);
        let mut backend = CholeskyMM::new(&problem);

        assert!(matches!(
            backend.update(&mut problem, 0.1, 1., 2),
            Err(VdaError::UninitializedBackend)
        ));

        backend.on_penalty_change(&problem, 1.).unwrap();
        assert_eq!(backend.penalty(), Some(1.));
        backend.update(&mut problem, 0.1, 2., 2).unwrap();
        assert_eq!(backend.penalty(), Some(2.));
    }

    #[test]
    fn cholesky_solves_ridge_exactly() {
        // without deadzone and with a zero reference point the surrogate is the ridge objective
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut problem = random_problem(&mut rng);
        let lambda = 0.7;
        let mut backend = CholeskyMM::new(&problem);
        backend.on_penalty_change(&problem, lambda).unwrap();

        problem.proj.fill(0.);
        backend.update(&mut problem, 0., lambda, 2).unwrap();
        let res = evaluate_objective(&mut problem, 0., lambda);

        assert_abs_diff_eq!(res.gradient, 0., epsilon = 1e-12);
    }
}
