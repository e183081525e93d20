//! Proximal distance annealing
//!
//! The sparsity constraint is relaxed into the penalty `rho/2 dist(B, S_k)^2` where `S_k` is
//! the set of coefficients with at most `k` nonzero predictors. [`anneal`] minimizes the
//! relaxed objective for a fixed `rho` with accelerated MM steps, [`fit`] increases `rho`
//! round after round until the coefficients are (close to) feasible. [`init_regularized`]
//! computes a ridge solution to start the annealing from.
use linfa::Float;
use rand::Rng;

use crate::backend::Backend;
use crate::error::{Result, VdaError};
use crate::hyperparams::SolverOptions;
use crate::momentum::Nesterov;
use crate::objective::{evaluate_objective, IterationResult, SubproblemResult};
use crate::problem::VdaProblem;

/// Observer of the solver progress
///
/// Both methods default to doing nothing. Callbacks only observe the problem, the solver
/// never reads anything back from them.
pub trait Callback<F: Float> {
    /// Called after every inner iteration
    fn inner(
        &mut self,
        _iteration: usize,
        _problem: &VdaProblem<F>,
        _epsilon: F,
        _rho: F,
        _k: usize,
        _result: &IterationResult<F>,
    ) {
    }

    /// Called after every annealing round
    fn outer(
        &mut self,
        _round: usize,
        _problem: &VdaProblem<F>,
        _epsilon: F,
        _rho: F,
        _k: usize,
        _result: &SubproblemResult<F>,
    ) {
    }
}

impl<F: Float> Callback<F> for () {}

/// Minimize the penalized objective for a fixed penalty `rho`
///
/// Every iteration performs one backend update, projects the new coefficients onto the
/// sparse set and evaluates the objective at the new point. Iteration stops as soon as the
/// gradient norm falls below the gradient tolerance or after
/// [`max_inner_iterations`](SolverOptions::max_inner_iterations) steps. Momentum is applied
/// unless the iteration is within the first
/// [`nesterov_threshold`](SolverOptions::nesterov_threshold) steps or the objective increased.
///
/// When the starting point already satisfies the tolerance, zero iterations are reported and
/// the backend is never called.
pub fn anneal<F, B, R, C>(
    problem: &mut VdaProblem<F>,
    backend: &mut B,
    options: &SolverOptions<F>,
    rho: F,
    k: usize,
    rng: &mut R,
    callback: &mut C,
) -> Result<SubproblemResult<F>>
where
    F: Float,
    B: Backend<F>,
    R: Rng,
    C: Callback<F>,
{
    let epsilon = options.epsilon;
    let gtol = options.gradient_tolerance;

    problem.project(k, rng)?;
    let mut result = evaluate_objective(problem, epsilon, rho);
    if result.gradient < gtol * gtol {
        return Ok(SubproblemResult {
            iterations: 0,
            result,
        });
    }

    let mut nesterov = Nesterov::new();
    let mut reset = true;
    let mut iterations = 0;
    for iter in 1..=options.max_inner_iterations {
        iterations = iter;
        let previous = result;

        backend.update(problem, epsilon, rho, k)?;
        problem.project(k, rng)?;
        result = evaluate_objective(problem, epsilon, rho);
        callback.inner(iter, problem, epsilon, rho, k, &result);

        tracing::trace!(
            "iteration {} with rho = {}: objective {}, gradient {}",
            iter,
            rho,
            result.objective,
            result.gradient
        );

        if result.gradient < gtol * gtol {
            break;
        }

        check_descent(options, reset, iter, &previous, &result)?;

        reset = iter < options.nesterov_threshold || result.objective > previous.objective;
        nesterov.apply(&mut problem.coeff, &mut problem.coeff_prev, reset);
    }

    Ok(SubproblemResult { iterations, result })
}

/// Anneal the penalty from [`rho_init`](SolverOptions::rho_init) to
/// [`rho_max`](SolverOptions::rho_max) until the coefficients have at most `k` nonzero
/// predictors
///
/// Every round solves the penalized subproblem with [`anneal`] and stops the annealing when
/// the distance to the sparse set is small, or when it changed by less than the relative
/// tolerance. The returned result counts the inner iterations of all rounds and reports the
/// objective after a final projection.
pub fn fit<F, B, R, C>(
    problem: &mut VdaProblem<F>,
    backend: &mut B,
    options: &SolverOptions<F>,
    k: usize,
    rng: &mut R,
    callback: &mut C,
) -> Result<SubproblemResult<F>>
where
    F: Float,
    B: Backend<F>,
    R: Rng,
    C: Callback<F>,
{
    let epsilon = options.epsilon;
    let dtol = options.distance_tolerance;
    let rtol = options.relative_tolerance;

    backend.on_sparsity_change(problem, k)?;
    let mut rho = options.rho_init;
    backend.on_penalty_change(problem, rho)?;

    problem.project(k, rng)?;
    let mut old_dist = evaluate_objective(problem, epsilon, rho).distance.sqrt();

    let mut iterations = 0;
    for round in 1..=options.max_outer_iterations {
        let sub = anneal(problem, backend, options, rho, k, rng, callback)?;
        iterations += sub.iterations;
        callback.outer(round, problem, epsilon, rho, k, &sub);

        let dist = sub.result.distance.sqrt();
        tracing::debug!(
            "round {} with rho = {}: distance {} after {} iterations",
            round,
            rho,
            dist,
            sub.iterations
        );

        if dist < dtol || (dist - old_dist).abs() < rtol * (F::one() + old_dist) {
            break;
        }
        old_dist = dist;

        if round < options.max_outer_iterations {
            let next = options.schedule.next(rho, options.rho_max);
            if next != rho {
                rho = next;
                backend.on_penalty_change(problem, rho)?;
            }
        }
    }

    problem.project(k, rng)?;
    let result = evaluate_objective(problem, epsilon, rho);
    tracing::debug!(
        "annealing finished after {} iterations: loss {}, distance {}",
        iterations,
        result.loss,
        result.distance.sqrt()
    );

    Ok(SubproblemResult { iterations, result })
}

/// Ridge regularized initialization
///
/// Randomizes the coefficients and minimizes the objective with the distance penalty
/// replaced by a ridge penalty of strength [`init_penalty`](SolverOptions::init_penalty) on
/// all predictors. No sparsity is enforced, the intercept is not penalized. Uses the same
/// momentum and reset policy as [`anneal`].
pub fn init_regularized<F, B, R>(
    problem: &mut VdaProblem<F>,
    backend: &mut B,
    options: &SolverOptions<F>,
    rng: &mut R,
) -> Result<SubproblemResult<F>>
where
    F: Float,
    B: Backend<F>,
    R: Rng,
{
    let epsilon = options.epsilon;
    let lambda = options.init_penalty;
    let gtol = options.gradient_tolerance;
    let k = problem.npredictors();

    problem.randomize(rng);
    backend.on_penalty_change(problem, lambda)?;

    problem.shrink();
    let mut result = evaluate_objective(problem, epsilon, lambda);
    if result.gradient < gtol * gtol {
        return Ok(SubproblemResult {
            iterations: 0,
            result,
        });
    }

    let mut nesterov = Nesterov::new();
    let mut reset = true;
    let mut iterations = 0;
    for iter in 1..=options.init_max_iterations {
        iterations = iter;
        let previous = result;

        backend.update(problem, epsilon, lambda, k)?;
        problem.shrink();
        result = evaluate_objective(problem, epsilon, lambda);

        if result.gradient < gtol * gtol {
            break;
        }

        check_descent(options, reset, iter, &previous, &result)?;

        reset = iter < options.nesterov_threshold || result.objective > previous.objective;
        nesterov.apply(&mut problem.coeff, &mut problem.coeff_prev, reset);
    }

    tracing::debug!(
        "regularized initialization with lambda = {}: loss {} after {} iterations",
        lambda,
        result.loss,
        iterations
    );

    Ok(SubproblemResult { iterations, result })
}

/// A surrogate step taken from a point without momentum must not increase the objective
fn check_descent<F: Float>(
    options: &SolverOptions<F>,
    reset: bool,
    iteration: usize,
    previous: &IterationResult<F>,
    current: &IterationResult<F>,
) -> Result<()> {
    if !options.strict_descent || !reset {
        return Ok(());
    }

    let tol = F::epsilon().sqrt() * (F::one() + previous.objective.abs());
    if current.objective - previous.objective > tol {
        return Err(VdaError::DescentFailure {
            iteration,
            before: previous.objective.to_f32().unwrap_or(f32::NAN),
            after: current.objective.to_f32().unwrap_or(f32::NAN),
        });
    }

    Ok(())
}
