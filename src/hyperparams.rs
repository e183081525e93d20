use linfa::{Float, ParamGuard};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::backend::Algorithm;
use crate::error::VdaError;

/// Growth of the distance penalty between two annealing rounds
///
/// The new penalty is always clamped to the maximal penalty, so both schedules produce a
/// non-decreasing sequence bounded by it.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PenaltySchedule<F> {
    /// Multiply the penalty with a factor larger than one
    Geometric(F),
    /// Add a positive step to the penalty
    Linear(F),
}

impl<F: Float> Default for PenaltySchedule<F> {
    fn default() -> Self {
        PenaltySchedule::Geometric(F::cast(1.2))
    }
}

impl<F: Float> PenaltySchedule<F> {
    /// Penalty of the round following a round with penalty `rho`
    pub fn next(&self, rho: F, rho_max: F) -> F {
        let next = match *self {
            PenaltySchedule::Geometric(m) => rho * m,
            PenaltySchedule::Linear(step) => rho + step,
        };
        next.min(rho_max)
    }

    fn is_increasing(&self) -> bool {
        match *self {
            PenaltySchedule::Geometric(m) => m.is_finite() && m > F::one(),
            PenaltySchedule::Linear(step) => step.is_finite() && step > F::zero(),
        }
    }

    fn value(&self) -> F {
        match *self {
            PenaltySchedule::Geometric(v) | PenaltySchedule::Linear(v) => v,
        }
    }
}

/// Options of the annealing solver
///
/// The solver routines in [`solver`](crate::solver) take these options directly. When fitting
/// through [`VdaParams`] they are assembled and validated by the builder.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions<F> {
    /// Deadzone radius
    pub epsilon: F,
    /// Penalty of the first annealing round
    pub rho_init: F,
    /// Upper bound of the penalty
    pub rho_max: F,
    pub schedule: PenaltySchedule<F>,
    /// Iteration cap of a single penalized subproblem
    pub max_inner_iterations: usize,
    /// Number of annealing rounds
    pub max_outer_iterations: usize,
    /// A subproblem is solved once the gradient norm drops below this value
    pub gradient_tolerance: F,
    /// Annealing stops once the distance to the constraint set drops below this value
    pub distance_tolerance: F,
    /// Annealing stops once the distance changes less than this fraction between two rounds
    pub relative_tolerance: F,
    /// Number of iterations at the start of a subproblem without momentum
    pub nesterov_threshold: usize,
    /// Ridge penalty of the regularized initialization
    pub init_penalty: F,
    /// Iteration cap of the regularized initialization
    pub init_max_iterations: usize,
    /// Fail when a plain surrogate step increases the objective
    pub strict_descent: bool,
}

impl<F: Float> Default for SolverOptions<F> {
    fn default() -> Self {
        SolverOptions {
            epsilon: F::cast(0.5),
            rho_init: F::one(),
            rho_max: F::cast(1e8),
            schedule: PenaltySchedule::default(),
            max_inner_iterations: 10_000,
            max_outer_iterations: 100,
            gradient_tolerance: F::cast(1e-3),
            distance_tolerance: F::cast(1e-3),
            relative_tolerance: F::cast(1e-6),
            nesterov_threshold: 10,
            init_penalty: F::one(),
            init_max_iterations: 1_000,
            strict_descent: false,
        }
    }
}

impl<F: Float> SolverOptions<F> {
    /// Check that every option is inside its valid range
    pub fn validate(&self) -> Result<(), VdaError> {
        let to_f32 = |v: F| v.to_f32().unwrap_or(f32::NAN);

        if !(F::zero()..=F::one()).contains(&self.epsilon) {
            Err(VdaError::InvalidDeadzone(to_f32(self.epsilon)))
        } else if !self.rho_init.is_finite() || self.rho_init <= F::zero() {
            Err(VdaError::InvalidPenalty(to_f32(self.rho_init)))
        } else if self.rho_max.is_nan() || self.rho_max < self.rho_init {
            Err(VdaError::InvalidPenaltyRange {
                init: to_f32(self.rho_init),
                max: to_f32(self.rho_max),
            })
        } else if !self.schedule.is_increasing() {
            Err(VdaError::InvalidSchedule(to_f32(self.schedule.value())))
        } else if !self.init_penalty.is_finite() || self.init_penalty <= F::zero() {
            Err(VdaError::InvalidPenalty(to_f32(self.init_penalty)))
        } else if self.max_inner_iterations == 0
            || self.max_outer_iterations == 0
            || self.init_max_iterations == 0
        {
            Err(VdaError::InvalidMaxIterations)
        } else if let Some(tol) = [self.gradient_tolerance, self.distance_tolerance]
            .iter()
            .find(|tol| !tol.is_finite() || **tol <= F::zero())
        {
            Err(VdaError::InvalidTolerance(to_f32(*tol)))
        } else if !self.relative_tolerance.is_finite() || self.relative_tolerance < F::zero() {
            Err(VdaError::InvalidTolerance(to_f32(self.relative_tolerance)))
        } else {
            Ok(())
        }
    }
}

/// A verified hyper-parameter set ready for the estimation of a sparse vertex discriminant
/// model
///
/// See [`VdaParams`] for more information.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct VdaValidParams<F, R> {
    pub(crate) sparsity: F,
    pub(crate) with_intercept: bool,
    pub(crate) algorithm: Algorithm,
    pub(crate) warm_start: bool,
    pub(crate) options: SolverOptions<F>,
    pub(crate) rng: R,
}

impl<F: Float, R> VdaValidParams<F, R> {
    pub fn sparsity(&self) -> F {
        self.sparsity
    }

    pub fn with_intercept(&self) -> bool {
        self.with_intercept
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn warm_start(&self) -> bool {
        self.warm_start
    }

    pub fn options(&self) -> &SolverOptions<F> {
        &self.options
    }

    pub fn rng(&self) -> &R {
        &self.rng
    }
}

/// A hyper-parameter set for sparse vertex discriminant analysis
///
/// | Name | Default | Purpose | Range |
/// | :--- | :--- | :--- | :--- |
/// | [epsilon](Self::epsilon) | `0.5` | Deadzone radius of the loss | `[0, 1]` |
/// | [sparsity](Self::sparsity) | `0.0` | Fraction of features forced to zero | `[0, 1]` |
/// | [with_intercept](Self::with_intercept) | `true` | Model an unpenalized intercept | `false`, `true` |
/// | [algorithm](Self::algorithm) | `Cholesky` | Surrogate update rule | |
/// | [penalty](Self::penalty) | `1.0`, `1e8` | Initial and maximal distance penalty | `0 < init <= max` |
/// | [schedule](Self::schedule) | `Geometric(1.2)` | Penalty growth between rounds | strictly increasing |
/// | [max_inner_iterations](Self::max_inner_iterations) | `10000` | Iterations per penalty | `[1, inf)` |
/// | [max_outer_iterations](Self::max_outer_iterations) | `100` | Annealing rounds | `[1, inf)` |
/// | [gradient_tolerance](Self::gradient_tolerance) | `1e-3` | Convergence of a round | `(0, inf)` |
/// | [distance_tolerance](Self::distance_tolerance) | `1e-3` | Convergence of the annealing | `(0, inf)` |
/// | [relative_tolerance](Self::relative_tolerance) | `1e-6` | Stall detection of the annealing | `[0, inf)` |
/// | [nesterov_threshold](Self::nesterov_threshold) | `10` | Iterations before momentum kicks in | |
/// | [warm_start](Self::warm_start) | `true` | Run the regularized initialization | `false`, `true` |
/// | [init_penalty](Self::init_penalty) | `1.0` | Ridge penalty of the initialization | `(0, inf)` |
/// | [init_max_iterations](Self::init_max_iterations) | `1000` | Iterations of the initialization | `[1, inf)` |
/// | [strict_descent](Self::strict_descent) | `false` | Fail on an increasing objective | `false`, `true` |
/// | [rng](Self::rng) | `Xoshiro256Plus` seeded with `42` | Initialization and tie breaking | |
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct VdaParams<F, R>(pub(crate) VdaValidParams<F, R>);

impl<F: Float> Default for VdaParams<F, Xoshiro256Plus> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> VdaParams<F, Xoshiro256Plus> {
    /// Create default hyper parameters with a seeded random number generator
    pub fn new() -> Self {
        Self::new_with_rng(Xoshiro256Plus::seed_from_u64(42))
    }
}

impl<F: Float, R: Rng + Clone> VdaParams<F, R> {
    /// Create default hyper parameters with a custom random number generator
    pub fn new_with_rng(rng: R) -> Self {
        Self(VdaValidParams {
            sparsity: F::zero(),
            with_intercept: true,
            algorithm: Algorithm::default(),
            warm_start: true,
            options: SolverOptions::default(),
            rng,
        })
    }

    /// Set the deadzone radius
    ///
    /// Residuals with a norm below the radius do not contribute to the loss. Larger values
    /// move the decision boundaries away from the class vertices, similar to the margin of
    /// a support vector machine.
    pub fn epsilon(mut self, epsilon: F) -> Self {
        self.0.options.epsilon = epsilon;
        self
    }

    /// Set the fraction of features whose coefficients are forced to zero
    ///
    /// The number of kept features is `round((1 - sparsity) * n_features)`.
    pub fn sparsity(mut self, sparsity: F) -> Self {
        self.0.sparsity = sparsity;
        self
    }

    pub fn with_intercept(mut self, with_intercept: bool) -> Self {
        self.0.with_intercept = with_intercept;
        self
    }

    /// Select the update rule of the surrogate problems
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.0.algorithm = algorithm;
        self
    }

    /// Set the initial and the maximal penalty of the distance to the sparse set
    pub fn penalty(mut self, init: F, max: F) -> Self {
        self.0.options.rho_init = init;
        self.0.options.rho_max = max;
        self
    }

    /// Set the growth of the penalty between two annealing rounds
    pub fn schedule(mut self, schedule: PenaltySchedule<F>) -> Self {
        self.0.options.schedule = schedule;
        self
    }

    pub fn max_inner_iterations(mut self, max_iter: usize) -> Self {
        self.0.options.max_inner_iterations = max_iter;
        self
    }

    pub fn max_outer_iterations(mut self, max_iter: usize) -> Self {
        self.0.options.max_outer_iterations = max_iter;
        self
    }

    /// Set the gradient norm at which a penalized subproblem counts as solved
    pub fn gradient_tolerance(mut self, tolerance: F) -> Self {
        self.0.options.gradient_tolerance = tolerance;
        self
    }

    /// Set the distance to the sparse set at which the annealing stops
    pub fn distance_tolerance(mut self, tolerance: F) -> Self {
        self.0.options.distance_tolerance = tolerance;
        self
    }

    /// Set the relative change of the distance at which the annealing counts as stalled
    pub fn relative_tolerance(mut self, tolerance: F) -> Self {
        self.0.options.relative_tolerance = tolerance;
        self
    }

    /// Set the number of plain iterations at the start of every subproblem before Nesterov
    /// momentum is applied
    pub fn nesterov_threshold(mut self, threshold: usize) -> Self {
        self.0.options.nesterov_threshold = threshold;
        self
    }

    /// Start the annealing from a ridge regularized solution instead of random coefficients
    pub fn warm_start(mut self, warm_start: bool) -> Self {
        self.0.warm_start = warm_start;
        self
    }

    pub fn init_penalty(mut self, penalty: F) -> Self {
        self.0.options.init_penalty = penalty;
        self
    }

    pub fn init_max_iterations(mut self, max_iter: usize) -> Self {
        self.0.options.init_max_iterations = max_iter;
        self
    }

    /// Fail with [`DescentFailure`](VdaError::DescentFailure) when a surrogate step without
    /// momentum increases the objective
    pub fn strict_descent(mut self, strict: bool) -> Self {
        self.0.options.strict_descent = strict;
        self
    }

    /// Set the random number generator used for the initial coefficients and to break ties in
    /// the projection
    pub fn rng<R2: Rng + Clone>(self, rng: R2) -> VdaParams<F, R2> {
        let VdaValidParams {
            sparsity,
            with_intercept,
            algorithm,
            warm_start,
            options,
            ..
        } = self.0;

        VdaParams(VdaValidParams {
            sparsity,
            with_intercept,
            algorithm,
            warm_start,
            options,
            rng,
        })
    }
}

impl<F: Float, R> ParamGuard for VdaParams<F, R> {
    type Checked = VdaValidParams<F, R>;
    type Error = VdaError;

    /// Validate the hyper parameters
    fn check_ref(&self) -> Result<&Self::Checked, Self::Error> {
        if !(F::zero()..=F::one()).contains(&self.0.sparsity) {
            Err(VdaError::InvalidSparsity(
                self.0.sparsity.to_f32().unwrap_or(f32::NAN),
            ))
        } else {
            self.0.options.validate()?;
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}
