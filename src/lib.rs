//! # Sparse Vertex Discriminant Analysis
//!
//! Vertex discriminant analysis (VDA) encodes every class as a vertex of a regular simplex and
//! fits a linear map from the features to the vertex space by least squares. Residuals shorter
//! than a deadzone radius `epsilon` are ignored, similar to the margin of a support vector
//! machine. A new sample is assigned to the class whose vertex is nearest to its score.
//!
//! This crate adds an exact cardinality constraint: at most `k` features have nonzero
//! coefficients. The constraint is not convex, so the problem is relaxed into a sequence of
//! penalized problems
//! ```ignore
//! 1/2 (loss(B) + rho * dist(B, S_k)^2)
//! ```
//! where `S_k` is the set of coefficients with at most `k` nonzero rows. For a fixed `rho` the
//! relaxed problem is minimized with majorization-minimization steps accelerated by Nesterov
//! momentum, then `rho` is increased until the coefficients are (close to) feasible. This is
//! known as a proximal distance algorithm.
//!
//! ## Available parameters
//!
//! The number of kept features is controlled with [`sparsity`](VdaParams::sparsity), the
//! fraction of features forced to zero. See [`VdaParams`] for the complete list.
//!
//! ## The solver
//!
//! The components of the solver are public and can be driven on a [`VdaProblem`] directly:
//!
//! * [`L0Projection`] projects onto the sparse set and breaks ties uniformly at random
//! * [`evaluate_objective`] computes loss, distance and gradient
//! * [`Backend`] implementations perform the surrogate updates
//! * [`anneal`], [`fit`] and [`init_regularized`] are the inner, outer and initialization loops
//!
//! A [`Callback`] can observe every iteration. Progress is also reported through `tracing`
//! events.
//!
//! ## Example
//!
//! ```rust
//! use linfa::prelude::*;
//! use linfa_vda::Vda;
//!
//! let dataset = linfa_datasets::iris();
//!
//! let model = Vda::<_, usize>::params()
//!     .sparsity(0.5)
//!     .fit(&dataset)?;
//!
//! let pred = model.predict(&dataset);
//! let cm = pred.confusion_matrix(&dataset)?;
//! println!("{} features active, accuracy {}", model.active_features().len(), cm.accuracy());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
use std::fmt;

use linfa::Float;
use ndarray::{s, Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

mod algorithm;
mod backend;
mod error;
mod hyperparams;
mod momentum;
mod objective;
mod pivot;
mod problem;
mod projection;
pub mod solver;

pub use backend::{Algorithm, AlgorithmState, Backend, CholeskyMM, SteepestDescent};
pub use error::{Result, VdaError};
pub use hyperparams::{PenaltySchedule, SolverOptions, VdaParams, VdaValidParams};
pub use momentum::Nesterov;
pub use objective::{evaluate_objective, IterationResult, SubproblemResult};
pub use pivot::pivot;
pub use problem::{simplex_vertices, VdaProblem};
pub use projection::L0Projection;
pub use solver::{anneal, fit, init_regularized, Callback};

/// Fitted sparse vertex discriminant model
///
/// Holds the sparse weights of shape `(n_features, n_classes - 1)`, the intercept, the simplex
/// vertices encoding the classes and the sorted class labels.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct Vda<F, C> {
    weights: Array2<F>,
    intercept: Array1<F>,
    vertices: Array2<F>,
    classes: Vec<C>,
    n_iterations: usize,
    result: IterationResult<F>,
}

impl<F: Float, C> Vda<F, C> {
    /// Create default hyperparameters
    ///
    /// The random number generator is a `Xoshiro256Plus` seeded with `42`.
    pub fn params() -> VdaParams<F, Xoshiro256Plus> {
        VdaParams::new_with_rng(Xoshiro256Plus::seed_from_u64(42))
    }

    /// Create default hyperparameters with a custom random number generator
    pub fn params_with_rng<R: Rng + Clone>(rng: R) -> VdaParams<F, R> {
        VdaParams::new_with_rng(rng)
    }

    pub(crate) fn from_problem(
        problem: &VdaProblem<F>,
        vertices: Array2<F>,
        classes: Vec<C>,
        result: SubproblemResult<F>,
    ) -> Self {
        let p = problem.npredictors();
        let proj = problem.projected();
        let intercept = if problem.has_intercept() {
            proj.row(p).to_owned()
        } else {
            Array1::zeros(problem.ndims())
        };

        Vda {
            weights: proj.slice(s![..p, ..]).to_owned(),
            intercept,
            vertices,
            classes,
            n_iterations: result.iterations,
            result: result.result,
        }
    }

    /// Sparse weights with shape `(n_features, n_classes - 1)`
    pub fn weights(&self) -> &Array2<F> {
        &self.weights
    }

    /// Intercept in the vertex space, zero when fitted without intercept
    pub fn intercept(&self) -> &Array1<F> {
        &self.intercept
    }

    /// Vertices of the simplex, row `j` encodes the class `classes()[j]`
    pub fn vertices(&self) -> &Array2<F> {
        &self.vertices
    }

    /// Sorted class labels seen during fitting
    pub fn classes(&self) -> &[C] {
        &self.classes
    }

    /// Indices of the features with nonzero weights
    pub fn active_features(&self) -> Vec<usize> {
        self.weights
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|w| *w != F::zero()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Total number of inner iterations over all annealing rounds
    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    /// Loss, objective, distance and gradient after the last round
    pub fn fit_result(&self) -> &IterationResult<F> {
        &self.result
    }
}

impl<F: Float, C> fmt::Display for Vda<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sparse VDA with {} classes and {} of {} features active, loss = {} after {} iterations",
            self.classes.len(),
            self.active_features().len(),
            self.weights.nrows(),
            self.result.loss,
            self.n_iterations
        )
    }
}
