use linfa::Float;
use ndarray::{linalg::general_mat_mul, Zip};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::problem::VdaProblem;

/// Objective values after a single iteration
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationResult<F> {
    /// Squared norm of the deadzone weighted residuals
    pub loss: F,
    /// `(loss + rho * distance) / 2`
    pub objective: F,
    /// Squared distance between the coefficients and their projection
    pub distance: F,
    /// Squared norm of the gradient
    pub gradient: F,
}

/// Terminal result of a penalized subproblem or of a complete fit
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubproblemResult<F> {
    pub iterations: usize,
    pub result: IterationResult<F>,
}

/// Evaluate loss, objective, distance and gradient at the current coefficients
///
/// With `a = 1/sqrt(n)` the scaled residuals are `R = a (Y - X B)`. A sample whose residual
/// norm is inside the deadzone `epsilon` is ignored, all others are weighted by
/// `(r - epsilon) / r`. The gradient of `(|W|^2 + rho |P - B|^2) / 2` is then
/// `-(a X^t W + rho (P - B))`.
///
/// The projected coefficients are consumed as they are, this never projects. All residual
/// buffers and the gradient of the problem are overwritten.
pub fn evaluate_objective<F: Float>(
    problem: &mut VdaProblem<F>,
    epsilon: F,
    rho: F,
) -> IterationResult<F> {
    let a = F::one() / F::cast(problem.nsamples()).sqrt();

    problem.res_main.assign(&problem.y);
    general_mat_mul(-a, &problem.x, &problem.coeff, a, &mut problem.res_main);

    Zip::from(problem.res_weighted.rows_mut())
        .and(problem.res_main.rows())
        .for_each(|mut weighted, main| {
            let r = main.dot(&main).sqrt() / a;
            let w = if r <= epsilon {
                F::zero()
            } else {
                (r - epsilon) / r
            };
            Zip::from(&mut weighted)
                .and(&main)
                .for_each(|w_ij, m_ij| *w_ij = w * *m_ij);
        });

    Zip::from(&mut problem.res_dist)
        .and(&problem.proj)
        .and(&problem.coeff)
        .for_each(|d, p, b| *d = *p - *b);

    problem.grad.assign(&problem.res_dist);
    general_mat_mul(
        -a,
        &problem.x.t(),
        &problem.res_weighted,
        -rho,
        &mut problem.grad,
    );

    let loss = sum_sq(problem.res_weighted.iter());
    let distance = sum_sq(problem.res_dist.iter());
    let gradient = sum_sq(problem.grad.iter());

    IterationResult {
        loss,
        objective: F::cast(0.5) * (loss + rho * distance),
        distance,
        gradient,
    }
}

fn sum_sq<'a, F: Float>(values: impl Iterator<Item = &'a F>) -> F {
    values.fold(F::zero(), |acc, v| acc + *v * *v)
}
