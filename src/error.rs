use thiserror::Error;

/// Simplified `Result` using [`VdaError`](crate::VdaError) as error type
pub type Result<T> = std::result::Result<T, VdaError>;

#[derive(Error, Debug)]
pub enum VdaError {
    #[error("deadzone radius should be in range [0, 1], but is {0}")]
    InvalidDeadzone(f32),
    #[error("sparsity should be in range [0, 1], but is {0}")]
    InvalidSparsity(f32),
    #[error("penalty should be positive and finite, but is {0}")]
    InvalidPenalty(f32),
    #[error("maximum penalty {max} is smaller than the initial penalty {init}")]
    InvalidPenaltyRange { init: f32, max: f32 },
    #[error("penalty schedule must strictly increase the penalty, but uses {0}")]
    InvalidSchedule(f32),
    #[error("tolerance should be positive and finite, but is {0}")]
    InvalidTolerance(f32),
    #[error("maximum number of iterations cannot be 0")]
    InvalidMaxIterations,
    #[error("expected {0} samples in the targets, but found {1}")]
    MismatchedShapes(usize, usize),
    #[error("records contain non-finite values")]
    InvalidValues,
    #[error("at least two classes are required, but found {0}")]
    NotEnoughClasses(usize),
    #[error("cannot group a matrix along axis {0}")]
    InvalidAxis(usize),
    #[error("backend was updated before its factorization was computed")]
    UninitializedBackend,
    #[error("objective increased from {before} to {after} in iteration {iteration}")]
    DescentFailure {
        iteration: usize,
        before: f32,
        after: f32,
    },
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    #[error(transparent)]
    BaseCrate(#[from] linfa::Error),
}

