//! Whittaker smoothing: weighted penalized least squares with a difference penalty.
//!
//! Given a signal `y`, non-negative weights `w`, a penalty strength `λ` and a
//! difference order `d`, the smoothed curve `z` solves
//!
//! ```text
//! (diag(w) + λ·DᵀD) z = diag(w) y
//! ```
//!
//! where `D` is the `d`-th order [`DifferenceOperator`]. Larger `λ` values give
//! smoother curves, and points with zero weight are filled in by the penalty alone.
use std::fmt::Debug;

use num_traits::Float;
use thiserror::Error;

use crate::penalty::{penalized_system, DifferenceOperator, SymmetricBandMatrix};
use crate::solver::{BandedCholesky, SolverError, SparseSolver};

/// All the ways smoothing or baseline estimation can fail
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WhittakerError {
    #[error("The signal has {signal} points but {weights} weights were provided")]
    DimensionMismatch { signal: usize, weights: usize },
    #[error("The smoothing penalty must be positive and finite, received {0}")]
    InvalidLambda(f64),
    #[error("The difference order must be at least 1, received {0}")]
    InvalidOrder(usize),
    #[error("A difference penalty of order {order} needs more than {order} points, received {len}")]
    SignalTooShort { len: usize, order: usize },
    #[error("Weights must be finite and non-negative, received {value} at index {index}")]
    InvalidWeight { index: usize, value: f64 },
    #[error("The iteration limit must be at least 1")]
    InvalidIterationLimit,
    #[error("Failed to solve the smoothing system: {0}")]
    Solver(#[from] SolverError),
}

/// Check the parameters shared by all smoothing entry points
pub(crate) fn validate_parameters(
    len: usize,
    lambda: f64,
    order: usize,
) -> Result<(), WhittakerError> {
    if order == 0 {
        Err(WhittakerError::InvalidOrder(order))
    } else if !(lambda > 0.0) || !lambda.is_finite() {
        Err(WhittakerError::InvalidLambda(lambda))
    } else if len <= order {
        Err(WhittakerError::SignalTooShort { len, order })
    } else {
        Ok(())
    }
}

/// A Whittaker smoother with a fixed penalty strength, difference order and
/// linear solver backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhittakerSmoother<S = BandedCholesky> {
    pub lambda: f64,
    pub order: usize,
    solver: S,
}

impl Default for WhittakerSmoother<BandedCholesky> {
    fn default() -> Self {
        Self::new(100.0, 1)
    }
}

impl WhittakerSmoother<BandedCholesky> {
    pub fn new(lambda: f64, order: usize) -> Self {
        Self {
            lambda,
            order,
            solver: BandedCholesky,
        }
    }
}

impl<S> WhittakerSmoother<S> {
    /// Swap the linear solver backend
    pub fn with_solver<T>(self, solver: T) -> WhittakerSmoother<T> {
        WhittakerSmoother {
            lambda: self.lambda,
            order: self.order,
            solver,
        }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Build `λ·DᵀD` for a signal of length `size`
    pub fn penalty<F: Float>(&self, size: usize) -> SymmetricBandMatrix<F> {
        DifferenceOperator::new(size, self.order)
            .gram()
            .scaled(F::from(self.lambda).unwrap())
    }

    /// Smooth `signal` with per-point `weights`.
    ///
    /// # Errors
    /// - [`WhittakerError::InvalidOrder`] if the order is zero
    /// - [`WhittakerError::DimensionMismatch`] if `signal` and `weights` differ in length
    /// - [`WhittakerError::InvalidLambda`] if `lambda` is not strictly positive
    /// - [`WhittakerError::SignalTooShort`] if there are not more points than the order
    /// - [`WhittakerError::InvalidWeight`] if any weight is negative or not finite
    /// - [`WhittakerError::Solver`] if the system could not be solved, e.g. all weights are zero
    pub fn smooth<F: Float + Debug>(
        &self,
        signal: &[F],
        weights: &[F],
    ) -> Result<Vec<F>, WhittakerError>
    where
        S: SparseSolver<F>,
    {
        if self.order == 0 {
            return Err(WhittakerError::InvalidOrder(self.order));
        }
        if signal.len() != weights.len() {
            return Err(WhittakerError::DimensionMismatch {
                signal: signal.len(),
                weights: weights.len(),
            });
        }
        validate_parameters(signal.len(), self.lambda, self.order)?;
        if let Some((index, value)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !(**w >= F::zero()) || !w.is_finite())
        {
            return Err(WhittakerError::InvalidWeight {
                index,
                value: value.to_f64().unwrap_or(f64::NAN),
            });
        }
        let penalty = self.penalty(signal.len());
        self.smooth_with_penalty(&penalty, signal, weights)
    }

    /// Solve the smoothing system against a precomputed `λ·DᵀD`, skipping validation.
    ///
    /// Used by iterative callers that reweight the same signal many times.
    pub(crate) fn smooth_with_penalty<F: Float + Debug>(
        &self,
        penalty: &SymmetricBandMatrix<F>,
        signal: &[F],
        weights: &[F],
    ) -> Result<Vec<F>, WhittakerError>
    where
        S: SparseSolver<F>,
    {
        let system = penalized_system(penalty, weights);
        let rhs: Vec<F> = signal
            .iter()
            .zip(weights.iter())
            .map(|(y, w)| *y * *w)
            .collect();
        Ok(self.solver.solve(&system, &rhs)?)
    }
}

/// Smooth `signal` with per-point `weights` using a difference penalty of order `order`
/// scaled by `lambda`, solved with the default [`BandedCholesky`] backend.
///
/// See [`WhittakerSmoother::smooth`] for the error conditions.
pub fn whittaker_smooth<F: Float + Debug>(
    signal: &[F],
    weights: &[F],
    lambda: f64,
    order: usize,
) -> Result<Vec<F>, WhittakerError> {
    WhittakerSmoother::new(lambda, order).smooth(signal, weights)
}
