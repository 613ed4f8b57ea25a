//! Baseline estimation by adaptive iteratively reweighted penalized least squares (airPLS).
//!
//! Starting from uniform weights, the signal is repeatedly smoothed with a
//! [`WhittakerSmoother`]. After each pass, points lying on or above the smoothed curve
//! are treated as peak signal and lose all weight, while points below it are weighted
//! by how far below they fall, growing exponentially with the iteration number. The
//! curve sinks under the peaks until the total negative residual is a negligible
//! fraction of the signal.
//!
//! # References
//! Z.-M. Zhang, S. Chen, Y.-Z. Liang, "Baseline correction using adaptive iteratively
//! reweighted penalized least squares", Analyst 135 (2010), 1138–1146.
use std::fmt::{self, Debug};

use log::{debug, warn};
use num_traits::Float;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{abs_sum, subtract};
use crate::solver::{BandedCholesky, SparseSolver};
use crate::whittaker::{validate_parameters, WhittakerError, WhittakerSmoother};

/// The fraction of the total absolute signal the negative residual must fall under
pub const DEFAULT_TOLERANCE_RATIO: f64 = 0.001;

/// Raised alongside a valid result when the iteration cap was reached before the
/// negative residual met the tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConvergenceWarning {
    pub iterations: usize,
    pub negative_residual: f64,
    pub tolerance: f64,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Maximum iteration count {} reached with negative residual {} above tolerance {}",
            self.iterations, self.negative_residual, self.tolerance
        )
    }
}

/// The outcome of a baseline estimation
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaselineFit<F: Float> {
    /// The estimated baseline, one value per input point
    pub baseline: Vec<F>,
    /// Whether the negative residual met the tolerance
    pub converged: bool,
    /// How many smoothing passes were performed
    pub iterations: usize,
    /// The summed magnitude of the negative residuals of the final pass
    pub negative_residual: F,
    /// The threshold `negative_residual` was compared against
    pub tolerance: F,
}

impl<F: Float> BaselineFit<F> {
    /// `None` when the fit converged, otherwise the warning describing why it didn't
    pub fn warning(&self) -> Option<ConvergenceWarning> {
        if self.converged {
            None
        } else {
            Some(ConvergenceWarning {
                iterations: self.iterations,
                negative_residual: self.negative_residual.to_f64().unwrap_or(f64::NAN),
                tolerance: self.tolerance.to_f64().unwrap_or(f64::NAN),
            })
        }
    }

    /// Subtract the baseline from `signal`
    pub fn corrected(&self, signal: &[F]) -> Vec<F> {
        subtract(signal, &self.baseline)
    }

    pub fn into_baseline(self) -> Vec<F> {
        self.baseline
    }
}

/// Summary of the strictly negative entries of a residual vector
#[derive(Debug, Clone, Copy, PartialEq)]
struct NegativeResidual<F: Float> {
    /// Sum of magnitudes
    total: F,
    /// Largest magnitude
    largest: F,
    count: usize,
}

impl<F: Float> NegativeResidual<F> {
    fn measure(residual: &[F]) -> Self {
        residual.iter().filter(|d| **d < F::zero()).fold(
            Self {
                total: F::zero(),
                largest: F::zero(),
                count: 0,
            },
            |acc, d| {
                let magnitude = d.abs();
                Self {
                    total: acc.total + magnitude,
                    largest: acc.largest.max(magnitude),
                    count: acc.count + 1,
                }
            },
        )
    }
}

/// Reweight for the next pass. Points at or above the curve are dropped, points below
/// it are weighted by `exp(iteration · |d| / total)`, and both endpoints take the
/// largest such weight to pin the ends of the curve.
fn update_weights<F: Float>(
    weights: &mut [F],
    residual: &[F],
    negative: &NegativeResidual<F>,
    iteration: usize,
) {
    let scale = F::from(iteration).unwrap() / negative.total;
    weights
        .iter_mut()
        .zip(residual.iter())
        .for_each(|(w, d)| {
            *w = if *d < F::zero() {
                (d.abs() * scale).exp()
            } else {
                F::zero()
            }
        });
    let edge = (negative.largest * scale).exp();
    if let Some(first) = weights.first_mut() {
        *first = edge;
    }
    if let Some(last) = weights.last_mut() {
        *last = edge;
    }
}

/// An airPLS baseline estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirPLS<S = BandedCholesky> {
    /// The smoothness penalty, larger values give stiffer baselines
    pub lambda: f64,
    /// The order of the difference penalty
    pub order: usize,
    /// The maximum number of smoothing passes
    pub max_iterations: usize,
    /// Convergence is reached when the negative residual falls under this fraction
    /// of the summed absolute signal
    pub tolerance_ratio: f64,
    solver: S,
}

impl Default for AirPLS<BandedCholesky> {
    fn default() -> Self {
        Self::new(100.0, 1, 15)
    }
}

impl AirPLS<BandedCholesky> {
    pub fn new(lambda: f64, order: usize, max_iterations: usize) -> Self {
        Self {
            lambda,
            order,
            max_iterations,
            tolerance_ratio: DEFAULT_TOLERANCE_RATIO,
            solver: BandedCholesky,
        }
    }
}

impl<S> AirPLS<S> {
    /// Swap the linear solver backend used for every smoothing pass
    pub fn with_solver<T>(self, solver: T) -> AirPLS<T> {
        AirPLS {
            lambda: self.lambda,
            order: self.order,
            max_iterations: self.max_iterations,
            tolerance_ratio: self.tolerance_ratio,
            solver,
        }
    }

    /// Estimate the baseline of `signal`.
    ///
    /// Reaching [`AirPLS::max_iterations`] before the tolerance is met is not an error,
    /// the last smoothed curve is returned with [`BaselineFit::converged`] unset and a
    /// warning is logged. When no point falls below the smoothed curve the fit is
    /// considered converged.
    ///
    /// # Errors
    /// [`WhittakerError::InvalidIterationLimit`] for a zero iteration cap, and any
    /// parameter or solver error from the smoothing passes, unchanged.
    pub fn fit<F: Float + Debug>(&self, signal: &[F]) -> Result<BaselineFit<F>, WhittakerError>
    where
        S: SparseSolver<F>,
    {
        validate_parameters(signal.len(), self.lambda, self.order)?;
        if self.max_iterations == 0 {
            return Err(WhittakerError::InvalidIterationLimit);
        }

        let smoother = WhittakerSmoother::new(self.lambda, self.order).with_solver(&self.solver);
        let penalty = smoother.penalty(signal.len());
        let tolerance = F::from(self.tolerance_ratio).unwrap() * abs_sum(signal);

        let mut weights = vec![F::one(); signal.len()];
        let mut iteration = 0;
        loop {
            iteration += 1;
            let baseline = smoother.smooth_with_penalty(&penalty, signal, &weights)?;
            let residual = subtract(signal, &baseline);
            let negative = NegativeResidual::measure(&residual);
            debug!(
                "Iteration {iteration}: {} points below the baseline, negative residual {:?}",
                negative.count, negative.total
            );

            let converged = negative.count == 0 || negative.total < tolerance;
            if converged || iteration == self.max_iterations {
                let fit = BaselineFit {
                    baseline,
                    converged,
                    iterations: iteration,
                    negative_residual: negative.total,
                    tolerance,
                };
                if let Some(warning) = fit.warning() {
                    warn!("{warning}");
                }
                return Ok(fit);
            }
            update_weights(&mut weights, &residual, &negative, iteration);
        }
    }
}

/// A builder for configuring [`AirPLS`]
#[derive(Debug, Clone)]
pub struct AirPLSBuilder {
    lambda: f64,
    order: usize,
    max_iterations: usize,
    tolerance_ratio: f64,
}

impl Default for AirPLSBuilder {
    fn default() -> Self {
        let defaults = AirPLS::default();
        Self {
            lambda: defaults.lambda,
            order: defaults.order,
            max_iterations: defaults.max_iterations,
            tolerance_ratio: defaults.tolerance_ratio,
        }
    }
}

impl AirPLSBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lambda(&mut self, lambda: f64) -> &mut Self {
        self.lambda = lambda;
        self
    }

    pub fn order(&mut self, order: usize) -> &mut Self {
        self.order = order;
        self
    }

    pub fn max_iterations(&mut self, max_iterations: usize) -> &mut Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn tolerance_ratio(&mut self, tolerance_ratio: f64) -> &mut Self {
        self.tolerance_ratio = tolerance_ratio;
        self
    }

    pub fn build(&self) -> AirPLS {
        let mut inst = AirPLS::new(self.lambda, self.order, self.max_iterations);
        inst.tolerance_ratio = self.tolerance_ratio;
        inst
    }
}

impl From<AirPLSBuilder> for AirPLS {
    fn from(value: AirPLSBuilder) -> Self {
        value.build()
    }
}

/// Estimate the baseline of `signal` with penalty strength `lambda`, difference order
/// `order` and at most `max_iterations` smoothing passes.
///
/// This is a convenience wrapper around [`AirPLS::fit`].
pub fn airpls<F: Float + Debug>(
    signal: &[F],
    lambda: f64,
    order: usize,
    max_iterations: usize,
) -> Result<BaselineFit<F>, WhittakerError> {
    AirPLS::new(lambda, order, max_iterations).fit(signal)
}
