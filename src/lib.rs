//! `ramansignal` is a library for removing the slowly varying background from
//! Raman and other one-dimensional spectra.
//!
//! The baseline is estimated with adaptive iteratively reweighted penalized least
//! squares ([`AirPLS`]), which repeatedly fits a [`WhittakerSmoother`] to the signal
//! while taking weight away from the points lying above the curve, so that the fit
//! settles underneath the peaks. The linear systems involved are banded and are solved
//! through the [`SparseSolver`] trait, with a banded Cholesky factorization as the
//! default backend.
//!
//! For whole spectra, [`BaselineCorrector`] optionally pre-smooths the signal with a
//! Savitzky-Golay filter before estimating the baseline, and the [`batch`] module
//! corrects every table in a directory.
//!
//! # Usage
//! ```
//! use ramansignal::airpls;
//!
//! let signal: Vec<f64> = vec![0.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0];
//! let fit = airpls(&signal, 100.0, 1, 15).unwrap();
//! assert!(fit.converged);
//! let corrected = fit.corrected(&signal);
//! assert!((corrected[4] - 5.0).abs() < 1e-6);
//! ```
//!
//! ## Features
//! - `nalgebra` (default): Savitzky-Golay smoothing and the `SparseCholesky` and
//!   `DenseCholesky` solver backends.
//! - `parallelism` (default): process the files of a batch on a `rayon` thread pool.
//! - `plotting`: draw SVG figures of corrected spectra with `plotters`.
//! - `serde`: serialize configurations and results.
//! - `cli`: the `ramansignal` command line program.
pub mod airpls;
pub mod arrayops;
pub mod batch;
pub mod correction;
pub mod penalty;
pub mod prelude;
pub mod smooth;
pub mod solver;
pub mod text;
pub mod whittaker;

#[cfg(feature = "plotting")]
pub mod plot;

#[cfg(test)]
mod test_data;

pub use crate::airpls::{airpls, AirPLS, AirPLSBuilder, BaselineFit, ConvergenceWarning};
pub use crate::correction::{
    BaselineCorrector, BaselineCorrectorBuilder, CorrectedSpectrum, CorrectionConfig,
    CorrectionError, SavitskyGolayConfig,
};
pub use crate::solver::{BandedCholesky, ConjugateGradient, SolverError, SparseSolver};
pub use crate::whittaker::{whittaker_smooth, WhittakerError, WhittakerSmoother};

#[cfg(feature = "nalgebra")]
pub use crate::solver::{DenseCholesky, SparseCholesky};
