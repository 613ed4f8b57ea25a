//! Correct the baseline of a single spectrum, optionally pre-smoothing it first.
//!
//! [`BaselineCorrector`] ties together the optional [`savitsky_golay`](crate::smooth)
//! pre-filter and the [`AirPLS`] baseline estimator, and returns every intermediate
//! array in a [`CorrectedSpectrum`] so callers can write or plot them.
use log::debug;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::airpls::{AirPLS, ConvergenceWarning, DEFAULT_TOLERANCE_RATIO};
use crate::smooth::SavitskyGolayError;
use crate::whittaker::WhittakerError;

/// All the ways correcting a spectrum can fail
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorrectionError {
    #[error("The x and y arrays do not match in length ({0} != {1})")]
    LengthMismatch(usize, usize),
    #[error("Failed to pre-filter the signal: {0}")]
    Prefilter(#[from] SavitskyGolayError),
    #[error("Savitzky-Golay pre-filtering requires the `nalgebra` feature")]
    PrefilterUnavailable,
    #[error("Failed to estimate the baseline: {0}")]
    Baseline(#[from] WhittakerError),
}

/// Savitzky-Golay pre-filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SavitskyGolayConfig {
    /// Odd number of points per window, no longer than the signal. Larger windows smooth
    /// more aggressively.
    pub window_length: usize,
    /// Polynomial order, less than `window_length`. Lower orders smooth more aggressively.
    pub poly_order: usize,
}

impl Default for SavitskyGolayConfig {
    fn default() -> Self {
        Self {
            window_length: 21,
            poly_order: 3,
        }
    }
}

/// Parameters for [`BaselineCorrector`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CorrectionConfig {
    pub lambda: f64,
    pub order: usize,
    pub max_iterations: usize,
    pub tolerance_ratio: f64,
    /// Smooth the signal before estimating its baseline when set
    pub prefilter: Option<SavitskyGolayConfig>,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            lambda: 100.0,
            order: 1,
            max_iterations: 15,
            tolerance_ratio: DEFAULT_TOLERANCE_RATIO,
            prefilter: None,
        }
    }
}

/// The arrays produced while correcting a spectrum
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorrectedSpectrum {
    pub x: Vec<f64>,
    /// The signal as given
    pub y: Vec<f64>,
    /// The pre-filtered signal, if a pre-filter was configured
    pub smoothed: Option<Vec<f64>>,
    pub baseline: Vec<f64>,
    /// The signal the baseline was fit to minus the baseline
    pub corrected: Vec<f64>,
    pub converged: bool,
    pub iterations: usize,
}

impl CorrectedSpectrum {
    /// The signal the baseline was estimated from, the smoothed signal when present
    pub fn signal(&self) -> &[f64] {
        self.smoothed.as_deref().unwrap_or(&self.y)
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "nalgebra")] {
        fn prefilter(y: &[f64], config: &SavitskyGolayConfig) -> Result<Vec<f64>, CorrectionError> {
            Ok(crate::smooth::savitsky_golay(y, config.window_length, config.poly_order, 0)?)
        }
    } else {
        fn prefilter(_y: &[f64], _config: &SavitskyGolayConfig) -> Result<Vec<f64>, CorrectionError> {
            Err(CorrectionError::PrefilterUnavailable)
        }
    }
}

/// Remove the baseline from spectra according to a [`CorrectionConfig`]
#[derive(Debug, Clone, Default)]
pub struct BaselineCorrector {
    config: CorrectionConfig,
}

impl From<CorrectionConfig> for BaselineCorrector {
    fn from(config: CorrectionConfig) -> Self {
        Self::new(config)
    }
}

impl BaselineCorrector {
    pub fn new(config: CorrectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// The baseline estimator configured from [`BaselineCorrector::config`]
    pub fn estimator(&self) -> AirPLS {
        let mut estimator = AirPLS::new(
            self.config.lambda,
            self.config.order,
            self.config.max_iterations,
        );
        estimator.tolerance_ratio = self.config.tolerance_ratio;
        estimator
    }

    /// Correct the spectrum `(x, y)`.
    ///
    /// A fit that stopped at the iteration cap is still returned, with
    /// [`CorrectedSpectrum::converged`] unset.
    pub fn correct(&self, x: &[f64], y: &[f64]) -> Result<CorrectedSpectrum, CorrectionError> {
        self.correct_with_warning(x, y).map(|(spectrum, _)| spectrum)
    }

    /// Like [`BaselineCorrector::correct`], also returning the convergence warning if
    /// the baseline estimate stopped at the iteration cap
    pub fn correct_with_warning(
        &self,
        x: &[f64],
        y: &[f64],
    ) -> Result<(CorrectedSpectrum, Option<ConvergenceWarning>), CorrectionError> {
        if x.len() != y.len() {
            return Err(CorrectionError::LengthMismatch(x.len(), y.len()));
        }
        let smoothed = match &self.config.prefilter {
            Some(config) => {
                debug!(
                    "Pre-filtering with window {} and order {}",
                    config.window_length, config.poly_order
                );
                Some(prefilter(y, config)?)
            }
            None => None,
        };
        let signal = smoothed.as_deref().unwrap_or(y);
        let fit = self.estimator().fit(signal)?;
        let warning = fit.warning();
        let corrected = fit.corrected(signal);
        let spectrum = CorrectedSpectrum {
            x: x.to_vec(),
            y: y.to_vec(),
            smoothed,
            converged: fit.converged,
            iterations: fit.iterations,
            baseline: fit.into_baseline(),
            corrected,
        };
        Ok((spectrum, warning))
    }
}

/// A builder for configuring [`BaselineCorrector`]
#[derive(Debug, Clone, Default)]
pub struct BaselineCorrectorBuilder {
    config: CorrectionConfig,
}

impl BaselineCorrectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lambda(&mut self, lambda: f64) -> &mut Self {
        self.config.lambda = lambda;
        self
    }

    pub fn order(&mut self, order: usize) -> &mut Self {
        self.config.order = order;
        self
    }

    pub fn max_iterations(&mut self, max_iterations: usize) -> &mut Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn tolerance_ratio(&mut self, tolerance_ratio: f64) -> &mut Self {
        self.config.tolerance_ratio = tolerance_ratio;
        self
    }

    pub fn prefilter(&mut self, prefilter: Option<SavitskyGolayConfig>) -> &mut Self {
        self.config.prefilter = prefilter;
        self
    }

    pub fn build(&self) -> BaselineCorrector {
        BaselineCorrector::new(self.config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data::synthetic_spectrum;

    #[test]
    fn test_correct() {
        let (x, y, _) = synthetic_spectrum(500);
        let corrector = BaselineCorrector::default();
        let spectrum = corrector.correct(&x, &y).unwrap();
        assert_eq!(spectrum.len(), 500);
        assert!(spectrum.smoothed.is_none());
        assert_eq!(spectrum.signal(), y.as_slice());
        for i in 0..500 {
            let total = spectrum.baseline[i] + spectrum.corrected[i];
            assert!((total - y[i]).abs() < 1e-9);
        }
        let expected = airpls_reference(&y);
        assert_eq!(spectrum.baseline, expected);
    }

    fn airpls_reference(y: &[f64]) -> Vec<f64> {
        crate::airpls::airpls(y, 100.0, 1, 15).unwrap().baseline
    }

    #[cfg(feature = "nalgebra")]
    #[test]
    fn test_correct_with_prefilter() {
        let (x, y, _) = synthetic_spectrum(500);
        let corrector = BaselineCorrectorBuilder::new()
            .prefilter(Some(SavitskyGolayConfig::default()))
            .build();
        let spectrum = corrector.correct(&x, &y).unwrap();
        let smoothed = spectrum.smoothed.as_ref().unwrap();
        assert_eq!(smoothed.len(), 500);
        assert_eq!(spectrum.signal(), smoothed.as_slice());
        for i in 0..500 {
            let total = spectrum.baseline[i] + spectrum.corrected[i];
            assert!((total - smoothed[i]).abs() < 1e-9);
        }
    }

    #[cfg(feature = "nalgebra")]
    #[test]
    fn test_prefilter_error() {
        let corrector = BaselineCorrectorBuilder::new()
            .prefilter(Some(SavitskyGolayConfig {
                window_length: 21,
                poly_order: 3,
            }))
            .build();
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let err = corrector.correct(&x, &x).unwrap_err();
        assert_eq!(
            err,
            CorrectionError::Prefilter(SavitskyGolayError::WindowLengthTooLong(21, 10))
        );
    }

    #[test]
    fn test_length_mismatch() {
        let err = BaselineCorrector::default()
            .correct(&[1.0, 2.0, 3.0], &[1.0, 2.0])
            .unwrap_err();
        assert_eq!(err, CorrectionError::LengthMismatch(3, 2));
    }

    #[test]
    fn test_baseline_error_propagates() {
        let corrector = BaselineCorrectorBuilder::new().lambda(-1.0).build();
        let err = corrector.correct(&[1.0, 2.0], &[1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            CorrectionError::Baseline(WhittakerError::InvalidLambda(-1.0))
        );
    }

    #[test]
    fn test_warning() {
        let corrector = BaselineCorrectorBuilder::new().max_iterations(1).build();
        let y = vec![0.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let (spectrum, warning) = corrector.correct_with_warning(&x, &y).unwrap();
        assert!(!spectrum.converged);
        let warning = warning.unwrap();
        assert_eq!(warning.iterations, 1);
        assert!((warning.tolerance - 0.005).abs() < 1e-12);
        assert!(warning.negative_residual > warning.tolerance);
    }
}
