//! Savitzky-Golay smoothing, used to pre-filter noisy spectra before baseline correction.
//!
//! Each interior point is replaced by the value at the window center of a least squares
//! polynomial fit over the surrounding window. The first and last half-windows are
//! taken from a single polynomial fit to the first and last full windows.
use num_traits::Float;
use thiserror::Error;

/// Invalid Savitzky-Golay filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SavitskyGolayError {
    #[error("The window length must be odd, received {0}")]
    WindowLengthNotOdd(usize),
    #[error("A window of {0} points does not fit in a signal of {1} points")]
    WindowLengthTooLong(usize, usize),
    #[error("The polynomial order {0} must be less than the window length {1}")]
    PolynomialOrderTooLarge(usize, usize),
    #[error("Least squares solve failed: {0}")]
    FailedToSolveCoefficients(&'static str),
}

/// A polynomial in ascending coefficient order, `c[0] + c[1]·x + c[2]·x² + ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial<F: Float> {
    coefficients: Vec<F>,
    order: usize,
}

impl<F: Float> Polynomial<F> {
    pub fn new(coefficients: Vec<F>, order: usize) -> Self {
        Self {
            coefficients,
            order,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn derivative(&self) -> Self {
        let coefficients = self.coefficients[1.min(self.coefficients.len())..]
            .iter()
            .zip(1..)
            .map(|(c, power)| *c * F::from(power).unwrap())
            .collect();
        Self::new(coefficients, self.order.saturating_sub(1))
    }

    /// Differentiate `times` times
    pub fn nth_derivative(&self, times: usize) -> Self {
        (0..times).fold(self.clone(), |poly, _| poly.derivative())
    }

    pub fn coefficients(&self) -> &[F] {
        &self.coefficients
    }

    /// Evaluate the polynomial at each of `values` with Horner's rule
    pub fn eval(&self, values: &[F]) -> Vec<F> {
        values
            .iter()
            .map(|v| {
                self.coefficients
                    .iter()
                    .rev()
                    .fold(F::zero(), |acc, c| acc * *v + *c)
            })
            .collect()
    }
}

impl<F: Float> AsRef<[F]> for Polynomial<F> {
    fn as_ref(&self) -> &[F] {
        &self.coefficients
    }
}

#[cfg(feature = "nalgebra")]
mod nalgebra_impl {
    use std::fmt::Debug;

    use log::trace;
    use nalgebra::{DMatrix, DVector, RealField};

    use super::*;

    fn factorial(n: usize) -> usize {
        (1..=n).product()
    }

    /// A validated filter over one signal
    #[derive(Debug, Clone)]
    struct SavitskyGolayFilter<'a, F: Float> {
        signal: &'a [F],
        window_length: usize,
        poly_order: usize,
        derivative: usize,
    }

    impl<'a, F> SavitskyGolayFilter<'a, F>
    where
        F: Float + Debug + RealField,
    {
        fn new(
            signal: &'a [F],
            window_length: usize,
            poly_order: usize,
            derivative: usize,
        ) -> Result<Self, SavitskyGolayError> {
            if window_length % 2 == 0 {
                return Err(SavitskyGolayError::WindowLengthNotOdd(window_length));
            }
            if window_length > signal.len() {
                return Err(SavitskyGolayError::WindowLengthTooLong(
                    window_length,
                    signal.len(),
                ));
            }
            if poly_order >= window_length {
                return Err(SavitskyGolayError::PolynomialOrderTooLarge(
                    poly_order,
                    window_length,
                ));
            }
            Ok(Self {
                signal,
                window_length,
                poly_order,
                derivative,
            })
        }

        const fn half_window(&self) -> usize {
            self.window_length / 2
        }

        /// The filter weights applied to a window, in window order
        fn estimate_coefficients(&self) -> Result<DVector<F>, SavitskyGolayError> {
            if self.derivative > self.poly_order {
                return Ok(DVector::from_element(self.window_length, F::zero()));
            }
            let half = F::from(self.half_window()).unwrap();
            // Vandermonde matrix over window positions relative to the center
            let vandermonde =
                DMatrix::from_fn(self.poly_order + 1, self.window_length, |i, j| {
                    Float::powi(F::from(j).unwrap() - half, i as i32)
                });

            let mut y = DVector::from_element(self.poly_order + 1, F::zero());
            y[self.derivative] = F::from(factorial(self.derivative)).unwrap();

            // Minimum norm least squares through the SVD, see https://github.com/strawlab/lstsq
            let svd = nalgebra::linalg::SVD::new(vandermonde, true, true);
            svd.solve(&y, F::from(1e-12).unwrap())
                .map_err(SavitskyGolayError::FailedToSolveCoefficients)
        }

        fn polyfit(&self, x: &[F], y: &[F]) -> Result<Vec<F>, SavitskyGolayError> {
            let nc = self.poly_order + 1;
            let nr = x.len();

            let system =
                DMatrix::from_fn(nr, nc, |row_i, col_j| Float::powi(x[row_i], col_j as i32));

            let beta = DVector::from_row_slice(y);
            let decomp = nalgebra::linalg::SVD::new(system, true, true);

            let poly_coefs = decomp
                .solve(&beta, F::from(1e-18).unwrap())
                .map_err(SavitskyGolayError::FailedToSolveCoefficients)?;
            Ok(poly_coefs.iter().copied().collect())
        }

        /// Fit a polynomial to `signal[window_start..window_stop]` and write its values
        /// (or derivative) at `interp_start..interp_stop` into `out`
        fn fit_edge(
            &self,
            window_start: usize,
            window_stop: usize,
            interp_start: usize,
            interp_stop: usize,
            out: &mut [F],
        ) -> Result<(), SavitskyGolayError> {
            let x_edge: Vec<F> = (0..window_stop - window_start)
                .map(|i| F::from(i).unwrap())
                .collect();
            let y_edge = &self.signal[window_start..window_stop];

            let poly_coefs = Polynomial::new(self.polyfit(&x_edge, y_edge)?, self.poly_order);
            let poly_coefs = poly_coefs.nth_derivative(self.derivative);
            let i: Vec<F> = (interp_start..interp_stop)
                .map(|i| F::from(i - window_start).unwrap())
                .collect();
            let values = poly_coefs.eval(&i);
            out[interp_start..interp_stop].copy_from_slice(&values);
            Ok(())
        }

        fn fit_edges(&self, out: &mut [F]) -> Result<(), SavitskyGolayError> {
            let n = self.signal.len();
            let half = self.half_window();
            self.fit_edge(0, self.window_length, 0, half, out)?;
            self.fit_edge(n - self.window_length, n, n - half, n, out)
        }

        fn apply(&self) -> Result<Vec<F>, SavitskyGolayError> {
            let coefs = self.estimate_coefficients()?;
            trace!("Savitzky-Golay coefficients: {coefs:?}");
            let n = self.signal.len();
            let half = self.half_window();
            let mut out = vec![F::zero(); n];
            for i in half..(n - half) {
                let window = &self.signal[i - half..=i + half];
                out[i] = window
                    .iter()
                    .zip(coefs.iter())
                    .fold(F::zero(), |acc, (y, c)| acc + *y * *c);
            }
            self.fit_edges(&mut out)?;
            Ok(out)
        }
    }

    /// Smooth `data` (or estimate its `derivative`-th derivative at unit spacing) with a
    /// Savitzky-Golay filter of `window_length` points and polynomial order `poly_order`.
    pub fn savitsky_golay<F>(
        data: &[F],
        window_length: usize,
        poly_order: usize,
        derivative: usize,
    ) -> Result<Vec<F>, SavitskyGolayError>
    where
        F: Float + Debug + RealField,
    {
        SavitskyGolayFilter::new(data, window_length, poly_order, derivative)?.apply()
    }
}

#[cfg(feature = "nalgebra")]
pub use nalgebra_impl::savitsky_golay;
