//! Linear solvers for the symmetric positive definite banded systems produced by
//! penalized least squares smoothing.
//!
//! [`SparseSolver`] is the seam between the smoothing algorithms and the linear
//! algebra. [`BandedCholesky`] is the default backend and works in `O(m·d²)` time for
//! an `m × m` system with half-bandwidth `d`. [`ConjugateGradient`] is a matrix-free
//! iterative alternative. With the `nalgebra` feature, [`SparseCholesky`] factors a
//! compressed sparse column copy of the system and [`DenseCholesky`] solves a dense
//! copy, which is only sensible for small systems.
use std::fmt::Debug;

use log::trace;
use num_traits::Float;
use thiserror::Error;

use crate::penalty::SymmetricBandMatrix;

/// All the ways solving a smoothing system can fail
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("The system has {expected} rows but the right hand side has {found} entries")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("The system is not positive definite (failed at pivot {0:?})")]
    NotPositiveDefinite(Option<usize>),
    #[error("The iterative solver did not converge after {iterations} iterations, relative residual {residual}")]
    DidNotConverge { iterations: usize, residual: f64 },
    #[error("The solution contains non-finite values")]
    NonFiniteSolution,
    #[error("The solver backend failed: {0}")]
    Backend(String),
}

/// Solve `A x = b` for a symmetric positive definite banded `A`
pub trait SparseSolver<F: Float> {
    fn solve(&self, system: &SymmetricBandMatrix<F>, rhs: &[F]) -> Result<Vec<F>, SolverError>;
}

impl<F: Float, S: SparseSolver<F> + ?Sized> SparseSolver<F> for &S {
    fn solve(&self, system: &SymmetricBandMatrix<F>, rhs: &[F]) -> Result<Vec<F>, SolverError> {
        (**self).solve(system, rhs)
    }
}

fn check_dimensions<F: Float>(
    system: &SymmetricBandMatrix<F>,
    rhs: &[F],
) -> Result<(), SolverError> {
    if system.size() != rhs.len() {
        Err(SolverError::DimensionMismatch {
            expected: system.size(),
            found: rhs.len(),
        })
    } else {
        Ok(())
    }
}

fn check_finite<F: Float>(solution: Vec<F>) -> Result<Vec<F>, SolverError> {
    if solution.iter().all(|v| v.is_finite()) {
        Ok(solution)
    } else {
        Err(SolverError::NonFiniteSolution)
    }
}

/// A Cholesky factorization `A = L Lᵀ` that keeps `L` inside the band of `A`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BandedCholesky;

impl BandedCholesky {
    pub fn new() -> Self {
        Self
    }

    /// Factor `system`, returning `L` in the same lower band layout.
    ///
    /// A pivot that is not positive, or that vanishes relative to the matching
    /// diagonal entry of `system`, means the system is singular or indefinite.
    pub fn factor<F: Float>(
        &self,
        system: &SymmetricBandMatrix<F>,
    ) -> Result<SymmetricBandMatrix<F>, SolverError> {
        let n = system.size();
        let k = system.bandwidth();
        let mut factor = SymmetricBandMatrix::zeros(n, k);
        let size_scale = F::from(n.max(1)).unwrap() * F::epsilon();

        for i in 0..n {
            let start = i.saturating_sub(k);
            let a_ii = system.lower(i, i);
            let mut pivot = a_ii;
            for t in start..i {
                let v = factor.lower(i, t);
                pivot = pivot - v * v;
            }
            if !(pivot > size_scale * a_ii.abs()) || !pivot.is_finite() {
                return Err(SolverError::NotPositiveDefinite(Some(i)));
            }
            let l_ii = pivot.sqrt();
            factor.set_lower(i, i, l_ii);

            for row in (i + 1)..(i + k + 1).min(n) {
                let start = row.saturating_sub(k);
                let mut acc = system.lower(row, i);
                for t in start..i {
                    acc = acc - factor.lower(row, t) * factor.lower(i, t);
                }
                factor.set_lower(row, i, acc / l_ii);
            }
        }
        Ok(factor)
    }

    /// Solve `L Lᵀ x = b` given a factor from [`BandedCholesky::factor`]
    pub fn solve_factored<F: Float>(&self, factor: &SymmetricBandMatrix<F>, rhs: &[F]) -> Vec<F> {
        let n = factor.size();
        let k = factor.bandwidth();

        let mut y = vec![F::zero(); n];
        for i in 0..n {
            let mut acc = rhs[i];
            for t in i.saturating_sub(k)..i {
                acc = acc - factor.lower(i, t) * y[t];
            }
            y[i] = acc / factor.lower(i, i);
        }

        let mut x = vec![F::zero(); n];
        for i in (0..n).rev() {
            let mut acc = y[i];
            for row in (i + 1)..(i + k + 1).min(n) {
                acc = acc - factor.lower(row, i) * x[row];
            }
            x[i] = acc / factor.lower(i, i);
        }
        x
    }
}

impl<F: Float> SparseSolver<F> for BandedCholesky {
    fn solve(&self, system: &SymmetricBandMatrix<F>, rhs: &[F]) -> Result<Vec<F>, SolverError> {
        check_dimensions(system, rhs)?;
        let factor = self.factor(system)?;
        check_finite(self.solve_factored(&factor, rhs))
    }
}

/// Jacobi preconditioned conjugate gradient iteration.
///
/// Never forms a factorization, only matrix-vector products with the band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConjugateGradient {
    /// Stop once `‖b - Ax‖ <= tolerance · ‖b‖`
    pub tolerance: f64,
    /// Iteration cap, defaulting to ten times the system size when `None`
    pub max_iterations: Option<usize>,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: None,
        }
    }
}

impl ConjugateGradient {
    pub fn new(tolerance: f64, max_iterations: Option<usize>) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }
}

fn dot<F: Float>(a: &[F], b: &[F]) -> F {
    a.iter()
        .zip(b.iter())
        .fold(F::zero(), |acc, (x, y)| acc + *x * *y)
}

impl<F: Float + Debug> SparseSolver<F> for ConjugateGradient {
    fn solve(&self, system: &SymmetricBandMatrix<F>, rhs: &[F]) -> Result<Vec<F>, SolverError> {
        check_dimensions(system, rhs)?;
        let n = system.size();
        let max_iterations = self.max_iterations.unwrap_or(10 * n.max(1));
        let tolerance = F::from(self.tolerance).unwrap();

        let diagonal = system.diagonal();
        if let Some(i) = diagonal.iter().position(|d| !(*d > F::zero())) {
            return Err(SolverError::NotPositiveDefinite(Some(i)));
        }

        let mut x = vec![F::zero(); n];
        let rhs_norm = dot(rhs, rhs).sqrt();
        if rhs_norm == F::zero() {
            return Ok(x);
        }

        let mut residual = rhs.to_vec();
        let mut z: Vec<F> = residual
            .iter()
            .zip(diagonal.iter())
            .map(|(r, d)| *r / *d)
            .collect();
        let mut direction = z.clone();
        let mut rz = dot(&residual, &z);
        let mut relative_residual = F::one();

        for iteration in 0..max_iterations {
            let a_dir = system.multiply(&direction);
            let curvature = dot(&direction, &a_dir);
            if !(curvature > F::zero()) {
                return Err(SolverError::NotPositiveDefinite(None));
            }
            let alpha = rz / curvature;
            x.iter_mut()
                .zip(direction.iter())
                .for_each(|(xi, pi)| *xi = *xi + alpha * *pi);
            residual
                .iter_mut()
                .zip(a_dir.iter())
                .for_each(|(ri, ai)| *ri = *ri - alpha * *ai);

            relative_residual = dot(&residual, &residual).sqrt() / rhs_norm;
            if relative_residual <= tolerance {
                trace!("Conjugate gradient converged after {} iterations", iteration + 1);
                return check_finite(x);
            }

            z.iter_mut()
                .zip(residual.iter().zip(diagonal.iter()))
                .for_each(|(zi, (ri, di))| *zi = *ri / *di);
            let rz_next = dot(&residual, &z);
            let beta = rz_next / rz;
            rz = rz_next;
            direction
                .iter_mut()
                .zip(z.iter())
                .for_each(|(pi, zi)| *pi = *zi + beta * *pi);
        }
        Err(SolverError::DidNotConverge {
            iterations: max_iterations,
            residual: relative_residual.to_f64().unwrap_or(f64::NAN),
        })
    }
}

/// Cholesky factorization of a compressed sparse column copy of the system
#[cfg(feature = "nalgebra")]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SparseCholesky;

/// Cholesky factorization of a dense copy of the system. Only suitable for small
/// systems, for cross-checking the sparse backends.
#[cfg(feature = "nalgebra")]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DenseCholesky;

#[cfg(feature = "nalgebra")]
mod nalgebra_impl {
    use nalgebra::{DMatrix, DVector, RealField};
    use nalgebra_sparse::factorization::CscCholesky;
    use nalgebra_sparse::{CooMatrix, CscMatrix};

    use super::*;

    fn collect_finite<F: Float + RealField>(values: &[F]) -> Result<Vec<F>, SolverError> {
        if values.iter().all(|v| Float::is_finite(*v)) {
            Ok(values.to_vec())
        } else {
            Err(SolverError::NonFiniteSolution)
        }
    }

    impl<F: Float + RealField> SparseSolver<F> for SparseCholesky {
        fn solve(
            &self,
            system: &SymmetricBandMatrix<F>,
            rhs: &[F],
        ) -> Result<Vec<F>, SolverError> {
            check_dimensions(system, rhs)?;
            let n = system.size();
            let mut coo = CooMatrix::new(n, n);
            for (row, col, value) in system.lower_entries() {
                coo.push(row, col, value);
                if row != col {
                    coo.push(col, row, value);
                }
            }
            let csc = CscMatrix::from(&coo);
            let factor = CscCholesky::factor(&csc)
                .map_err(|err| SolverError::Backend(format!("{err:?}")))?;
            let b = DMatrix::from_column_slice(n, 1, rhs);
            let solution = factor.solve(&b);
            collect_finite(solution.as_slice())
        }
    }

    impl<F: Float + RealField> SparseSolver<F> for DenseCholesky {
        fn solve(
            &self,
            system: &SymmetricBandMatrix<F>,
            rhs: &[F],
        ) -> Result<Vec<F>, SolverError> {
            check_dimensions(system, rhs)?;
            let n = system.size();
            let dense = DMatrix::from_fn(n, n, |i, j| system.get(i, j));
            let decomp = dense
                .cholesky()
                .ok_or(SolverError::NotPositiveDefinite(None))?;
            let solution = decomp.solve(&DVector::from_column_slice(rhs));
            collect_finite(solution.as_slice())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::penalty::{penalized_system, DifferenceOperator};

    fn smoothing_system(n: usize, order: usize, lambda: f64) -> SymmetricBandMatrix<f64> {
        let penalty = DifferenceOperator::new(n, order).gram().scaled(lambda);
        let weights: Vec<f64> = (0..n).map(|i| 0.5 + (i % 3) as f64).collect();
        penalized_system(&penalty, &weights)
    }

    fn rhs(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i as f64 * 0.7).sin() * 3.0 + 1.0).collect()
    }

    fn assert_solves(system: &SymmetricBandMatrix<f64>, x: &[f64], b: &[f64], tol: f64) {
        let ax = system.multiply(x);
        for (i, (a, b)) in ax.iter().zip(b.iter()).enumerate() {
            assert!((a - b).abs() < tol, "Row {i}: {a} != {b}");
        }
    }

    #[test]
    fn test_banded_cholesky() {
        for order in 1..4 {
            let system = smoothing_system(40, order, 25.0);
            let b = rhs(40);
            let x = BandedCholesky.solve(&system, &b).unwrap();
            assert_solves(&system, &x, &b, 1e-8);
        }
    }

    #[test]
    fn test_banded_cholesky_diagonal() {
        let system = SymmetricBandMatrix::from_diagonal(&[2.0, 4.0, 8.0]);
        let x = BandedCholesky.solve(&system, &[2.0, 2.0, 2.0]).unwrap();
        assert_eq!(x, vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn test_conjugate_gradient() {
        let system = smoothing_system(50, 2, 10.0);
        let b = rhs(50);
        let x = ConjugateGradient::default().solve(&system, &b).unwrap();
        let y = BandedCholesky.solve(&system, &b).unwrap();
        for (a, b) in x.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} != {b}");
        }
    }

    #[test]
    fn test_conjugate_gradient_iteration_cap() {
        let system = smoothing_system(50, 2, 1e4);
        let b = rhs(50);
        let err = ConjugateGradient::new(1e-14, Some(1))
            .solve(&system, &b)
            .unwrap_err();
        assert!(matches!(err, SolverError::DidNotConverge { iterations: 1, .. }));
    }

    #[test]
    fn test_singular_system() {
        // A pure first difference penalty annihilates constants
        let system = DifferenceOperator::<f64>::new(10, 1).gram().scaled(100.0);
        let err = BandedCholesky.solve(&system, &rhs(10)).unwrap_err();
        assert_eq!(err, SolverError::NotPositiveDefinite(Some(9)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let system = smoothing_system(10, 1, 1.0);
        let err = BandedCholesky.solve(&system, &rhs(9)).unwrap_err();
        assert_eq!(
            err,
            SolverError::DimensionMismatch {
                expected: 10,
                found: 9
            }
        );
        let err = ConjugateGradient::default()
            .solve(&system, &rhs(11))
            .unwrap_err();
        assert!(matches!(err, SolverError::DimensionMismatch { .. }));
    }

    #[cfg(feature = "nalgebra")]
    #[test]
    fn test_backends_agree() {
        for order in 1..=3 {
            let system = smoothing_system(30, order, 50.0);
            let b = rhs(30);
            let banded = BandedCholesky.solve(&system, &b).unwrap();
            let sparse = SparseCholesky.solve(&system, &b).unwrap();
            let dense = DenseCholesky.solve(&system, &b).unwrap();
            for i in 0..30 {
                assert!((banded[i] - sparse[i]).abs() < 1e-8);
                assert!((banded[i] - dense[i]).abs() < 1e-8);
            }
        }
    }
}
