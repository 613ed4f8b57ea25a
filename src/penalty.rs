//! Difference penalties for penalized least squares smoothing.
//!
//! A difference operator of order `d` over `m` points is the `(m - d) × m` matrix
//! obtained by differencing adjacent rows of the identity matrix `d` times. Every row
//! of the result carries the same stencil, the signed binomial coefficients of order `d`,
//! shifted one column to the right per row, so only the stencil is stored.
//!
//! The normal equations of the smoother are built from the Gram matrix `DᵀD`, which is
//! symmetric and banded with half-bandwidth `d`. [`SymmetricBandMatrix`] stores the lower
//! band of such matrices and is what the [`SparseSolver`](crate::solver::SparseSolver)
//! backends consume.
use std::fmt::Debug;

use num_traits::Float;

/// The `order`-th difference operator over `size` points
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceOperator<F: Float> {
    size: usize,
    order: usize,
    stencil: Vec<F>,
}

impl<F: Float> DifferenceOperator<F> {
    /// Build the operator by repeatedly differencing the rows of the identity.
    ///
    /// Each pass replaces row `r` with `row[r + 1] - row[r]`, removing one row,
    /// so an operator of order `order` has `size - order` rows.
    pub fn new(size: usize, order: usize) -> Self {
        let mut stencil = vec![F::one()];
        for _ in 0..order {
            let n = stencil.len();
            let next: Vec<F> = (0..=n)
                .map(|j| {
                    let shifted = if j > 0 { stencil[j - 1] } else { F::zero() };
                    let current = if j < n { stencil[j] } else { F::zero() };
                    shifted - current
                })
                .collect();
            stencil = next;
        }
        Self {
            size,
            order,
            stencil,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// The number of rows, `size - order`
    pub fn rows(&self) -> usize {
        self.size.saturating_sub(self.order)
    }

    pub fn columns(&self) -> usize {
        self.size
    }

    /// The coefficients shared by every row, starting at the row's own column
    pub fn stencil(&self) -> &[F] {
        &self.stencil
    }

    /// Compute `D · values`
    pub fn apply(&self, values: &[F]) -> Vec<F> {
        (0..self.rows())
            .map(|r| {
                self.stencil
                    .iter()
                    .enumerate()
                    .fold(F::zero(), |acc, (j, c)| acc + *c * values[r + j])
            })
            .collect()
    }

    /// Compute the Gram matrix `DᵀD` in banded form
    pub fn gram(&self) -> SymmetricBandMatrix<F> {
        let mut gram = SymmetricBandMatrix::zeros(self.size, self.order);
        for r in 0..self.rows() {
            for p in 0..=self.order {
                for q in 0..=p {
                    let value = gram.lower(r + p, r + q) + self.stencil[p] * self.stencil[q];
                    gram.set_lower(r + p, r + q, value);
                }
            }
        }
        gram
    }
}

/// A symmetric matrix stored as its lower band.
///
/// `bands[k][i]` holds the entry at row `i + k`, column `i`, for offsets `k` in
/// `0..=bandwidth`. Entries outside the band are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricBandMatrix<F: Float> {
    size: usize,
    bandwidth: usize,
    bands: Vec<Vec<F>>,
}

impl<F: Float> SymmetricBandMatrix<F> {
    pub fn zeros(size: usize, bandwidth: usize) -> Self {
        let bands = (0..=bandwidth)
            .map(|k| vec![F::zero(); size.saturating_sub(k)])
            .collect();
        Self {
            size,
            bandwidth,
            bands,
        }
    }

    /// Build a diagonal matrix from `values`
    pub fn from_diagonal(values: &[F]) -> Self {
        let mut inst = Self::zeros(values.len(), 0);
        inst.bands[0].copy_from_slice(values);
        inst
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bandwidth(&self) -> usize {
        self.bandwidth
    }

    /// The `offset`-th sub-diagonal, `0` being the main diagonal
    pub fn band(&self, offset: usize) -> &[F] {
        &self.bands[offset]
    }

    pub fn diagonal(&self) -> &[F] {
        &self.bands[0]
    }

    /// Read the entry at `(row, col)` from the lower band, requiring `row >= col`
    #[inline]
    pub fn lower(&self, row: usize, col: usize) -> F {
        let offset = row - col;
        if offset > self.bandwidth {
            F::zero()
        } else {
            self.bands[offset][col]
        }
    }

    /// Write the entry at `(row, col)` and, implicitly, its mirror at `(col, row)`.
    ///
    /// # Panics
    /// If `row < col` or the entry falls outside the band
    #[inline]
    pub fn set_lower(&mut self, row: usize, col: usize, value: F) {
        let offset = row - col;
        self.bands[offset][col] = value;
    }

    /// Read any entry of the matrix
    pub fn get(&self, row: usize, col: usize) -> F {
        if row >= col {
            self.lower(row, col)
        } else {
            self.lower(col, row)
        }
    }

    /// Multiply every stored entry by `factor`
    pub fn scaled(mut self, factor: F) -> Self {
        for band in self.bands.iter_mut() {
            band.iter_mut().for_each(|v| *v = *v * factor);
        }
        self
    }

    /// Add `values` to the main diagonal, as in `A + diag(values)`
    pub fn add_diagonal(&mut self, values: &[F]) {
        self.bands[0]
            .iter_mut()
            .zip(values.iter())
            .for_each(|(d, v)| *d = *d + *v);
    }

    /// Compute `A · values`
    pub fn multiply(&self, values: &[F]) -> Vec<F> {
        let mut out: Vec<F> = self.bands[0]
            .iter()
            .zip(values.iter())
            .map(|(d, v)| *d * *v)
            .collect();
        for (k, band) in self.bands.iter().enumerate().skip(1) {
            for (i, a) in band.iter().enumerate() {
                out[i + k] = out[i + k] + *a * values[i];
                out[i] = out[i] + *a * values[i + k];
            }
        }
        out
    }

    /// Iterate over the stored lower-triangle entries as `(row, col, value)`
    pub fn lower_entries(&self) -> impl Iterator<Item = (usize, usize, F)> + '_ {
        self.bands.iter().enumerate().flat_map(|(k, band)| {
            band.iter()
                .enumerate()
                .map(move |(col, value)| (col + k, col, *value))
        })
    }
}

/// Build `diag(weights) + penalty`, the left hand side of the smoothing normal equations
pub fn penalized_system<F: Float + Debug>(
    penalty: &SymmetricBandMatrix<F>,
    weights: &[F],
) -> SymmetricBandMatrix<F> {
    let mut system = penalty.clone();
    system.add_diagonal(weights);
    system
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, vec![1.0])]
    #[case(1, vec![-1.0, 1.0])]
    #[case(2, vec![1.0, -2.0, 1.0])]
    #[case(3, vec![-1.0, 3.0, -3.0, 1.0])]
    fn test_stencil(#[case] order: usize, #[case] expected: Vec<f64>) {
        let op = DifferenceOperator::<f64>::new(10, order);
        assert_eq!(op.stencil(), expected.as_slice());
        assert_eq!(op.rows(), 10 - order);
        assert_eq!(op.columns(), 10);
    }

    #[test]
    fn test_apply_second_difference() {
        let op = DifferenceOperator::<f64>::new(5, 2);
        let squares = [0.0, 1.0, 4.0, 9.0, 16.0];
        assert_eq!(op.apply(&squares), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_gram_first_order() {
        let gram = DifferenceOperator::<f64>::new(5, 1).gram();
        assert_eq!(gram.bandwidth(), 1);
        assert_eq!(gram.diagonal(), &[1.0, 2.0, 2.0, 2.0, 1.0]);
        assert_eq!(gram.band(1), &[-1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_gram_second_order() {
        let gram = DifferenceOperator::<f64>::new(6, 2).gram();
        assert_eq!(gram.diagonal(), &[1.0, 5.0, 6.0, 6.0, 5.0, 1.0]);
        assert_eq!(gram.band(1), &[-2.0, -4.0, -4.0, -4.0, -2.0]);
        assert_eq!(gram.band(2), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_gram_matches_product() {
        // DᵀD x == Dᵀ (D x)
        let op = DifferenceOperator::<f64>::new(8, 2);
        let x: Vec<f64> = (0..8).map(|i| ((i * i) as f64).sin()).collect();
        let dx = op.apply(&x);
        let mut expected = vec![0.0; 8];
        for (r, v) in dx.iter().enumerate() {
            for (j, c) in op.stencil().iter().enumerate() {
                expected[r + j] += c * v;
            }
        }
        let observed = op.gram().multiply(&x);
        for (a, b) in observed.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12, "{a} != {b}");
        }
    }

    #[test]
    fn test_penalized_system() {
        let penalty = DifferenceOperator::<f64>::new(4, 1).gram().scaled(10.0);
        let system = penalized_system(&penalty, &[1.0, 0.0, 2.0, 1.0]);
        assert_eq!(system.diagonal(), &[11.0, 20.0, 22.0, 11.0]);
        assert_eq!(system.get(0, 1), -10.0);
        assert_eq!(system.get(1, 0), -10.0);
        assert_eq!(system.get(0, 2), 0.0);
        assert_eq!(system.lower_entries().count(), 7);
    }
}
