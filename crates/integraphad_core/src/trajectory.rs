use crate::error::{IntegrationError, IntegrationResult};
use crate::traits::{value_of, Scalar};
use nalgebra::DMatrix;

/// Row-major table of state vectors indexed by step.
///
/// Row 0 is the initial condition. Rows are appended strictly in order with
/// `commit`, and nothing already committed can be rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTrajectory<T: Scalar> {
    dim: usize,
    rows: Vec<T>,
}

impl<T: Scalar> StateTrajectory<T> {
    /// Seeds row 0 with `initial`, reserving space for `num_steps` more rows.
    pub fn seeded(initial: &[T], num_steps: usize) -> IntegrationResult<Self> {
        if initial.is_empty() {
            return Err(IntegrationError::DimensionMismatch {
                expected: 1,
                got: 0,
            });
        }
        let dim = initial.len();
        let mut rows = Vec::with_capacity(dim * (num_steps + 1));
        rows.extend_from_slice(initial);
        Ok(Self { dim, rows })
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Number of committed rows.
    pub fn len(&self) -> usize {
        self.rows.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&[T]> {
        let start = index * self.dim;
        self.rows.get(start..start + self.dim)
    }

    /// The most recently committed row.
    pub fn last(&self) -> &[T] {
        &self.rows[self.rows.len() - self.dim..]
    }

    pub fn initial(&self) -> &[T] {
        &self.rows[..self.dim]
    }

    /// Appends the next row and returns its index.
    pub fn commit(&mut self, next: &[T]) -> IntegrationResult<usize> {
        if next.len() != self.dim {
            return Err(IntegrationError::DimensionMismatch {
                expected: self.dim,
                got: next.len(),
            });
        }
        self.rows.extend_from_slice(next);
        Ok(self.len() - 1)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.rows.chunks_exact(self.dim)
    }

    /// Value parts of every row as an `(N+1) x D` matrix.
    pub fn values(&self) -> DMatrix<f64> {
        DMatrix::from_row_iterator(
            self.len(),
            self.dim,
            self.rows.iter().map(|&v| value_of(v)),
        )
    }
}
