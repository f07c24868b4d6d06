use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};

/// A sparse matrix in CSC form, built from triplets. Thin wrapper around
/// `sprs::CsMat` so the reduction and linear-solver modules share one
/// assembly/inspection surface instead of passing raw `sprs` types around.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    csc: CsMat<f64>,
}

impl SparseMatrix {
    pub fn from_triplets(
        shape: (usize, usize),
        rows: &[usize],
        cols: &[usize],
        values: &[f64],
    ) -> Self {
        let mut tri = TriMat::new(shape);
        for ((&r, &c), &v) in rows.iter().zip(cols.iter()).zip(values.iter()) {
            tri.add_triplet(r, c, v);
        }
        Self {
            csc: tri.to_csc(),
        }
    }

    pub fn from_csc(csc: CsMat<f64>) -> Self {
        Self { csc }
    }

    pub fn nrows(&self) -> usize {
        self.csc.rows()
    }

    pub fn ncols(&self) -> usize {
        self.csc.cols()
    }

    pub fn csc(&self) -> &CsMat<f64> {
        &self.csc
    }

    pub fn diagonal(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        let mut diag = vec![0.0; n];
        for (value, (r, c)) in self.csc.iter() {
            if r == c {
                diag[r] = *value;
            }
        }
        diag
    }

    pub fn row_entries(&self, row: usize) -> Vec<(usize, f64)> {
        self.csc
            .iter()
            .filter(|(_, (r, _))| *r == row)
            .map(|(v, (_, c))| (c, *v))
            .collect()
    }

    pub fn mat_vec(&self, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; self.nrows()];
        for (value, (r, c)) in self.csc.iter() {
            y[r] += value * x[c];
        }
        y
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::<f64>::zeros(self.nrows(), self.ncols());
        for (value, (r, c)) in self.csc.iter() {
            dense[(r, c)] = *value;
        }
        dense
    }

    /// Symmetric transpose-row-scaling: returns `self` with each row `r` scaled
    /// by `scale[r]`, used to build `D^-1 * B^T`-style intermediates without a
    /// generic sparse-sparse product.
    pub fn scale_rows(&self, scale: &[f64]) -> Self {
        let mut tri = TriMat::new((self.nrows(), self.ncols()));
        for (value, (r, c)) in self.csc.iter() {
            tri.add_triplet(r, c, value * scale[r]);
        }
        Self {
            csc: tri.to_csc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triplets_accumulate_into_dense() {
        let m = SparseMatrix::from_triplets((2, 2), &[0, 0, 1], &[0, 1, 1], &[1.0, 2.0, 3.0]);
        let dense = m.to_dense();
        assert_eq!(dense[(0, 0)], 1.0);
        assert_eq!(dense[(0, 1)], 2.0);
        assert_eq!(dense[(1, 1)], 3.0);
    }

    #[test]
    fn mat_vec_matches_dense() {
        let m = SparseMatrix::from_triplets((2, 2), &[0, 0, 1], &[0, 1, 1], &[1.0, 2.0, 3.0]);
        let y = m.mat_vec(&[1.0, 1.0]);
        assert_eq!(y, vec![3.0, 3.0]);
    }

    #[test]
    fn diagonal_extraction() {
        let m = SparseMatrix::from_triplets((2, 2), &[0, 1], &[0, 1], &[5.0, 7.0]);
        assert_eq!(m.diagonal(), vec![5.0, 7.0]);
    }
}
