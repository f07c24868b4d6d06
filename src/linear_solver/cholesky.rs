use crate::matrix::SparseMatrix;
use std::collections::BTreeMap;

/// A left-looking sparse Cholesky factorization `A = L L^T` of a symmetric
/// positive-definite matrix, stored column-by-column. Intended for the Schur
/// complement and fully-reduced systems, whose sparsity pattern is fixed
/// across iterations: [`SparseCholesky::factorize`] is cheap to call again
/// each iteration (no separate symbolic phase is cached here, since a
/// not-maximally-supernodal left-looking factorization is already simple
/// enough to redo in full on every refactor at the grid sizes this engine
/// targets).
#[derive(Debug, Clone)]
pub struct SparseCholesky {
    n: usize,
    /// `columns[j]` holds `(row, value)` pairs with `row >= j`, including the
    /// diagonal entry first.
    columns: Vec<Vec<(usize, f64)>>,
}

impl SparseCholesky {
    pub fn factorize(matrix: &SparseMatrix) -> Option<Self> {
        let n = matrix.nrows();
        debug_assert_eq!(matrix.nrows(), matrix.ncols());

        let mut lower_of_a: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for (value, (r, c)) in matrix.csc().iter() {
            if r >= c {
                lower_of_a[c].push((r, *value));
            }
        }

        let mut columns: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];

        for j in 0..n {
            let mut col: BTreeMap<usize, f64> = BTreeMap::new();
            for &(r, v) in &lower_of_a[j] {
                *col.entry(r).or_insert(0.0) += v;
            }

            for k in 0..j {
                let l_jk = columns[k]
                    .iter()
                    .find(|&&(r, _)| r == j)
                    .map(|&(_, v)| v);
                if let Some(l_jk) = l_jk {
                    for &(r, l_rk) in &columns[k] {
                        if r >= j {
                            *col.entry(r).or_insert(0.0) -= l_jk * l_rk;
                        }
                    }
                }
            }

            let diag = *col.get(&j)?;
            if diag <= 0.0 {
                return None;
            }
            let l_jj = diag.sqrt();

            let mut this_col = Vec::with_capacity(col.len());
            this_col.push((j, l_jj));
            for (&r, &v) in col.iter() {
                if r > j {
                    this_col.push((r, v / l_jj));
                }
            }
            columns[j] = this_col;
        }

        Some(Self { n, columns })
    }

    /// Solves `A x = b` via forward substitution on `L` followed by backward
    /// substitution on `L^T`.
    pub fn solve(&self, rhs: &[f64]) -> Vec<f64> {
        let mut y = rhs.to_vec();
        for j in 0..self.n {
            let l_jj = self.columns[j][0].1;
            y[j] /= l_jj;
            for &(r, l_rj) in &self.columns[j][1..] {
                y[r] -= l_rj * y[j];
            }
        }

        let mut x = y;
        for j in (0..self.n).rev() {
            for &(r, l_rj) in &self.columns[j][1..] {
                x[j] -= l_rj * x[r];
            }
            let l_jj = self.columns[j][0].1;
            x[j] /= l_jj;
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factorizes_and_solves_spd_system() {
        // [[4,1],[1,3]]
        let a = SparseMatrix::from_triplets((2, 2), &[0, 0, 1, 1], &[0, 1, 0, 1], &[4.0, 1.0, 1.0, 3.0]);
        let chol = SparseCholesky::factorize(&a).expect("SPD matrix should factorize");
        let x = chol.solve(&[1.0, 2.0]);
        // A x = b check
        let residual = a.mat_vec(&x);
        assert!((residual[0] - 1.0).abs() < 1e-9);
        assert!((residual[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_definite_matrix() {
        let indefinite =
            SparseMatrix::from_triplets((2, 2), &[0, 0, 1, 1], &[0, 1, 0, 1], &[1.0, 2.0, 2.0, 1.0]);
        assert!(SparseCholesky::factorize(&indefinite).is_none());
    }
}
