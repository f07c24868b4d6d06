pub mod amg;
pub mod cholesky;

use crate::errors::WassersteinError;
use crate::matrix::SparseMatrix;
use nalgebra::{DMatrix, DVector};
use std::str::FromStr;

/// The five solver routes named in the external interface. `Lu` densifies the
/// unreduced system; the `*FluxReduced`/`*Potential` variants act on the
/// Schur-complement-reduced and fully-reduced SPD systems respectively, via
/// either a direct sparse Cholesky or an algebraic multigrid V-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LinearSolverKind {
    Lu,
    LuFluxReduced,
    LuPotential,
    AmgFluxReduced,
    AmgPotential,
}

impl FromStr for LinearSolverKind {
    type Err = WassersteinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lu" => Ok(Self::Lu),
            "lu-flux-reduced" => Ok(Self::LuFluxReduced),
            "lu-potential" => Ok(Self::LuPotential),
            "amg-flux-reduced" => Ok(Self::AmgFluxReduced),
            "amg-potential" => Ok(Self::AmgPotential),
            other => Err(WassersteinError::UnknownLinearSolver {
                solver: other.to_string(),
            }),
        }
    }
}

impl LinearSolverKind {
    pub fn uses_amg(self) -> bool {
        matches!(self, Self::AmgFluxReduced | Self::AmgPotential)
    }
}

/// Solves the dense unreduced saddle-point system `K x = rhs` via LU
/// decomposition. Returns `None` on a singular pivot, which callers treat as a
/// numeric (non-propagating) solver failure.
pub fn solve_dense_lu(matrix: &DMatrix<f64>, rhs: &[f64]) -> Option<Vec<f64>> {
    let b = DVector::from_row_slice(rhs);
    let lu = matrix.clone().lu();
    lu.solve(&b).map(|x| x.iter().copied().collect())
}

/// A cached, SPD-system solve route: either a factorized sparse Cholesky
/// (refactored by the caller whenever the matrix's values change) or an AMG
/// hierarchy rebuilt from the current matrix and iterated to `tolerance`.
pub enum SpdSolver {
    Cholesky(cholesky::SparseCholesky),
    Amg(amg::AmgHierarchy),
}

impl SpdSolver {
    pub fn build(kind: LinearSolverKind, matrix: &SparseMatrix) -> Option<Self> {
        match kind {
            LinearSolverKind::LuFluxReduced | LinearSolverKind::LuPotential => {
                cholesky::SparseCholesky::factorize(matrix).map(Self::Cholesky)
            }
            LinearSolverKind::AmgFluxReduced | LinearSolverKind::AmgPotential => {
                Some(Self::Amg(amg::AmgHierarchy::build(matrix)))
            }
            LinearSolverKind::Lu => None,
        }
    }

    pub fn solve(&self, rhs: &[f64], tolerance: f64) -> Vec<f64> {
        match self {
            Self::Cholesky(chol) => chol.solve(rhs),
            Self::Amg(amg) => amg.solve(rhs, tolerance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_solver_names() {
        assert_eq!(LinearSolverKind::from_str("lu").unwrap(), LinearSolverKind::Lu);
        assert_eq!(
            LinearSolverKind::from_str("amg-potential").unwrap(),
            LinearSolverKind::AmgPotential
        );
    }

    #[test]
    fn rejects_unknown_solver_name() {
        assert!(matches!(
            LinearSolverKind::from_str("gmres"),
            Err(WassersteinError::UnknownLinearSolver { .. })
        ));
    }

    #[test]
    fn dense_lu_solves_identity() {
        let m = DMatrix::<f64>::identity(3, 3);
        let x = solve_dense_lu(&m, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(x, vec![1.0, 2.0, 3.0]);
    }
}
