use crate::errors::WassersteinError;
use crate::grid::Grid;
use crate::linear_solver::{self, LinearSolverKind};
use crate::matrix::SparseMatrix;
use crate::operators::Operators;
use nalgebra::{DMatrix, DVector};

/// Owns the index bookkeeping for the three-stage saddle-point reduction
/// (Schur complement over the flux block, then simultaneous elimination of the
/// pinned cell and the Lagrange multiplier). Built once per solve and reused
/// every Newton/Bregman iteration; only the Schur complement's numeric values
/// change between iterations, its sparsity pattern and the pin/multiplier
/// index map are fixed at construction.
#[derive(Debug, Clone)]
pub struct ReductionWorkspace {
    pinned_cell: usize,
    n_cells: usize,
    /// `reduced_index[cell] = Some(i)` for every cell except the pinned one,
    /// giving its row/column in the fully-reduced SPD system.
    reduced_index: Vec<Option<usize>>,
}

impl ReductionWorkspace {
    pub fn new(grid: &Grid) -> Self {
        let n_cells = grid.n_cells();
        let pinned_cell = grid.pinned_cell();
        let mut reduced_index = vec![None; n_cells];
        let mut next = 0;
        for c in 0..n_cells {
            if c == pinned_cell {
                continue;
            }
            reduced_index[c] = Some(next);
            next += 1;
        }
        Self {
            pinned_cell,
            n_cells,
            reduced_index,
        }
    }

    pub fn pinned_cell(&self) -> usize {
        self.pinned_cell
    }

    /// `S = B * diag(flux_diag_inv) * B^T`, assembled as a weighted graph
    /// Laplacian over the cell-adjacency graph induced by faces (two nonzeros
    /// per face), since `B` has exactly two nonzero entries per column.
    pub fn assemble_schur(&self, grid: &Grid, flux_diag_inv: &[f64]) -> SparseMatrix {
        let mut rows = Vec::with_capacity(4 * grid.n_faces());
        let mut cols = Vec::with_capacity(4 * grid.n_faces());
        let mut values = Vec::with_capacity(4 * grid.n_faces());

        for (f, &(c_left, c_right)) in grid.connectivity().iter().enumerate() {
            let vol = grid.face_volume(f);
            let w = vol * vol * flux_diag_inv[f];
            rows.push(c_left);
            cols.push(c_left);
            values.push(w);
            rows.push(c_right);
            cols.push(c_right);
            values.push(w);
            rows.push(c_left);
            cols.push(c_right);
            values.push(-w);
            rows.push(c_right);
            cols.push(c_left);
            values.push(-w);
        }

        SparseMatrix::from_triplets((self.n_cells, self.n_cells), &rows, &cols, &values)
    }

    /// `S` with the pinned cell's row and column removed. Because the pin
    /// constraint row only ever touches the pinned cell and the multiplier,
    /// deleting the pinned row/col from `S` is equivalent to eliminating the
    /// pinned cell and the multiplier together from the `(potential,
    /// multiplier)` reduced system, leaving an SPD system over the remaining
    /// cells.
    pub fn assemble_fully_reduced(&self, schur: &SparseMatrix) -> SparseMatrix {
        let n = self.n_cells - 1;
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut values = Vec::new();

        for (value, (r, c)) in schur.csc().iter() {
            if r == self.pinned_cell || c == self.pinned_cell {
                continue;
            }
            rows.push(self.reduced_index[r].expect("non-pinned row"));
            cols.push(self.reduced_index[c].expect("non-pinned col"));
            values.push(*value);
        }

        SparseMatrix::from_triplets((n, n), &rows, &cols, &values)
    }

    pub fn reduce_rhs(&self, rhs_potential: &[f64]) -> Vec<f64> {
        let mut reduced = vec![0.0; self.n_cells - 1];
        for c in 0..self.n_cells {
            if let Some(i) = self.reduced_index[c] {
                reduced[i] = rhs_potential[c];
            }
        }
        reduced
    }

    /// Reinserts zero at the pinned cell's slot to recover the full potential.
    pub fn back_substitute_potential(&self, reduced_solution: &[f64]) -> Vec<f64> {
        let mut potential = vec![0.0; self.n_cells];
        for c in 0..self.n_cells {
            if let Some(i) = self.reduced_index[c] {
                potential[c] = reduced_solution[i];
            }
        }
        potential
    }

    /// Recovers the Lagrange multiplier from the discarded pinned-cell row of
    /// the reduced (potential, multiplier) system:
    /// `S[pinned, :] . potential - lambda = rhs_potential[pinned]`.
    pub fn recover_multiplier(
        &self,
        schur: &SparseMatrix,
        potential: &[f64],
        rhs_potential_at_pin: f64,
    ) -> f64 {
        let row_dot: f64 = schur
            .row_entries(self.pinned_cell)
            .into_iter()
            .map(|(col, value)| value * potential[col])
            .sum();
        row_dot - rhs_potential_at_pin
    }

    /// `u = flux_diag_inv .* (rhs_flux + B^T * potential)`, computed directly
    /// from face connectivity rather than a materialized `B^T`.
    pub fn back_substitute_flux(
        &self,
        grid: &Grid,
        flux_diag_inv: &[f64],
        potential: &[f64],
        rhs_flux: &[f64],
    ) -> Vec<f64> {
        grid.connectivity()
            .iter()
            .enumerate()
            .map(|(f, &(c_left, c_right))| {
                let vol = grid.face_volume(f);
                let bt_p = vol * (potential[c_left] - potential[c_right]);
                flux_diag_inv[f] * (rhs_flux[f] + bt_p)
            })
            .collect()
    }

    /// Solves for `(potential, multiplier)` via the route named by `kind`.
    /// `Lu` densifies the full unreduced saddle-point system
    /// `K = [[D, -B^T, 0], [B, 0, -c^T], [0, c, 0]]` over `(flux, potential,
    /// lambda)` directly, using `ops.divergence` for `B` and `flux_diag_inv`
    /// for `D^-1`; the flux entries of the solution are discarded since
    /// callers recover flux from potential via [`Self::back_substitute_flux`]
    /// regardless of solver route. `LuFluxReduced` instead densifies the
    /// smaller bordered `(n_cells+1)`-sized system `[[S, -c^T], [c, 0]]` over
    /// the Schur complement (neither is SPD, so neither can go through
    /// Cholesky/AMG). `LuPotential` factors the SPD fully-reduced system `S~`
    /// via sparse Cholesky; `AmgFluxReduced`/`AmgPotential` both solve `S~` via
    /// an AMG V-cycle (the bordered system `AmgFluxReduced` nominally reduces
    /// is not SPD, so in this implementation it shares `AmgPotential`'s route
    /// rather than attempting multigrid directly on a saddle-point system).
    /// Returns `None` on a numeric breakdown (singular pivot or non-SPD
    /// fully-reduced matrix), which callers treat as a non-converged solve
    /// rather than a propagated error.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &self,
        kind: LinearSolverKind,
        ops: &Operators,
        flux_diag_inv: &[f64],
        schur: &SparseMatrix,
        fully_reduced: &SparseMatrix,
        rhs_flux: &[f64],
        rhs_potential: &[f64],
        tolerance: f64,
    ) -> Option<(Vec<f64>, f64)> {
        match kind {
            LinearSolverKind::Lu => {
                let n_f = flux_diag_inv.len();
                let n_c = self.n_cells;
                let n = n_f + n_c + 1;
                let mut k = DMatrix::<f64>::zeros(n, n);

                for f in 0..n_f {
                    k[(f, f)] = 1.0 / flux_diag_inv[f];
                }
                for (value, (cell, face)) in ops.divergence.csc().iter() {
                    k[(n_f + cell, face)] = *value;
                    k[(face, n_f + cell)] = -*value;
                }
                k[(n_f + self.pinned_cell, n_f + n_c)] = -1.0;
                k[(n_f + n_c, n_f + self.pinned_cell)] = 1.0;

                let mut rhs = DVector::<f64>::zeros(n);
                for (f, &value) in rhs_flux.iter().enumerate() {
                    rhs[f] = value;
                }
                for (c, &value) in rhs_potential.iter().enumerate() {
                    rhs[n_f + c] = value;
                }

                let solution = k.lu().solve(&rhs)?;
                let potential: Vec<f64> = solution.rows(n_f, n_c).iter().copied().collect();
                let lambda = solution[n_f + n_c];
                Some((potential, lambda))
            }
            LinearSolverKind::LuFluxReduced => {
                let n_c = self.n_cells;
                let mut k = DMatrix::<f64>::zeros(n_c + 1, n_c + 1);
                for (value, (r, c)) in schur.csc().iter() {
                    k[(r, c)] = *value;
                }
                k[(self.pinned_cell, n_c)] = -1.0;
                k[(n_c, self.pinned_cell)] = 1.0;

                let mut rhs = DVector::<f64>::zeros(n_c + 1);
                for (i, &value) in rhs_potential.iter().enumerate() {
                    rhs[i] = value;
                }

                let solution = k.lu().solve(&rhs)?;
                let potential: Vec<f64> = solution.rows(0, n_c).iter().copied().collect();
                let lambda = solution[n_c];
                Some((potential, lambda))
            }
            LinearSolverKind::LuPotential
            | LinearSolverKind::AmgFluxReduced
            | LinearSolverKind::AmgPotential => {
                let reduced_rhs = self.reduce_rhs(rhs_potential);
                let reduced_solution = if kind == LinearSolverKind::LuPotential {
                    let chol = linear_solver::cholesky::SparseCholesky::factorize(fully_reduced)?;
                    chol.solve(&reduced_rhs)
                } else {
                    linear_solver::amg::AmgHierarchy::build(fully_reduced).solve(&reduced_rhs, tolerance)
                };
                let potential = self.back_substitute_potential(&reduced_solution);
                let lambda =
                    self.recover_multiplier(schur, &potential, rhs_potential[self.pinned_cell]);
                Some((potential, lambda))
            }
        }
    }

    /// Enforces the runtime preconditions the pin/multiplier elimination
    /// relies on: the multiplier-row residual and the pinned cell's potential
    /// must already be (numerically) zero, mirroring the hard failure the
    /// reference implementation raises rather than silently proceeding.
    pub fn check_pin_preconditions(
        &self,
        potential: &[f64],
        lambda_residual: f64,
        tolerance: f64,
    ) -> Result<(), WassersteinError> {
        let pinned_potential = potential[self.pinned_cell];
        if lambda_residual.abs() > tolerance || pinned_potential.abs() > tolerance {
            return Err(WassersteinError::PinPreconditionViolated {
                lambda_residual,
                pinned_potential,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{OperatorOptions, Operators};

    #[test]
    fn fully_reduced_drops_pinned_row_and_col() {
        let grid = Grid::new((3, 3), (1.0, 1.0)).unwrap();
        let ops = Operators::new(&grid, OperatorOptions::default());
        let _ = ops;
        let ws = ReductionWorkspace::new(&grid);
        let diag_inv = vec![1.0; grid.n_faces()];
        let schur = ws.assemble_schur(&grid, &diag_inv);
        let reduced = ws.assemble_fully_reduced(&schur);
        assert_eq!(reduced.nrows(), grid.n_cells() - 1);
        assert_eq!(reduced.ncols(), grid.n_cells() - 1);
    }

    #[test]
    fn back_substitution_round_trips_potential() {
        let grid = Grid::new((4, 4), (1.0, 1.0)).unwrap();
        let ws = ReductionWorkspace::new(&grid);
        let n_reduced = grid.n_cells() - 1;
        let reduced_solution: Vec<f64> = (0..n_reduced).map(|i| i as f64).collect();
        let potential = ws.back_substitute_potential(&reduced_solution);
        assert_eq!(potential[ws.pinned_cell()], 0.0);
    }

    #[test]
    fn rejects_violated_pin_precondition() {
        let grid = Grid::new((3, 3), (1.0, 1.0)).unwrap();
        let ws = ReductionWorkspace::new(&grid);
        let mut potential = vec![0.0; grid.n_cells()];
        potential[ws.pinned_cell()] = 1.0;
        assert!(matches!(
            ws.check_pin_preconditions(&potential, 0.0, 1e-8),
            Err(WassersteinError::PinPreconditionViolated { .. })
        ));
    }
}
