pub mod projection;

use crate::grid::Grid;
use crate::matrix::SparseMatrix;

/// Mass-matrix lumping and regularization knobs for [`Operators::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatorOptions {
    /// Use the diagonal-lumped face mass matrix instead of the full RT0 mass
    /// matrix with its off-diagonal couplings between parallel faces.
    pub lumped: bool,
    /// Small value added to flux-norm denominators to avoid division by zero
    /// at vanishing flux.
    pub regularization: f64,
    /// Homogeneous-Darcy permeability used to build the initial flux guess.
    pub l_init: f64,
}

impl Default for OperatorOptions {
    fn default() -> Self {
        Self {
            lumped: true,
            regularization: 1e-10,
            l_init: 1.0,
        }
    }
}

/// The discrete operators of the mixed finite-volume discretization, built once
/// per grid and reused across Newton/Bregman iterations.
#[derive(Debug, Clone)]
pub struct Operators {
    /// `n_cells x n_faces` signed incidence matrix.
    pub divergence: SparseMatrix,
    /// `n_faces x n_faces` face mass matrix (lumped diagonal, or full RT0).
    pub face_mass: SparseMatrix,
    /// `n_cells x n_cells` diagonal cell mass matrix.
    pub cell_mass: SparseMatrix,
    /// `n_faces x n_faces` orthogonal-neighbor averaging operator, used to
    /// recover the tangential flux component at a face.
    pub orthogonal_average: SparseMatrix,
    /// `1 x n_cells` row singling out the pinned cell.
    pub pin_constraint: SparseMatrix,
    pub options: OperatorOptions,
}

impl Operators {
    pub fn new(grid: &Grid, options: OperatorOptions) -> Self {
        let divergence = build_divergence(grid);
        let face_mass = if options.lumped {
            build_lumped_face_mass(grid)
        } else {
            build_full_face_mass(grid)
        };
        let cell_mass = build_cell_mass(grid);
        let orthogonal_average = build_orthogonal_average(grid);
        let pin_constraint = build_pin_constraint(grid);

        Self {
            divergence,
            face_mass,
            cell_mass,
            orthogonal_average,
            pin_constraint,
            options,
        }
    }
}

/// `B[c_left, f] = +face_vol(f)`, `B[c_right, f] = -face_vol(f)` for every face,
/// matching the left-to-right / top-to-bottom sign convention.
fn build_divergence(grid: &Grid) -> SparseMatrix {
    let n_faces = grid.n_faces();
    let mut rows = Vec::with_capacity(2 * n_faces);
    let mut cols = Vec::with_capacity(2 * n_faces);
    let mut values = Vec::with_capacity(2 * n_faces);

    for (f, &(c_left, c_right)) in grid.connectivity().iter().enumerate() {
        let vol = grid.face_volume(f);
        rows.push(c_left);
        cols.push(f);
        values.push(vol);
        rows.push(c_right);
        cols.push(f);
        values.push(-vol);
    }

    SparseMatrix::from_triplets((grid.n_cells(), n_faces), &rows, &cols, &values)
}

fn build_cell_mass(grid: &Grid) -> SparseMatrix {
    let n = grid.n_cells();
    let vol = grid.cell_volume();
    let idx: Vec<usize> = (0..n).collect();
    let values = vec![vol; n];
    SparseMatrix::from_triplets((n, n), &idx, &idx, &values)
}

fn build_lumped_face_mass(grid: &Grid) -> SparseMatrix {
    let n_faces = grid.n_faces();
    let idx: Vec<usize> = (0..n_faces).collect();
    let values: Vec<f64> = (0..n_faces).map(|_| 0.5 * grid.cell_volume()).collect();
    SparseMatrix::from_triplets((n_faces, n_faces), &idx, &idx, &values)
}

/// Full RT0-style face mass matrix: a flat diagonal of `2/3 * vol` set once
/// per face, plus an off-diagonal `1/6 * vol` coupling added once for every
/// interior cell between the pair of faces that bound it along a given axis.
/// The diagonal is never re-added per bordering cell, so a face shared by two
/// interior cells is not double-counted.
fn build_full_face_mass(grid: &Grid) -> SparseMatrix {
    let (n_y, n_x) = grid.shape();
    let vol = grid.cell_volume();
    let n_faces = grid.n_faces();
    let n_vert = grid.n_vertical_faces();

    let mut rows = Vec::with_capacity(n_faces);
    let mut cols = Vec::with_capacity(n_faces);
    let mut values = Vec::with_capacity(n_faces);

    for f in 0..n_faces {
        rows.push(f);
        cols.push(f);
        values.push(2.0 / 3.0 * vol);
    }

    let mut push_coupling = |f_a: usize, f_b: usize| {
        rows.push(f_a);
        cols.push(f_b);
        values.push(1.0 / 6.0 * vol);
        rows.push(f_b);
        cols.push(f_a);
        values.push(1.0 / 6.0 * vol);
    };

    for r in 0..n_y {
        for c in 0..n_x {
            if c > 0 && c < n_x - 1 {
                let left = r * (n_x - 1) + (c - 1);
                let right = r * (n_x - 1) + c;
                push_coupling(left, right);
            }
            if r > 0 && r < n_y - 1 {
                let top = n_vert + (r - 1) * n_x + c;
                let bottom = n_vert + r * n_x + c;
                push_coupling(top, bottom);
            }
        }
    }

    SparseMatrix::from_triplets((n_faces, n_faces), &rows, &cols, &values)
}

/// For each face, a quarter-weighted average of the (up to four) perpendicular
/// faces surrounding it. Boundary faces simply drop missing terms rather than
/// renormalizing the remaining weights.
fn build_orthogonal_average(grid: &Grid) -> SparseMatrix {
    let (n_y, n_x) = grid.shape();
    let n_faces = grid.n_faces();
    let n_vert = grid.n_vertical_faces();
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    let mut values = Vec::new();

    let hf = |r: usize, c: usize| n_vert + r * n_x + c;
    let vf = |r: usize, c: usize| r * (n_x - 1) + c;

    for r in 0..n_y {
        for c in 0..n_x - 1 {
            let f = vf(r, c);
            let mut neighbors = Vec::with_capacity(4);
            if r > 0 {
                neighbors.push(hf(r - 1, c));
                neighbors.push(hf(r - 1, c + 1));
            }
            if r < n_y - 1 {
                neighbors.push(hf(r, c));
                neighbors.push(hf(r, c + 1));
            }
            for n in neighbors {
                rows.push(f);
                cols.push(n);
                values.push(0.25);
            }
        }
    }

    for r in 0..n_y - 1 {
        for c in 0..n_x {
            let f = hf(r, c);
            let mut neighbors = Vec::with_capacity(4);
            if c > 0 {
                neighbors.push(vf(r, c - 1));
                neighbors.push(vf(r + 1, c - 1));
            }
            if c < n_x - 1 {
                neighbors.push(vf(r, c));
                neighbors.push(vf(r + 1, c));
            }
            for n in neighbors {
                rows.push(f);
                cols.push(n);
                values.push(0.25);
            }
        }
    }

    SparseMatrix::from_triplets((n_faces, n_faces), &rows, &cols, &values)
}

fn build_pin_constraint(grid: &Grid) -> SparseMatrix {
    SparseMatrix::from_triplets((1, grid.n_cells()), &[0], &[grid.pinned_cell()], &[1.0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divergence_has_two_nonzeros_per_face() {
        let grid = Grid::new((3, 3), (1.0, 1.0)).unwrap();
        let ops = Operators::new(&grid, OperatorOptions::default());
        for f in 0..grid.n_faces() {
            let col_nnz = ops.divergence.csc().outer_view(f).unwrap().nnz();
            assert_eq!(col_nnz, 2);
        }
    }

    #[test]
    fn lumped_face_mass_is_diagonal_and_positive() {
        let grid = Grid::new((3, 3), (2.0, 0.5)).unwrap();
        let ops = Operators::new(&grid, OperatorOptions::default());
        let diag = ops.face_mass.diagonal();
        assert!(diag.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn full_face_mass_diagonal_is_not_double_counted() {
        // Regression test: a face shared by two interior cells must not
        // accumulate the 2/3*vol diagonal contribution twice.
        let grid = Grid::new((1, 5), (1.0, 1.0)).unwrap();
        let ops = Operators::new(
            &grid,
            OperatorOptions {
                lumped: false,
                ..OperatorOptions::default()
            },
        );
        let diag = ops.face_mass.diagonal();
        for &d in diag.iter() {
            assert!((d - 2.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn pin_constraint_singles_out_center_cell() {
        let grid = Grid::new((5, 5), (1.0, 1.0)).unwrap();
        let ops = Operators::new(&grid, OperatorOptions::default());
        let nnz = ops.pin_constraint.csc().iter().count();
        assert_eq!(nnz, 1);
        let value = ops
            .pin_constraint
            .csc()
            .iter()
            .next()
            .map(|(v, (_, c))| (*v, c))
            .unwrap();
        assert_eq!(value, (1.0, grid.pinned_cell()));
    }
}
