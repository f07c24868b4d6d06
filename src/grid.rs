use crate::errors::WassersteinError;

/// A uniform rectangular grid of `shape = (n_rows, n_cols)` cells with voxel size
/// `(h_y, h_x)`. Faces are indexed with all vertical faces (connecting
/// horizontally-adjacent cells) first, followed by all horizontal faces
/// (connecting vertically-adjacent cells), matching the ordering the discrete
/// divergence and mass operators are built against.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    shape: (usize, usize),
    voxel_size: (f64, f64),
    n_vertical_faces: usize,
    n_horizontal_faces: usize,
    /// `connectivity[f] = (c_left, c_right)`: for a vertical face, the cell to the
    /// left and the cell to the right; for a horizontal face, the cell above and
    /// the cell below. Divergence is signed left-to-right / top-to-bottom.
    connectivity: Vec<(usize, usize)>,
    pinned_cell: usize,
}

impl Grid {
    pub fn new(shape: (usize, usize), voxel_size: (f64, f64)) -> Result<Self, WassersteinError> {
        if shape.0 == 0 || shape.1 == 0 || shape.0 * shape.1 < 2 {
            return Err(WassersteinError::GridTooSmall { shape });
        }
        if !(voxel_size.0 > 0.0) || !(voxel_size.1 > 0.0) {
            return Err(WassersteinError::NonPositiveVoxelSize {
                h_y: voxel_size.0,
                h_x: voxel_size.1,
            });
        }

        let (n_y, n_x) = shape;
        let n_vertical_faces = n_y * (n_x - 1);
        let n_horizontal_faces = (n_y - 1) * n_x;
        let mut connectivity = Vec::with_capacity(n_vertical_faces + n_horizontal_faces);

        for r in 0..n_y {
            for c in 0..n_x - 1 {
                let left = r * n_x + c;
                let right = r * n_x + c + 1;
                connectivity.push((left, right));
            }
        }
        for r in 0..n_y - 1 {
            for c in 0..n_x {
                let top = r * n_x + c;
                let bottom = (r + 1) * n_x + c;
                connectivity.push((top, bottom));
            }
        }

        let pinned_cell = (n_y / 2) * n_x + (n_x / 2);

        Ok(Self {
            shape,
            voxel_size,
            n_vertical_faces,
            n_horizontal_faces,
            connectivity,
            pinned_cell,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn voxel_size(&self) -> (f64, f64) {
        self.voxel_size
    }

    pub fn n_cells(&self) -> usize {
        self.shape.0 * self.shape.1
    }

    pub fn n_vertical_faces(&self) -> usize {
        self.n_vertical_faces
    }

    pub fn n_horizontal_faces(&self) -> usize {
        self.n_horizontal_faces
    }

    pub fn n_faces(&self) -> usize {
        self.n_vertical_faces + self.n_horizontal_faces
    }

    pub fn is_vertical_face(&self, face: usize) -> bool {
        face < self.n_vertical_faces
    }

    pub fn connectivity(&self) -> &[(usize, usize)] {
        &self.connectivity
    }

    pub fn cell_index(&self, row: usize, col: usize) -> usize {
        row * self.shape.1 + col
    }

    pub fn cell_coords(&self, cell: usize) -> (usize, usize) {
        (cell / self.shape.1, cell % self.shape.1)
    }

    /// The area/volume of a single cell (`h_y * h_x`).
    pub fn cell_volume(&self) -> f64 {
        self.voxel_size.0 * self.voxel_size.1
    }

    /// The length of the face perpendicular to the flow it carries: a vertical
    /// face spans `h_y`, a horizontal face spans `h_x`.
    pub fn face_volume(&self, face: usize) -> f64 {
        if self.is_vertical_face(face) {
            self.voxel_size.0
        } else {
            self.voxel_size.1
        }
    }

    pub fn pinned_cell(&self) -> usize {
        self.pinned_cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_undersized_grid() {
        assert!(matches!(
            Grid::new((1, 1), (1.0, 1.0)),
            Err(WassersteinError::GridTooSmall { .. })
        ));
    }

    #[test]
    fn accepts_a_single_row_grid() {
        // Scenarios S1/S2/S6 are posed on 1xN / Nx1 grids; only a genuinely
        // degenerate single-cell grid should be rejected.
        let grid = Grid::new((1, 8), (1.0, 1.0)).unwrap();
        assert_eq!(grid.n_horizontal_faces(), 0);
        assert_eq!(grid.n_vertical_faces(), 7);
    }

    #[test]
    fn rejects_non_positive_voxel_size() {
        assert!(matches!(
            Grid::new((3, 3), (0.0, 1.0)),
            Err(WassersteinError::NonPositiveVoxelSize { .. })
        ));
    }

    #[test]
    fn face_count_matches_layout() {
        let grid = Grid::new((3, 4), (1.0, 1.0)).unwrap();
        assert_eq!(grid.n_vertical_faces(), 3 * 3);
        assert_eq!(grid.n_horizontal_faces(), 2 * 4);
        assert_eq!(grid.n_faces(), grid.connectivity().len());
    }

    #[test]
    fn pinned_cell_is_geometric_center() {
        let grid = Grid::new((5, 7), (1.0, 1.0)).unwrap();
        assert_eq!(grid.cell_coords(grid.pinned_cell()), (2, 3));
    }

    #[test]
    fn vertical_faces_precede_horizontal_faces() {
        let grid = Grid::new((2, 2), (1.0, 1.0)).unwrap();
        assert!(grid.is_vertical_face(0));
        assert!(!grid.is_vertical_face(grid.n_vertical_faces()));
    }
}
