use crate::bregman;
use crate::errors::WassersteinError;
use crate::field::{Field2, VectorField2};
use crate::grid::Grid;
use crate::linear_solver::LinearSolverKind;
use crate::newton;
use crate::operators::projection::{self, NormMode};
use crate::operators::{OperatorOptions, Operators};

/// Which of the two solvers computes the distance: a Newton linearization of
/// the regularized primal, or a Split-Bregman (ADMM) splitting. Selected as a
/// tagged variant at the single entry point rather than via a solver trait
/// object hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Method {
    Newton,
    Bregman,
}

/// Tuning knobs shared by both solvers, plus a few that only one of them uses
/// (Newton ignores the Bregman-only fields and vice versa). Derives
/// `Serialize`/`Deserialize` so a caller can load these from a config file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WassersteinOptions {
    pub tol_residual: f64,
    pub tol_increment: f64,
    pub tol_distance: f64,
    pub max_iter: usize,
    /// Newton: the floor `L` in the iteratively-reweighted flux diagonal
    /// `max(L, 1/||u||_face,eps)`. Distinct from `l_init`, which only sets the
    /// homogeneous Darcy guess at iteration 0 (and the Bregman solver's
    /// starting penalty).
    pub l: f64,
    /// Newton iteration 0 / Bregman starting value: the homogeneous
    /// "Darcy" permeability used to build the initial flux guess.
    pub l_init: f64,
    /// Bregman: the augmented-Lagrangian penalty weight's growth factor.
    pub l_factor: f64,
    /// Bregman: the penalty weight's hard cap; exceeding it is reported as
    /// divergence rather than propagated as an error.
    pub l_max: f64,
    /// Bregman: number of non-improving iterations tolerated before growing
    /// the penalty weight.
    pub max_iter_increase_diff: usize,
    /// Bregman: whether the stagnation-triggered penalty growth is enabled at
    /// all. When `false`, `L` never changes after initialization.
    pub update_l: bool,
    pub lumped_mass: bool,
    pub norm_mode: NormMode,
    pub linear_solver: LinearSolverKind,
    pub anderson_depth: usize,
    pub anderson_restart: bool,
    pub regularization: f64,
    pub mass_tolerance: f64,
}

impl Default for WassersteinOptions {
    fn default() -> Self {
        Self {
            tol_residual: 1e-6,
            tol_increment: 1e-6,
            tol_distance: 1e-6,
            max_iter: 100,
            l: 1.0,
            l_init: 1.0,
            l_factor: 2.0,
            l_max: 1e8,
            max_iter_increase_diff: 20,
            update_l: true,
            lumped_mass: true,
            norm_mode: NormMode::FaceArithmetic,
            linear_solver: LinearSolverKind::Lu,
            anderson_depth: 0,
            anderson_restart: false,
            regularization: 1e-10,
            mass_tolerance: 1e-8,
        }
    }
}

/// One row of the convergence history: a snapshot of the residual,
/// increment, and running distance estimate after a given iteration. The
/// `force_*` fields are populated only by the Bregman solver (`None` in
/// Newton's history), since they track the dual/auxiliary variables that
/// solver alone maintains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    pub residual_norm: f64,
    pub increment_norm: f64,
    pub distance: f64,
    pub distance_increment: f64,
    /// `||B u - M_c (m1 - m2)||_inf`, the infinity-norm mass-conservation
    /// residual (P4), as opposed to `residual_norm`'s Euclidean norm.
    pub mass_conservation_residual: f64,
    pub force_norm: Option<f64>,
    pub aux_increment: Option<f64>,
    pub force_increment: Option<f64>,
}

/// Why a solve returned `converged: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The linear solve broke down: a non-positive Cholesky pivot, or AMG
    /// failing to reach its own internal tolerance.
    NumericFailure,
    /// Bregman's penalty weight `L` exceeded `l_max`.
    PenaltyExceeded,
    /// The iteration budget (`max_iter`) was exhausted without satisfying the
    /// stopping criteria.
    IterationLimit,
}

/// The per-method convergence summary returned alongside the solution.
/// Numeric breakdowns (Cholesky pivot failure, Bregman penalty exceeding
/// `l_max`, iteration exhaustion) are recorded here with `converged: false`
/// and a `failure` kind, rather than surfaced as an `Err`, since a
/// non-converged answer is still a usable approximation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvergenceReport {
    Newton {
        converged: bool,
        iterations: usize,
        distance: f64,
        residual: f64,
        mass_conservation_residual: f64,
        flux_increment: f64,
        distance_increment: f64,
        failure: Option<FailureKind>,
        history: Vec<IterationRecord>,
    },
    Bregman {
        converged: bool,
        iterations: usize,
        final_penalty: f64,
        distance: f64,
        residual: f64,
        mass_conservation_residual: f64,
        flux_increment: f64,
        distance_increment: f64,
        force: f64,
        aux_increment: f64,
        force_increment: f64,
        failure: Option<FailureKind>,
        history: Vec<IterationRecord>,
    },
}

impl ConvergenceReport {
    pub fn converged(&self) -> bool {
        match self {
            Self::Newton { converged, .. } => *converged,
            Self::Bregman { converged, .. } => *converged,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WassersteinResult {
    pub distance: f64,
    pub flux: VectorField2,
    pub potential: Field2,
    pub transport_density: Field2,
    pub convergence: ConvergenceReport,
}

/// Computes the variational L1 Wasserstein distance between two equal-mass,
/// non-negative distributions on a shared uniform rectangular grid.
///
/// Validates shape/positivity/mass-compatibility preconditions up front and
/// returns `Err` before any iteration starts if they fail; once iterating,
/// numeric trouble is reported through `WassersteinResult::convergence`
/// instead.
pub fn wasserstein_distance(
    mass_1: &Field2,
    mass_2: &Field2,
    voxel_size: (f64, f64),
    method: Method,
    options: WassersteinOptions,
) -> Result<WassersteinResult, WassersteinError> {
    validate_masses(mass_1, mass_2, voxel_size, &options)?;

    let grid = Grid::new(mass_1.shape(), voxel_size)?;
    let ops = Operators::new(
        &grid,
        OperatorOptions {
            lumped: options.lumped_mass,
            regularization: options.regularization,
            l_init: options.l_init,
        },
    );

    let source: Vec<f64> = mass_1
        .as_slice()
        .iter()
        .zip(mass_2.as_slice().iter())
        .map(|(&m1, &m2)| m1 - m2)
        .collect();

    let (flat_flux, potential, convergence) = match method {
        Method::Newton => {
            let (flux, potential, report) = newton::solve(&grid, &ops, &source, &options)?;
            (flux, potential, report)
        }
        Method::Bregman => {
            let (flux, potential, report) = bregman::solve(&grid, &ops, &source, &options)?;
            (flux, potential, report)
        }
    };

    let distance = projection::l1_dissipation(&flat_flux, &grid, &ops, options.norm_mode);
    let transport_density = projection::transport_density(&flat_flux, &grid);
    let flux_field = projection::face_to_cell(&flat_flux, &grid);

    Ok(WassersteinResult {
        distance,
        flux: flux_field,
        potential: Field2::from_vec(grid.shape(), potential),
        transport_density,
        convergence,
    })
}

fn validate_masses(
    mass_1: &Field2,
    mass_2: &Field2,
    voxel_size: (f64, f64),
    options: &WassersteinOptions,
) -> Result<(), WassersteinError> {
    if mass_1.shape() != mass_2.shape() {
        return Err(WassersteinError::ShapeMismatch {
            shape_1: mass_1.shape(),
            shape_2: mass_2.shape(),
        });
    }

    for (which, mass) in [(1u8, mass_1), (2u8, mass_2)] {
        for (index, &value) in mass.as_slice().iter().enumerate() {
            if !value.is_finite() {
                return Err(WassersteinError::NonFiniteMass { which, index });
            }
            if value < 0.0 {
                return Err(WassersteinError::NegativeMass {
                    which,
                    index,
                    value,
                });
            }
        }
    }

    let cell_volume = voxel_size.0 * voxel_size.1;
    let residual: f64 = mass_1
        .as_slice()
        .iter()
        .zip(mass_2.as_slice().iter())
        .map(|(&m1, &m2)| m1 - m2)
        .sum::<f64>()
        * cell_volume;
    if residual.abs() > options.mass_tolerance {
        return Err(WassersteinError::MassImbalance {
            residual,
            tolerance: options.mass_tolerance,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_shapes() {
        let m1 = Field2::zeros((3, 3));
        let m2 = Field2::zeros((3, 4));
        let result = wasserstein_distance(
            &m1,
            &m2,
            (1.0, 1.0),
            Method::Newton,
            WassersteinOptions::default(),
        );
        assert!(matches!(result, Err(WassersteinError::ShapeMismatch { .. })));
    }

    #[test]
    fn rejects_mass_imbalance() {
        let m1 = Field2::from_vec((2, 2), vec![1.0, 0.0, 0.0, 0.0]);
        let m2 = Field2::from_vec((2, 2), vec![0.0, 0.0, 0.0, 0.0]);
        let result = wasserstein_distance(
            &m1,
            &m2,
            (1.0, 1.0),
            Method::Newton,
            WassersteinOptions::default(),
        );
        assert!(matches!(result, Err(WassersteinError::MassImbalance { .. })));
    }

    #[test]
    fn rejects_negative_mass() {
        let m1 = Field2::from_vec((2, 2), vec![-1.0, 1.0, 0.0, 0.0]);
        let m2 = Field2::from_vec((2, 2), vec![0.0, 0.0, 0.0, 0.0]);
        let result = wasserstein_distance(
            &m1,
            &m2,
            (1.0, 1.0),
            Method::Newton,
            WassersteinOptions::default(),
        );
        assert!(matches!(result, Err(WassersteinError::NegativeMass { .. })));
    }

    #[test]
    fn identical_distributions_have_zero_distance() {
        let mass = Field2::from_vec((3, 3), vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]);
        let result = wasserstein_distance(
            &mass,
            &mass,
            (1.0, 1.0),
            Method::Newton,
            WassersteinOptions::default(),
        )
        .unwrap();
        assert!(result.distance.abs() < 1e-6);
    }
}
