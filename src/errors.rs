use thiserror::Error;

/// Failure modes of the Wasserstein engine, categorized per the error-handling
/// design: `InvalidInput` and `UnsupportedConfiguration` are hard failures
/// surfaced to the caller before any iteration starts; `NumericFailure` and
/// `Divergence` are recorded in the convergence report instead of propagated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WassersteinError {
    #[error("mass_1 and mass_2 have different shapes: {shape_1:?} vs {shape_2:?}")]
    ShapeMismatch {
        shape_1: (usize, usize),
        shape_2: (usize, usize),
    },
    #[error("grid shape {shape:?} is smaller than the minimum 2x2")]
    GridTooSmall { shape: (usize, usize) },
    #[error("voxel size must be strictly positive, got {h_y}x{h_x}")]
    NonPositiveVoxelSize { h_y: f64, h_x: f64 },
    #[error("mass_{which} contains a non-finite entry at flat index {index}")]
    NonFiniteMass { which: u8, index: usize },
    #[error("mass_{which} contains a negative entry at flat index {index}: {value}")]
    NegativeMass { which: u8, index: usize, value: f64 },
    #[error(
        "mass imbalance |sum(m1 - m2) * voxel area| = {residual} exceeds tolerance {tolerance}"
    )]
    MassImbalance { residual: f64, tolerance: f64 },
    #[error("unknown face-flux norm mode {mode:?}")]
    UnknownMode { mode: String },
    #[error("unknown linear solver {solver:?}")]
    UnknownLinearSolver { solver: String },
    #[error(
        "pin-elimination precondition violated: residual at the multiplier is {lambda_residual}, potential at the pinned cell is {pinned_potential}"
    )]
    PinPreconditionViolated {
        lambda_residual: f64,
        pinned_potential: f64,
    },
}
