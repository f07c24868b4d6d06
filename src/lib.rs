//! Variational L1 Wasserstein (earth-mover) distance engine.
//!
//! Given two non-negative 2D mass distributions of equal total mass on a uniform
//! rectangular grid, computes
//! `W_1(m_1, m_2) = inf { integral |u| : div u = m_1 - m_2 }`
//! together with the optimal flux field, a dual potential and the transport
//! density, via either a Newton linearization or a Split-Bregman (ADMM) splitting
//! of the regularized primal problem.
//!
//! See [`solver::wasserstein_distance`] for the entry point.

mod anderson;
mod bregman;
mod errors;
mod field;
mod grid;
mod linear_solver;
mod matrix;
mod newton;
mod operators;
mod reduction;
mod solver;

pub use errors::WassersteinError;
pub use field::{Field2, VectorField2};
pub use grid::Grid;
pub use linear_solver::LinearSolverKind;
pub use operators::projection::{AveragingMode, NormMode};
pub use operators::{OperatorOptions, Operators};
pub use solver::{
    ConvergenceReport, FailureKind, IterationRecord, Method, WassersteinOptions, WassersteinResult,
    wasserstein_distance,
};
