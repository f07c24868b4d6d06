use crate::anderson::AndersonAccelerator;
use crate::errors::WassersteinError;
use crate::grid::Grid;
use crate::operators::projection::{self, AveragingMode};
use crate::operators::Operators;
use crate::reduction::ReductionWorkspace;
use crate::solver::{ConvergenceReport, FailureKind, IterationRecord, WassersteinOptions};

/// Split-Bregman (ADMM) splitting: a linear Darcy-type solve for the flux
/// against a fixed penalty weight `L`, followed by a shrink (soft-threshold)
/// step that reintroduces the `|u|` nonlinearity on an auxiliary flux
/// variable, with the Bregman error variable absorbing the gap between the
/// two. `L` only grows (geometric backoff) when the distance estimate
/// stagnates for `options.max_iter_increase_diff` iterations in a row.
pub fn solve(
    grid: &Grid,
    ops: &Operators,
    source: &[f64],
    options: &WassersteinOptions,
) -> Result<(Vec<f64>, Vec<f64>, ConvergenceReport), WassersteinError> {
    let ws = ReductionWorkspace::new(grid);
    let n_faces = grid.n_faces();
    let face_mass_diag = ops.face_mass.diagonal();

    let mut l = options.l_init.max(1.0);
    let mut aux = vec![0.0; n_faces];
    let mut bregman_error = vec![0.0; n_faces];
    let mut potential = vec![0.0; grid.n_cells()];
    let mut raw_flux = vec![0.0; n_faces];

    let mut history = Vec::new();
    let mut best_distance = f64::INFINITY;
    let mut stagnant_count = 0usize;
    let mut anderson = AndersonAccelerator::new(options.anderson_depth, options.anderson_restart);
    let mut converged = false;
    let mut iterations = 0;
    let mut diverged = false;
    let mut numeric_failure = false;
    let mut old_distance = 0.0;

    let mut flux_diag_inv: Vec<f64> = face_mass_diag.iter().map(|&m| 1.0 / (l * m)).collect();
    let mut schur = ws.assemble_schur(grid, &flux_diag_inv);
    let mut fully_reduced = ws.assemble_fully_reduced(&schur);

    for iter in 0..options.max_iter {
        let rhs_flux: Vec<f64> = aux
            .iter()
            .zip(bregman_error.iter())
            .zip(face_mass_diag.iter())
            .map(|((&d, &b), &mass)| l * mass * (d - b))
            .collect();

        let Some((new_potential, lambda)) = ws.solve(
            options.linear_solver,
            ops,
            &flux_diag_inv,
            &schur,
            &fully_reduced,
            &rhs_flux,
            source,
            options.tol_residual,
        ) else {
            iterations = iter;
            numeric_failure = true;
            break;
        };
        potential = new_potential;
        ws.check_pin_preconditions(&potential, 0.0, 1e-6)?;
        let _ = lambda;

        let raw_flux_plain = ws.back_substitute_flux(grid, &flux_diag_inv, &potential, &rhs_flux);
        raw_flux = anderson.accelerate(&raw_flux, &raw_flux_plain);

        let flux_plus_b: Vec<f64> = raw_flux
            .iter()
            .zip(bregman_error.iter())
            .map(|(&u, &b)| u + b)
            .collect();
        let new_aux = shrink(&flux_plus_b, grid, l, options.regularization);

        let force_delta: Vec<f64> = raw_flux
            .iter()
            .zip(new_aux.iter())
            .map(|(&u, &a)| u - a)
            .collect();
        let force_increment: f64 = force_delta.iter().map(|d| d * d).sum::<f64>().sqrt();
        for f in 0..n_faces {
            bregman_error[f] += force_delta[f];
        }
        let force_norm: f64 = bregman_error.iter().map(|b| b * b).sum::<f64>().sqrt();

        let increment_norm: f64 = new_aux
            .iter()
            .zip(aux.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();

        let divergence_of_aux = ops.divergence.mat_vec(&new_aux);
        let residual_norm: f64 = divergence_of_aux
            .iter()
            .zip(source.iter())
            .map(|(bu, s)| (bu - s).powi(2))
            .sum::<f64>()
            .sqrt();
        let mass_conservation_residual: f64 = divergence_of_aux
            .iter()
            .zip(source.iter())
            .map(|(bu, s)| (bu - s).abs())
            .fold(0.0, f64::max);

        let distance = projection::l1_dissipation(&new_aux, grid, ops, options.norm_mode);
        let distance_increment = (distance - old_distance).abs();

        aux = new_aux;
        old_distance = distance;
        iterations = iter + 1;

        history.push(IterationRecord {
            iteration: iter,
            residual_norm,
            increment_norm,
            distance,
            distance_increment,
            mass_conservation_residual,
            force_norm: Some(force_norm),
            aux_increment: Some(increment_norm),
            force_increment: Some(force_increment),
        });

        if iter > 0
            && residual_norm < options.tol_residual
            && increment_norm < options.tol_increment
        {
            converged = true;
            break;
        }

        if distance < best_distance - options.tol_distance {
            best_distance = distance;
            stagnant_count = 0;
        } else {
            stagnant_count += 1;
        }

        if options.update_l && stagnant_count >= options.max_iter_increase_diff {
            l *= options.l_factor;
            stagnant_count = 0;
            log::debug!("bregman distance stagnated, growing penalty to {l:e}");
            if l > options.l_max {
                log::warn!("bregman penalty exceeded l_max={:e}, diverging", options.l_max);
                diverged = true;
                break;
            }
            flux_diag_inv = face_mass_diag.iter().map(|&m| 1.0 / (l * m)).collect();
            schur = ws.assemble_schur(grid, &flux_diag_inv);
            fully_reduced = ws.assemble_fully_reduced(&schur);
        }
    }

    if converged {
        log::debug!("bregman converged after {iterations} iterations at penalty {l:e}");
    } else if !diverged && !numeric_failure {
        log::warn!("bregman did not converge within {iterations} iterations");
    }

    let last = history.last();
    let distance = last.map_or(0.0, |r| r.distance);
    let residual = last.map_or(0.0, |r| r.residual_norm);
    let mass_conservation_residual = last.map_or(0.0, |r| r.mass_conservation_residual);
    let flux_increment = last.map_or(0.0, |r| r.increment_norm);
    let distance_increment = last.map_or(0.0, |r| r.distance_increment);
    let force = last.and_then(|r| r.force_norm).unwrap_or(0.0);
    let aux_increment = last.and_then(|r| r.aux_increment).unwrap_or(0.0);
    let force_increment = last.and_then(|r| r.force_increment).unwrap_or(0.0);
    let failure = if converged {
        None
    } else if numeric_failure {
        Some(FailureKind::NumericFailure)
    } else if diverged {
        Some(FailureKind::PenaltyExceeded)
    } else {
        Some(FailureKind::IterationLimit)
    };

    Ok((
        aux,
        potential,
        ConvergenceReport::Bregman {
            converged,
            iterations,
            final_penalty: l,
            distance,
            residual,
            mass_conservation_residual,
            flux_increment,
            distance_increment,
            force,
            aux_increment,
            force_increment,
            failure,
            history,
        },
    ))
}

/// The cell-arithmetic shrink (soft-threshold) operator: for each cell,
/// `scaling = max(||u||_cell - 1/L, 0) / (||u||_cell + regularization)`,
/// projected back onto faces and applied multiplicatively to the input flux.
fn shrink(flux_plus_b: &[f64], grid: &Grid, l: f64, regularization: f64) -> Vec<f64> {
    let cell_flux = projection::face_to_cell(flux_plus_b, grid);
    let cell_norm: Vec<f64> = cell_flux
        .as_slice()
        .iter()
        .map(|v| (v[0] * v[0] + v[1] * v[1]).sqrt())
        .collect();
    let cell_scaling: Vec<f64> = cell_norm
        .iter()
        .map(|&norm| (norm - 1.0 / l).max(0.0) / (norm + regularization))
        .collect();
    let flat_scaling = projection::cell_to_face(
        &cell_scaling,
        grid,
        AveragingMode::Arithmetic,
        regularization,
    );
    flux_plus_b
        .iter()
        .zip(flat_scaling.iter())
        .map(|(&u, &s)| s * u)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::OperatorOptions;

    #[test]
    fn zero_source_shrinks_flux_to_zero() {
        let grid = Grid::new((3, 3), (1.0, 1.0)).unwrap();
        let ops = Operators::new(&grid, OperatorOptions::default());
        let source = vec![0.0; grid.n_cells()];
        let options = WassersteinOptions::default();
        let (flux, _potential, report) = solve(&grid, &ops, &source, &options).unwrap();
        assert!(report.converged());
        assert!(flux.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn shrink_is_zero_below_threshold() {
        let grid = Grid::new((3, 3), (1.0, 1.0)).unwrap();
        let tiny_flux = vec![1e-6; grid.n_faces()];
        let shrunk = shrink(&tiny_flux, &grid, 1.0, 1e-10);
        assert!(shrunk.iter().all(|&v| v.abs() < 1e-6));
    }
}
