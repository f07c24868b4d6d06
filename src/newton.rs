use crate::anderson::AndersonAccelerator;
use crate::errors::WassersteinError;
use crate::grid::Grid;
use crate::operators::projection;
use crate::operators::Operators;
use crate::reduction::ReductionWorkspace;
use crate::solver::{ConvergenceReport, FailureKind, IterationRecord, WassersteinOptions};

/// Newton linearization of the regularized primal: the flux-block diagonal is
/// an iteratively-reweighted-least-squares approximation of the `|u|` penalty
/// (weight `1/||u||`, floored by `options.regularization`), with the first
/// iteration's weight set homogeneously to `options.l_init` (the "Darcy"
/// initialization) since no flux estimate exists yet.
pub fn solve(
    grid: &Grid,
    ops: &Operators,
    source: &[f64],
    options: &WassersteinOptions,
) -> Result<(Vec<f64>, Vec<f64>, ConvergenceReport), WassersteinError> {
    let ws = ReductionWorkspace::new(grid);
    let n_faces = grid.n_faces();
    let face_mass_diag = ops.face_mass.diagonal();

    let mut flat_flux = vec![0.0; n_faces];
    let mut potential = vec![0.0; grid.n_cells()];
    let rhs_flux = vec![0.0; n_faces];
    let mut history = Vec::new();
    let mut old_distance = 0.0;
    let mut anderson = AndersonAccelerator::new(options.anderson_depth, options.anderson_restart);
    let mut converged = false;
    let mut iterations = 0;
    let mut numeric_failure = false;

    for iter in 0..options.max_iter {
        let flux_norm = if iter == 0 {
            vec![options.l_init; n_faces]
        } else {
            projection::vector_face_flux_norm(&flat_flux, grid, ops, options.norm_mode)
        };

        // J_uu = diag(max(L, 1/||u||_face,eps)) * M_f, so the reciprocal
        // diagonal used by the Schur complement is min(1/L, ||u||_face,eps).
        let flux_diag_inv: Vec<f64> = flux_norm
            .iter()
            .zip(face_mass_diag.iter())
            .map(|(&norm, &mass)| {
                let clamped_norm = norm.max(options.regularization);
                clamped_norm.min(1.0 / options.l) / mass
            })
            .collect();

        let schur = ws.assemble_schur(grid, &flux_diag_inv);
        let fully_reduced = ws.assemble_fully_reduced(&schur);

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

        let new_flux_plain = ws.back_substitute_flux(grid, &flux_diag_inv, &potential, &rhs_flux);
        let new_flux = anderson.accelerate(&flat_flux, &new_flux_plain);

        let increment_norm: f64 = new_flux
            .iter()
            .zip(flat_flux.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();

        let divergence_of_flux = ops.divergence.mat_vec(&new_flux);
        let residual_norm: f64 = divergence_of_flux
            .iter()
            .zip(source.iter())
            .map(|(bu, s)| (bu - s).powi(2))
            .sum::<f64>()
            .sqrt();
        let mass_conservation_residual: f64 = divergence_of_flux
            .iter()
            .zip(source.iter())
            .map(|(bu, s)| (bu - s).abs())
            .fold(0.0, f64::max);

        let distance = projection::l1_dissipation(&new_flux, grid, ops, options.norm_mode);
        let distance_increment = (distance - old_distance).abs();

        flat_flux = new_flux;
        old_distance = distance;
        iterations = iter + 1;

        history.push(IterationRecord {
            iteration: iter,
            residual_norm,
            increment_norm,
            distance,
            distance_increment,
            mass_conservation_residual,
            force_norm: None,
            aux_increment: None,
            force_increment: None,
        });

        log::trace!(
            "newton iter {iter}: residual={residual_norm:e} increment={increment_norm:e} distance={distance:e}"
        );

        if iter > 0
            && ((residual_norm < options.tol_residual && increment_norm < options.tol_increment)
                || distance_increment < options.tol_distance)
        {
            converged = true;
            break;
        }
    }

    if converged {
        log::debug!("newton converged after {iterations} iterations");
    } else if numeric_failure {
        log::warn!("newton linear solve broke down after {iterations} iterations");
    } else {
        log::warn!("newton did not converge within {iterations} iterations");
    }

    let last = history.last();
    let distance = last.map_or(0.0, |r| r.distance);
    let residual = last.map_or(0.0, |r| r.residual_norm);
    let mass_conservation_residual = last.map_or(0.0, |r| r.mass_conservation_residual);
    let flux_increment = last.map_or(0.0, |r| r.increment_norm);
    let distance_increment = last.map_or(0.0, |r| r.distance_increment);
    let failure = if converged {
        None
    } else if numeric_failure {
        Some(FailureKind::NumericFailure)
    } else {
        Some(FailureKind::IterationLimit)
    };

    Ok((
        flat_flux,
        potential,
        ConvergenceReport::Newton {
            converged,
            iterations,
            distance,
            residual,
            mass_conservation_residual,
            flux_increment,
            distance_increment,
            failure,
            history,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::OperatorOptions;

    #[test]
    fn converges_on_a_trivial_zero_source() {
        let grid = Grid::new((3, 3), (1.0, 1.0)).unwrap();
        let ops = Operators::new(&grid, OperatorOptions::default());
        let source = vec![0.0; grid.n_cells()];
        let options = WassersteinOptions::default();
        let (flux, _potential, report) = solve(&grid, &ops, &source, &options).unwrap();
        assert!(report.converged());
        assert!(flux.iter().all(|v| v.abs() < 1e-6));
    }
}
