use nalgebra::{DMatrix, DVector};
use std::collections::VecDeque;

/// Type-II Anderson acceleration (Walker & Ni) over a sliding window of depth
/// `m`, mixing the plain fixed-point update with its own recent history via a
/// small least-squares solve. Applied only to the flux block of the Newton
/// and Bregman iterations; the potential/multiplier block is reported to
/// diverge under acceleration and is always updated unmixed.
pub struct AndersonAccelerator {
    depth: usize,
    restart: bool,
    iterates: VecDeque<DVector<f64>>,
    residuals: VecDeque<DVector<f64>>,
}

impl AndersonAccelerator {
    pub fn new(depth: usize, restart: bool) -> Self {
        Self {
            depth,
            restart,
            iterates: VecDeque::with_capacity(depth + 1),
            residuals: VecDeque::with_capacity(depth + 1),
        }
    }

    pub fn reset(&mut self) {
        self.iterates.clear();
        self.residuals.clear();
    }

    /// Given the previous iterate `x_prev` and the plain (unaccelerated)
    /// update `x_new`, returns the accelerated iterate. With `depth == 0` this
    /// degenerates to returning `x_new` unchanged.
    pub fn accelerate(&mut self, x_prev: &[f64], x_new: &[f64]) -> Vec<f64> {
        if self.depth == 0 {
            return x_new.to_vec();
        }

        let x_prev_v = DVector::from_row_slice(x_prev);
        let x_new_v = DVector::from_row_slice(x_new);
        let f_new = &x_new_v - &x_prev_v;

        self.iterates.push_back(x_prev_v.clone());
        self.residuals.push_back(f_new.clone());
        if self.iterates.len() > self.depth + 1 {
            self.iterates.pop_front();
            self.residuals.pop_front();
        }

        let window = self.residuals.len();
        if window < 2 {
            return x_new_v.iter().copied().collect();
        }
        let m = window - 1;
        let n = f_new.len();

        let mut delta_f = DMatrix::<f64>::zeros(n, m);
        let mut delta_x = DMatrix::<f64>::zeros(n, m);
        for i in 0..m {
            let df = &self.residuals[i + 1] - &self.residuals[i];
            let dx = &self.iterates[i + 1] - &self.iterates[i];
            delta_f.set_column(i, &df);
            delta_x.set_column(i, &dx);
        }

        let gram = delta_f.transpose() * &delta_f;
        let rhs = delta_f.transpose() * &f_new;
        let gamma = gram
            .lu()
            .solve(&rhs)
            .unwrap_or_else(|| DVector::zeros(m));

        let correction = (&delta_x + &delta_f) * &gamma;
        let accelerated = &x_new_v - &correction;

        if self.restart && window > self.depth {
            self.reset();
        }

        accelerated.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_zero_is_a_no_op() {
        let mut acc = AndersonAccelerator::new(0, false);
        let out = acc.accelerate(&[1.0, 2.0], &[3.0, 4.0]);
        assert_eq!(out, vec![3.0, 4.0]);
    }

    #[test]
    fn first_call_returns_unmixed_update() {
        let mut acc = AndersonAccelerator::new(3, false);
        let out = acc.accelerate(&[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(out, vec![1.0, 1.0]);
    }

    #[test]
    fn converged_sequence_stays_at_fixed_point() {
        let mut acc = AndersonAccelerator::new(3, false);
        let fixed = vec![2.0, -1.0];
        let _ = acc.accelerate(&[0.0, 0.0], &fixed);
        let out = acc.accelerate(&fixed, &fixed);
        for (o, f) in out.iter().zip(fixed.iter()) {
            assert!((o - f).abs() < 1e-9);
        }
    }
}
