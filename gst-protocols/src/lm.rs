//! Damped Levenberg–Marquardt least squares.
//!
//! Minimizes Σ r(x)² given residual and Jacobian closures. The damping
//! parameter multiplies the diagonal of JᵀJ (Marquardt scaling), shrinking
//! after accepted steps and growing after rejected ones. Normal equations
//! are solved by Cholesky with an LU fallback.

use log::debug;
use nalgebra::{DMatrix, DVector};

use gst_core::error::GstError;
use gst_core::linalg::solve_spd;

/// Optimizer knobs. The defaults fit GST problems with a few dozen to a few
/// hundred parameters.
#[derive(Debug, Clone)]
pub struct LmConfig {
    pub max_iters: usize,
    /// Stop when the relative cost decrease falls below this.
    pub f_rel_tol: f64,
    /// Stop when the gradient infinity-norm falls below this.
    pub grad_tol: f64,
    pub init_damping: f64,
    pub damping_up: f64,
    pub damping_down: f64,
    /// Consecutive rejected steps before giving up on an iteration.
    pub max_inner: usize,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iters: 100,
            f_rel_tol: 1e-10,
            grad_tol: 1e-8,
            init_damping: 1e-3,
            damping_up: 10.0,
            damping_down: 0.1,
            max_inner: 25,
        }
    }
}

/// Outcome of a minimization run.
#[derive(Debug, Clone)]
pub struct LmResult {
    pub x: DVector<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimize Σ r(x)² starting from `x0`.
pub fn minimize<R, J>(
    mut residual_fn: R,
    mut jacobian_fn: J,
    x0: DVector<f64>,
    cfg: &LmConfig,
) -> Result<LmResult, GstError>
where
    R: FnMut(&DVector<f64>) -> Result<DVector<f64>, GstError>,
    J: FnMut(&DVector<f64>) -> Result<DMatrix<f64>, GstError>,
{
    let mut x = x0;
    let mut r = residual_fn(&x)?;
    let mut cost = r.dot(&r);
    let mut damping = cfg.init_damping;

    for iter in 0..cfg.max_iters {
        let jac = jacobian_fn(&x)?;
        let grad = jac.transpose() * &r;
        let grad_inf = grad.iter().map(|g| g.abs()).fold(0.0_f64, f64::max);
        if grad_inf < cfg.grad_tol {
            debug!("LM converged at iter {}: |grad|_inf = {:.3e}", iter, grad_inf);
            return Ok(LmResult { x, cost, iterations: iter, converged: true });
        }

        let jtj = jac.transpose() * &jac;
        let mut accepted = false;
        for _ in 0..cfg.max_inner {
            let mut damped = jtj.clone();
            for k in 0..damped.nrows() {
                damped[(k, k)] += damping * jtj[(k, k)].max(1e-12);
            }
            let step = match solve_spd(&damped, &grad) {
                Ok(s) => s,
                Err(_) => {
                    damping *= cfg.damping_up;
                    continue;
                }
            };
            let candidate = &x - &step;
            let r_new = residual_fn(&candidate)?;
            let cost_new = r_new.dot(&r_new);
            if cost_new < cost {
                let rel_decrease = (cost - cost_new) / cost.max(1e-300);
                x = candidate;
                r = r_new;
                cost = cost_new;
                damping = (damping * cfg.damping_down).max(1e-15);
                accepted = true;
                debug!(
                    "LM iter {}: cost = {:.6e}, damping = {:.1e}",
                    iter, cost, damping
                );
                if rel_decrease < cfg.f_rel_tol {
                    return Ok(LmResult { x, cost, iterations: iter + 1, converged: true });
                }
                break;
            }
            damping *= cfg.damping_up;
        }
        if !accepted {
            debug!("LM stalled at iter {} with cost {:.6e}", iter, cost);
            return Ok(LmResult { x, cost, iterations: iter, converged: cost < 1e-16 || grad_inf < 1e-4 });
        }
    }

    let iterations = cfg.max_iters;
    Ok(LmResult { x, cost, iterations, converged: false })
}
