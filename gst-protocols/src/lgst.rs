//! Linear-inversion gate set tomography.
//!
//! LGST recovers every gate, preparation and effect of a model — in one
//! common, arbitrary gauge — from the fiducial-sandwich probabilities alone.
//! With measurement fiducials H_i, preparation fiducials F_j and effective
//! measurement rows (POVM outcome m after H_i):
//!
//! ```text
//! Ã[(i,m), j]   = f_m(F_j · H_i)          = [A B]
//! G̃_g[(i,m), j] = f_m(F_j · g · H_i)      = [A G B]
//! ```
//!
//! where A stacks the evolved effect rows and B collects the evolved
//! preparation columns. Truncating the SVD of Ã to rank d² gives square
//! invertible projections A_p = U_d²ᵀA and B_p = B·V_d², so
//!
//! ```text
//! Ĝ_g = (UᵀÃV)⁻¹ (UᵀG̃_gV) = B_p⁻¹ G B_p
//! ```
//!
//! — the true gate up to the gauge B_p. Preparations and effects transform
//! with the same B_p, so all predicted probabilities are reproduced exactly
//! in the large-sample limit. Informational completeness of the fiducials is
//! checked via the numerical rank of Ã.

use log::info;
use nalgebra::{DMatrix, DVector};

use gst_core::circuit::{Circuit, Label};
use gst_core::dataset::DataSet;
use gst_core::error::GstError;
use gst_core::model::{ExplicitModel, SimType};
use gst_core::spam::{Parameterization, Povm, PovmKind, SpamVec};

/// Relative singular-value cutoff for the rank test.
const RANK_TOL: f64 = 1e-6;

/// Frequency of `outcome` for `circuit` in the dataset.
fn frequency(dataset: &DataSet, circuit: &Circuit, outcome: &str) -> Result<f64, GstError> {
    let counts = dataset.counts(circuit)?;
    let total: f64 = counts.values().sum();
    if total <= 0.0 {
        return Err(GstError::MissingData(circuit.to_string()));
    }
    Ok(counts.get(outcome).copied().unwrap_or(0.0) / total)
}

/// Run LGST.
///
/// `target` supplies the labels to estimate (gates, prep, POVM outcomes) and
/// the superoperator dimension; the estimate itself comes entirely from
/// `dataset`. The returned model is fully parameterized, in the LGST gauge —
/// gauge-optimize it toward a target frame before comparing matrices.
pub fn run_lgst(
    dataset: &DataSet,
    target: &ExplicitModel,
    prep_fiducials: &[Circuit],
    meas_fiducials: &[Circuit],
) -> Result<ExplicitModel, GstError> {
    let d2 = target.superdim();
    let povm_label = target.default_povm_label().to_string();
    let outcome_labels: Vec<String> = target
        .povm(&povm_label)?
        .outcome_labels()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let gate_labels: Vec<String> = target.operations().keys().cloned().collect();

    let n_rows = meas_fiducials.len() * outcome_labels.len();
    let n_cols = prep_fiducials.len();
    if n_rows < d2 || n_cols < d2 {
        return Err(GstError::NotInformationallyComplete {
            rank: n_rows.min(n_cols),
            needed: d2,
        });
    }

    // Ã[(i,m), j] = f_m(F_j · H_i)
    let mut ab = DMatrix::zeros(n_rows, n_cols);
    for (i, h) in meas_fiducials.iter().enumerate() {
        for (j, f) in prep_fiducials.iter().enumerate() {
            let circuit = f.then(h);
            for (m, outcome) in outcome_labels.iter().enumerate() {
                ab[(i * outcome_labels.len() + m, j)] =
                    frequency(dataset, &circuit, outcome)?;
            }
        }
    }

    let svd = ab.clone().svd(true, true);
    let u = svd.u.as_ref().expect("SVD with u");
    let v_t = svd.v_t.as_ref().expect("SVD with v_t");
    let smax = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let rank = svd
        .singular_values
        .iter()
        .filter(|&&s| s > RANK_TOL * smax)
        .count();
    if rank < d2 {
        return Err(GstError::NotInformationallyComplete { rank, needed: d2 });
    }
    info!(
        "LGST: fiducial matrix is {}x{} with rank {} (need {})",
        n_rows, n_cols, rank, d2
    );

    // truncated projections
    let u_d = u.columns(0, d2).into_owned(); // n_rows × d²
    let v_d = v_t.rows(0, d2).transpose().into_owned(); // n_cols × d²

    let ab_p = u_d.transpose() * &ab * &v_d;
    let ab_p_inv = ab_p
        .try_inverse()
        .ok_or_else(|| GstError::SingularMatrix("LGST projected fiducial matrix".into()))?;

    let mut estimate = ExplicitModel::new(target.basis.clone(), SimType::Matrix);

    // gates: Ĝ = (UᵀÃV)⁻¹ UᵀG̃V
    for g in &gate_labels {
        let gate_circuit = Circuit::from_labels([Label::new(g.clone())]);
        let mut g_tilde = DMatrix::zeros(n_rows, n_cols);
        for (i, h) in meas_fiducials.iter().enumerate() {
            for (j, f) in prep_fiducials.iter().enumerate() {
                let circuit = f.then(&gate_circuit).then(h);
                for (m, outcome) in outcome_labels.iter().enumerate() {
                    g_tilde[(i * outcome_labels.len() + m, j)] =
                        frequency(dataset, &circuit, outcome)?;
                }
            }
        }
        let g_hat = &ab_p_inv * u_d.transpose() * g_tilde * &v_d;
        estimate.set_operation(g.clone(), gst_core::operation::GateOp::full(g_hat));
    }

    // preparation: ρ̂ = (UᵀÃV)⁻¹ Uᵀ R̃ with R̃[(i,m)] = f_m(H_i)
    let mut r_tilde = DVector::zeros(n_rows);
    for (i, h) in meas_fiducials.iter().enumerate() {
        for (m, outcome) in outcome_labels.iter().enumerate() {
            r_tilde[i * outcome_labels.len() + m] = frequency(dataset, h, outcome)?;
        }
    }
    let rho_hat = &ab_p_inv * u_d.transpose() * r_tilde;
    estimate.set_prep(
        target.default_prep_label().to_string(),
        SpamVec::new(rho_hat, Parameterization::Full),
    );

    // effects: Ê_m = Vᵀ Ẽ_m with Ẽ_m[j] = f_m(F_j)
    let mut effects = Vec::with_capacity(outcome_labels.len());
    for outcome in &outcome_labels {
        let mut e_tilde = DVector::zeros(n_cols);
        for (j, f) in prep_fiducials.iter().enumerate() {
            e_tilde[j] = frequency(dataset, f, outcome)?;
        }
        let e_hat = v_d.transpose() * e_tilde;
        effects.push((
            outcome.clone(),
            SpamVec::new(e_hat, Parameterization::Full),
        ));
    }
    estimate.set_povm(povm_label, Povm::new(effects, PovmKind::Unconstrained));

    Ok(estimate)
}
