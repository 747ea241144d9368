//! Forward simulation: circuit outcome probabilities and their gradients.
//!
//! Three interchangeable strategies (selected by the model's
//! [`SimType`](crate::model::SimType)):
//!
//! - **Matrix**: compose the full circuit transfer matrix, then sandwich
//!   between effect and preparation. O(L·d⁶) but exposes the prefix/suffix
//!   product cache needed for analytic Jacobians.
//! - **Map**: propagate the superket layer by layer, O(L·d⁴). Same numbers,
//!   cheaper for long circuits.
//! - **Stabilizer**: Pauli-frame tableau tracking for Clifford-only
//!   circuits; see [`crate::stabilizer`].
//!
//! Circuits containing instrument labels fan out into one branch per
//! instrument outcome; branch outcomes are prefixed onto the POVM outcome
//! labels (`"0:1"` = instrument outcome 0, then POVM outcome 1).

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::circuit::Circuit;
use crate::error::GstError;
use crate::linalg::outer_flat;
use crate::model::{ExplicitModel, SimType};
use crate::stabilizer;

/// One instrument-resolved execution path through a circuit.
struct Branch {
    /// Instrument outcome prefix ("" when the circuit has no instruments).
    prefix: String,
    /// Transfer matrices in application order.
    mats: Vec<DMatrix<f64>>,
    /// Parameterized-operation label per layer (None for instrument members).
    op_labels: Vec<Option<String>>,
}

/// Expand a circuit into instrument branches, fetching each layer's
/// transfer matrix at time `t`.
fn expand_branches(
    model: &ExplicitModel,
    circuit: &Circuit,
    t: Option<f64>,
) -> Result<Vec<Branch>, GstError> {
    let mut branches = vec![Branch {
        prefix: String::new(),
        mats: Vec::with_capacity(circuit.len()),
        op_labels: Vec::with_capacity(circuit.len()),
    }];

    for label in circuit.layers() {
        let name = label.name();
        if let Some(inst) = model.instrument(name) {
            let mut next = Vec::with_capacity(branches.len() * inst.num_members());
            for branch in &branches {
                for (outcome, mat) in inst.members() {
                    let mut prefix = branch.prefix.clone();
                    if !prefix.is_empty() {
                        prefix.push(':');
                    }
                    prefix.push_str(outcome);
                    let mut mats = branch.mats.clone();
                    mats.push(mat.clone());
                    let mut op_labels = branch.op_labels.clone();
                    op_labels.push(None);
                    next.push(Branch { prefix, mats, op_labels });
                }
            }
            branches = next;
        } else {
            let op = model.operation(name)?;
            let mat = match t {
                Some(time) => op.matrix_at(time),
                None => op.matrix(),
            };
            for branch in &mut branches {
                branch.mats.push(mat.clone());
                branch.op_labels.push(Some(name.to_string()));
            }
        }
    }
    Ok(branches)
}

fn outcome_label(prefix: &str, povm_outcome: &str) -> String {
    if prefix.is_empty() {
        povm_outcome.to_string()
    } else {
        format!("{}:{}", prefix, povm_outcome)
    }
}

fn dense_probabilities(
    model: &ExplicitModel,
    circuit: &Circuit,
    t: Option<f64>,
) -> Result<BTreeMap<String, f64>, GstError> {
    let prep = model.prep(model.default_prep_label())?;
    let povm = model.povm(model.default_povm_label())?;
    let branches = expand_branches(model, circuit, t)?;

    let mut probs = BTreeMap::new();
    for branch in &branches {
        let state = match model.sim_type {
            SimType::Matrix => {
                // full product, then apply once
                let n = model.superdim();
                let mut total = DMatrix::identity(n, n);
                for m in &branch.mats {
                    total = m * total;
                }
                total * prep.vector()
            }
            _ => {
                // layer-by-layer matrix-vector propagation
                let mut state = prep.vector().clone();
                for m in &branch.mats {
                    state = m * state;
                }
                state
            }
        };
        for (outcome, effect) in povm.effects() {
            let p = effect.vector().dot(&state);
            *probs.entry(outcome_label(&branch.prefix, outcome)).or_insert(0.0) += p;
        }
    }
    Ok(probs)
}

/// Outcome probabilities for one circuit.
pub fn probabilities(
    model: &ExplicitModel,
    circuit: &Circuit,
) -> Result<BTreeMap<String, f64>, GstError> {
    match model.sim_type {
        SimType::Stabilizer => stabilizer::probabilities(model, circuit),
        _ => dense_probabilities(model, circuit, None),
    }
}

/// Outcome probabilities with time-dependent operations evaluated at `t`.
pub fn probabilities_at_time(
    model: &ExplicitModel,
    circuit: &Circuit,
    t: f64,
) -> Result<BTreeMap<String, f64>, GstError> {
    match model.sim_type {
        SimType::Stabilizer => stabilizer::probabilities(model, circuit),
        _ => dense_probabilities(model, circuit, Some(t)),
    }
}

/// Probabilities for a whole circuit list.
pub fn bulk_probabilities(
    model: &ExplicitModel,
    circuits: &[Circuit],
) -> Result<Vec<BTreeMap<String, f64>>, GstError> {
    #[cfg(feature = "parallel")]
    {
        circuits.par_iter().map(|c| probabilities(model, c)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        circuits.iter().map(|c| probabilities(model, c)).collect()
    }
}

/// Probabilities and gradients w.r.t. the model parameter vector.
///
/// Uses the prefix/suffix product cache: with forward states
/// s_k = M_k ··· M_1 |ρ⟩⟩ and backward effects ⟨⟨b_k| = ⟨⟨E| M_L ··· M_k,
/// the derivative w.r.t. a parameter of layer k is
/// ⟨⟨b_{k+1}| ∂M_k |s_{k-1}⟩⟩ — each layer's Jacobian contracts against an
/// outer product of cached vectors instead of a fresh chain of products.
pub fn dprobs(
    model: &ExplicitModel,
    circuit: &Circuit,
) -> Result<BTreeMap<String, (f64, DVector<f64>)>, GstError> {
    let prep = model.prep(model.default_prep_label())?;
    let povm = model.povm(model.default_povm_label())?;
    let branches = expand_branches(model, circuit, None)?;

    let np = model.num_params();
    let spans: BTreeMap<String, (usize, usize)> = model
        .param_spans()
        .into_iter()
        .map(|(l, s, n)| (l, (s, n)))
        .collect();

    // per-operation matrix Jacobians, computed once per circuit
    let mut op_jacobians: BTreeMap<String, DMatrix<f64>> = BTreeMap::new();
    for branch in &branches {
        for label in branch.op_labels.iter().flatten() {
            if !op_jacobians.contains_key(label) {
                op_jacobians.insert(label.clone(), model.operation(label)?.dmatrix_dparams());
            }
        }
    }

    let prep_span = spans.get(model.default_prep_label()).copied();
    let povm_span = spans.get(model.default_povm_label()).copied();
    let prep_jac = prep.dvec_dparams();
    let effect_jacs = povm.effect_jacobians();

    let mut out: BTreeMap<String, (f64, DVector<f64>)> = BTreeMap::new();
    for branch in &branches {
        let len = branch.mats.len();

        // forward states s_0 .. s_L
        let mut forward = Vec::with_capacity(len + 1);
        forward.push(prep.vector().clone());
        for m in &branch.mats {
            let next = m * forward.last().expect("nonempty");
            forward.push(next);
        }

        for (ei, (outcome, effect)) in povm.effects().iter().enumerate() {
            // backward effects b_{L+1} .. b_1 (stored reversed)
            let mut backward = vec![effect.vector().clone()];
            for m in branch.mats.iter().rev() {
                let next = m.transpose() * backward.last().expect("nonempty");
                backward.push(next);
            }
            backward.reverse(); // backward[k] = b_{k+1} for k = 0..L

            let p = effect.vector().dot(&forward[len]);
            let mut grad = DVector::zeros(np);

            // gate-layer contributions
            for k in 0..len {
                if let Some(label) = &branch.op_labels[k] {
                    let (start, n_op) = spans[label.as_str()];
                    if n_op == 0 {
                        continue;
                    }
                    let jac = &op_jacobians[label.as_str()];
                    let flat = outer_flat(&backward[k + 1], &forward[k]);
                    for pidx in 0..n_op {
                        let mut acc = 0.0;
                        for r in 0..flat.len() {
                            acc += flat[r] * jac[(r, pidx)];
                        }
                        grad[start + pidx] += acc;
                    }
                }
            }

            // preparation contribution: b_1ᵀ · ∂ρ/∂θ
            if let Some((start, n_prep)) = prep_span {
                if n_prep > 0 {
                    let row = backward[0].transpose() * &prep_jac;
                    for pidx in 0..n_prep {
                        grad[start + pidx] += row[(0, pidx)];
                    }
                }
            }

            // effect contribution: s_Lᵀ · ∂E/∂θ
            if let Some((start, n_povm)) = povm_span {
                if n_povm > 0 {
                    let row = forward[len].transpose() * &effect_jacs[ei];
                    for pidx in 0..n_povm {
                        grad[start + pidx] += row[(0, pidx)];
                    }
                }
            }

            let label = outcome_label(&branch.prefix, outcome);
            match out.get_mut(&label) {
                Some((p0, g0)) => {
                    *p0 += p;
                    *g0 += grad;
                }
                None => {
                    out.insert(label, (p, grad));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Instrument;
    use crate::model::SimType;
    use crate::modelpacks;
    use approx::assert_relative_eq;

    #[test]
    fn gx_on_ket0_is_even_odds() {
        let model = modelpacks::std1q_xyi::target_model_tp();
        let c: Circuit = "Gx".parse().unwrap();
        let p = model.probabilities(&c).unwrap();
        assert_relative_eq!(*p.get("0").unwrap(), 0.5, epsilon = 1e-10);
        assert_relative_eq!(*p.get("1").unwrap(), 0.5, epsilon = 1e-10);
    }

    #[test]
    fn gxgx_flips_the_qubit() {
        let model = modelpacks::std1q_xyi::target_model_tp();
        let c: Circuit = "GxGx".parse().unwrap();
        let p = model.probabilities(&c).unwrap();
        assert_relative_eq!(*p.get("1").unwrap(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn empty_circuit_measures_the_prep() {
        let model = modelpacks::std1q_xyi::target_model_tp();
        let p = model.probabilities(&Circuit::empty()).unwrap();
        assert_relative_eq!(*p.get("0").unwrap(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn matrix_and_map_sims_agree() {
        let mut matrix_model = modelpacks::std1q_xyi::target_model_tp();
        matrix_model.depolarize_gates(0.03);
        let mut map_model = matrix_model.clone();
        matrix_model.sim_type = SimType::Matrix;
        map_model.sim_type = SimType::Map;

        for s in ["Gx", "GxGyGi", "(GxGy)^3", "GyGyGyGx"] {
            let c: Circuit = s.parse().unwrap();
            let pa = matrix_model.probabilities(&c).unwrap();
            let pb = map_model.probabilities(&c).unwrap();
            for (k, v) in &pa {
                assert_relative_eq!(v, pb.get(k).unwrap(), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn probabilities_sum_to_one_for_tp_model() {
        let mut model = modelpacks::std1q_xyi::target_model_tp();
        model.depolarize_gates(0.02);
        model.depolarize_spam(0.01);
        for s in ["{}", "Gx", "GxGy", "(GxGyGi)^4"] {
            let c: Circuit = s.parse().unwrap();
            let p = model.probabilities(&c).unwrap();
            let total: f64 = p.values().sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn dprobs_matches_finite_differences() {
        let mut model = modelpacks::std1q_xyi::target_model_tp();
        model.depolarize_gates(0.05);
        let c: Circuit = "GxGyGx".parse().unwrap();

        let dp = model.dprobs(&c).unwrap();
        let x0 = model.to_vector();
        let eps = 1e-6;

        for pidx in [0usize, 3, 10, 20, 42] {
            let mut xp = x0.clone();
            xp[pidx] += eps;
            let mut mp = model.clone();
            mp.from_vector(&xp).unwrap();
            let pp = mp.probabilities(&c).unwrap();

            let mut xm = x0.clone();
            xm[pidx] -= eps;
            let mut mm = model.clone();
            mm.from_vector(&xm).unwrap();
            let pm = mm.probabilities(&c).unwrap();

            for (outcome, (_, grad)) in &dp {
                let fd = (pp.get(outcome).unwrap() - pm.get(outcome).unwrap()) / (2.0 * eps);
                assert_relative_eq!(grad[pidx], fd, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn instrument_branches_compose_outcomes() {
        let mut model = modelpacks::std1q_xyi::target_model_tp();
        let inst = Instrument::computational(&model.basis, 1).unwrap();
        model.set_instrument("Iz", inst);

        let c: Circuit = "GxIz".parse().unwrap();
        let p = model.probabilities(&c).unwrap();
        // after Gx the state is an even mixture; the instrument projects
        // and the follow-up measurement agrees with the projection
        assert_relative_eq!(*p.get("0:0").unwrap(), 0.5, epsilon = 1e-10);
        assert_relative_eq!(*p.get("1:1").unwrap(), 0.5, epsilon = 1e-10);
        assert_relative_eq!(*p.get("0:1").unwrap(), 0.0, epsilon = 1e-10);
        let total: f64 = p.values().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn bulk_matches_single() {
        let model = modelpacks::std1q_xyi::target_model_tp();
        let circuits: Vec<Circuit> =
            ["Gx", "GyGy", "{}"].iter().map(|s| s.parse().unwrap()).collect();
        let bulk = model.bulk_probabilities(&circuits).unwrap();
        for (c, probs) in circuits.iter().zip(&bulk) {
            let single = model.probabilities(c).unwrap();
            for (k, v) in probs {
                assert_relative_eq!(v, single.get(k).unwrap(), epsilon = 1e-14);
            }
        }
    }
}
