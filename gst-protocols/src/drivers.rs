//! The long-sequence GST pipeline.
//!
//! `run_long_sequence_gst` chains the standard stages: LGST seed, gauge-fix
//! to the target frame, cast into the target's parameterization, iterative
//! MC2GST over the nested circuit lists, MLGST polish, and a final gauge
//! optimization. The result carries the per-iteration fit records and the
//! model-violation statistics of the final estimate.

use log::info;
use nalgebra::DVector;

use gst_core::circuit::Label;
use gst_core::dataset::DataSet;
use gst_core::error::GstError;
use gst_core::expdesign::StdDesign;
use gst_core::model::ExplicitModel;
use gst_core::operation::GateOp;
use gst_core::spam::{Parameterization, Povm, PovmKind, SpamVec};

use crate::confidence::nongauge_param_count;
use crate::gaugeopt::{gaugeopt_to_target, GaugeGroup, GaugeOptConfig};
use crate::lgst::run_lgst;
use crate::lm::LmConfig;
use crate::mc2gst::{run_iterative_mc2gst, FitRecord};
use crate::mlgst::run_mlgst;
use crate::objectives::{data_dof, nsigma, two_delta_logl, ObjectiveKind};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct GstConfig {
    pub lm: LmConfig,
    pub gaugeopt: GaugeOptConfig,
}

impl Default for GstConfig {
    fn default() -> Self {
        Self { lm: LmConfig::default(), gaugeopt: GaugeOptConfig::default() }
    }
}

/// Everything the pipeline produces.
#[derive(Debug, Clone)]
pub struct GstResults {
    /// The gauge-fixed LGST seed, cast to the target's parameterization.
    pub seed: ExplicitModel,
    /// One record per MC2GST iteration.
    pub iteration_records: Vec<FitRecord>,
    /// The MLGST polish record.
    pub final_record: FitRecord,
    /// The final, gauge-optimized estimate.
    pub estimate: ExplicitModel,
    /// Frobenius distance of the estimate to the target after gauge opt.
    pub gauge_distance: f64,
    /// 2ΔlogL of the final estimate over the full circuit list.
    pub two_delta_logl: f64,
    /// Degrees of freedom for the model-violation test.
    pub dof: usize,
    /// Standard deviations of model violation above expectation.
    pub nsigma: f64,
}

/// Re-express `source` (a fully-parameterized estimate) in the
/// parameterization of `template`, copying matrices and superkets over.
fn cast_to_parameterization(
    template: &ExplicitModel,
    source: &ExplicitModel,
) -> Result<ExplicitModel, GstError> {
    let mut out = template.clone();
    let d2 = template.superdim();

    for (label, op) in template.operations() {
        let mat = source.operation(label)?.matrix();
        let cast = match op {
            GateOp::Full(_) => GateOp::full(mat),
            GateOp::Tp(_) => GateOp::tp(mat),
            GateOp::Static(_) => GateOp::statically(mat),
            // generator-parameterized templates keep their own starting point
            other => other.clone(),
        };
        out.set_operation(label.clone(), cast);
    }

    for (label, prep) in template.preps() {
        let mut v = source.prep(label)?.vector().clone();
        if prep.parameterization() == Parameterization::Tp {
            // pin the unit-trace component: v₀ = 1/√d with d = √(d²)
            let d = (d2 as f64).sqrt();
            v[0] = 1.0 / d.sqrt();
        }
        out.set_prep(label.clone(), SpamVec::new(v, prep.parameterization()));
    }

    for (label, povm) in template.povms() {
        let src = source.povm(label)?;
        let mut effects = Vec::with_capacity(povm.num_effects());
        match povm.kind() {
            PovmKind::Unconstrained => {
                for ((name, e_t), (_, e_s)) in povm.effects().iter().zip(src.effects()) {
                    effects.push((
                        name.clone(),
                        SpamVec::new(e_s.vector().clone(), e_t.parameterization()),
                    ));
                }
            }
            PovmKind::TpComplement => {
                let trace = Povm::trace_effect(d2);
                let mut sum = DVector::zeros(d2);
                let last = povm.num_effects() - 1;
                for (i, ((name, e_t), (_, e_s))) in
                    povm.effects().iter().zip(src.effects()).enumerate()
                {
                    if i < last {
                        sum += e_s.vector();
                        effects.push((
                            name.clone(),
                            SpamVec::new(e_s.vector().clone(), e_t.parameterization()),
                        ));
                    } else {
                        effects.push((
                            name.clone(),
                            SpamVec::new(&trace - &sum, Parameterization::Static),
                        ));
                    }
                }
            }
        }
        out.set_povm(label.clone(), Povm::new(effects, povm.kind()));
    }

    Ok(out)
}

/// Run the full long-sequence GST pipeline.
pub fn run_long_sequence_gst(
    dataset: &DataSet,
    target: &ExplicitModel,
    design: &StdDesign,
    cfg: &GstConfig,
) -> Result<GstResults, GstError> {
    // 1. linear-inversion seed
    let gate_labels: Vec<Label> = target
        .operations()
        .keys()
        .map(|k| Label::new(k.clone()))
        .collect();
    info!("stage 1: LGST over {} gates", gate_labels.len());
    let lgst = run_lgst(dataset, target, &design.prep_fiducials, &design.meas_fiducials)?;

    // 2. bring the seed into the target's frame (full gauge group — the
    //    LGST gauge is arbitrary)
    info!("stage 2: gauge-fixing the LGST seed to the target frame");
    let seed_gauge_cfg = GaugeOptConfig {
        group: GaugeGroup::Full,
        gate_weight: cfg.gaugeopt.gate_weight,
        spam_weight: cfg.gaugeopt.spam_weight,
        lm: cfg.gaugeopt.lm.clone(),
    };
    let (lgst_fixed, _) = gaugeopt_to_target(&lgst, target, &seed_gauge_cfg)?;

    // 3. cast into the target's parameterization
    let seed = cast_to_parameterization(target, &lgst_fixed)?;

    // 4. iterative chi2 fitting over the nested lists
    info!("stage 3: iterative MC2GST");
    let lists = design.circuit_lists();
    let (chi2_model, iteration_records) =
        run_iterative_mc2gst(dataset, &seed, &lists, &cfg.lm)?;

    // 5. maximum-likelihood polish on the longest list
    info!("stage 4: MLGST polish");
    let final_list = lists.last().cloned().unwrap_or_default();
    let (mle_model, final_record) = run_mlgst(dataset, &chi2_model, &final_list, &cfg.lm)?;

    // 6. gauge-optimize the estimate toward the target for reporting
    info!("stage 5: final gauge optimization");
    let (estimate, gauge_distance) = gaugeopt_to_target(&mle_model, target, &cfg.gaugeopt)?;

    // model violation statistics
    let tdl = two_delta_logl(
        &estimate,
        dataset,
        &final_list,
        ObjectiveKind::PoissonLogl.default_clip(),
    )?;
    let k_data = data_dof(&estimate, &final_list)?;
    let k_model = nongauge_param_count(&estimate, cfg.gaugeopt.group)?;
    let dof = k_data.saturating_sub(k_model).max(1);
    let ns = nsigma(tdl, dof);
    info!(
        "GST complete: 2Δlogl = {:.3e}, dof = {}, Nσ = {:.2}",
        tdl, dof, ns
    );

    Ok(GstResults {
        seed,
        iteration_records,
        final_record,
        estimate,
        gauge_distance,
        two_delta_logl: tdl,
        dof,
        nsigma: ns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gst_core::dataset::{generate_fake_data, SampleError};
    use gst_core::expdesign::std1q_xyi_design;
    use gst_core::modelpacks;
    use gst_core::operation::average_gate_fidelity;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn pipeline_recovers_a_noisy_model() {
        let mut truth = modelpacks::std1q_xyi::target_model_tp();
        truth.depolarize_gates(0.02);

        let target = modelpacks::std1q_xyi::target_model_tp();
        let design = std1q_xyi_design(vec![1, 2, 4]);
        let circuits = design.all_circuits();
        let mut rng = StdRng::seed_from_u64(2024);
        let ds = generate_fake_data(
            &truth, &circuits, 1000, SampleError::None, &mut rng, None, true,
        )
        .unwrap();

        let results = run_long_sequence_gst(&ds, &target, &design, &GstConfig::default())
            .unwrap();

        // exact data: essentially no model violation
        assert!(
            results.two_delta_logl < 1e-2,
            "2Δlogl = {}",
            results.two_delta_logl
        );

        // the estimated Gx should carry the injected depolarization:
        // average gate fidelity to the ideal ≈ (1 + (d-1)(1-r))/... — just
        // check it is depressed by roughly the right amount
        let est_gx = results.estimate.operation("Gx").unwrap().matrix();
        let ideal_gx = modelpacks::std1q_xyi::gx_ptm();
        let f_est = average_gate_fidelity(&est_gx, &ideal_gx);
        let true_gx = truth.operation("Gx").unwrap().matrix();
        let f_true = average_gate_fidelity(&true_gx, &ideal_gx);
        assert!(
            (f_est - f_true).abs() < 5e-3,
            "estimated fidelity {} vs true {}",
            f_est,
            f_true
        );
    }

    #[test]
    fn cast_preserves_parameterization_and_matrices() {
        let target = modelpacks::std1q_xyi::target_model_tp();
        let mut source = modelpacks::std1q_xyi::target_model_full();
        source.depolarize_gates(0.05);
        let cast = cast_to_parameterization(&target, &source).unwrap();
        assert_eq!(cast.num_params(), target.num_params());
        let m = cast.operation("Gx").unwrap().matrix();
        assert!((m[(1, 1)] - 0.95).abs() < 1e-12);
        // TP pinning
        assert!((m[(0, 0)] - 1.0).abs() < 1e-12);
    }
}
