//! Maximum-likelihood GST polish.
//!
//! Chi2 and log-likelihood agree to second order around the truth, so the
//! MC2GST estimate is already close; this stage re-minimizes the
//! Poisson-picture 2ΔlogL so the reported estimate is the actual MLE, whose
//! goodness-of-fit statistic has the textbook chi2 distribution.

use log::info;

use gst_core::circuit::Circuit;
use gst_core::dataset::DataSet;
use gst_core::error::GstError;
use gst_core::model::ExplicitModel;

use crate::lm::LmConfig;
use crate::mc2gst::FitRecord;
use crate::objectives::{chi2, two_delta_logl, ObjectiveKind};

/// Maximum-likelihood fit over one circuit list, warm-started from `start`
/// (usually the final MC2GST estimate).
pub fn run_mlgst(
    dataset: &DataSet,
    start: &ExplicitModel,
    circuits: &[Circuit],
    lm_cfg: &LmConfig,
) -> Result<(ExplicitModel, FitRecord), GstError> {
    let objective = std::cell::RefCell::new(crate::objectives::GstObjective::new(
        start.clone(),
        dataset,
        circuits,
        ObjectiveKind::PoissonLogl,
    )?);
    let x0 = objective.borrow().initial_vector();
    let result = crate::lm::minimize(
        |x| objective.borrow_mut().residuals(x),
        |x| objective.borrow_mut().jacobian(x),
        x0,
        lm_cfg,
    )?;
    let mut fitted = start.clone();
    fitted.from_vector(&result.x)?;

    let record = FitRecord {
        num_circuits: circuits.len(),
        chi2: chi2(&fitted, dataset, circuits, ObjectiveKind::Chi2.default_clip())?,
        two_delta_logl: two_delta_logl(
            &fitted,
            dataset,
            circuits,
            ObjectiveKind::PoissonLogl.default_clip(),
        )?,
        lm_iterations: result.iterations,
        converged: result.converged,
    };
    info!(
        "MLGST: {} circuits, 2Δlogl = {:.4e} after {} LM iterations",
        record.num_circuits, record.two_delta_logl, record.lm_iterations
    );
    Ok((fitted, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mc2gst::run_mc2gst;
    use crate::objectives::two_delta_logl;
    use gst_core::dataset::{generate_fake_data, SampleError};
    use gst_core::expdesign::std1q_xyi_design;
    use gst_core::modelpacks;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn mlgst_does_not_worsen_the_likelihood() {
        let mut truth = modelpacks::std1q_xyi::target_model_tp();
        truth.depolarize_gates(0.02);

        let design = std1q_xyi_design(vec![1, 2]);
        let circuits = design.all_circuits();
        let mut rng = StdRng::seed_from_u64(21);
        let ds = generate_fake_data(
            &truth, &circuits, 1000, SampleError::Multinomial, &mut rng, None, true,
        )
        .unwrap();

        let start = modelpacks::std1q_xyi::target_model_tp();
        let (chi2_fit, _) = run_mc2gst(&ds, &start, &circuits, &LmConfig::default()).unwrap();
        let tdl_chi2 = two_delta_logl(&chi2_fit, &ds, &circuits, 1e-6).unwrap();

        let (mle_fit, record) =
            run_mlgst(&ds, &chi2_fit, &circuits, &LmConfig::default()).unwrap();
        let tdl_mle = two_delta_logl(&mle_fit, &ds, &circuits, 1e-6).unwrap();

        assert!(
            tdl_mle <= tdl_chi2 + 1e-6,
            "MLE should not lose likelihood: {} vs {}",
            tdl_mle,
            tdl_chi2
        );
        assert!(record.two_delta_logl.is_finite());
    }

    #[test]
    fn mlgst_on_exact_data_reaches_the_likelihood_ceiling() {
        let mut truth = modelpacks::std1q_xyi::target_model_tp();
        truth.depolarize_gates(0.04);

        let design = std1q_xyi_design(vec![1, 2]);
        let circuits = design.all_circuits();
        let mut rng = StdRng::seed_from_u64(3);
        let ds = generate_fake_data(
            &truth, &circuits, 1000, SampleError::None, &mut rng, None, true,
        )
        .unwrap();

        let start = modelpacks::std1q_xyi::target_model_tp();
        let (fitted, record) = run_mlgst(&ds, &start, &circuits, &LmConfig::default()).unwrap();
        assert!(
            record.two_delta_logl < 1e-4,
            "2Δlogl on exact data should vanish, got {}",
            record.two_delta_logl
        );
        let c: Circuit = "GxGyGx".parse().unwrap();
        let pt = truth.probabilities(&c).unwrap();
        let pf = fitted.probabilities(&c).unwrap();
        for (k, v) in &pt {
            assert!((v - pf.get(k).unwrap()).abs() < 1e-2);
        }
    }
}
