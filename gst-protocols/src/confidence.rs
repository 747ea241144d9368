//! Hessian-based confidence regions in gate-set space.
//!
//! The Hessian of the (log-likelihood) objective at the estimate is the
//! Fisher information — except along gauge directions, where the objective
//! is exactly flat. The region is therefore built by projecting the Hessian
//! onto the non-gauge subspace, scaling by the chi2 quantile for the
//! requested confidence level, and inverting only the non-gauge eigenvalues:
//!
//! ```text
//! Q = P H P / C1,   C1 = chi2⁻¹(level, 1)
//! error bar for parameter k = sqrt(|Q⁻¹[k,k]|)   (profile likelihood)
//! ```
//!
//! Intervals for scalar functions of a gate follow by linearization: the
//! function's parameter-space gradient is contracted against Q⁻¹.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use gst_core::circuit::Circuit;
use gst_core::dataset::DataSet;
use gst_core::error::GstError;
use gst_core::linalg::{complement_projector, rank};
use gst_core::model::ExplicitModel;

use crate::gaugeopt::{gauge_group_generators, GaugeGroup};
use crate::objectives::{GstObjective, ObjectiveKind};
use crate::stats::chi2_quantile;

/// Finite-difference step for gauge directions and function gradients.
const EPS: f64 = 1e-6;

/// Columns spanning the gauge directions in model-parameter space:
/// d(params)/dε under S = I + εΛ for each group generator Λ.
pub fn gauge_directions(
    model: &ExplicitModel,
    group: GaugeGroup,
) -> Result<DMatrix<f64>, GstError> {
    let d2 = model.superdim();
    let gens = gauge_group_generators(d2, group);
    let x0 = model.to_vector();
    let np = x0.len();
    let mut dirs = DMatrix::zeros(np, gens.len());
    for (a, gen) in gens.iter().enumerate() {
        let s = DMatrix::identity(d2, d2) + gen * EPS;
        let mut copy = model.clone();
        copy.transform_gauge(&s)?;
        let x1 = copy.to_vector();
        for k in 0..np {
            dirs[(k, a)] = (x1[k] - x0[k]) / EPS;
        }
    }
    Ok(dirs)
}

/// Number of model parameters that change probabilities: total params minus
/// the rank of the gauge-direction matrix.
pub fn nongauge_param_count(
    model: &ExplicitModel,
    group: GaugeGroup,
) -> Result<usize, GstError> {
    let dirs = gauge_directions(model, group)?;
    Ok(model.num_params() - rank(&dirs, 1e-7))
}

/// Gauss–Newton Hessian of the Poisson-picture log-likelihood: 2 JᵀJ of the
/// logl residual vector at the model's current parameters.
pub fn logl_hessian(
    model: &ExplicitModel,
    dataset: &DataSet,
    circuits: &[Circuit],
) -> Result<DMatrix<f64>, GstError> {
    let mut obj = GstObjective::new(
        model.clone(),
        dataset,
        circuits,
        ObjectiveKind::PoissonLogl,
    )?;
    let x = model.to_vector();
    let j = obj.jacobian(&x)?;
    Ok(2.0 * j.transpose() * j)
}

/// A quadratic-form confidence region around a model estimate.
#[derive(Debug, Clone)]
pub struct ConfidenceRegion {
    model: ExplicitModel,
    inv_quad_form: DMatrix<f64>,
    profile_intervals: DVector<f64>,
    /// Confidence level as a percentage.
    pub level: f64,
    pub n_nongauge: usize,
    pub n_gauge: usize,
    /// Multiplier converting 1-D intervals to full-region intervals.
    pub interval_scaling: f64,
}

impl ConfidenceRegion {
    /// Build the region from a Hessian evaluated at `model`.
    pub fn new(
        model: &ExplicitModel,
        hessian: &DMatrix<f64>,
        level_percent: f64,
        group: GaugeGroup,
    ) -> Result<Self, GstError> {
        if !(0.0 < level_percent && level_percent < 100.0) {
            return Err(GstError::OptimizationFailed(format!(
                "confidence level must be a percentage in (0,100), got {}",
                level_percent
            )));
        }
        if level_percent < 1.0 {
            log::warn!(
                "confidence level {}% is unusually small; the level is a \
                 percentage in (0,100), not a fraction",
                level_percent
            );
        }
        let np = model.num_params();
        if hessian.nrows() != np {
            return Err(GstError::dim(np, hessian.nrows()));
        }

        let dirs = gauge_directions(model, group)?;
        let n_gauge = rank(&dirs, 1e-7);
        let n_nongauge = np - n_gauge;

        // project out the flat directions
        let proj = complement_projector(&dirs, 1e-7)?;
        let projected = &proj * hessian * &proj;

        let c1 = chi2_quantile(level_percent / 100.0, 1);
        let ck = chi2_quantile(level_percent / 100.0, n_nongauge.max(1));
        let quad_form = projected / c1;
        let interval_scaling = (ck / c1).sqrt();

        // eigen-invert only the non-gauge part
        let eig = SymmetricEigen::new(quad_form);
        let evals = &eig.eigenvalues;
        let u = &eig.eigenvectors;
        let mut order: Vec<usize> = (0..np).collect();
        order.sort_by(|&a, &b| {
            evals[a].abs().partial_cmp(&evals[b].abs()).expect("finite eigenvalues")
        });
        let mut inv_evals = DVector::zeros(np);
        for &i in order.iter().skip(n_gauge) {
            if evals[i].abs() > 1e-300 {
                inv_evals[i] = 1.0 / evals[i];
            }
        }
        let inv_quad_form = u * DMatrix::from_diagonal(&inv_evals) * u.transpose();

        let profile_intervals =
            DVector::from_fn(np, |k, _| inv_quad_form[(k, k)].abs().sqrt());

        Ok(Self {
            model: model.clone(),
            inv_quad_form,
            profile_intervals,
            level: level_percent,
            n_nongauge,
            n_gauge,
            interval_scaling,
        })
    }

    /// Profile-likelihood half-widths for every model parameter.
    pub fn profile_intervals(&self) -> &DVector<f64> {
        &self.profile_intervals
    }

    /// Half-widths for the parameters of one labeled member.
    pub fn member_intervals(&self, label: &str) -> Option<DVector<f64>> {
        self.model
            .param_spans()
            .into_iter()
            .find(|(l, _, _)| l == label)
            .map(|(_, start, n)| self.profile_intervals.rows(start, n).into_owned())
    }

    /// Linearized confidence interval for a scalar function of one gate's
    /// transfer matrix. Returns (value, half-width).
    pub fn gate_function_interval<F>(
        &self,
        gate_label: &str,
        f: F,
    ) -> Result<(f64, f64), GstError>
    where
        F: Fn(&DMatrix<f64>) -> f64,
    {
        let np = self.model.num_params();
        let (_, start, n) = self
            .model
            .param_spans()
            .into_iter()
            .find(|(l, _, _)| l == gate_label)
            .ok_or_else(|| GstError::UnknownLabel(gate_label.into()))?;

        let f0 = f(&self.model.operation(gate_label)?.matrix());
        let x0 = self.model.to_vector();
        let mut grad = DVector::zeros(np);
        for i in 0..n {
            let mut x = x0.clone();
            x[start + i] += EPS;
            let mut probe = self.model.clone();
            probe.from_vector(&x)?;
            grad[start + i] = (f(&probe.operation(gate_label)?.matrix()) - f0) / EPS;
        }

        let var = (grad.transpose() * &self.inv_quad_form * &grad)[(0, 0)];
        Ok((f0, var.abs().sqrt()))
    }
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
    fn xyi_tp_model_has_31_nongauge_params() {
        let model = modelpacks::std1q_xyi::target_model_tp();
        let n = nongauge_param_count(&model, GaugeGroup::Tp).unwrap();
        assert_eq!(n, 31, "43 TP params minus 12 TP gauge directions");
    }

    #[test]
    fn gauge_directions_are_flat_directions_of_probabilities() {
        let model = modelpacks::std1q_xyi::target_model_full();
        let dirs = gauge_directions(&model, GaugeGroup::Full).unwrap();
        // move along a gauge direction and check probabilities barely move
        let x0 = model.to_vector();
        let step = dirs.column(5) * 1e-4;
        let mut moved = model.clone();
        moved.from_vector(&(&x0 + &step)).unwrap();
        let c: Circuit = "GxGyGx".parse().unwrap();
        let p0 = model.probabilities(&c).unwrap();
        let p1 = moved.probabilities(&c).unwrap();
        for (k, v) in &p0 {
            assert!(
                (v - p1.get(k).unwrap()).abs() < 1e-6,
                "gauge direction changed probabilities"
            );
        }
    }

    #[test]
    fn confidence_region_yields_finite_positive_error_bars() {
        let mut truth = modelpacks::std1q_xyi::target_model_tp();
        truth.depolarize_gates(0.02);
        let design = std1q_xyi_design(vec![1, 2]);
        let circuits = design.all_circuits();
        let mut rng = StdRng::seed_from_u64(17);
        let ds = generate_fake_data(
            &truth, &circuits, 1000, SampleError::Multinomial, &mut rng, None, true,
        )
        .unwrap();

        let hessian = logl_hessian(&truth, &ds, &circuits).unwrap();
        let region = ConfidenceRegion::new(&truth, &hessian, 95.0, GaugeGroup::Tp).unwrap();

        assert_eq!(region.n_gauge + region.n_nongauge, truth.num_params());
        assert!(region.interval_scaling >= 1.0);
        let intervals = region.profile_intervals();
        assert!(intervals.iter().all(|v| v.is_finite() && *v >= 0.0));
        // a 95% error bar on a 1000-shot experiment should be small
        let gx = region.member_intervals("Gx").unwrap();
        assert!(gx.iter().all(|v| *v < 0.5), "Gx intervals: {:?}", gx);
    }

    #[test]
    fn fidelity_interval_brackets_small_uncertainty() {
        let mut truth = modelpacks::std1q_xyi::target_model_tp();
        truth.depolarize_gates(0.02);
        let design = std1q_xyi_design(vec![1, 2]);
        let circuits = design.all_circuits();
        let mut rng = StdRng::seed_from_u64(23);
        let ds = generate_fake_data(
            &truth, &circuits, 1000, SampleError::Multinomial, &mut rng, None, true,
        )
        .unwrap();
        let hessian = logl_hessian(&truth, &ds, &circuits).unwrap();
        let region = ConfidenceRegion::new(&truth, &hessian, 95.0, GaugeGroup::Tp).unwrap();

        let ideal = modelpacks::std1q_xyi::gx_ptm();
        let (f0, df) = region
            .gate_function_interval("Gx", |g| average_gate_fidelity(g, &ideal))
            .unwrap();
        assert!(f0 > 0.95 && f0 < 1.0, "fidelity {}", f0);
        assert!(df > 0.0 && df < 0.1, "half-width {}", df);
    }

    #[test]
    fn out_of_range_confidence_level_is_rejected() {
        let model = modelpacks::std1q_xyi::target_model_tp();
        let h = DMatrix::identity(model.num_params(), model.num_params());
        assert!(ConfidenceRegion::new(&model, &h, 100.0, GaugeGroup::Tp).is_err());
        assert!(ConfidenceRegion::new(&model, &h, 0.0, GaugeGroup::Tp).is_err());
    }
}
