//! Fit objectives: chi-squared and Poisson-picture log-likelihood.
//!
//! Both are exposed as residual vectors for Levenberg–Marquardt, one term
//! per (circuit, outcome):
//!
//! - chi2:  r = √N (p - f) / √max(p, clip), so Σr² is the familiar
//!   Σ N(p-f)²/p with small-probability clipping of the weights.
//! - logl:  r = sign(p-f)·√(2[Np - n + n·ln(n/(Np))]), so Σr² is
//!   2ΔlogL = 2(logL_max - logL) in the Poisson picture — the quantity that
//!   is asymptotically chi2-distributed and feeds the model-violation
//!   "N sigma" figure of merit.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use gst_core::circuit::Circuit;
use gst_core::dataset::DataSet;
use gst_core::error::GstError;
use gst_core::model::ExplicitModel;

/// Which residual family an objective uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveKind {
    Chi2,
    PoissonLogl,
}

impl ObjectiveKind {
    /// Conventional small-probability clip for each objective.
    pub fn default_clip(self) -> f64 {
        match self {
            ObjectiveKind::Chi2 => 1e-4,
            ObjectiveKind::PoissonLogl => 1e-6,
        }
    }
}

/// A least-squares view of a GST fit: a working model plus per-(circuit,
/// outcome) counts, frozen at construction.
pub struct GstObjective<'a> {
    model: ExplicitModel,
    dataset: &'a DataSet,
    circuits: Vec<Circuit>,
    kind: ObjectiveKind,
    clip: f64,
    /// Outcome labels per circuit, fixing the residual ordering.
    outcomes: Vec<Vec<String>>,
    /// Total shots per circuit.
    totals: Vec<f64>,
    /// Observed counts per (circuit, outcome), aligned with `outcomes`.
    counts: Vec<Vec<f64>>,
}

impl<'a> GstObjective<'a> {
    pub fn new(
        model: ExplicitModel,
        dataset: &'a DataSet,
        circuits: &[Circuit],
        kind: ObjectiveKind,
    ) -> Result<Self, GstError> {
        let clip = kind.default_clip();
        let mut outcomes = Vec::with_capacity(circuits.len());
        let mut totals = Vec::with_capacity(circuits.len());
        let mut counts = Vec::with_capacity(circuits.len());
        for c in circuits {
            let row_counts = dataset.counts(c)?;
            let probs = model.probabilities(c)?;
            let labels: Vec<String> = probs.keys().cloned().collect();
            let n: Vec<f64> = labels
                .iter()
                .map(|l| row_counts.get(l).copied().unwrap_or(0.0))
                .collect();
            totals.push(n.iter().sum());
            outcomes.push(labels);
            counts.push(n);
        }
        Ok(Self {
            model,
            dataset,
            circuits: circuits.to_vec(),
            kind,
            clip,
            outcomes,
            totals,
            counts,
        })
    }

    pub fn num_residuals(&self) -> usize {
        self.outcomes.iter().map(|o| o.len()).sum()
    }

    pub fn num_params(&self) -> usize {
        self.model.num_params()
    }

    pub fn initial_vector(&self) -> DVector<f64> {
        self.model.to_vector()
    }

    /// The working model at a given parameter vector.
    pub fn model_at(&mut self, x: &DVector<f64>) -> Result<&ExplicitModel, GstError> {
        self.model.from_vector(x)?;
        Ok(&self.model)
    }

    fn residual_and_slope(&self, p: f64, n: f64, total: f64) -> (f64, f64) {
        let f = if total > 0.0 { n / total } else { 0.0 };
        match self.kind {
            ObjectiveKind::Chi2 => {
                let w = p.max(self.clip);
                let r = total.sqrt() * (p - f) / w.sqrt();
                let mut slope = total.sqrt() / w.sqrt();
                if p > self.clip {
                    slope -= total.sqrt() * (p - f) / (2.0 * w.powf(1.5));
                }
                (r, slope)
            }
            ObjectiveKind::PoissonLogl => {
                // clip protects the log when counts were observed; an
                // unobserved outcome with p = 0 contributes exactly nothing
                let pc = p.max(self.clip);
                let (v2, dv2dp) = if n > 0.0 {
                    let lambda = total * pc;
                    (
                        2.0 * (lambda - n + n * (n / lambda).ln()),
                        2.0 * (total - n / pc),
                    )
                } else {
                    (2.0 * total * p.max(0.0), 2.0 * total)
                };
                let r = (pc - f).signum() * v2.max(0.0).sqrt();
                let slope = if r.abs() > 1e-8 {
                    0.5 * dv2dp / r
                } else {
                    (total / pc.max(1e-12)).sqrt()
                };
                (r, slope)
            }
        }
    }

    /// Residual vector at parameter vector `x`.
    pub fn residuals(&mut self, x: &DVector<f64>) -> Result<DVector<f64>, GstError> {
        self.model.from_vector(x)?;
        let mut r = DVector::zeros(self.num_residuals());
        let mut idx = 0;
        for (ci, circuit) in self.circuits.iter().enumerate() {
            let probs = self.model.probabilities(circuit)?;
            for (oi, outcome) in self.outcomes[ci].iter().enumerate() {
                let p = probs.get(outcome).copied().unwrap_or(0.0);
                let (res, _) = self.residual_and_slope(p, self.counts[ci][oi], self.totals[ci]);
                r[idx] = res;
                idx += 1;
            }
        }
        Ok(r)
    }

    /// Residual Jacobian at parameter vector `x` (num_residuals × num_params).
    pub fn jacobian(&mut self, x: &DVector<f64>) -> Result<DMatrix<f64>, GstError> {
        self.model.from_vector(x)?;
        let np = self.model.num_params();
        let mut j = DMatrix::zeros(self.num_residuals(), np);
        let mut idx = 0;
        for (ci, circuit) in self.circuits.iter().enumerate() {
            let dprobs = self.model.dprobs(circuit)?;
            for (oi, outcome) in self.outcomes[ci].iter().enumerate() {
                if let Some((p, grad)) = dprobs.get(outcome) {
                    let (_, slope) =
                        self.residual_and_slope(*p, self.counts[ci][oi], self.totals[ci]);
                    for k in 0..np {
                        j[(idx, k)] = slope * grad[k];
                    }
                }
                idx += 1;
            }
        }
        Ok(j)
    }

    /// Σ r² at `x`.
    pub fn value(&mut self, x: &DVector<f64>) -> Result<f64, GstError> {
        Ok(self.residuals(x)?.iter().map(|r| r * r).sum())
    }

    pub fn dataset(&self) -> &DataSet {
        self.dataset
    }
}

// ---- scalar objective functions ----------------------------------------

/// Σ_c N_c Σ_m (p - f)²/max(p, clip).
pub fn chi2(
    model: &ExplicitModel,
    dataset: &DataSet,
    circuits: &[Circuit],
    min_prob_clip: f64,
) -> Result<f64, GstError> {
    let mut total = 0.0;
    for c in circuits {
        let counts = dataset.counts(c)?;
        let n_total: f64 = counts.values().sum();
        let probs = model.probabilities(c)?;
        for (outcome, p) in &probs {
            let f = counts.get(outcome).copied().unwrap_or(0.0) / n_total;
            let w = p.max(min_prob_clip);
            total += n_total * (p - f) * (p - f) / w;
        }
    }
    Ok(total)
}

/// Poisson-picture log-likelihood Σ n·ln(Np) - Np.
pub fn logl(
    model: &ExplicitModel,
    dataset: &DataSet,
    circuits: &[Circuit],
    min_prob_clip: f64,
) -> Result<f64, GstError> {
    let mut total = 0.0;
    for c in circuits {
        let counts = dataset.counts(c)?;
        let n_total: f64 = counts.values().sum();
        let probs = model.probabilities(c)?;
        for (outcome, p) in &probs {
            let n = counts.get(outcome).copied().unwrap_or(0.0);
            if n > 0.0 {
                let lambda = n_total * p.max(min_prob_clip);
                total += n * lambda.ln() - lambda;
            } else {
                total -= n_total * p.max(0.0);
            }
        }
    }
    Ok(total)
}

/// The likelihood ceiling: Σ n·ln(n) - n.
pub fn logl_max(dataset: &DataSet, circuits: &[Circuit]) -> Result<f64, GstError> {
    let mut total = 0.0;
    for c in circuits {
        for (_, &n) in dataset.counts(c)? {
            if n > 0.0 {
                total += n * n.ln() - n;
            }
        }
    }
    Ok(total)
}

/// 2(logL_max - logL): the model-violation statistic.
pub fn two_delta_logl(
    model: &ExplicitModel,
    dataset: &DataSet,
    circuits: &[Circuit],
    min_prob_clip: f64,
) -> Result<f64, GstError> {
    Ok(2.0 * (logl_max(dataset, circuits)? - logl(model, dataset, circuits, min_prob_clip)?))
}

/// Independent data degrees of freedom: Σ_c (outcomes - 1).
pub fn data_dof(model: &ExplicitModel, circuits: &[Circuit]) -> Result<usize, GstError> {
    let mut k = 0;
    for c in circuits {
        let probs: BTreeMap<String, f64> = model.probabilities(c)?;
        k += probs.len().saturating_sub(1);
    }
    Ok(k)
}

/// How many standard deviations the observed 2ΔlogL sits above its
/// chi2 expectation with `dof` degrees of freedom.
pub fn nsigma(two_delta_logl: f64, dof: usize) -> f64 {
    let k = dof.max(1) as f64;
    (two_delta_logl - k) / (2.0 * k).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gst_core::dataset::{generate_fake_data, SampleError};
    use gst_core::modelpacks;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn exact_data(circuits: &[Circuit]) -> DataSet {
        let model = modelpacks::std1q_xyi::target_model_tp();
        let mut rng = StdRng::seed_from_u64(0);
        generate_fake_data(
            &model, circuits, 1000, SampleError::None, &mut rng, None, true,
        )
        .unwrap()
    }

    fn circuits() -> Vec<Circuit> {
        ["{}", "Gx", "Gy", "GxGx", "GxGyGx"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect()
    }

    #[test]
    fn perfect_model_has_zero_chi2_and_max_logl() {
        let model = modelpacks::std1q_xyi::target_model_tp();
        let cs = circuits();
        let ds = exact_data(&cs);
        assert_relative_eq!(chi2(&model, &ds, &cs, 1e-4).unwrap(), 0.0, epsilon = 1e-9);
        let tdl = two_delta_logl(&model, &ds, &cs, 1e-6).unwrap();
        assert_relative_eq!(tdl, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn wrong_model_is_penalized() {
        let mut model = modelpacks::std1q_xyi::target_model_tp();
        model.depolarize_gates(0.1);
        let cs = circuits();
        let ds = exact_data(&cs);
        assert!(chi2(&model, &ds, &cs, 1e-4).unwrap() > 1.0);
        assert!(two_delta_logl(&model, &ds, &cs, 1e-6).unwrap() > 1.0);
    }

    #[test]
    fn objective_value_matches_scalar_chi2() {
        let mut model = modelpacks::std1q_xyi::target_model_tp();
        model.depolarize_gates(0.03);
        let cs = circuits();
        let ds = exact_data(&cs);
        let expected = chi2(&model, &ds, &cs, 1e-4).unwrap();
        let mut obj =
            GstObjective::new(model.clone(), &ds, &cs, ObjectiveKind::Chi2).unwrap();
        let x = model.to_vector();
        assert_relative_eq!(obj.value(&x).unwrap(), expected, epsilon = 1e-8);
    }

    #[test]
    fn poisson_residuals_square_to_two_delta_logl() {
        let mut model = modelpacks::std1q_xyi::target_model_tp();
        model.depolarize_gates(0.05);
        let cs = circuits();
        let ds = exact_data(&cs);
        let expected = two_delta_logl(&model, &ds, &cs, 1e-6).unwrap();
        let mut obj =
            GstObjective::new(model.clone(), &ds, &cs, ObjectiveKind::PoissonLogl).unwrap();
        let x = model.to_vector();
        assert_relative_eq!(obj.value(&x).unwrap(), expected, epsilon = 1e-6);
    }

    #[test]
    fn jacobian_matches_finite_difference_residuals() {
        let mut model = modelpacks::std1q_xyi::target_model_tp();
        model.depolarize_gates(0.04);
        let cs = circuits();
        let ds = exact_data(&cs);
        let mut obj = GstObjective::new(model.clone(), &ds, &cs, ObjectiveKind::Chi2).unwrap();
        let x0 = model.to_vector();
        let j = obj.jacobian(&x0).unwrap();
        let eps = 1e-6;
        for pidx in [0usize, 7, 21, 40] {
            let mut xp = x0.clone();
            xp[pidx] += eps;
            let rp = obj.residuals(&xp).unwrap();
            let mut xm = x0.clone();
            xm[pidx] -= eps;
            let rm = obj.residuals(&xm).unwrap();
            for row in 0..rp.len() {
                let fd = (rp[row] - rm[row]) / (2.0 * eps);
                assert_relative_eq!(j[(row, pidx)], fd, epsilon = 2e-4);
            }
        }
    }

    #[test]
    fn nsigma_is_centered_for_expected_violation() {
        assert_relative_eq!(nsigma(31.0, 31), 0.0, epsilon = 1e-12);
        assert!(nsigma(100.0, 31) > 5.0);
    }

    #[test]
    fn zero_count_rows_stay_finite() {
        let model = modelpacks::std1q_xyi::target_model_tp();
        let cs: Vec<Circuit> = vec!["GxGx".parse().unwrap()]; // p("0") = 0
        let ds = exact_data(&cs);
        let v = two_delta_logl(&model, &ds, &cs, 1e-6).unwrap();
        assert!(v.is_finite());
        let c = chi2(&model, &ds, &cs, 1e-4).unwrap();
        assert!(c.is_finite());
    }
}
