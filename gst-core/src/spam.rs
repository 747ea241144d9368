//! State preparations and POVMs as parameterized superkets.
//!
//! A preparation is a real superket |ρ⟩⟩; a POVM is an ordered set of effect
//! superkets ⟨⟨E_m|. Outcome probabilities are inner products
//! p_m = ⟨⟨E_m|ρ⟩⟩.
//!
//! Parameterizations:
//! - `Full`: every superket entry is a free parameter.
//! - `Tp`: the unit-trace component is pinned (preps), or the POVM carries a
//!   complement effect so its effects always sum to the trace effect.
//! - `Static`: no free parameters.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::basis::Basis;
use crate::error::GstError;

/// How a SPAM vector exposes its entries as fit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parameterization {
    Full,
    Tp,
    Static,
}

/// A parameterized state-preparation or effect superket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamVec {
    vec: DVector<f64>,
    param: Parameterization,
}

impl SpamVec {
    pub fn new(vec: DVector<f64>, param: Parameterization) -> Self {
        Self { vec, param }
    }

    /// Superket of the n-qubit |0...0⟩ preparation in the given basis.
    pub fn computational_prep(basis: &Basis, param: Parameterization) -> Result<Self, GstError> {
        let mut rho = DMatrix::from_element(
            basis.dim,
            basis.dim,
            num_complex::Complex64::new(0.0, 0.0),
        );
        rho[(0, 0)] = num_complex::Complex64::new(1.0, 0.0);
        Ok(Self::new(basis.superket(&rho)?, param))
    }

    pub fn vector(&self) -> &DVector<f64> {
        &self.vec
    }

    pub fn dim(&self) -> usize {
        self.vec.len()
    }

    pub fn parameterization(&self) -> Parameterization {
        self.param
    }

    pub fn num_params(&self) -> usize {
        match self.param {
            Parameterization::Full => self.vec.len(),
            Parameterization::Tp => self.vec.len() - 1,
            Parameterization::Static => 0,
        }
    }

    pub fn to_vector(&self) -> DVector<f64> {
        match self.param {
            Parameterization::Full => self.vec.clone(),
            Parameterization::Tp => self.vec.rows(1, self.vec.len() - 1).into_owned(),
            Parameterization::Static => DVector::zeros(0),
        }
    }

    pub fn from_vector(&mut self, v: &DVector<f64>) -> Result<(), GstError> {
        if v.len() != self.num_params() {
            return Err(GstError::ParamCountMismatch {
                expected: self.num_params(),
                actual: v.len(),
            });
        }
        match self.param {
            Parameterization::Full => self.vec.copy_from(v),
            Parameterization::Tp => {
                for i in 0..v.len() {
                    self.vec[i + 1] = v[i];
                }
            }
            Parameterization::Static => {}
        }
        Ok(())
    }

    /// Jacobian of superket entries w.r.t. this object's parameters
    /// (dim × num_params).
    pub fn dvec_dparams(&self) -> DMatrix<f64> {
        let d = self.vec.len();
        match self.param {
            Parameterization::Full => DMatrix::identity(d, d),
            Parameterization::Tp => {
                let mut j = DMatrix::zeros(d, d - 1);
                for k in 0..d - 1 {
                    j[(k + 1, k)] = 1.0;
                }
                j
            }
            Parameterization::Static => DMatrix::zeros(d, 0),
        }
    }

    /// Gauge-transform as a preparation: |ρ⟩⟩ → S⁻¹|ρ⟩⟩.
    pub fn transform_prep(&mut self, s_inv: &DMatrix<f64>) {
        self.vec = s_inv * &self.vec;
    }

    /// Gauge-transform as an effect: ⟨⟨E| → ⟨⟨E|S, i.e. |E⟩⟩ → Sᵀ|E⟩⟩.
    pub fn transform_effect(&mut self, s: &DMatrix<f64>) {
        self.vec = s.transpose() * &self.vec;
    }

    /// Depolarize toward the maximally mixed state: non-identity components
    /// shrink by (1-rate).
    pub fn depolarize(&mut self, rate: f64) {
        for i in 1..self.vec.len() {
            self.vec[i] *= 1.0 - rate;
        }
    }
}

/// Whether a POVM constrains its effects to sum to the trace effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PovmKind {
    /// Effects are independent.
    Unconstrained,
    /// The last effect is the complement of the others; it carries no
    /// parameters of its own.
    TpComplement,
}

/// An ordered collection of named effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Povm {
    effects: Vec<(String, SpamVec)>,
    kind: PovmKind,
}

impl Povm {
    pub fn new(effects: Vec<(String, SpamVec)>, kind: PovmKind) -> Self {
        Self { effects, kind }
    }

    /// Computational-basis POVM with outcomes "0...0" through "1...1".
    pub fn computational(
        basis: &Basis,
        n_qubits: usize,
        param: Parameterization,
        kind: PovmKind,
    ) -> Result<Self, GstError> {
        let dim = 1usize << n_qubits;
        let mut effects = Vec::with_capacity(dim);
        for b in 0..dim {
            let mut proj = DMatrix::from_element(
                dim,
                dim,
                num_complex::Complex64::new(0.0, 0.0),
            );
            proj[(b, b)] = num_complex::Complex64::new(1.0, 0.0);
            let label: String = (0..n_qubits)
                .rev()
                .map(|q| if (b >> q) & 1 == 1 { '1' } else { '0' })
                .collect();
            let p = if kind == PovmKind::TpComplement && b == dim - 1 {
                Parameterization::Static
            } else {
                param
            };
            effects.push((label, SpamVec::new(basis.superket(&proj)?, p)));
        }
        Ok(Self { effects, kind })
    }

    pub fn kind(&self) -> PovmKind {
        self.kind
    }

    pub fn outcome_labels(&self) -> Vec<&str> {
        self.effects.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn effects(&self) -> &[(String, SpamVec)] {
        &self.effects
    }

    pub fn effect(&self, label: &str) -> Option<&SpamVec> {
        self.effects.iter().find(|(l, _)| l == label).map(|(_, e)| e)
    }

    pub fn num_effects(&self) -> usize {
        self.effects.len()
    }

    fn complement_index(&self) -> Option<usize> {
        match self.kind {
            PovmKind::TpComplement => Some(self.effects.len() - 1),
            PovmKind::Unconstrained => None,
        }
    }

    /// Superket of the trace effect (the identity operator).
    pub fn trace_effect(dim_superop: usize) -> DVector<f64> {
        let d = (dim_superop as f64).sqrt();
        let mut v = DVector::zeros(dim_superop);
        v[0] = d;
        v
    }

    /// Restore the complement effect after parameter or gauge updates.
    fn resync_complement(&mut self) {
        if let Some(ci) = self.complement_index() {
            let dim = self.effects[0].1.dim();
            let mut comp = Self::trace_effect(dim);
            for (i, (_, e)) in self.effects.iter().enumerate() {
                if i != ci {
                    comp -= e.vector();
                }
            }
            self.effects[ci].1 = SpamVec::new(comp, Parameterization::Static);
        }
    }

    pub fn num_params(&self) -> usize {
        let ci = self.complement_index();
        self.effects
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != ci)
            .map(|(_, (_, e))| e.num_params())
            .sum()
    }

    pub fn to_vector(&self) -> DVector<f64> {
        let ci = self.complement_index();
        let mut out = Vec::new();
        for (i, (_, e)) in self.effects.iter().enumerate() {
            if Some(i) != ci {
                out.extend(e.to_vector().iter().cloned());
            }
        }
        DVector::from_vec(out)
    }

    pub fn from_vector(&mut self, v: &DVector<f64>) -> Result<(), GstError> {
        if v.len() != self.num_params() {
            return Err(GstError::ParamCountMismatch {
                expected: self.num_params(),
                actual: v.len(),
            });
        }
        let ci = self.complement_index();
        let mut off = 0;
        for (i, (_, e)) in self.effects.iter_mut().enumerate() {
            if Some(i) == ci {
                continue;
            }
            let np = e.num_params();
            e.from_vector(&v.rows(off, np).into_owned())?;
            off += np;
        }
        self.resync_complement();
        Ok(())
    }

    /// Per-effect Jacobians w.r.t. the POVM's parameter vector
    /// (each dim × num_params, in effect order). The complement effect's
    /// Jacobian is minus the sum of the others'.
    pub fn effect_jacobians(&self) -> Vec<DMatrix<f64>> {
        let np = self.num_params();
        let dim = self.effects[0].1.dim();
        let ci = self.complement_index();
        let mut jacobians = Vec::with_capacity(self.effects.len());
        let mut off = 0;
        for (i, (_, e)) in self.effects.iter().enumerate() {
            let mut j = DMatrix::zeros(dim, np);
            if Some(i) != ci {
                let own = e.dvec_dparams();
                let cols = own.ncols();
                j.view_mut((0, off), (dim, cols)).copy_from(&own);
                off += cols;
            }
            jacobians.push(j);
        }
        if let Some(ci) = ci {
            let mut comp = DMatrix::zeros(dim, np);
            for (i, j) in jacobians.iter().enumerate() {
                if i != ci {
                    comp -= j;
                }
            }
            jacobians[ci] = comp;
        }
        jacobians
    }

    pub fn transform(&mut self, s: &DMatrix<f64>) {
        for (_, e) in &mut self.effects {
            e.transform_effect(s);
        }
    }

    pub fn depolarize(&mut self, rate: f64) {
        for (_, e) in &mut self.effects {
            e.depolarize(rate);
        }
        self.resync_complement();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn computational_prep_has_expected_superket() {
        let basis = Basis::pp(1);
        let prep = SpamVec::computational_prep(&basis, Parameterization::Tp).unwrap();
        let s = 1.0 / 2.0_f64.sqrt();
        assert_relative_eq!(prep.vector()[0], s, epsilon = 1e-12);
        assert_relative_eq!(prep.vector()[3], s, epsilon = 1e-12);
        assert_eq!(prep.num_params(), 3);
    }

    #[test]
    fn tp_prep_round_trips_parameters_without_touching_trace() {
        let basis = Basis::pp(1);
        let mut prep = SpamVec::computational_prep(&basis, Parameterization::Tp).unwrap();
        let trace_component = prep.vector()[0];
        let v = DVector::from_vec(vec![0.1, -0.2, 0.3]);
        prep.from_vector(&v).unwrap();
        assert_relative_eq!(prep.vector()[0], trace_component, epsilon = 1e-15);
        assert_relative_eq!(prep.vector()[2], -0.2, epsilon = 1e-15);
        assert_eq!(prep.to_vector(), v);
    }

    #[test]
    fn computational_povm_effects_sum_to_trace() {
        let basis = Basis::pp(1);
        let povm = Povm::computational(
            &basis,
            1,
            Parameterization::Full,
            PovmKind::TpComplement,
        )
        .unwrap();
        let total: DVector<f64> = povm.effects()[0].1.vector() + povm.effects()[1].1.vector();
        let trace = Povm::trace_effect(4);
        for i in 0..4 {
            assert_relative_eq!(total[i], trace[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn tp_complement_tracks_parameter_updates() {
        let basis = Basis::pp(1);
        let mut povm = Povm::computational(
            &basis,
            1,
            Parameterization::Full,
            PovmKind::TpComplement,
        )
        .unwrap();
        assert_eq!(povm.num_params(), 4); // only the "0" effect is free

        let mut v = povm.to_vector();
        v[1] += 0.05;
        povm.from_vector(&v).unwrap();

        let total: DVector<f64> =
            povm.effects()[0].1.vector() + povm.effects()[1].1.vector();
        let trace = Povm::trace_effect(4);
        for i in 0..4 {
            assert_relative_eq!(total[i], trace[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn complement_jacobian_is_minus_sum_of_others() {
        let basis = Basis::pp(1);
        let povm = Povm::computational(
            &basis,
            1,
            Parameterization::Full,
            PovmKind::TpComplement,
        )
        .unwrap();
        let jacs = povm.effect_jacobians();
        assert_eq!(jacs.len(), 2);
        let sum = &jacs[0] + &jacs[1];
        for x in sum.iter() {
            assert_relative_eq!(*x, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn effect_gauge_transform_preserves_probabilities_with_prep() {
        let basis = Basis::pp(1);
        let mut prep = SpamVec::computational_prep(&basis, Parameterization::Full).unwrap();
        let mut povm = Povm::computational(
            &basis,
            1,
            Parameterization::Full,
            PovmKind::Unconstrained,
        )
        .unwrap();
        let p_before = povm.effects()[0].1.vector().dot(prep.vector());

        let s = DMatrix::from_row_slice(4, 4, &[
            1.0, 0.0, 0.0, 0.0,
            0.2, 1.1, 0.0, 0.0,
            0.0, 0.0, 0.9, 0.1,
            0.0, 0.0, -0.1, 1.0,
        ]);
        let s_inv = s.clone().try_inverse().unwrap();
        prep.transform_prep(&s_inv);
        povm.transform(&s);
        let p_after = povm.effects()[0].1.vector().dot(prep.vector());
        assert_relative_eq!(p_before, p_after, epsilon = 1e-10);
    }
}
