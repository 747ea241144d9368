//! Explicit models: one operator per layer label.
//!
//! An [`ExplicitModel`] is the parameterized collection GST estimates: state
//! preparations, POVMs, gate operations and instruments, together with a
//! forward-simulation strategy. Circuit outcome probabilities are
//!
//! ```text
//! p(m | c) = ⟨⟨E_m| G_{c_L} ··· G_{c_1} |ρ⟩⟩
//! ```
//!
//! The model exposes a single flat parameter vector (preparations, then
//! POVMs, then operations, each in sorted-label order) so the estimators can
//! drive it like any other least-squares problem.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::Rng;

use crate::basis::Basis;
use crate::circuit::Circuit;
use crate::error::GstError;
use crate::fwdsim;
use crate::instrument::Instrument;
use crate::linalg::expm;
use crate::operation::{hamiltonian_generator, GateOp};
use crate::spam::{Povm, SpamVec};

/// Forward-simulation strategy (spec: evolution type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimType {
    /// Compose the full circuit transfer matrix, then sandwich. Supports
    /// analytic probability Jacobians.
    Matrix,
    /// Propagate the superket layer by layer (cheaper for long circuits).
    Map,
    /// Stabilizer-frame tracking; Clifford-only circuits.
    Stabilizer,
}

/// A parameterized collection of preparations, POVMs, operations and
/// instruments over a fixed Hermitian basis.
#[derive(Debug, Clone)]
pub struct ExplicitModel {
    pub basis: Basis,
    pub sim_type: SimType,
    preps: BTreeMap<String, SpamVec>,
    povms: BTreeMap<String, Povm>,
    operations: BTreeMap<String, GateOp>,
    instruments: BTreeMap<String, Instrument>,
    default_prep: String,
    default_povm: String,
}

impl ExplicitModel {
    pub fn new(basis: Basis, sim_type: SimType) -> Self {
        Self {
            basis,
            sim_type,
            preps: BTreeMap::new(),
            povms: BTreeMap::new(),
            operations: BTreeMap::new(),
            instruments: BTreeMap::new(),
            default_prep: "rho0".into(),
            default_povm: "Mdefault".into(),
        }
    }

    /// Superoperator dimension d².
    pub fn superdim(&self) -> usize {
        self.basis.superdim()
    }

    pub fn set_prep(&mut self, label: impl Into<String>, prep: SpamVec) {
        self.preps.insert(label.into(), prep);
    }

    pub fn set_povm(&mut self, label: impl Into<String>, povm: Povm) {
        self.povms.insert(label.into(), povm);
    }

    pub fn set_operation(&mut self, label: impl Into<String>, op: GateOp) {
        self.operations.insert(label.into(), op);
    }

    pub fn set_instrument(&mut self, label: impl Into<String>, inst: Instrument) {
        self.instruments.insert(label.into(), inst);
    }

    pub fn prep(&self, label: &str) -> Result<&SpamVec, GstError> {
        self.preps
            .get(label)
            .ok_or_else(|| GstError::UnknownLabel(label.into()))
    }

    pub fn povm(&self, label: &str) -> Result<&Povm, GstError> {
        self.povms
            .get(label)
            .ok_or_else(|| GstError::UnknownLabel(label.into()))
    }

    pub fn operation(&self, label: &str) -> Result<&GateOp, GstError> {
        self.operations
            .get(label)
            .ok_or_else(|| GstError::UnknownLabel(label.into()))
    }

    pub fn instrument(&self, label: &str) -> Option<&Instrument> {
        self.instruments.get(label)
    }

    pub fn preps(&self) -> &BTreeMap<String, SpamVec> {
        &self.preps
    }

    pub fn povms(&self) -> &BTreeMap<String, Povm> {
        &self.povms
    }

    pub fn operations(&self) -> &BTreeMap<String, GateOp> {
        &self.operations
    }

    pub fn operations_mut(&mut self) -> &mut BTreeMap<String, GateOp> {
        &mut self.operations
    }

    pub fn instruments(&self) -> &BTreeMap<String, Instrument> {
        &self.instruments
    }

    pub fn default_prep_label(&self) -> &str {
        &self.default_prep
    }

    pub fn default_povm_label(&self) -> &str {
        &self.default_povm
    }

    // ---- probabilities -------------------------------------------------

    /// Outcome-label → probability map for one circuit.
    pub fn probabilities(&self, circuit: &Circuit) -> Result<BTreeMap<String, f64>, GstError> {
        fwdsim::probabilities(self, circuit)
    }

    /// Outcome probabilities with time-dependent operations evaluated at `t`.
    pub fn probabilities_at_time(
        &self,
        circuit: &Circuit,
        t: f64,
    ) -> Result<BTreeMap<String, f64>, GstError> {
        fwdsim::probabilities_at_time(self, circuit, t)
    }

    /// Probabilities for many circuits; rayon-parallel when the `parallel`
    /// feature is on.
    pub fn bulk_probabilities(
        &self,
        circuits: &[Circuit],
    ) -> Result<Vec<BTreeMap<String, f64>>, GstError> {
        fwdsim::bulk_probabilities(self, circuits)
    }

    /// Probabilities and their gradients w.r.t. the model parameter vector.
    pub fn dprobs(
        &self,
        circuit: &Circuit,
    ) -> Result<BTreeMap<String, (f64, DVector<f64>)>, GstError> {
        fwdsim::dprobs(self, circuit)
    }

    // ---- parameter vector ----------------------------------------------

    pub fn num_params(&self) -> usize {
        self.preps.values().map(|p| p.num_params()).sum::<usize>()
            + self.povms.values().map(|p| p.num_params()).sum::<usize>()
            + self.operations.values().map(|o| o.num_params()).sum::<usize>()
    }

    /// (label, start, length) spans of each member within the parameter
    /// vector, in concatenation order.
    pub fn param_spans(&self) -> Vec<(String, usize, usize)> {
        let mut spans = Vec::new();
        let mut off = 0;
        for (l, p) in &self.preps {
            spans.push((l.clone(), off, p.num_params()));
            off += p.num_params();
        }
        for (l, p) in &self.povms {
            spans.push((l.clone(), off, p.num_params()));
            off += p.num_params();
        }
        for (l, o) in &self.operations {
            spans.push((l.clone(), off, o.num_params()));
            off += o.num_params();
        }
        spans
    }

    pub fn to_vector(&self) -> DVector<f64> {
        let mut out = Vec::with_capacity(self.num_params());
        for p in self.preps.values() {
            out.extend(p.to_vector().iter().cloned());
        }
        for p in self.povms.values() {
            out.extend(p.to_vector().iter().cloned());
        }
        for o in self.operations.values() {
            out.extend(o.to_vector().iter().cloned());
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
        let mut off = 0;
        for p in self.preps.values_mut() {
            let np = p.num_params();
            p.from_vector(&v.rows(off, np).into_owned())?;
            off += np;
        }
        for p in self.povms.values_mut() {
            let np = p.num_params();
            p.from_vector(&v.rows(off, np).into_owned())?;
            off += np;
        }
        for o in self.operations.values_mut() {
            let np = o.num_params();
            o.from_vector(&v.rows(off, np).into_owned())?;
            off += np;
        }
        Ok(())
    }

    // ---- transformations -----------------------------------------------

    /// Gauge-transform the whole model: |ρ⟩⟩ → S⁻¹|ρ⟩⟩, |E⟩⟩ → Sᵀ|E⟩⟩,
    /// G → S⁻¹GS. Predicted probabilities are invariant.
    pub fn transform_gauge(&mut self, s: &DMatrix<f64>) -> Result<(), GstError> {
        let s_inv = s
            .clone()
            .try_inverse()
            .ok_or_else(|| GstError::SingularMatrix("gauge transform".into()))?;
        for p in self.preps.values_mut() {
            p.transform_prep(&s_inv);
        }
        for p in self.povms.values_mut() {
            p.transform(s);
        }
        for o in self.operations.values_mut() {
            o.transform(s, &s_inv)?;
        }
        for i in self.instruments.values_mut() {
            i.transform(s, &s_inv);
        }
        Ok(())
    }

    /// Depolarize every gate operation.
    pub fn depolarize_gates(&mut self, rate: f64) {
        for o in self.operations.values_mut() {
            o.depolarize(rate);
        }
    }

    /// Depolarize preparations and effects.
    pub fn depolarize_spam(&mut self, rate: f64) {
        for p in self.preps.values_mut() {
            p.depolarize(rate);
        }
        for p in self.povms.values_mut() {
            p.depolarize(rate);
        }
    }

    /// Compose every gate with a small unitary rotation
    /// exp(-i Σ_k θ_k P_k / 2), θ given per non-identity basis element.
    pub fn rotate_gates(&mut self, angles: &[f64]) -> Result<(), GstError> {
        let n = self.superdim();
        if angles.len() != n - 1 {
            return Err(GstError::ParamCountMismatch {
                expected: n - 1,
                actual: angles.len(),
            });
        }
        let rot = self.rotation_ptm(angles);
        for o in self.operations.values_mut() {
            let m = rot.clone() * o.matrix();
            match o {
                GateOp::Full(g) | GateOp::Tp(g) | GateOp::Static(g) => *g = m,
                _ => {
                    return Err(GstError::OptimizationFailed(
                        "cannot rotate a generator-parameterized operation".into(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Compose every gate with an independent random small rotation, angles
    /// uniform in [-scale, scale].
    pub fn randomize_unitary<R: Rng>(&mut self, scale: f64, rng: &mut R) {
        let n = self.superdim();
        let labels: Vec<String> = self.operations.keys().cloned().collect();
        for label in labels {
            let angles: Vec<f64> =
                (0..n - 1).map(|_| rng.gen_range(-scale..scale)).collect();
            let rot = self.rotation_ptm(&angles);
            if let Some(o) = self.operations.get_mut(&label) {
                if let GateOp::Full(g) | GateOp::Tp(g) | GateOp::Static(g) = o {
                    *g = rot.clone() * g.clone();
                }
            }
        }
    }

    /// Transfer matrix of exp(-i Σ_k θ_k P_k / 2) via the Hamiltonian
    /// generator: PTM = expm(Σ_k (θ_k/2) L_{P_k}).
    fn rotation_ptm(&self, angles: &[f64]) -> DMatrix<f64> {
        let n = self.superdim();
        let scale = (self.basis.dim as f64).sqrt();
        let mut gen = DMatrix::zeros(n, n);
        for (k, &theta) in angles.iter().enumerate() {
            if theta == 0.0 {
                continue;
            }
            let pauli: DMatrix<Complex64> =
                &self.basis.elements[k + 1] * Complex64::new(scale, 0.0);
            gen += hamiltonian_generator(&pauli, &self.basis) * (theta / 2.0);
        }
        expm(&gen)
    }

    // ---- distances ------------------------------------------------------

    /// Root-sum-square Frobenius distance over matching operations and SPAM.
    pub fn frobenius_distance(&self, other: &ExplicitModel) -> f64 {
        let mut total = 0.0;
        for (l, o) in &self.operations {
            if let Ok(oo) = other.operation(l) {
                total += (o.matrix() - oo.matrix()).iter().map(|x| x * x).sum::<f64>();
            }
        }
        for (l, p) in &self.preps {
            if let Ok(pp) = other.prep(l) {
                total += (p.vector() - pp.vector()).iter().map(|x| x * x).sum::<f64>();
            }
        }
        for (l, p) in &self.povms {
            if let Ok(pp) = other.povm(l) {
                for ((_, e), (_, ee)) in p.effects().iter().zip(pp.effects()) {
                    total += (e.vector() - ee.vector()).iter().map(|x| x * x).sum::<f64>();
                }
            }
        }
        total.sqrt()
    }
}
