//! Quantum instruments: layer operations with a classical outcome.
//!
//! An instrument is an ordered set of completely-positive maps, one per
//! classical outcome, whose sum is trace preserving. Running a circuit
//! containing an instrument label produces composite outcome labels
//! `"<instrument outcome>:<povm outcome>"`, one branch per member.

use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basis::Basis;
use crate::error::GstError;

/// An ordered label → transfer-matrix map. Members are static in this
/// release (they contribute no fit parameters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    members: Vec<(String, DMatrix<f64>)>,
}

impl Instrument {
    pub fn new(members: Vec<(String, DMatrix<f64>)>) -> Self {
        Self { members }
    }

    /// The computational-basis projective instrument: member k is
    /// ρ ↦ |k⟩⟨k| ρ |k⟩⟨k|.
    pub fn computational(basis: &Basis, n_qubits: usize) -> Result<Self, GstError> {
        let dim = 1usize << n_qubits;
        let mut members = Vec::with_capacity(dim);
        for b in 0..dim {
            let mut proj =
                DMatrix::from_element(dim, dim, Complex64::new(0.0, 0.0));
            proj[(b, b)] = Complex64::new(1.0, 0.0);
            let label: String = (0..n_qubits)
                .rev()
                .map(|q| if (b >> q) & 1 == 1 { '1' } else { '0' })
                .collect();
            members.push((label, basis.sandwich_to_transfer_matrix(&proj, &proj)?));
        }
        Ok(Self { members })
    }

    pub fn members(&self) -> &[(String, DMatrix<f64>)] {
        &self.members
    }

    pub fn num_members(&self) -> usize {
        self.members.len()
    }

    pub fn dim(&self) -> usize {
        self.members[0].1.nrows()
    }

    /// Sum of all member maps. Trace preserving for a valid instrument.
    pub fn total_map(&self) -> DMatrix<f64> {
        let n = self.dim();
        let mut total = DMatrix::zeros(n, n);
        for (_, m) in &self.members {
            total += m;
        }
        total
    }

    /// Check the TP-sum invariant: the first row of the summed transfer
    /// matrix must be (1, 0, ..., 0) within `tol`.
    pub fn is_trace_preserving(&self, tol: f64) -> bool {
        let total = self.total_map();
        if (total[(0, 0)] - 1.0).abs() > tol {
            return false;
        }
        (1..total.ncols()).all(|j| total[(0, j)].abs() <= tol)
    }

    /// Gauge-transform every member: M → S⁻¹ M S.
    pub fn transform(&mut self, s: &DMatrix<f64>, s_inv: &DMatrix<f64>) {
        for (_, m) in &mut self.members {
            *m = s_inv * m.clone() * s;
        }
    }
}

/// Compose an instrument outcome with a downstream outcome label.
pub fn composite_outcome(instrument_outcome: &str, rest: &str) -> String {
    format!("{}:{}", instrument_outcome, rest)
}
