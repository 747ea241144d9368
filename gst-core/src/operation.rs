//! Parameterized layer operations (process matrices).
//!
//! Every operation stores (or generates) a real transfer matrix in the
//! model's Hermitian basis and exposes the uniform parameter-vector
//! interface the optimizers drive: `num_params` / `to_vector` /
//! `from_vector` / `dmatrix_dparams`.
//!
//! Parameterizations:
//! - [`GateOp::Full`]: every entry of the d²×d² matrix is a parameter.
//! - [`GateOp::Tp`]: first row pinned to (1, 0, ..., 0); the map stays
//!   trace-preserving under optimization.
//! - [`GateOp::Static`]: fixed matrix, no parameters.
//! - [`GateOp::Lindblad`]: G = expm(Σ_k h_k H_k + Σ_k s_k S_k) · G₀, with
//!   Hamiltonian generators H_k(ρ) = -i[P_k, ρ] and Pauli-stochastic
//!   generators S_k(ρ) = P_k ρ P_k - ρ. A physical, low-dimensional error
//!   model around a target gate G₀.
//! - [`GateOp::TimeDepDepol`]: depolarization growing linearly in time,
//!   a(t) = 1 - min(rate·t, 1); the transfer matrix at time t is
//!   diag(1, a, ..., a) · G₀.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basis::Basis;
use crate::error::GstError;
use crate::linalg::expm;

/// Central finite-difference step for non-linear parameterizations.
const FD_EPS: f64 = 1e-7;

/// A parameterized gate-layer operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GateOp {
    Full(DMatrix<f64>),
    Tp(DMatrix<f64>),
    Static(DMatrix<f64>),
    Lindblad(LindbladOp),
    TimeDepDepol(TimeDepDepolOp),
}

impl GateOp {
    /// Full parameterization around the given transfer matrix.
    pub fn full(mat: DMatrix<f64>) -> Self {
        GateOp::Full(mat)
    }

    /// TP parameterization; the first row is pinned to (1, 0, ..., 0).
    pub fn tp(mut mat: DMatrix<f64>) -> Self {
        for j in 0..mat.ncols() {
            mat[(0, j)] = if j == 0 { 1.0 } else { 0.0 };
        }
        GateOp::Tp(mat)
    }

    pub fn statically(mat: DMatrix<f64>) -> Self {
        GateOp::Static(mat)
    }

    /// Lindblad error-generator parameterization around a target gate,
    /// starting with all coefficients zero (the ideal gate).
    pub fn lindblad(base: DMatrix<f64>, basis: &Basis) -> Self {
        GateOp::Lindblad(LindbladOp::new(base, basis))
    }

    /// Superoperator dimension d².
    pub fn dim(&self) -> usize {
        match self {
            GateOp::Full(m) | GateOp::Tp(m) | GateOp::Static(m) => m.nrows(),
            GateOp::Lindblad(op) => op.base.nrows(),
            GateOp::TimeDepDepol(op) => op.base.nrows(),
        }
    }

    /// The transfer matrix (time-dependent operations evaluate at t = 0).
    pub fn matrix(&self) -> DMatrix<f64> {
        match self {
            GateOp::Full(m) | GateOp::Tp(m) | GateOp::Static(m) => m.clone(),
            GateOp::Lindblad(op) => op.matrix(),
            GateOp::TimeDepDepol(op) => op.matrix_at(0.0),
        }
    }

    /// The transfer matrix at time `t`.
    pub fn matrix_at(&self, t: f64) -> DMatrix<f64> {
        match self {
            GateOp::TimeDepDepol(op) => op.matrix_at(t),
            _ => self.matrix(),
        }
    }

    pub fn num_params(&self) -> usize {
        match self {
            GateOp::Full(m) => m.nrows() * m.ncols(),
            GateOp::Tp(m) => (m.nrows() - 1) * m.ncols(),
            GateOp::Static(_) => 0,
            GateOp::Lindblad(op) => 2 * op.ham_gens.len(),
            GateOp::TimeDepDepol(_) => 1,
        }
    }

    pub fn to_vector(&self) -> DVector<f64> {
        match self {
            GateOp::Full(m) => DVector::from_iterator(
                m.nrows() * m.ncols(),
                m.row_iter().flat_map(|r| r.iter().cloned().collect::<Vec<_>>()),
            ),
            GateOp::Tp(m) => {
                let n = m.ncols();
                DVector::from_iterator(
                    (m.nrows() - 1) * n,
                    m.row_iter()
                        .skip(1)
                        .flat_map(|r| r.iter().cloned().collect::<Vec<_>>()),
                )
            }
            GateOp::Static(_) => DVector::zeros(0),
            GateOp::Lindblad(op) => {
                let k = op.ham_coeffs.len();
                let mut v = DVector::zeros(2 * k);
                v.rows_mut(0, k).copy_from(&op.ham_coeffs);
                v.rows_mut(k, k).copy_from(&op.stoch_coeffs);
                v
            }
            GateOp::TimeDepDepol(op) => DVector::from_vec(vec![op.rate]),
        }
    }

    pub fn from_vector(&mut self, v: &DVector<f64>) -> Result<(), GstError> {
        if v.len() != self.num_params() {
            return Err(GstError::ParamCountMismatch {
                expected: self.num_params(),
                actual: v.len(),
            });
        }
        match self {
            GateOp::Full(m) => {
                let n = m.ncols();
                for r in 0..m.nrows() {
                    for c in 0..n {
                        m[(r, c)] = v[r * n + c];
                    }
                }
            }
            GateOp::Tp(m) => {
                let n = m.ncols();
                for r in 1..m.nrows() {
                    for c in 0..n {
                        m[(r, c)] = v[(r - 1) * n + c];
                    }
                }
            }
            GateOp::Static(_) => {}
            GateOp::Lindblad(op) => {
                let k = op.ham_coeffs.len();
                op.ham_coeffs.copy_from(&v.rows(0, k).into_owned());
                op.stoch_coeffs.copy_from(&v.rows(k, k).into_owned());
            }
            GateOp::TimeDepDepol(op) => op.rate = v[0],
        }
        Ok(())
    }

    /// Jacobian of the flattened (row-major) transfer matrix w.r.t. this
    /// operation's parameters: (d²·d²) × num_params.
    pub fn dmatrix_dparams(&self) -> DMatrix<f64> {
        let n = self.dim();
        let flat = n * n;
        match self {
            GateOp::Full(_) => DMatrix::identity(flat, flat),
            GateOp::Tp(_) => {
                // parameters cover rows 1..n; row 0 is constant
                let mut j = DMatrix::zeros(flat, flat - n);
                for p in 0..flat - n {
                    j[(n + p, p)] = 1.0;
                }
                j
            }
            GateOp::Static(_) => DMatrix::zeros(flat, 0),
            GateOp::Lindblad(_) | GateOp::TimeDepDepol(_) => self.fd_jacobian(),
        }
    }

    /// Central finite-difference Jacobian for non-linear parameterizations.
    fn fd_jacobian(&self) -> DMatrix<f64> {
        let np = self.num_params();
        let n = self.dim();
        let flat = n * n;
        let x0 = self.to_vector();
        let mut j = DMatrix::zeros(flat, np);
        let mut probe = self.clone();
        for p in 0..np {
            let mut xp = x0.clone();
            xp[p] += FD_EPS;
            probe.from_vector(&xp).expect("same length");
            let mp = probe.matrix();
            let mut xm = x0.clone();
            xm[p] -= FD_EPS;
            probe.from_vector(&xm).expect("same length");
            let mm = probe.matrix();
            for r in 0..n {
                for c in 0..n {
                    j[(r * n + c, p)] = (mp[(r, c)] - mm[(r, c)]) / (2.0 * FD_EPS);
                }
            }
        }
        j
    }

    /// Gauge-transform: G → S⁻¹ G S. Constrained parameterizations cannot
    /// absorb an arbitrary similarity transform and refuse.
    pub fn transform(&mut self, s: &DMatrix<f64>, s_inv: &DMatrix<f64>) -> Result<(), GstError> {
        match self {
            GateOp::Full(m) | GateOp::Tp(m) | GateOp::Static(m) => {
                *m = s_inv * m.clone() * s;
                Ok(())
            }
            GateOp::Lindblad(_) => Err(GstError::OptimizationFailed(
                "Lindblad-parameterized operation cannot be gauge-transformed".into(),
            )),
            GateOp::TimeDepDepol(_) => Err(GstError::OptimizationFailed(
                "time-dependent operation cannot be gauge-transformed".into(),
            )),
        }
    }

    /// Compose with a uniform depolarizing channel: G → D·G with
    /// D = diag(1, 1-rate, ..., 1-rate).
    pub fn depolarize(&mut self, rate: f64) {
        match self {
            GateOp::Full(m) | GateOp::Tp(m) | GateOp::Static(m) => {
                for r in 1..m.nrows() {
                    for c in 0..m.ncols() {
                        m[(r, c)] *= 1.0 - rate;
                    }
                }
            }
            GateOp::Lindblad(op) => {
                // uniform depolarization = equal Pauli-stochastic rates
                let k = op.stoch_coeffs.len();
                let d2 = (k + 1) as f64;
                // expm of the stochastic generator with equal rates s gives
                // off-identity decay exp(-d² s); match (1-rate)
                let s = -(1.0 - rate).ln() / d2;
                for i in 0..k {
                    op.stoch_coeffs[i] += s;
                }
            }
            GateOp::TimeDepDepol(_) => {}
        }
    }
}

/// Lindblad error-generator parameterized operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LindbladOp {
    /// Target transfer matrix G₀.
    pub base: DMatrix<f64>,
    /// Hamiltonian coefficients h_k, one per non-identity basis element.
    pub ham_coeffs: DVector<f64>,
    /// Stochastic rates s_k, one per non-identity basis element.
    pub stoch_coeffs: DVector<f64>,
    /// Precomputed Hamiltonian generators H_k.
    ham_gens: Vec<DMatrix<f64>>,
    /// Precomputed stochastic generators S_k.
    stoch_gens: Vec<DMatrix<f64>>,
}

impl LindbladOp {
    pub fn new(base: DMatrix<f64>, basis: &Basis) -> Self {
        let d = basis.dim;
        let n = basis.superdim();
        let scale = (d as f64).sqrt(); // unnormalize basis elements to Paulis

        let mut ham_gens = Vec::with_capacity(n - 1);
        let mut stoch_gens = Vec::with_capacity(n - 1);
        for k in 1..n {
            let pauli: DMatrix<Complex64> =
                &basis.elements[k] * Complex64::new(scale, 0.0);
            ham_gens.push(hamiltonian_generator(&pauli, basis));
            stoch_gens.push(stochastic_generator(&pauli, basis));
        }

        Self {
            base,
            ham_coeffs: DVector::zeros(n - 1),
            stoch_coeffs: DVector::zeros(n - 1),
            ham_gens,
            stoch_gens,
        }
    }

    /// G = expm(L) · G₀ with L the weighted sum of generators.
    pub fn matrix(&self) -> DMatrix<f64> {
        let n = self.base.nrows();
        let mut gen = DMatrix::zeros(n, n);
        for (k, g) in self.ham_gens.iter().enumerate() {
            gen += g * self.ham_coeffs[k];
        }
        for (k, g) in self.stoch_gens.iter().enumerate() {
            gen += g * self.stoch_coeffs[k];
        }
        expm(&gen) * &self.base
    }
}

/// PTM of ρ ↦ -i[P, ρ].
pub fn hamiltonian_generator(pauli: &DMatrix<Complex64>, basis: &Basis) -> DMatrix<f64> {
    let n = basis.superdim();
    let mut g = DMatrix::zeros(n, n);
    let minus_i = Complex64::new(0.0, -1.0);
    for j in 0..n {
        let commutator = pauli * &basis.elements[j] - &basis.elements[j] * pauli;
        for i in 0..n {
            g[(i, j)] = (basis.elements[i].adjoint() * &commutator * minus_i)
                .trace()
                .re;
        }
    }
    g
}

/// PTM of ρ ↦ PρP - ρ.
pub fn stochastic_generator(pauli: &DMatrix<Complex64>, basis: &Basis) -> DMatrix<f64> {
    let n = basis.superdim();
    let mut g = DMatrix::zeros(n, n);
    for j in 0..n {
        let mapped = pauli * &basis.elements[j] * pauli - &basis.elements[j];
        for i in 0..n {
            g[(i, j)] = (basis.elements[i].adjoint() * &mapped).trace().re;
        }
    }
    g
}

/// Idle-style operation whose depolarization grows linearly with time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeDepDepolOp {
    /// Transfer matrix before any decay.
    pub base: DMatrix<f64>,
    /// Depolarization rate per unit time.
    pub rate: f64,
}

impl TimeDepDepolOp {
    pub fn new(base: DMatrix<f64>, rate: f64) -> Self {
        Self { base, rate }
    }

    pub fn matrix_at(&self, t: f64) -> DMatrix<f64> {
        let a = 1.0 - (self.rate * t).min(1.0);
        let n = self.base.nrows();
        let mut decay = DMatrix::identity(n, n);
        for k in 1..n {
            decay[(k, k)] = a;
        }
        decay * &self.base
    }
}

/// Entanglement fidelity of two transfer matrices, F_e = Tr(Tᵀ G)/d².
pub fn entanglement_fidelity(g: &DMatrix<f64>, target: &DMatrix<f64>) -> f64 {
    let d2 = g.nrows() as f64;
    (target.transpose() * g).trace() / d2
}

/// Average gate fidelity, F_avg = (d·F_e + 1)/(d + 1).
pub fn average_gate_fidelity(g: &DMatrix<f64>, target: &DMatrix<f64>) -> f64 {
    let d = (g.nrows() as f64).sqrt();
    (d * entanglement_fidelity(g, target) + 1.0) / (d + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn x_half_ptm() -> DMatrix<f64> {
        DMatrix::from_row_slice(4, 4, &[
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, -1.0,
            0.0, 0.0, 1.0, 0.0,
        ])
    }

    #[test]
    fn full_round_trips_parameters() {
        let mut op = GateOp::full(x_half_ptm());
        assert_eq!(op.num_params(), 16);
        let mut v = op.to_vector();
        v[5] = 0.93;
        op.from_vector(&v).unwrap();
        assert_relative_eq!(op.matrix()[(1, 1)], 0.93, epsilon = 1e-15);
    }

    #[test]
    fn tp_keeps_first_row_fixed() {
        let mut op = GateOp::tp(x_half_ptm());
        assert_eq!(op.num_params(), 12);
        let v = DVector::from_vec(vec![0.5; 12]);
        op.from_vector(&v).unwrap();
        let m = op.matrix();
        assert_relative_eq!(m[(0, 0)], 1.0, epsilon = 1e-15);
        assert_relative_eq!(m[(0, 1)], 0.0, epsilon = 1e-15);
        assert_relative_eq!(m[(2, 3)], 0.5, epsilon = 1e-15);
    }

    #[test]
    fn lindblad_with_zero_coeffs_is_the_base_gate() {
        let basis = Basis::pp(1);
        let op = GateOp::lindblad(x_half_ptm(), &basis);
        let m = op.matrix();
        let base = x_half_ptm();
        for i in 0..4 {
            for j in 0..4 {
                assert_relative_eq!(m[(i, j)], base[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn lindblad_stochastic_rates_depolarize() {
        let basis = Basis::pp(1);
        let mut op = GateOp::lindblad(DMatrix::identity(4, 4), &basis);
        let mut v = op.to_vector();
        // equal stochastic rates on X, Y, Z
        v[3] = 0.01;
        v[4] = 0.01;
        v[5] = 0.01;
        op.from_vector(&v).unwrap();
        let m = op.matrix();
        // L = s Σ_P (PρP - ρ) acts as -4s on each non-identity component:
        // for each Pauli Q ≠ I, two of the three P anticommute, each
        // contributing -2s. So diag = exp(-0.04).
        assert_relative_eq!(m[(0, 0)], 1.0, epsilon = 1e-10);
        let expected = (-0.04_f64).exp();
        for k in 1..4 {
            assert_relative_eq!(m[(k, k)], expected, epsilon = 1e-8);
        }
    }

    #[test]
    fn lindblad_hamiltonian_coeff_rotates() {
        let basis = Basis::pp(1);
        let mut op = GateOp::lindblad(DMatrix::identity(4, 4), &basis);
        let mut v = op.to_vector();
        v[2] = 0.1; // Z Hamiltonian coefficient
        op.from_vector(&v).unwrap();
        let m = op.matrix();
        // -i·0.1[Z, ·] generates a rotation of the X-Y plane by angle 0.2
        // (Pauli coefficient h corresponds to angle 2h)
        assert_relative_eq!(m[(1, 1)], 0.2_f64.cos(), epsilon = 1e-8);
        assert_relative_eq!(m[(3, 3)], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn fd_jacobian_matches_linear_shift_for_timedep() {
        let op = GateOp::TimeDepDepol(TimeDepDepolOp::new(DMatrix::identity(4, 4), 0.2));
        let j = op.dmatrix_dparams();
        assert_eq!(j.ncols(), 1);
        // at t=0 the matrix is rate-independent
        for r in 0..16 {
            assert_relative_eq!(j[(r, 0)], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn timedep_depol_decays_and_saturates() {
        let op = TimeDepDepolOp::new(DMatrix::identity(4, 4), 1.0);
        let m_early = op.matrix_at(0.1);
        assert_relative_eq!(m_early[(1, 1)], 0.9, epsilon = 1e-12);
        let m_late = op.matrix_at(5.0);
        assert_relative_eq!(m_late[(1, 1)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(m_late[(0, 0)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn depolarize_shrinks_fidelity() {
        let mut op = GateOp::full(x_half_ptm());
        op.depolarize(0.1);
        let f = average_gate_fidelity(&op.matrix(), &x_half_ptm());
        assert!(f < 1.0 && f > 0.8, "unexpected fidelity {}", f);
    }

    #[test]
    fn identity_has_unit_fidelity_with_itself() {
        let m = DMatrix::identity(4, 4);
        assert_relative_eq!(entanglement_fidelity(&m, &m), 1.0, epsilon = 1e-12);
        assert_relative_eq!(average_gate_fidelity(&m, &m), 1.0, epsilon = 1e-12);
    }
}
