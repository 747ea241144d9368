//! Hermitian operator bases and the superoperator picture.
//!
//! A basis here is an orthonormal set of d×d matrices {B_i} under the
//! Hilbert–Schmidt inner product ⟨A,B⟩ = Tr(A†B). Density matrices expand as
//! real coordinate vectors ("superkets") |ρ⟩⟩_i = Tr(B_i† ρ), and channels
//! become real d²×d² matrices acting on those coordinates.
//!
//! Two bases are provided:
//!
//! - **pp** (Pauli product): normalized tensor products of {I, X, Y, Z}/√2.
//!   Hermitian, so superkets of Hermitian operators are real and the transfer
//!   matrix of any CPTP map is real — the Pauli transfer matrix (PTM). The
//!   PTM of a trace-preserving map has first row (1, 0, ..., 0).
//! - **std** (matrix units): E_ij with a 1 in entry (i,j). Useful as an
//!   intermediate when converting process representations.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use num_traits::{One, Zero};

use crate::error::GstError;

/// One-qubit Pauli matrices (unnormalized).
pub fn pauli_matrices() -> [DMatrix<Complex64>; 4] {
    let z = Complex64::zero();
    let o = Complex64::one();
    let i = Complex64::new(0.0, 1.0);
    [
        DMatrix::from_row_slice(2, 2, &[o, z, z, o]),            // I
        DMatrix::from_row_slice(2, 2, &[z, o, o, z]),            // X
        DMatrix::from_row_slice(2, 2, &[z, -i, i, z]),           // Y
        DMatrix::from_row_slice(2, 2, &[o, z, z, -o]),           // Z
    ]
}

/// An orthonormal Hermitian-operator basis for a d-dimensional Hilbert space.
#[derive(Debug, Clone)]
pub struct Basis {
    /// Short name: "pp" or "std".
    pub name: String,
    /// Hilbert space dimension d (superoperator dimension is d²).
    pub dim: usize,
    /// Basis element labels, e.g. "IX", "ZZ".
    pub labels: Vec<String>,
    /// Basis element matrices, each d×d with Tr(B_i† B_j) = δ_ij.
    pub elements: Vec<DMatrix<Complex64>>,
}

impl Basis {
    /// Normalized Pauli-product basis on `n_qubits` qubits.
    ///
    /// Element order is lexicographic in (I, X, Y, Z) per qubit, so the
    /// identity element comes first — the convention the TP first-row
    /// invariant relies on.
    pub fn pp(n_qubits: usize) -> Self {
        let paulis = pauli_matrices();
        let names = ["I", "X", "Y", "Z"];
        let dim = 1usize << n_qubits;
        let norm = Complex64::new(1.0 / (dim as f64).sqrt(), 0.0);

        let mut labels = Vec::new();
        let mut elements = Vec::new();
        for idx in 0..dim * dim {
            // digits of idx base 4, most significant qubit first
            let mut digits = vec![0usize; n_qubits];
            let mut rem = idx;
            for q in (0..n_qubits).rev() {
                digits[q] = rem % 4;
                rem /= 4;
            }
            let mut label = String::new();
            let mut mat = DMatrix::from_element(1, 1, Complex64::new(1.0, 0.0));
            for &dgt in &digits {
                label.push_str(names[dgt]);
                mat = mat.kronecker(&paulis[dgt]);
            }
            elements.push(mat * norm);
            labels.push(label);
        }

        Self { name: "pp".into(), dim, labels, elements }
    }

    /// Matrix-unit ("standard") basis: E_ij, row-major order.
    pub fn std(dim: usize) -> Self {
        let mut labels = Vec::new();
        let mut elements = Vec::new();
        for i in 0..dim {
            for j in 0..dim {
                let mut m = DMatrix::from_element(dim, dim, Complex64::new(0.0, 0.0));
                m[(i, j)] = Complex64::new(1.0, 0.0);
                elements.push(m);
                labels.push(format!("E{}{}", i, j));
            }
        }
        Self { name: "std".into(), dim, labels, elements }
    }

    /// Superoperator dimension d².
    pub fn superdim(&self) -> usize {
        self.dim * self.dim
    }

    /// Expand a Hermitian operator into its real superket coordinates.
    pub fn superket(&self, rho: &DMatrix<Complex64>) -> Result<DVector<f64>, GstError> {
        if rho.nrows() != self.dim || rho.ncols() != self.dim {
            return Err(GstError::dim(self.dim, rho.nrows()));
        }
        let mut v = DVector::zeros(self.superdim());
        for (k, b) in self.elements.iter().enumerate() {
            v[k] = (b.adjoint() * rho).trace().re;
        }
        Ok(v)
    }

    /// Reconstruct the operator from superket coordinates.
    pub fn from_superket(&self, v: &DVector<f64>) -> Result<DMatrix<Complex64>, GstError> {
        if v.len() != self.superdim() {
            return Err(GstError::dim(self.superdim(), v.len()));
        }
        let mut rho = DMatrix::from_element(self.dim, self.dim, Complex64::new(0.0, 0.0));
        for (k, b) in self.elements.iter().enumerate() {
            rho += b * Complex64::new(v[k], 0.0);
        }
        Ok(rho)
    }

    /// Transfer matrix of the unitary channel ρ ↦ UρU† in this basis.
    ///
    /// G_ij = Tr(B_i† U B_j U†). Real for Hermitian bases.
    pub fn unitary_to_transfer_matrix(
        &self,
        u: &DMatrix<Complex64>,
    ) -> Result<DMatrix<f64>, GstError> {
        if u.nrows() != self.dim || u.ncols() != self.dim {
            return Err(GstError::dim(self.dim, u.nrows()));
        }
        let n = self.superdim();
        let udag = u.adjoint();
        let mut g = DMatrix::zeros(n, n);
        for j in 0..n {
            let mapped = u * &self.elements[j] * &udag;
            for i in 0..n {
                g[(i, j)] = (self.elements[i].adjoint() * &mapped).trace().re;
            }
        }
        Ok(g)
    }

    /// Transfer matrix of conjugation by a (possibly non-unitary) Kraus-like
    /// pair: ρ ↦ A ρ B†. Used for instrument members and error generators.
    pub fn sandwich_to_transfer_matrix(
        &self,
        a: &DMatrix<Complex64>,
        b: &DMatrix<Complex64>,
    ) -> Result<DMatrix<f64>, GstError> {
        if a.nrows() != self.dim || b.nrows() != self.dim {
            return Err(GstError::dim(self.dim, a.nrows()));
        }
        let n = self.superdim();
        let bdag = b.adjoint();
        let mut g = DMatrix::zeros(n, n);
        for j in 0..n {
            let mapped = a * &self.elements[j] * &bdag;
            for i in 0..n {
                g[(i, j)] = (self.elements[i].adjoint() * &mapped).trace().re;
            }
        }
        Ok(g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ket0_density(dim: usize) -> DMatrix<Complex64> {
        let mut rho = DMatrix::from_element(dim, dim, Complex64::new(0.0, 0.0));
        rho[(0, 0)] = Complex64::new(1.0, 0.0);
        rho
    }

    #[test]
    fn pp_basis_is_orthonormal() {
        let basis = Basis::pp(1);
        for i in 0..4 {
            for j in 0..4 {
                let ip = (basis.elements[i].adjoint() * &basis.elements[j]).trace();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(ip.re, expected, epsilon = 1e-12);
                assert_relative_eq!(ip.im, 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn two_qubit_pp_basis_has_sixteen_elements() {
        let basis = Basis::pp(2);
        assert_eq!(basis.elements.len(), 16);
        assert_eq!(basis.labels[0], "II");
        assert_eq!(basis.labels[15], "ZZ");
        let ip = (basis.elements[5].adjoint() * &basis.elements[5]).trace();
        assert_relative_eq!(ip.re, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn ket0_superket_round_trips() {
        let basis = Basis::pp(1);
        let rho = ket0_density(2);
        let v = basis.superket(&rho).unwrap();
        // |0⟩⟨0| = (I + Z)/2 → (1/√2, 0, 0, 1/√2)
        let s = 1.0 / 2.0_f64.sqrt();
        assert_relative_eq!(v[0], s, epsilon = 1e-12);
        assert_relative_eq!(v[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(v[2], 0.0, epsilon = 1e-12);
        assert_relative_eq!(v[3], s, epsilon = 1e-12);

        let back = basis.from_superket(&v).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(back[(i, j)].re, rho[(i, j)].re, epsilon = 1e-12);
                assert_relative_eq!(back[(i, j)].im, rho[(i, j)].im, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn identity_channel_gives_identity_ptm() {
        let basis = Basis::pp(1);
        let u = DMatrix::from_diagonal_element(2, 2, Complex64::new(1.0, 0.0));
        let g = basis.unitary_to_transfer_matrix(&u).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(g[(i, j)], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn x_half_turn_ptm_is_trace_preserving_rotation() {
        // X(π/2) = exp(-iπX/4): Bloch rotation about x, y → z, z → -y
        let basis = Basis::pp(1);
        let c = (std::f64::consts::FRAC_PI_4).cos();
        let s = (std::f64::consts::FRAC_PI_4).sin();
        let u = DMatrix::from_row_slice(2, 2, &[
            Complex64::new(c, 0.0), Complex64::new(0.0, -s),
            Complex64::new(0.0, -s), Complex64::new(c, 0.0),
        ]);
        let g = basis.unitary_to_transfer_matrix(&u).unwrap();

        // TP first row
        assert_relative_eq!(g[(0, 0)], 1.0, epsilon = 1e-12);
        for j in 1..4 {
            assert_relative_eq!(g[(0, j)], 0.0, epsilon = 1e-12);
        }
        // x row fixed, z column of the y image
        assert_relative_eq!(g[(1, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(g[(3, 2)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(g[(2, 3)], -1.0, epsilon = 1e-12);
    }
}
