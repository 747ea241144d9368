//! Stabilizer-frame forward simulation for Clifford-only circuits.
//!
//! Tracks the stabilizer group of the state as n signed Pauli generators in
//! the binary symplectic representation (Aaronson–Gottesman tableau, without
//! destabilizers). Gates act as H/S/CNOT update rules; named rotation gates
//! are applied as short words over {H, S}:
//!
//! ```text
//! Gx = H·S·H      Gy = S†·(HSH)·S      Gz = S      Gxpi = H·S²·H  ...
//! ```
//!
//! Computational-basis outcome probabilities are 2^-k on an affine subspace:
//! each qubit whose Z operator anticommutes with some generator contributes
//! a factor 1/2; the rest are determined by the sign of ±Z_q in the group.
//!
//! Supported on circuits whose every label has a Clifford action; anything
//! else is a [`GstError::NonCliffordGate`]. State preparation is |0...0⟩ and
//! measurement is the computational POVM — the regime in which stabilizer
//! evaluation replaces the dense simulators.

use std::collections::BTreeMap;

use crate::circuit::Circuit;
use crate::error::GstError;
use crate::model::ExplicitModel;

/// Elementary tableau updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Elem {
    H(usize),
    S(usize),
    Cnot(usize, usize),
}

/// Signed-Pauli generator rows over n qubits.
#[derive(Debug, Clone)]
pub struct Tableau {
    n: usize,
    /// x bits, row-major [row][qubit]
    x: Vec<Vec<bool>>,
    /// z bits
    z: Vec<Vec<bool>>,
    /// sign bits: generator = (-1)^r · Pauli
    r: Vec<bool>,
}

impl Tableau {
    /// Stabilizer tableau of |0...0⟩: rows Z_0, ..., Z_{n-1}.
    pub fn computational(n: usize) -> Self {
        let mut z = vec![vec![false; n]; n];
        for (k, row) in z.iter_mut().enumerate() {
            row[k] = true;
        }
        Self { n, x: vec![vec![false; n]; n], z, r: vec![false; n] }
    }

    fn apply_elem(&mut self, e: Elem) {
        match e {
            Elem::H(q) => {
                for k in 0..self.n {
                    self.r[k] ^= self.x[k][q] & self.z[k][q];
                    std::mem::swap(&mut self.x[k][q], &mut self.z[k][q]);
                }
            }
            Elem::S(q) => {
                for k in 0..self.n {
                    self.r[k] ^= self.x[k][q] & self.z[k][q];
                    self.z[k][q] ^= self.x[k][q];
                }
            }
            Elem::Cnot(c, t) => {
                for k in 0..self.n {
                    self.r[k] ^=
                        self.x[k][c] & self.z[k][t] & (self.x[k][t] ^ self.z[k][c] ^ true);
                    self.x[k][t] ^= self.x[k][c];
                    self.z[k][c] ^= self.z[k][t];
                }
            }
        }
    }

    /// Phase exponent (power of i) from multiplying single-qubit Paulis
    /// (x1,z1)·(x2,z2), per Aaronson–Gottesman.
    fn g(x1: bool, z1: bool, x2: bool, z2: bool) -> i32 {
        match (x1, z1) {
            (false, false) => 0,
            (true, true) => z2 as i32 - x2 as i32,
            (true, false) => (z2 as i32) * (2 * x2 as i32 - 1),
            (false, true) => (x2 as i32) * (1 - 2 * z2 as i32),
        }
    }

    /// row[h] := row[i] · row[h], with the sign worked out mod 4.
    fn rowsum(&mut self, h: usize, i: usize) {
        let mut phase = 2 * self.r[h] as i32 + 2 * self.r[i] as i32;
        for q in 0..self.n {
            phase += Self::g(self.x[i][q], self.z[i][q], self.x[h][q], self.z[h][q]);
        }
        let phase = phase.rem_euclid(4);
        debug_assert!(phase == 0 || phase == 2, "stabilizer product must be real");
        self.r[h] = phase == 2;
        for q in 0..self.n {
            self.x[h][q] ^= self.x[i][q];
            self.z[h][q] ^= self.z[i][q];
        }
    }

    /// Sign bit of ±Z_q in the group, assuming Z_q commutes with all rows
    /// (no row has an x bit at q). Solves the GF(2) combination and
    /// accumulates its sign with `rowsum`.
    fn deterministic_sign(&self, q: usize) -> bool {
        // solve sum_k c_k (x_k|z_k) = (0|e_q) by elimination over rows
        let n = self.n;
        let ncols = 2 * n;
        // build augmented system: each row k is a column of unknown c_k
        let mut a = vec![vec![false; n]; ncols];
        for k in 0..n {
            for qq in 0..n {
                a[qq][k] = self.x[k][qq];
                a[n + qq][k] = self.z[k][qq];
            }
        }
        let mut t = vec![false; ncols];
        t[n + q] = true;

        let mut c = vec![false; n];
        let mut pivot_of_col = vec![usize::MAX; n];
        let mut row = 0;
        for col in 0..n {
            if let Some(p) = (row..ncols).find(|&p| a[p][col]) {
                a.swap(row, p);
                t.swap(row, p);
                for rr in 0..ncols {
                    if rr != row && a[rr][col] {
                        for cc in 0..n {
                            let v = a[row][cc];
                            a[rr][cc] ^= v;
                        }
                        let v = t[row];
                        t[rr] ^= v;
                    }
                }
                pivot_of_col[col] = row;
                row += 1;
            }
        }
        for col in 0..n {
            if pivot_of_col[col] != usize::MAX {
                c[col] = t[pivot_of_col[col]];
            }
        }

        // multiply the selected rows into a scratch identity row
        let mut scratch = self.clone();
        scratch.x.push(vec![false; n]);
        scratch.z.push(vec![false; n]);
        scratch.r.push(false);
        let h = n; // scratch row index (rowsum only reads qubit bits of rows)
        for (k, &ck) in c.iter().enumerate() {
            if ck {
                scratch.rowsum_into_scratch(h, k);
            }
        }
        scratch.r[h]
    }

    /// rowsum where the target row lives past the n generator rows.
    fn rowsum_into_scratch(&mut self, h: usize, i: usize) {
        let mut phase = 2 * self.r[h] as i32 + 2 * self.r[i] as i32;
        for q in 0..self.n {
            phase += Self::g(self.x[i][q], self.z[i][q], self.x[h][q], self.z[h][q]);
        }
        let phase = phase.rem_euclid(4);
        self.r[h] = phase == 2;
        for q in 0..self.n {
            self.x[h][q] ^= self.x[i][q];
            self.z[h][q] ^= self.z[i][q];
        }
    }

    /// Probability of measuring the bitstring `bits` (bits[q] for qubit q)
    /// in the computational basis. Consumes a working copy.
    pub fn bitstring_probability(&self, bits: &[bool]) -> f64 {
        let mut tab = self.clone();
        let mut p = 1.0;
        for q in 0..tab.n {
            if let Some(k) = (0..tab.n).find(|&k| tab.x[k][q]) {
                // outcome is uniformly random; force the requested branch
                for j in 0..tab.n {
                    if j != k && tab.x[j][q] {
                        tab.rowsum(j, k);
                    }
                }
                for qq in 0..tab.n {
                    tab.x[k][qq] = false;
                    tab.z[k][qq] = false;
                }
                tab.z[k][q] = true;
                tab.r[k] = bits[q];
                p *= 0.5;
            } else {
                // outcome determined by the sign of ±Z_q in the group
                let sign = tab.deterministic_sign(q);
                if sign != bits[q] {
                    return 0.0;
                }
            }
        }
        p
    }
}

/// Clifford action of a named gate, as a word of elementary updates.
fn clifford_word(name: &str, n: usize) -> Result<Vec<Elem>, GstError> {
    use Elem::*;
    let q = 0usize; // single-qubit gates act on qubit 0 of 1-qubit models
    let word = match name {
        "Gi" => vec![],
        "Gh" => vec![H(q)],
        "Gz" | "Gs" => vec![S(q)],
        "Gzdg" | "Gsdg" => vec![S(q), S(q), S(q)],
        "Gx" => vec![H(q), S(q), H(q)],
        "Gy" => vec![S(q), S(q), S(q), H(q), S(q), H(q), S(q)],
        "Gxpi" => vec![H(q), S(q), S(q), H(q)],
        "Gypi" => vec![S(q), S(q), H(q), S(q), S(q), H(q)],
        "Gzpi" => vec![S(q), S(q)],
        "Gcnot" if n >= 2 => vec![Cnot(0, 1)],
        _ => return Err(GstError::NonCliffordGate(name.into())),
    };
    Ok(word)
}

/// Outcome probabilities of a Clifford circuit on the model's qubits.
///
/// The stabilizer strategy assumes |0...0⟩ preparation and computational
/// measurement; the model supplies the qubit count and the outcome labels.
pub fn probabilities(
    model: &ExplicitModel,
    circuit: &Circuit,
) -> Result<BTreeMap<String, f64>, GstError> {
    let n = model.basis.dim.trailing_zeros() as usize;
    let mut tab = Tableau::computational(n);
    for label in circuit.layers() {
        if model.instrument(label.name()).is_some() {
            return Err(GstError::NonCliffordGate(label.name().into()));
        }
        for e in clifford_word(label.name(), n)? {
            tab.apply_elem(e);
        }
    }

    let mut probs = BTreeMap::new();
    for b in 0..(1usize << n) {
        // label bit order matches Povm::computational: qubit 0 leftmost
        let bits: Vec<bool> = (0..n).map(|q| (b >> (n - 1 - q)) & 1 == 1).collect();
        let label: String = bits.iter().map(|&x| if x { '1' } else { '0' }).collect();
        let p = tab.bitstring_probability(&bits);
        probs.insert(label, p);
    }
    Ok(probs)
}
