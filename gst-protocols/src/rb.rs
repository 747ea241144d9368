//! Single-qubit Clifford randomized benchmarking.
//!
//! Cliffords are represented by their conjugation action on the Pauli frame
//! (images of X and Z as signed Paulis — 24 elements). Compilation into the
//! model's native gates is found once by breadth-first search over words in
//! the generating gates, so sequence construction never hardcodes a
//! decomposition table.
//!
//! A depth-m sequence is m uniformly random Cliffords followed by the
//! inverse of their composition; ideally every sequence acts as the
//! identity and the survival probability P(0) decays as
//!
//! ```text
//! P(m) = A + B·p^m,   r = (1 - p)(d - 1)/d
//! ```

use log::info;
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use gst_core::circuit::{Circuit, Label};
use gst_core::dataset::{generate_fake_data, DataSet, SampleError};
use gst_core::error::GstError;
use gst_core::model::ExplicitModel;

use crate::lm::{minimize, LmConfig};

/// A non-identity Pauli.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pauli {
    X,
    Y,
    Z,
}

/// ± a Pauli.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SignedPauli {
    p: Pauli,
    neg: bool,
}

/// Product of two distinct non-identity Paulis: returns (result, phase) with
/// phase +1 for +i and -1 for -i (P1·P2 = phase·i·result).
fn pauli_mul(a: Pauli, b: Pauli) -> (Pauli, i8) {
    use Pauli::*;
    match (a, b) {
        (X, Y) => (Z, 1),
        (Y, X) => (Z, -1),
        (Y, Z) => (X, 1),
        (Z, Y) => (X, -1),
        (Z, X) => (Y, 1),
        (X, Z) => (Y, -1),
        _ => unreachable!("pauli_mul needs distinct Paulis"),
    }
}

/// A single-qubit Clifford as its action on the Pauli frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clifford1 {
    img_x: SignedPauli,
    img_z: SignedPauli,
}

impl Clifford1 {
    pub fn identity() -> Self {
        Self {
            img_x: SignedPauli { p: Pauli::X, neg: false },
            img_z: SignedPauli { p: Pauli::Z, neg: false },
        }
    }

    /// Image of Y via Y = iXZ: C(Y) = i·C(X)·C(Z).
    fn img_y(&self) -> SignedPauli {
        let (p, phase) = pauli_mul(self.img_x.p, self.img_z.p);
        // i · i^{±1} = ∓1
        SignedPauli { p, neg: self.img_x.neg ^ self.img_z.neg ^ (phase == 1) }
    }

    fn apply(&self, sp: SignedPauli) -> SignedPauli {
        let img = match sp.p {
            Pauli::X => self.img_x,
            Pauli::Y => self.img_y(),
            Pauli::Z => self.img_z,
        };
        SignedPauli { p: img.p, neg: img.neg ^ sp.neg }
    }

    /// `second ∘ first`: the element acting as `first`, then `second`.
    pub fn compose(second: &Clifford1, first: &Clifford1) -> Clifford1 {
        Clifford1 {
            img_x: second.apply(first.img_x),
            img_z: second.apply(first.img_z),
        }
    }

    /// Conjugation action of a native gate name, if it is Clifford.
    pub fn from_gate(name: &str) -> Option<Clifford1> {
        use Pauli::*;
        let c = |xp, xn, zp, zn| Clifford1 {
            img_x: SignedPauli { p: xp, neg: xn },
            img_z: SignedPauli { p: zp, neg: zn },
        };
        match name {
            "Gi" => Some(Clifford1::identity()),
            "Gx" => Some(c(X, false, Y, true)),  // X→X, Z→-Y
            "Gy" => Some(c(Z, true, X, false)),  // X→-Z, Z→X
            "Gz" => Some(c(Y, false, Z, false)), // X→Y, Z→Z
            "Gxpi" => Some(c(X, false, Z, true)),
            "Gypi" => Some(c(X, true, Z, true)),
            "Gzpi" => Some(c(X, true, Z, false)),
            _ => None,
        }
    }
}

/// The 24-element Clifford group together with shortest generator words.
#[derive(Debug)]
pub struct CliffordGroup {
    elements: Vec<Clifford1>,
    words: Vec<Vec<Label>>,
}

impl CliffordGroup {
    /// Breadth-first search over words in `generators` (native gate labels).
    pub fn generate(generators: &[&str]) -> Result<Self, GstError> {
        let gen_actions: Vec<(Label, Clifford1)> = generators
            .iter()
            .map(|g| {
                Clifford1::from_gate(g)
                    .map(|c| (Label::new(*g), c))
                    .ok_or_else(|| GstError::NonCliffordGate((*g).into()))
            })
            .collect::<Result<_, _>>()?;

        let mut elements = vec![Clifford1::identity()];
        let mut words: Vec<Vec<Label>> = vec![Vec::new()];
        let mut frontier = vec![0usize];

        while !frontier.is_empty() && elements.len() < 24 {
            let mut next = Vec::new();
            for &idx in &frontier {
                for (label, action) in &gen_actions {
                    // append the gate to the word: the new element acts as
                    // the old word first, then the new gate
                    let candidate = Clifford1::compose(action, &elements[idx]);
                    if !elements.contains(&candidate) {
                        let mut word = words[idx].clone();
                        word.push(label.clone());
                        elements.push(candidate);
                        words.push(word);
                        next.push(elements.len() - 1);
                    }
                }
            }
            frontier = next;
        }

        if elements.len() != 24 {
            return Err(GstError::OptimizationFailed(format!(
                "generators span only {} of 24 Cliffords",
                elements.len()
            )));
        }
        Ok(Self { elements, words })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, idx: usize) -> &Clifford1 {
        &self.elements[idx]
    }

    pub fn word(&self, idx: usize) -> &[Label] {
        &self.words[idx]
    }

    /// Index of the inverse of `c`.
    pub fn inverse_index(&self, c: &Clifford1) -> usize {
        let id = Clifford1::identity();
        self.elements
            .iter()
            .position(|e| Clifford1::compose(e, c) == id)
            .expect("every group element has an inverse")
    }
}

/// An RB experiment design.
#[derive(Debug, Clone)]
pub struct RbDesign {
    pub depths: Vec<usize>,
    pub circuits_per_depth: usize,
}

/// One random sequence: its Clifford depth and the compiled circuit.
#[derive(Debug, Clone)]
pub struct RbSequence {
    pub depth: usize,
    pub circuit: Circuit,
}

/// Draw the random sequences of an RB experiment, inverses included.
pub fn sample_rb_sequences<R: Rng>(
    group: &CliffordGroup,
    design: &RbDesign,
    rng: &mut R,
) -> Vec<RbSequence> {
    let mut sequences = Vec::new();
    for &depth in &design.depths {
        for _ in 0..design.circuits_per_depth {
            let mut net = Clifford1::identity();
            let mut labels: Vec<Label> = Vec::new();
            for _ in 0..depth {
                let idx = rng.gen_range(0..group.len());
                labels.extend_from_slice(group.word(idx));
                net = Clifford1::compose(group.element(idx), &net);
            }
            let inv = group.inverse_index(&net);
            labels.extend_from_slice(group.word(inv));
            sequences.push(RbSequence { depth, circuit: Circuit::from_labels(labels) });
        }
    }
    sequences
}

/// Fitted RB decay.
#[derive(Debug, Clone)]
pub struct RbResults {
    pub a: f64,
    pub b: f64,
    pub p: f64,
    /// Average error rate r = (1-p)(d-1)/d for d = 2.
    pub r: f64,
    /// (depth, mean survival) points the fit consumed.
    pub points: Vec<(usize, f64)>,
}

/// Fit P(m) = A + B·p^m to per-sequence survival probabilities.
pub fn fit_rb_decay(points: &[(usize, f64)]) -> Result<RbResults, GstError> {
    if points.len() < 3 {
        return Err(GstError::OptimizationFailed(
            "RB fit needs at least three depths".into(),
        ));
    }
    let ms: Vec<f64> = points.iter().map(|(m, _)| *m as f64).collect();
    let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();

    let ms_r = ms.clone();
    let ys_r = ys.clone();
    let residual = move |x: &DVector<f64>| -> Result<DVector<f64>, GstError> {
        Ok(DVector::from_iterator(
            ms_r.len(),
            ms_r.iter()
                .zip(&ys_r)
                .map(|(m, y)| x[0] + x[1] * x[2].powf(*m) - y),
        ))
    };
    let ms_j = ms.clone();
    let jacobian = move |x: &DVector<f64>| -> Result<DMatrix<f64>, GstError> {
        let mut j = DMatrix::zeros(ms_j.len(), 3);
        for (i, m) in ms_j.iter().enumerate() {
            j[(i, 0)] = 1.0;
            j[(i, 1)] = x[2].powf(*m);
            j[(i, 2)] = if *m > 0.0 { x[1] * m * x[2].powf(m - 1.0) } else { 0.0 };
        }
        Ok(j)
    };

    let x0 = DVector::from_vec(vec![0.5, 0.5, 0.9]);
    let result = minimize(residual, jacobian, x0, &LmConfig::default())?;
    let (a, b, p) = (result.x[0], result.x[1], result.x[2]);
    let r = (1.0 - p) / 2.0;
    info!("RB fit: A = {:.4}, B = {:.4}, p = {:.5}, r = {:.2e}", a, b, p, r);
    Ok(RbResults { a, b, p, r, points: points.to_vec() })
}

/// Mean survival probability per depth from measured counts.
pub fn survival_points(
    dataset: &DataSet,
    sequences: &[RbSequence],
    survival_outcome: &str,
) -> Result<Vec<(usize, f64)>, GstError> {
    let mut by_depth: std::collections::BTreeMap<usize, (f64, usize)> =
        std::collections::BTreeMap::new();
    for seq in sequences {
        let counts = dataset.counts(&seq.circuit)?;
        let total: f64 = counts.values().sum();
        let surv = counts.get(survival_outcome).copied().unwrap_or(0.0) / total.max(1.0);
        let entry = by_depth.entry(seq.depth).or_insert((0.0, 0));
        entry.0 += surv;
        entry.1 += 1;
    }
    Ok(by_depth
        .into_iter()
        .map(|(m, (sum, n))| (m, sum / n as f64))
        .collect())
}

/// Run a full simulated RB experiment against a model.
pub fn run_rb_simulation<R: Rng>(
    model: &ExplicitModel,
    design: &RbDesign,
    n_samples: usize,
    rng: &mut R,
) -> Result<RbResults, GstError> {
    let group = CliffordGroup::generate(&["Gx", "Gy"])?;
    let sequences = sample_rb_sequences(&group, design, rng);
    let circuits: Vec<Circuit> = sequences.iter().map(|s| s.circuit.clone()).collect();
    let ds = generate_fake_data(
        model,
        &circuits,
        n_samples,
        SampleError::Multinomial,
        rng,
        None,
        true,
    )?;
    let points = survival_points(&ds, &sequences, "0")?;
    fit_rb_decay(&points)
}
