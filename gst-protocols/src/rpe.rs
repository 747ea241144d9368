//! Robust phase estimation of a rotation angle.
//!
//! Estimates the angle θ of a rotation gate (e.g. how far Gx really is from
//! π/2) from two families of circuits at geometrically growing depths
//! N = 2^k:
//!
//! ```text
//! cos circuit: Gx^N     →  P(0) = (1 + cos(Nθ))/2
//! sin circuit: Gx^{N+1} →  P(0) = (1 + cos((N+1)θ))/2 ≈ (1 - sin(Nθ))/2
//! ```
//!
//! For θ near π/2 the extra half-turn converts the second family into a
//! quadrature readout, so atan2 recovers the wrapped angle Nθ mod 2π at
//! every depth. Unwrapping proceeds iteratively: each stage halves the
//! candidate window around the previous estimate, shrinking the final error
//! like ~π/2^K while staying robust to SPAM offsets.

use log::info;

use gst_core::circuit::Circuit;
use gst_core::dataset::DataSet;
use gst_core::error::GstError;

/// The circuits of one RPE stage.
#[derive(Debug, Clone)]
pub struct RpeStage {
    /// Germ power N = 2^k.
    pub n: usize,
    pub cos_circuit: Circuit,
    pub sin_circuit: Circuit,
}

/// Generate the stages for a rotation gate label up to depth 2^(k_max-1).
pub fn rpe_stages(gate: &str, k_max: usize) -> Vec<RpeStage> {
    let single = Circuit::from_names(&[gate]);
    (0..k_max)
        .map(|k| {
            let n = 1usize << k;
            RpeStage {
                n,
                cos_circuit: single.repeated(n),
                sin_circuit: single.repeated(n + 1),
            }
        })
        .collect()
}

/// All circuits an RPE experiment needs data for.
pub fn rpe_circuits(gate: &str, k_max: usize) -> Vec<Circuit> {
    let mut out = Vec::new();
    for stage in rpe_stages(gate, k_max) {
        out.push(stage.cos_circuit);
        out.push(stage.sin_circuit);
    }
    out.dedup();
    out
}

/// Per-stage and final angle estimates.
#[derive(Debug, Clone)]
pub struct RpeResults {
    /// Angle estimate after each stage.
    pub stage_estimates: Vec<f64>,
    /// The final estimate.
    pub angle: f64,
}

/// Estimate the rotation angle from measured data.
///
/// The survival outcome is "0"; `dataset` must contain every circuit from
/// [`rpe_circuits`] with the same `k_max`.
pub fn estimate_angle(
    dataset: &DataSet,
    gate: &str,
    k_max: usize,
) -> Result<RpeResults, GstError> {
    let stages = rpe_stages(gate, k_max);
    let mut estimates = Vec::with_capacity(stages.len());
    let mut theta = 0.0;

    for (k, stage) in stages.iter().enumerate() {
        let p_cos = survival(dataset, &stage.cos_circuit)?;
        let p_sin = survival(dataset, &stage.sin_circuit)?;
        let cos_est = 2.0 * p_cos - 1.0; //  cos(Nθ)
        let sin_est = -(2.0 * p_sin - 1.0); // ≈ sin(Nθ)
        let phi = sin_est.atan2(cos_est); // Nθ mod 2π, in (-π, π]

        let n = stage.n as f64;
        if k == 0 {
            // N = 1: the wrapped angle is the angle
            theta = phi.rem_euclid(2.0 * std::f64::consts::PI);
        } else {
            // choose the branch of (φ + 2πj)/N closest to the running
            // estimate; the window shrinks by half each stage
            let period = 2.0 * std::f64::consts::PI / n;
            let base = (phi / n).rem_euclid(period);
            let j = ((theta - base) / period).round();
            theta = base + period * j;
        }
        estimates.push(theta);
    }

    info!(
        "RPE: {} stages, final angle = {:.6} rad",
        estimates.len(),
        theta
    );
    Ok(RpeResults { stage_estimates: estimates, angle: theta })
}

fn survival(dataset: &DataSet, circuit: &Circuit) -> Result<f64, GstError> {
    let counts = dataset.counts(circuit)?;
    let total: f64 = counts.values().sum();
    if total <= 0.0 {
        return Err(GstError::MissingData(circuit.to_string()));
    }
    Ok(counts.get("0").copied().unwrap_or(0.0) / total)
}
