//! Drift detection from time-resolved data.
//!
//! Each circuit's clickstream — the per-timestamp outcome fractions — is
//! transformed with a type-II discrete cosine transform. Under the null
//! hypothesis of a static probability p, each normalized spectral power
//!
//! ```text
//! λ_k = N · d_k² / (p̂(1-p̂)),   d_k = √(2/T) Σ_t f_t cos(πk(2t+1)/(2T))
//! ```
//!
//! is chi2(1)-distributed, so powers exceeding the Bonferroni-corrected
//! chi2 quantile flag statistically significant drift at that frequency.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use gst_core::circuit::Circuit;
use gst_core::dataset::{DataSet, TimeSeries};
use gst_core::error::GstError;

use crate::stats::chi2_quantile;

/// Drift analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Global significance level (before Bonferroni correction).
    pub significance: f64,
    /// Outcome whose fraction forms the clickstream.
    pub outcome: String,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self { significance: 0.05, outcome: "1".into() }
    }
}

/// Per-circuit drift verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftResults {
    /// Normalized power at each nonzero DCT frequency index.
    pub powers: Vec<f64>,
    /// The chi2(1) significance threshold the powers were tested against.
    pub threshold: f64,
    /// Frequency indices with power above threshold.
    pub significant: Vec<usize>,
    /// Mean outcome fraction over the record.
    pub p_hat: f64,
    pub detected: bool,
}

/// Unitary type-II DCT of a real sequence (k = 0 term excluded).
pub fn dct_ii(x: &[f64]) -> Vec<f64> {
    let t = x.len();
    let norm = (2.0 / t as f64).sqrt();
    (1..t)
        .map(|k| {
            let mut acc = 0.0;
            for (i, &v) in x.iter().enumerate() {
                acc += v
                    * (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0)
                        / (2.0 * t as f64))
                        .cos();
            }
            norm * acc
        })
        .collect()
}

/// Analyze one time series for drift.
pub fn analyze_series(
    series: &TimeSeries,
    shots_per_time: f64,
    cfg: &DriftConfig,
) -> Result<DriftResults, GstError> {
    let times = series.distinct_times();
    let t = times.len();
    if t < 2 {
        return Err(GstError::MissingData(
            "drift analysis needs at least two timestamps".into(),
        ));
    }

    // outcome fraction per timestamp
    let mut fractions = Vec::with_capacity(t);
    for (w, &t0) in times.iter().enumerate() {
        let t1 = times.get(w + 1).copied().unwrap_or(f64::INFINITY);
        let counts = series.counts_in_window(t0, t1);
        let total: f64 = counts.values().sum();
        if total <= 0.0 {
            return Err(GstError::MissingData(format!(
                "no counts at timestamp {}",
                t0
            )));
        }
        fractions.push(counts.get(&cfg.outcome).copied().unwrap_or(0.0) / total);
    }

    let p_hat = fractions.iter().sum::<f64>() / t as f64;
    let variance = p_hat * (1.0 - p_hat);
    let threshold = chi2_quantile(1.0 - cfg.significance / (t - 1) as f64, 1);

    let modes = dct_ii(&fractions);
    let powers: Vec<f64> = if variance > 1e-12 {
        modes
            .iter()
            .map(|d| shots_per_time * d * d / variance)
            .collect()
    } else {
        // a deterministic clickstream cannot exhibit detectable drift
        vec![0.0; modes.len()]
    };

    let significant: Vec<usize> = powers
        .iter()
        .enumerate()
        .filter(|(_, &p)| p > threshold)
        .map(|(k, _)| k + 1)
        .collect();
    let detected = !significant.is_empty();

    Ok(DriftResults { powers, threshold, significant, p_hat, detected })
}

/// Run drift detection over every time-resolved row of a dataset.
pub fn detect_drift(
    dataset: &DataSet,
    shots_per_time: f64,
    cfg: &DriftConfig,
) -> Result<BTreeMap<Circuit, DriftResults>, GstError> {
    let mut out = BTreeMap::new();
    for circuit in dataset.circuits() {
        let row = dataset.row(circuit).expect("iterating existing rows");
        if let Some(series) = &row.series {
            let results = analyze_series(series, shots_per_time, cfg)?;
            if results.detected {
                info!(
                    "drift detected on {}: {} significant frequencies",
                    circuit,
                    results.significant.len()
                );
            }
            out.insert(circuit.clone(), results);
        }
    }
    Ok(out)
}
