//! Measured outcome counts, optionally time-resolved.
//!
//! A [`DataSet`] maps circuits to outcome repetition counts. Rows may carry
//! a raw time series (time, outcome, repetitions triples) alongside the
//! aggregated counts; the drift analyses consume the series, the GST
//! objectives consume the aggregates.
//!
//! The text format mirrors the classic GST dataset file:
//!
//! ```text
//! ## Columns = 0 count, 1 count
//! {} 100 0
//! GxGx 8 92
//! ```

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::circuit::Circuit;
use crate::error::GstError;
use crate::model::ExplicitModel;

/// Raw time-resolved record: parallel arrays of (time, outcome, reps).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeSeries {
    pub times: Vec<f64>,
    pub outcomes: Vec<String>,
    pub reps: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Counts aggregated over the half-open window [t0, t1).
    pub fn counts_in_window(&self, t0: f64, t1: f64) -> BTreeMap<String, f64> {
        let mut counts = BTreeMap::new();
        for i in 0..self.len() {
            if self.times[i] >= t0 && self.times[i] < t1 {
                *counts.entry(self.outcomes[i].clone()).or_insert(0.0) += self.reps[i];
            }
        }
        counts
    }

    /// Distinct timestamps, in order of first appearance.
    pub fn distinct_times(&self) -> Vec<f64> {
        let mut out: Vec<f64> = Vec::new();
        for &t in &self.times {
            if out.last().map_or(true, |&last| last != t) {
                out.push(t);
            }
        }
        out
    }
}

/// One circuit's worth of data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataRow {
    pub counts: BTreeMap<String, f64>,
    pub series: Option<TimeSeries>,
}

impl DataRow {
    pub fn total(&self) -> f64 {
        self.counts.values().sum()
    }

    pub fn fraction(&self, outcome: &str) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        self.counts.get(outcome).copied().unwrap_or(0.0) / total
    }
}

/// How simulated data is sampled from predicted probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleError {
    /// Counts are exactly N·p (not necessarily integers).
    None,
    /// Multinomial sampling with N shots.
    Multinomial,
}

/// Circuit → outcome-count map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSet {
    rows: BTreeMap<Circuit, DataRow>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn circuits(&self) -> impl Iterator<Item = &Circuit> {
        self.rows.keys()
    }

    pub fn row(&self, circuit: &Circuit) -> Option<&DataRow> {
        self.rows.get(circuit)
    }

    /// Counts for a circuit, as a hard requirement.
    pub fn counts(&self, circuit: &Circuit) -> Result<&BTreeMap<String, f64>, GstError> {
        self.rows
            .get(circuit)
            .map(|r| &r.counts)
            .ok_or_else(|| GstError::MissingData(circuit.to_string()))
    }

    pub fn add_count_dict(
        &mut self,
        circuit: Circuit,
        counts: impl IntoIterator<Item = (String, f64)>,
    ) {
        let row = self.rows.entry(circuit).or_default();
        for (outcome, n) in counts {
            *row.counts.entry(outcome).or_insert(0.0) += n;
        }
    }

    /// Attach a raw time series; aggregate counts are updated to match.
    pub fn add_raw_series(
        &mut self,
        circuit: Circuit,
        times: Vec<f64>,
        outcomes: Vec<String>,
        reps: Vec<f64>,
    ) -> Result<(), GstError> {
        if times.len() != outcomes.len() || times.len() != reps.len() {
            return Err(GstError::Parse(
                "time series arrays must have equal length".into(),
            ));
        }
        let row = self.rows.entry(circuit).or_default();
        for i in 0..times.len() {
            *row.counts.entry(outcomes[i].clone()).or_insert(0.0) += reps[i];
        }
        row.series = Some(TimeSeries { times, outcomes, reps });
        Ok(())
    }

    /// All outcome labels appearing anywhere in the dataset, sorted.
    pub fn outcome_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .rows
            .values()
            .flat_map(|r| r.counts.keys().cloned())
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }

    // ---- text IO ---------------------------------------------------------

    /// Serialize in the classic dataset text format.
    pub fn to_text(&self) -> String {
        let labels = self.outcome_labels();
        let mut out = String::from("## Columns = ");
        out.push_str(
            &labels
                .iter()
                .map(|l| format!("{} count", l))
                .collect::<Vec<_>>()
                .join(", "),
        );
        out.push('\n');
        for (circuit, row) in &self.rows {
            out.push_str(&circuit.to_string());
            for label in &labels {
                let n = row.counts.get(label).copied().unwrap_or(0.0);
                out.push_str(&format!(" {}", n));
            }
            out.push('\n');
        }
        out
    }

    /// Parse the text format produced by [`DataSet::to_text`].
    pub fn from_text(text: &str) -> Result<Self, GstError> {
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| GstError::Parse("empty dataset file".into()))?;
        let cols = header
            .trim()
            .strip_prefix("## Columns =")
            .ok_or_else(|| GstError::Parse("missing '## Columns =' header".into()))?;
        let labels: Vec<String> = cols
            .split(',')
            .map(|c| {
                c.trim()
                    .strip_suffix("count")
                    .map(|l| l.trim().to_string())
                    .ok_or_else(|| GstError::Parse(format!("bad column spec '{}'", c)))
            })
            .collect::<Result<_, _>>()?;

        let mut ds = DataSet::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let circuit: Circuit = parts
                .next()
                .ok_or_else(|| GstError::Parse("blank data line".into()))?
                .parse()?;
            let counts: Vec<f64> = parts
                .map(|p| {
                    p.parse::<f64>()
                        .map_err(|_| GstError::Parse(format!("bad count '{}'", p)))
                })
                .collect::<Result<_, _>>()?;
            if counts.len() != labels.len() {
                return Err(GstError::Parse(format!(
                    "line '{}' has {} counts for {} columns",
                    line,
                    counts.len(),
                    labels.len()
                )));
            }
            ds.add_count_dict(
                circuit,
                labels.iter().cloned().zip(counts.iter().cloned()),
            );
        }
        Ok(ds)
    }
}

/// Simulate a dataset from a model.
///
/// With `times`, each circuit row carries a raw time series with the model
/// evaluated at each timestamp (`n_samples` shots per timestamp); zero-count
/// entries are kept only when `record_zero_counts` is set.
#[allow(clippy::too_many_arguments)]
pub fn generate_fake_data<R: Rng>(
    model: &ExplicitModel,
    circuits: &[Circuit],
    n_samples: usize,
    sample_error: SampleError,
    rng: &mut R,
    times: Option<&[f64]>,
    record_zero_counts: bool,
) -> Result<DataSet, GstError> {
    let mut ds = DataSet::new();
    for circuit in circuits {
        match times {
            None => {
                let probs = model.probabilities(circuit)?;
                let counts = realize_counts(&probs, n_samples, sample_error, rng);
                let counts: Vec<(String, f64)> = counts
                    .into_iter()
                    .filter(|(_, n)| record_zero_counts || *n > 0.0)
                    .collect();
                ds.add_count_dict(circuit.clone(), counts);
            }
            Some(ts) => {
                let mut s_times = Vec::new();
                let mut s_outcomes = Vec::new();
                let mut s_reps = Vec::new();
                for &t in ts {
                    let probs = model.probabilities_at_time(circuit, t)?;
                    let counts = realize_counts(&probs, n_samples, sample_error, rng);
                    for (outcome, n) in counts {
                        if record_zero_counts || n > 0.0 {
                            s_times.push(t);
                            s_outcomes.push(outcome);
                            s_reps.push(n);
                        }
                    }
                }
                ds.add_raw_series(circuit.clone(), s_times, s_outcomes, s_reps)?;
            }
        }
    }
    Ok(ds)
}

fn realize_counts<R: Rng>(
    probs: &BTreeMap<String, f64>,
    n_samples: usize,
    sample_error: SampleError,
    rng: &mut R,
) -> BTreeMap<String, f64> {
    match sample_error {
        SampleError::None => probs
            .iter()
            .map(|(k, p)| (k.clone(), p.max(0.0) * n_samples as f64))
            .collect(),
        SampleError::Multinomial => {
            let labels: Vec<&String> = probs.keys().collect();
            let mut weights: Vec<f64> = probs.values().map(|p| p.max(0.0)).collect();
            let total: f64 = weights.iter().sum();
            if total > 0.0 {
                for w in &mut weights {
                    *w /= total;
                }
            }
            let mut counts: BTreeMap<String, f64> =
                labels.iter().map(|l| ((*l).clone(), 0.0)).collect();
            for _ in 0..n_samples {
                let u: f64 = rng.gen();
                let mut acc = 0.0;
                let mut chosen = labels.len() - 1;
                for (i, w) in weights.iter().enumerate() {
                    acc += w;
                    if u < acc {
                        chosen = i;
                        break;
                    }
                }
                *counts.get_mut(labels[chosen]).expect("label present") += 1.0;
            }
            counts
        }
    }
}
