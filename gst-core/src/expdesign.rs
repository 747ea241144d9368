//! Germ/fiducial structured experiment designs for long-sequence GST.
//!
//! A design is built from preparation fiducials F, measurement fiducials H,
//! germs g and a max-length ladder [1, 2, 4, ...]. The circuits at ladder
//! rung L are
//!
//! ```text
//! H_i · g^{floor(L/|g|)} · F_j
//! ```
//!
//! (applied left to right: F_j prepares, the germ power amplifies, H_i reads
//! out). Lists are nested: rung L contains every circuit of rung L-1. The
//! LGST list — fiducial pairs and single-gate sandwiches — seeds the linear
//! inversion estimate.

use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, Label};

/// Fiducials, germs and the max-length ladder of a standard GST experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdDesign {
    pub prep_fiducials: Vec<Circuit>,
    pub meas_fiducials: Vec<Circuit>,
    pub germs: Vec<Circuit>,
    pub max_lengths: Vec<usize>,
}

impl StdDesign {
    pub fn new(
        prep_fiducials: Vec<Circuit>,
        meas_fiducials: Vec<Circuit>,
        germs: Vec<Circuit>,
        max_lengths: Vec<usize>,
    ) -> Self {
        Self { prep_fiducials, meas_fiducials, germs, max_lengths }
    }

    /// Circuits needed by linear-inversion GST: every fiducial pair
    /// F_j, H_i·F_j and every sandwich H_i·g·F_j for the given gates.
    pub fn lgst_circuits(&self, gate_labels: &[Label]) -> Vec<Circuit> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for h in &self.meas_fiducials {
            for f in &self.prep_fiducials {
                push_unique(&mut out, &mut seen, f.then(h));
                for g in gate_labels {
                    let gate = Circuit::from_labels([g.clone()]);
                    push_unique(&mut out, &mut seen, f.then(&gate).then(h));
                }
            }
        }
        out
    }

    /// Nested circuit lists, one per max-length rung.
    pub fn circuit_lists(&self) -> Vec<Vec<Circuit>> {
        let mut lists: Vec<Vec<Circuit>> = Vec::with_capacity(self.max_lengths.len());
        let mut accumulated: Vec<Circuit> = Vec::new();
        let mut seen: HashSet<Circuit> = HashSet::new();

        for &max_len in &self.max_lengths {
            for germ in &self.germs {
                let power = germ.repeat_to_max_length(max_len);
                for f in &self.prep_fiducials {
                    for h in &self.meas_fiducials {
                        push_unique(&mut accumulated, &mut seen, f.then(&power).then(h));
                    }
                }
            }
            debug!("design rung L={}: {} circuits", max_len, accumulated.len());
            lists.push(accumulated.clone());
        }
        lists
    }

    /// Every circuit needing data: the last (largest) nested list.
    pub fn all_circuits(&self) -> Vec<Circuit> {
        self.circuit_lists().pop().unwrap_or_default()
    }
}

fn push_unique(out: &mut Vec<Circuit>, seen: &mut HashSet<Circuit>, c: Circuit) {
    if seen.insert(c.clone()) {
        out.push(c);
    }
}

/// The standard 1-qubit XYI design for a given max-length ladder.
pub fn std1q_xyi_design(max_lengths: Vec<usize>) -> StdDesign {
    StdDesign::new(
        crate::modelpacks::std1q_xyi::prep_fiducials(),
        crate::modelpacks::std1q_xyi::meas_fiducials(),
        crate::modelpacks::std1q_xyi::germs(),
        max_lengths,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_nested_and_deduplicated() {
        let design = std1q_xyi_design(vec![1, 2, 4]);
        let lists = design.circuit_lists();
        assert_eq!(lists.len(), 3);
        assert!(lists[0].len() < lists[1].len());
        assert!(lists[1].len() < lists[2].len());

        for c in &lists[0] {
            assert!(lists[1].contains(c), "rung 2 must contain rung 1");
        }
        let unique: HashSet<_> = lists[2].iter().collect();
        assert_eq!(unique.len(), lists[2].len(), "no duplicates");
    }

    #[test]
    fn rung_one_includes_bare_fiducial_pairs() {
        let design = std1q_xyi_design(vec![1]);
        let lists = design.circuit_lists();
        // germ Gi^1 = Gi between empty fiducials
        assert!(lists[0].contains(&"Gi".parse().unwrap()));
        // long germs truncate to nothing at L=1, leaving fiducial pairs
        assert!(lists[0].contains(&Circuit::empty()));
    }

    #[test]
    fn germ_powers_never_exceed_the_rung_length() {
        let design = std1q_xyi_design(vec![1, 2, 4, 8]);
        let max_fid = 3; // longest fiducial in the std pack
        for (rung, list) in design.circuit_lists().iter().enumerate() {
            let max_len = design.max_lengths[rung];
            for c in list {
                assert!(
                    c.len() <= max_len + 2 * max_fid,
                    "circuit {} too long for rung L={}",
                    c,
                    max_len
                );
            }
        }
    }

    #[test]
    fn lgst_list_covers_all_gate_sandwiches() {
        let design = std1q_xyi_design(vec![1]);
        let gates = [Label::new("Gx"), Label::new("Gy"), Label::new("Gi")];
        let circuits = design.lgst_circuits(&gates);
        assert!(circuits.contains(&Circuit::empty()));
        assert!(circuits.contains(&"Gx".parse().unwrap()));
        // F=GxGx, g=Gy, H=Gy → GxGxGyGy
        assert!(circuits.contains(&"GxGxGyGy".parse().unwrap()));
        let unique: HashSet<_> = circuits.iter().collect();
        assert_eq!(unique.len(), circuits.len());
    }
}
