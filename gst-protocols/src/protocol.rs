//! Minimal protocol framework: a design plus a dataset, and protocols that
//! run on the pair.
//!
//! This is the seam the higher-level drivers plug into: an experiment
//! design names the circuits needing data, a [`ProtocolData`] bundles the
//! design with the measured [`DataSet`], and a [`Protocol`] turns that
//! bundle into results.

use serde::{Deserialize, Serialize};

use gst_core::circuit::Circuit;
use gst_core::dataset::DataSet;
use gst_core::error::GstError;
use gst_core::expdesign::StdDesign;
use gst_core::model::ExplicitModel;

use crate::drivers::{run_long_sequence_gst, GstConfig, GstResults};

/// An experiment design: nested circuit lists over some qubit labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitListsDesign {
    pub circuit_lists: Vec<Vec<Circuit>>,
    pub qubit_labels: Vec<String>,
}

impl CircuitListsDesign {
    pub fn new(circuit_lists: Vec<Vec<Circuit>>, qubit_labels: Vec<String>) -> Self {
        Self { circuit_lists, qubit_labels }
    }

    /// Every circuit needing data (the union, which for nested lists is the
    /// final list).
    pub fn all_circuits(&self) -> Vec<Circuit> {
        self.circuit_lists.last().cloned().unwrap_or_default()
    }
}

/// A design paired with the data taken for it.
#[derive(Debug, Clone)]
pub struct ProtocolData {
    pub design: CircuitListsDesign,
    pub dataset: DataSet,
}

impl ProtocolData {
    pub fn new(design: CircuitListsDesign, dataset: DataSet) -> Self {
        Self { design, dataset }
    }

    /// Check that every designed circuit has counts.
    pub fn verify_complete(&self) -> Result<(), GstError> {
        for c in self.design.all_circuits() {
            self.dataset.counts(&c)?;
        }
        Ok(())
    }
}

/// Something that turns data into results.
pub trait Protocol {
    type Output;

    fn run(&self, data: &ProtocolData) -> Result<Self::Output, GstError>;
}

/// The standard GST protocol: a target model plus the germ/fiducial design.
pub struct StandardGst {
    pub target: ExplicitModel,
    pub std_design: StdDesign,
    pub config: GstConfig,
}

impl StandardGst {
    pub fn new(target: ExplicitModel, std_design: StdDesign) -> Self {
        Self { target, std_design, config: GstConfig::default() }
    }
}

impl Protocol for StandardGst {
    type Output = GstResults;

    fn run(&self, data: &ProtocolData) -> Result<GstResults, GstError> {
        data.verify_complete()?;
        run_long_sequence_gst(&data.dataset, &self.target, &self.std_design, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gst_core::dataset::{generate_fake_data, SampleError};
    use gst_core::expdesign::std1q_xyi_design;
    use gst_core::modelpacks;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn incomplete_data_is_refused() {
        let design = std1q_xyi_design(vec![1]);
        let lists = design.circuit_lists();
        let pdata = ProtocolData::new(
            CircuitListsDesign::new(lists, vec!["Q0".into()]),
            DataSet::new(),
        );
        assert!(pdata.verify_complete().is_err());
    }

    #[test]
    fn standard_gst_runs_through_the_protocol_seam() {
        let mut truth = modelpacks::std1q_xyi::target_model_tp();
        truth.depolarize_gates(0.02);
        let design = std1q_xyi_design(vec![1, 2]);

        // the GST driver needs LGST circuits too, so take data for both
        let gates: Vec<gst_core::circuit::Label> = truth
            .operations()
            .keys()
            .map(|k| gst_core::circuit::Label::new(k.clone()))
            .collect();
        let mut circuits = design.all_circuits();
        for c in design.lgst_circuits(&gates) {
            if !circuits.contains(&c) {
                circuits.push(c);
            }
        }

        let mut rng = StdRng::seed_from_u64(8);
        let ds = generate_fake_data(
            &truth, &circuits, 500, SampleError::None, &mut rng, None, true,
        )
        .unwrap();

        let pdata = ProtocolData::new(
            CircuitListsDesign::new(design.circuit_lists(), vec!["Q0".into()]),
            ds,
        );
        let protocol = StandardGst::new(modelpacks::std1q_xyi::target_model_tp(), design);
        let results = protocol.run(&pdata).unwrap();
        assert!(results.two_delta_logl < 1.0);
    }
}
