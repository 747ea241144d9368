//! # gst-protocols
//!
//! Estimation algorithms and characterization protocols on top of
//! [`gst_core`]: linear-inversion GST, iterative chi-squared and
//! maximum-likelihood GST, gauge optimization, Hessian-based confidence
//! regions, and the companion protocols (randomized benchmarking, robust
//! phase estimation, drift detection).
//!
//! The long-sequence GST pipeline chains the stages the way the drivers do:
//!
//! ```text
//! DataSet + fiducials ──LGST──> linear-inversion seed
//!        └──gauge-fix to target──> seed in the target's frame
//!               └──iterative MC2GST over nested circuit lists──> chi2 fit
//!                      └──MLGST polish──> maximum-likelihood estimate
//!                             └──gauge optimization──> reported model
//! ```
//!
//! ## References
//!
//! - Blume-Kohout et al. (2017), "Demonstration of qubit operations below a
//!   rigorous fault tolerance threshold with gate set tomography"
//! - Nielsen et al. (2021), "Gate Set Tomography", Quantum 5, 557
//! - Magesan, Gambetta, Emerson (2011), "Scalable and robust randomized
//!   benchmarking of quantum processes"
//! - Kimmel et al. (2015), "Robust calibration of a universal single-qubit
//!   gate set via robust phase estimation"

pub mod confidence;
pub mod drift;
pub mod drivers;
pub mod gaugeopt;
pub mod lgst;
pub mod lm;
pub mod mc2gst;
pub mod mlgst;
pub mod objectives;
pub mod protocol;
pub mod rb;
pub mod rpe;
pub mod stats;

pub mod prelude {
    pub use crate::confidence::*;
    pub use crate::drift::*;
    pub use crate::drivers::*;
    pub use crate::gaugeopt::*;
    pub use crate::lgst::*;
    pub use crate::lm::*;
    pub use crate::mc2gst::*;
    pub use crate::mlgst::*;
    pub use crate::objectives::*;
    pub use crate::protocol::*;
    pub use crate::rb::*;
    pub use crate::rpe::*;
}
