//! # gst-core
//!
//! Model layer, forward simulators and data layer for gate set tomography
//! (GST) and related quantum characterization protocols.
//!
//! GST estimates a self-consistent set of state preparations, gates and
//! measurements from circuit-outcome statistics. Everything here works in the
//! superoperator picture: density matrices become real vectors ("superkets")
//! in a Hermitian operator basis, and quantum channels become real matrices
//! (Pauli transfer matrices, PTMs) acting on them:
//!
//! ```text
//! p(outcome m | circuit g_1 ... g_L) = ⟨⟨E_m| G_L ··· G_1 |ρ⟩⟩
//! ```
//!
//! The crate provides:
//!
//! - [`basis`]: Pauli-product and matrix-unit operator bases, superket and
//!   PTM conversions
//! - [`spam`], [`operation`], [`instrument`]: parameterized preparations,
//!   POVMs, process matrices and quantum instruments
//! - [`model`]: explicit models (one operator per layer label) with analytic
//!   probability derivatives
//! - [`fwdsim`], [`stabilizer`]: interchangeable forward-simulation
//!   strategies (dense matrix composition, matrix-vector propagation,
//!   stabilizer-frame tracking)
//! - [`dataset`]: measured outcome counts, optionally time-resolved
//! - [`expdesign`]: germ/fiducial structured GST experiment designs
//!
//! ## References
//!
//! - Blume-Kohout et al. (2013), "Robust, self-consistent, closed-form
//!   tomography of quantum logic gates on a trapped ion qubit"
//! - Nielsen et al. (2021), "Gate Set Tomography", Quantum 5, 557
//! - Greenbaum (2015), "Introduction to quantum gate set tomography"
//! - Aaronson & Gottesman (2004), "Improved simulation of stabilizer
//!   circuits" (tableau simulation)

pub mod basis;
pub mod circuit;
pub mod dataset;
pub mod error;
pub mod expdesign;
pub mod fwdsim;
pub mod instrument;
pub mod linalg;
pub mod model;
pub mod modelpacks;
pub mod operation;
pub mod spam;
pub mod stabilizer;

pub mod prelude {
    pub use crate::basis::*;
    pub use crate::circuit::*;
    pub use crate::dataset::*;
    pub use crate::error::*;
    pub use crate::expdesign::*;
    pub use crate::fwdsim::*;
    pub use crate::instrument::*;
    pub use crate::model::*;
    pub use crate::modelpacks;
    pub use crate::operation::*;
    pub use crate::spam::*;
}
