//! Standard model packs: target models with their fiducial and germ lists.
//!
//! Only the workhorse 1-qubit pack ships here; the engine itself is
//! n-qubit generic.

/// The standard 1-qubit X(π/2), Y(π/2), idle gate set.
///
/// Ships the published fiducial set (six single-axis rotations bracketing
/// the Bloch sphere) and the eleven-germ amplificationally-complete list.
pub mod std1q_xyi {
    use nalgebra::DMatrix;

    use crate::basis::Basis;
    use crate::circuit::Circuit;
    use crate::model::{ExplicitModel, SimType};
    use crate::operation::GateOp;
    use crate::spam::{Parameterization, Povm, PovmKind, SpamVec};

    /// PTM of the idle gate.
    pub fn gi_ptm() -> DMatrix<f64> {
        DMatrix::identity(4, 4)
    }

    /// PTM of X(π/2): Y → Z, Z → -Y.
    pub fn gx_ptm() -> DMatrix<f64> {
        DMatrix::from_row_slice(4, 4, &[
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, -1.0,
            0.0, 0.0, 1.0, 0.0,
        ])
    }

    /// PTM of Y(π/2): Z → X, X → -Z.
    pub fn gy_ptm() -> DMatrix<f64> {
        DMatrix::from_row_slice(4, 4, &[
            1.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, -1.0, 0.0, 0.0,
        ])
    }

    fn build(
        prep_param: Parameterization,
        effect_param: Parameterization,
        povm_kind: PovmKind,
        gate_op: fn(DMatrix<f64>) -> GateOp,
    ) -> ExplicitModel {
        let basis = Basis::pp(1);
        let mut model = ExplicitModel::new(basis, SimType::Matrix);
        let prep = SpamVec::computational_prep(&model.basis, prep_param)
            .expect("1-qubit prep construction cannot fail");
        let povm = Povm::computational(&model.basis, 1, effect_param, povm_kind)
            .expect("1-qubit POVM construction cannot fail");
        model.set_prep("rho0", prep);
        model.set_povm("Mdefault", povm);
        model.set_operation("Gi", gate_op(gi_ptm()));
        model.set_operation("Gx", gate_op(gx_ptm()));
        model.set_operation("Gy", gate_op(gy_ptm()));
        model
    }

    /// Fully parameterized target model (60 parameters).
    pub fn target_model_full() -> ExplicitModel {
        build(
            Parameterization::Full,
            Parameterization::Full,
            PovmKind::Unconstrained,
            GateOp::full,
        )
    }

    /// TP-parameterized target model (43 parameters): TP preparation, a
    /// complement-constrained POVM and TP gates.
    pub fn target_model_tp() -> ExplicitModel {
        build(
            Parameterization::Tp,
            Parameterization::Full,
            PovmKind::TpComplement,
            GateOp::tp,
        )
    }

    /// Static target model, for data generation and as a gauge target.
    pub fn target_model_static() -> ExplicitModel {
        build(
            Parameterization::Static,
            Parameterization::Static,
            PovmKind::Unconstrained,
            GateOp::statically,
        )
    }

    /// Preparation fiducials: {} Gx Gy GxGx GxGxGx GyGyGy.
    pub fn prep_fiducials() -> Vec<Circuit> {
        ["{}", "Gx", "Gy", "GxGx", "GxGxGx", "GyGyGy"]
            .iter()
            .map(|s| s.parse().expect("static fiducial strings parse"))
            .collect()
    }

    /// Measurement fiducials (same set as the preparation fiducials).
    pub fn meas_fiducials() -> Vec<Circuit> {
        prep_fiducials()
    }

    /// The standard eleven-germ list for XYI.
    pub fn germs() -> Vec<Circuit> {
        [
            "Gx",
            "Gy",
            "Gi",
            "GxGy",
            "GxGyGi",
            "GxGiGy",
            "GxGiGi",
            "GyGiGi",
            "GxGxGiGy",
            "GxGyGyGi",
            "GxGxGyGxGyGy",
        ]
        .iter()
        .map(|s| s.parse().expect("static germ strings parse"))
        .collect()
    }

}
