// benches/fwdsim_bench.rs

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gst_core::expdesign::std1q_xyi_design;
use gst_core::model::SimType;
use gst_core::modelpacks;

fn benchmark_forward_simulation(c: &mut Criterion) {
    let design = std1q_xyi_design(vec![1, 2, 4, 8, 16]);
    let circuits = design.all_circuits();

    c.bench_function("matrix_sim_bulk_probabilities", |b| {
        let model = modelpacks::std1q_xyi::target_model_tp();
        b.iter(|| {
            let probs = model.bulk_probabilities(black_box(&circuits)).unwrap();
            black_box(probs);
        });
    });

    c.bench_function("map_sim_bulk_probabilities", |b| {
        let mut model = modelpacks::std1q_xyi::target_model_tp();
        model.sim_type = SimType::Map;
        b.iter(|| {
            let probs = model.bulk_probabilities(black_box(&circuits)).unwrap();
            black_box(probs);
        });
    });

    c.bench_function("dprobs_single_circuit", |b| {
        let model = modelpacks::std1q_xyi::target_model_tp();
        let circuit = circuits[circuits.len() - 1].clone();
        b.iter(|| {
            let dp = model.dprobs(black_box(&circuit)).unwrap();
            black_box(dp);
        });
    });
}

criterion_group!(benches, benchmark_forward_simulation);
criterion_main!(benches);
