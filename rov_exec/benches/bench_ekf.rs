//! # Estimator Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rov_lib::loc::{Ekf, EstimatorState, InertialSample, NoiseModel, OdometryDelta};

fn ekf_benchmark(c: &mut Criterion) {
    let noise = NoiseModel {
        std_d: 0.01,
        std_v: 0.05,
        std_theta: 0.01,
        std_accel_delta: 0.2,
        std_vel_delta: 0.01,
        std_gyro_delta: 0.02
    };

    // A gentle left hand curve at 1 m/s sampled at 10 Hz
    let odom = OdometryDelta {
        dist_m: 0.1,
        heading_rad: 0.01
    };
    let inertial = InertialSample {
        accel_x_ms2: 0.0,
        accel_y_ms2: 0.1,
        gyro_z_rads: 0.1
    };

    let mut ekf = Ekf::new(EstimatorState::at_origin(0.01, 0.01, 0.01), noise);

    c.bench_function("Ekf::predict_and_update", |b| {
        b.iter(|| ekf.predict_and_update(black_box(Some(odom)), black_box(Some(inertial)), 0.1))
    });

    let mut ekf = Ekf::new(EstimatorState::at_origin(0.01, 0.01, 0.01), noise);

    c.bench_function("Ekf::predict_and_update::predict_only", |b| {
        b.iter(|| ekf.predict_and_update(black_box(Some(odom)), None, 0.1))
    });
}

criterion_group!(benches, ekf_benchmark);
criterion_main!(benches);
