//! End-to-end driver benchmarks on classic smooth problems.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use odespan::{Driver, OdeSystem, OutputPlan, Rkf78Backend, Tolerances};

struct Oscillator;

impl OdeSystem<2> for Oscillator {
    fn rhs(&self, _t: f64, y: &[f64; 2], dydt: &mut [f64; 2]) {
        dydt[0] = y[1];
        dydt[1] = -y[0];
    }
}

struct Kepler;

// Planar two-body problem in Cartesian coordinates (mu = 1).
impl OdeSystem<4> for Kepler {
    fn rhs(&self, _t: f64, y: &[f64; 4], dydt: &mut [f64; 4]) {
        let r2 = y[0] * y[0] + y[1] * y[1];
        let r3 = r2 * r2.sqrt();
        dydt[0] = y[2];
        dydt[1] = y[3];
        dydt[2] = -y[0] / r3;
        dydt[3] = -y[1] / r3;
    }
}

fn bench_oscillator(c: &mut Criterion) {
    c.bench_function("oscillator_10_periods", |b| {
        let plan = OutputPlan::Span {
            horizon: 10.0 * std::f64::consts::TAU,
            points: 100,
        };
        let tol = Tolerances::new(1e-10, 1e-10);
        b.iter(|| {
            let mut driver = Driver::new(Rkf78Backend::<2>::new());
            black_box(
                driver
                    .run(&Oscillator, 0.0, &[1.0, 0.0], &plan, &tol)
                    .unwrap(),
            )
        })
    });
}

fn bench_kepler(c: &mut Criterion) {
    c.bench_function("kepler_orbit_e06", |b| {
        // Eccentric orbit (e = 0.6) started at periapsis, one full period.
        let e: f64 = 0.6;
        let y0 = [1.0 - e, 0.0, 0.0, ((1.0 + e) / (1.0 - e)).sqrt()];
        let plan = OutputPlan::Span {
            horizon: std::f64::consts::TAU,
            points: 64,
        };
        let tol = Tolerances::new(1e-12, 1e-12);
        b.iter(|| {
            let mut driver = Driver::new(Rkf78Backend::<4>::new());
            black_box(driver.run(&Kepler, 0.0, &y0, &plan, &tol).unwrap())
        })
    });
}

criterion_group!(benches, bench_oscillator, bench_kepler);
criterion_main!(benches);
