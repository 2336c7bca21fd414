//! Property tests for the driver's output contract: every requested
//! communication point is emitted exactly once, in order, and interpolated
//! values stay within tolerance of the analytic solution.

use odespan::{Driver, OdeSystem, OutputPlan, Rkf78Backend, RunStatus, Tolerances};
use proptest::prelude::*;

struct Decay;

impl OdeSystem<1> for Decay {
    fn rhs(&self, _t: f64, y: &[f64; 1], dydt: &mut [f64; 1]) {
        dydt[0] = -y[0];
    }
}

/// Strictly increasing grids starting after t = 0.
fn strict_grid() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(0.01f64..1.0, 1..8).prop_map(|increments| {
        let mut t = 0.0;
        increments
            .into_iter()
            .map(|dt| {
                t += dt;
                t
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn grid_points_are_covered_exactly_once(grid in strict_grid()) {
        let mut driver = Driver::new(Rkf78Backend::<1>::new());
        let plan = OutputPlan::Grid(grid.clone());
        let tol = Tolerances::new(1e-10, 1e-10);
        let traj = driver.run(&Decay, 0.0, &[1.0], &plan, &tol).unwrap();

        prop_assert_eq!(traj.status, RunStatus::Completed);
        prop_assert_eq!(traj.times.len(), grid.len() + 1);
        prop_assert_eq!(traj.times[0], 0.0);
        for (t, p) in traj.times[1..].iter().zip(&grid) {
            prop_assert_eq!(t, p);
        }
        for (t, y) in traj.times.iter().zip(&traj.states) {
            prop_assert!(
                (y[0] - (-t).exp()).abs() < 1e-7,
                "y({}) = {} deviates from analytic solution", t, y[0]
            );
        }
    }

    #[test]
    fn span_output_is_strictly_monotone(
        points in 0usize..40,
        horizon in 0.1f64..8.0,
    ) {
        let mut driver = Driver::new(Rkf78Backend::<1>::new());
        let plan = OutputPlan::Span { horizon, points };
        let tol = Tolerances::new(1e-10, 1e-10);
        let traj = driver.run(&Decay, 0.0, &[1.0], &plan, &tol).unwrap();

        prop_assert_eq!(traj.times[0], 0.0);
        for pair in traj.times.windows(2) {
            prop_assert!(pair[1] > pair[0]);
        }
        prop_assert_eq!(*traj.times.last().unwrap(), horizon);
        if points > 0 {
            prop_assert_eq!(traj.times.len(), points + 1);
        }
    }
}
