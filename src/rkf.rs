//! Built-in reference backend: Runge-Kutta-Fehlberg 7(8).
//!
//! A 13-stage embedded pair with adaptive step-size control, wrapped in the
//! [`Backend`] contract. Steps carry cubic Hermite dense output assembled
//! from the endpoint derivatives; because the cubic is of much lower order
//! than the method, the step size is limited by an interpolant defect test
//! in addition to the embedded error estimate, so interpolated values stay
//! within the integration tolerance. Other numerical methods plug into the
//! driver through the same trait; this one exists so the crate is usable
//! and testable out of the box.

use crate::backend::{
    AdvanceOutcome, Backend, BackendCounters, Capabilities, InternalStep, Problem, RestartMode,
    Tolerances,
};
use crate::error::BackendError;
use crate::interp::DenseOutput;
use crate::problem::OdeSystem;
use crate::tableau::{A, B, B_ERR, C, ORDER, STAGES};

/// I-controller for the step size: h_new = safety * h * err^(-1/p).
#[derive(Debug, Clone)]
struct StepController {
    safety: f64,
    max_factor: f64,
    min_factor: f64,
    exponent: f64,
}

impl Default for StepController {
    fn default() -> Self {
        Self {
            safety: 0.9,
            max_factor: 5.0,
            min_factor: 0.2,
            exponent: 1.0 / ORDER as f64,
        }
    }
}

impl StepController {
    fn factor(&self, error: f64) -> f64 {
        if error == 0.0 {
            return self.max_factor;
        }
        if !error.is_finite() {
            return self.min_factor;
        }
        (self.safety * error.powf(-self.exponent)).clamp(self.min_factor, self.max_factor)
    }
}

/// Runge-Kutta-Fehlberg 7(8) backend.
///
/// Owns only method-local memory: the step-size suggestion, the stage
/// workspace, and its work counters. Every `advance` call receives the
/// starting point explicitly from the driver.
pub struct Rkf78Backend<const N: usize> {
    tol: Tolerances<N>,
    controller: StepController,
    /// Current step-size suggestion (magnitude); 0 means "choose on next advance".
    h: f64,
    /// Configured initial step-size magnitude; 0 means automatic.
    h_init: f64,
    h_min: f64,
    h_max: f64,
    k: [[f64; N]; STAGES],
    counters: BackendCounters,
}

impl<const N: usize> Default for Rkf78Backend<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Rkf78Backend<N> {
    /// Create a backend with automatic initial step selection.
    pub fn new() -> Self {
        Self {
            tol: Tolerances::default(),
            controller: StepController::default(),
            h: 0.0,
            h_init: 0.0,
            h_min: 1e-14,
            h_max: f64::INFINITY,
            k: [[0.0; N]; STAGES],
            counters: BackendCounters::default(),
        }
    }

    /// Set the initial step-size magnitude (0 restores automatic selection).
    pub fn with_initial_step(mut self, h: f64) -> Self {
        self.h_init = h.abs();
        self
    }

    /// Set the minimum and maximum step-size magnitudes.
    pub fn with_step_limits(mut self, h_min: f64, h_max: f64) -> Self {
        self.h_min = h_min;
        self.h_max = h_max;
        self
    }

    /// Compute all 13 stages into the workspace.
    #[allow(clippy::needless_range_loop)]
    fn compute_stages(&mut self, sys: &dyn OdeSystem<N>, t: f64, y: &[f64; N], h: f64) {
        let mut y_temp = [0.0; N];

        sys.rhs(t, y, &mut self.k[0]);
        for i in 1..STAGES {
            for n in 0..N {
                let mut sum = 0.0;
                for j in 0..i {
                    sum += A[i][j] * self.k[j][n];
                }
                y_temp[n] = y[n] + h * sum;
            }
            sys.rhs(t + C[i] * h, &y_temp, &mut self.k[i]);
        }
        self.counters.rhs_evals += STAGES as u64;
    }

    /// 8th-order solution from the stages.
    #[allow(clippy::needless_range_loop)]
    fn solution(&self, y: &[f64; N], h: f64) -> [f64; N] {
        let mut y_new = [0.0; N];
        for n in 0..N {
            let mut sum = 0.0;
            for i in 0..STAGES {
                sum += B[i] * self.k[i][n];
            }
            y_new[n] = y[n] + h * sum;
        }
        y_new
    }

    /// Infinity norm of the tolerance-scaled error estimate.
    #[allow(clippy::needless_range_loop)]
    fn error_norm(&self, y_new: &[f64; N], h: f64) -> f64 {
        let mut max_err: f64 = 0.0;
        for n in 0..N {
            let mut err_n = 0.0;
            for i in 0..STAGES {
                err_n += B_ERR[i] * self.k[i][n];
            }
            err_n *= h;
            let scale = self.tol.atol[n] + self.tol.rtol[n] * y_new[n].abs();
            max_err = max_err.max(err_n.abs() / scale);
        }
        max_err
    }
}

impl<const N: usize> Backend<N> for Rkf78Backend<N> {
    fn name(&self) -> &'static str {
        "rkf78"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_native_events: false,
            supports_dense_output: true,
            is_stiff_solver: false,
        }
    }

    fn initialize(
        &mut self,
        problem: Problem<'_, N>,
        t0: f64,
        _y0: &[f64; N],
        tol: &Tolerances<N>,
    ) -> Result<(), BackendError> {
        if problem.as_ode().is_none() {
            return Err(BackendError {
                t: t0,
                message: "explicit method requires the problem in ODE form".into(),
            });
        }
        self.tol = tol.clone();
        self.h = self.h_init;
        self.counters = BackendCounters::default();
        Ok(())
    }

    fn advance(
        &mut self,
        problem: Problem<'_, N>,
        t: f64,
        y: &[f64; N],
        t_limit: f64,
    ) -> Result<AdvanceOutcome<N>, BackendError> {
        let sys = problem.as_ode().ok_or_else(|| BackendError {
            t,
            message: "explicit method requires the problem in ODE form".into(),
        })?;
        let span = t_limit - t;
        if span == 0.0 {
            return Err(BackendError {
                t,
                message: "advance target coincides with the current time".into(),
            });
        }
        let direction = span.signum();

        if self.h == 0.0 {
            // Automatic first step: a small fraction of the remaining span.
            self.h = (span.abs() * 1e-2).clamp(self.h_min, self.h_max);
        }

        let mut h = self.h.clamp(self.h_min, self.h_max) * direction;
        let landed = (t + h - t_limit) * direction >= 0.0;
        if landed {
            h = span;
        }

        self.compute_stages(sys, t, y, h);
        let y_new = self.solution(y, h);
        let error = self.error_norm(&y_new, h);
        let h_next = (h.abs() * self.controller.factor(error)).clamp(self.h_min, self.h_max);

        if error > 1.0 {
            if h.abs() <= self.h_min {
                return Err(BackendError {
                    t,
                    message: format!("error test failed at the minimum step size {}", self.h_min),
                });
            }
            self.h = h_next;
            return Ok(AdvanceOutcome::Rejected { h_attempted: h });
        }

        let t_end = if landed { t_limit } else { t + h };
        // Endpoint derivative for the Hermite interpolant; k[0] is f(t, y).
        let f_start = self.k[0];
        let mut f_end = [0.0; N];
        sys.rhs(t_end, &y_new, &mut f_end);
        self.counters.rhs_evals += 1;

        let dense = DenseOutput::Hermite {
            t_start: t,
            t_end,
            y_start: *y,
            y_end: y_new,
            f_start,
            f_end,
        };

        // Interpolant defect test. The cubic Hermite error is governed by
        // y'''': its derivative defect at the quarter point is y''''h^3/128,
        // which puts the worst interior error near defect * h / 3. A step
        // whose interpolant would exceed the tolerance is narrowed even
        // though the embedded error estimate accepted it.
        let t_q = t + 0.25 * h;
        let y_q = dense.at(t_q);
        let mut f_q = [0.0; N];
        sys.rhs(t_q, &y_q, &mut f_q);
        self.counters.rhs_evals += 1;
        let p_q = dense.rate_at(t_q);
        let mut interp_err: f64 = 0.0;
        for n in 0..N {
            let scale = self.tol.atol[n] + self.tol.rtol[n] * y_new[n].abs();
            interp_err = interp_err.max((f_q[n] - p_q[n]).abs() * h.abs() / (3.0 * scale));
        }

        if interp_err > 1.0 {
            if h.abs() <= self.h_min {
                return Err(BackendError {
                    t,
                    message: format!(
                        "interpolant defect test failed at the minimum step size {}",
                        self.h_min
                    ),
                });
            }
            let shrink = (self.controller.safety * interp_err.powf(-0.25))
                .clamp(self.controller.min_factor, 1.0);
            self.h = (h.abs() * shrink).clamp(self.h_min, self.h_max);
            return Ok(AdvanceOutcome::Rejected { h_attempted: h });
        }

        self.h = h_next;
        if interp_err > 0.0 {
            let grow = (self.controller.safety * interp_err.powf(-0.25))
                .clamp(self.controller.min_factor, self.controller.max_factor);
            self.h = self.h.min((h.abs() * grow).clamp(self.h_min, self.h_max));
        }

        Ok(AdvanceOutcome::Step(InternalStep {
            t_start: t,
            t_end,
            y_start: *y,
            y_end: y_new,
            dense,
        }))
    }

    fn restart(&mut self, mode: RestartMode) {
        if mode == RestartMode::Cold {
            self.h = self.h_init;
        }
    }

    fn step_suggestion(&self) -> f64 {
        self.h
    }

    fn counters(&self) -> BackendCounters {
        self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Decay;

    impl OdeSystem<1> for Decay {
        fn rhs(&self, _t: f64, y: &[f64; 1], dydt: &mut [f64; 1]) {
            dydt[0] = -y[0];
        }
    }

    struct Oscillator {
        omega: f64,
    }

    impl OdeSystem<2> for Oscillator {
        fn rhs(&self, _t: f64, y: &[f64; 2], dydt: &mut [f64; 2]) {
            dydt[0] = y[1];
            dydt[1] = -self.omega * self.omega * y[0];
        }
    }

    fn step_to(
        backend: &mut Rkf78Backend<2>,
        sys: &Oscillator,
        mut t: f64,
        mut y: [f64; 2],
        t_limit: f64,
    ) -> (f64, [f64; 2]) {
        while t < t_limit {
            match backend.advance(Problem::Ode(sys), t, &y, t_limit).unwrap() {
                AdvanceOutcome::Step(step) => {
                    t = step.t_end;
                    y = step.y_end;
                }
                AdvanceOutcome::Rejected { .. } => {}
            }
        }
        (t, y)
    }

    #[test]
    fn oscillator_returns_after_one_period() {
        let sys = Oscillator { omega: 1.0 };
        let mut backend = Rkf78Backend::new().with_initial_step(0.1);
        backend
            .initialize(
                Problem::Ode(&sys),
                0.0,
                &[1.0, 0.0],
                &Tolerances::new(1e-12, 1e-12),
            )
            .unwrap();

        let period = 2.0 * std::f64::consts::PI;
        let (t, y) = step_to(&mut backend, &sys, 0.0, [1.0, 0.0], period);

        assert_relative_eq!(t, period, epsilon = 1e-12);
        assert_relative_eq!(y[0], 1.0, epsilon = 1e-10);
        assert!(y[1].abs() < 1e-10);
    }

    #[test]
    fn lands_exactly_on_target() {
        let sys = Decay;
        let mut backend = Rkf78Backend::<1>::new().with_initial_step(10.0);
        backend
            .initialize(Problem::Ode(&sys), 0.0, &[1.0], &Tolerances::new(1e-12, 1e-12))
            .unwrap();

        // The run must end exactly at the clamped target.
        let mut t = 0.0;
        let mut y = [1.0];
        loop {
            match backend.advance(Problem::Ode(&sys), t, &y, 0.5).unwrap() {
                AdvanceOutcome::Step(step) => {
                    t = step.t_end;
                    y = step.y_end;
                    if t == 0.5 {
                        break;
                    }
                }
                AdvanceOutcome::Rejected { .. } => {}
            }
        }
        assert_relative_eq!(y[0], (-0.5f64).exp(), max_relative = 1e-10);
    }

    #[test]
    fn huge_step_with_tight_tolerance_is_rejected() {
        let sys = Oscillator { omega: 1.0 };
        let mut backend = Rkf78Backend::new().with_initial_step(100.0);
        backend
            .initialize(
                Problem::Ode(&sys),
                0.0,
                &[1.0, 0.0],
                &Tolerances::new(1e-12, 1e-12),
            )
            .unwrap();

        let outcome = backend
            .advance(Problem::Ode(&sys), 0.0, &[1.0, 0.0], 1000.0)
            .unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Rejected { .. }));
    }

    #[test]
    fn counters_track_stage_evaluations() {
        let sys = Decay;
        let mut backend = Rkf78Backend::<1>::new().with_initial_step(1e-3);
        backend
            .initialize(Problem::Ode(&sys), 0.0, &[1.0], &Tolerances::new(1e-9, 1e-9))
            .unwrap();

        let before = backend.counters();
        assert_eq!(before, BackendCounters::default());

        match backend.advance(Problem::Ode(&sys), 0.0, &[1.0], 1.0).unwrap() {
            AdvanceOutcome::Step(_) => {
                // 13 stages plus the dense-output endpoint derivative plus
                // the quarter-point defect evaluation.
                assert_eq!(backend.counters().rhs_evals, STAGES as u64 + 2);
            }
            AdvanceOutcome::Rejected { .. } => {
                panic!("small smooth step must be accepted")
            }
        }
    }

    #[test]
    fn cold_restart_forgets_step_history() {
        let sys = Decay;
        let mut backend = Rkf78Backend::<1>::new();
        backend
            .initialize(Problem::Ode(&sys), 0.0, &[1.0], &Tolerances::new(1e-9, 1e-9))
            .unwrap();
        let _ = backend.advance(Problem::Ode(&sys), 0.0, &[1.0], 5.0).unwrap();
        assert!(backend.h > 0.0);
        assert_eq!(backend.step_suggestion(), backend.h);

        backend.restart(RestartMode::Cold);
        assert_eq!(backend.h, 0.0);
    }

    #[test]
    fn backward_integration_step() {
        let sys = Decay;
        let mut backend = Rkf78Backend::<1>::new().with_initial_step(1e-3);
        backend
            .initialize(Problem::Ode(&sys), 1.0, &[1.0], &Tolerances::new(1e-12, 1e-12))
            .unwrap();

        match backend.advance(Problem::Ode(&sys), 1.0, &[1.0], 0.0).unwrap() {
            AdvanceOutcome::Step(step) => {
                assert!(step.t_end < step.t_start);
            }
            AdvanceOutcome::Rejected { .. } => panic!("smooth problem, step should be accepted"),
        }
    }

    #[test]
    fn controller_exponent_follows_the_method_order() {
        let controller = StepController::default();
        // err = 2^ORDER halves the step before the safety factor.
        let err = 2.0f64.powi(ORDER as i32);
        assert_relative_eq!(controller.factor(err), 0.45, max_relative = 1e-12);
    }

    #[test]
    fn dense_output_stays_within_tolerance() {
        // The step starts on the exact trajectory y = e^-t, so interior
        // interpolated values can be checked against it directly.
        let sys = Decay;
        let tol = Tolerances::new(1e-12, 1e-12);
        let mut backend = Rkf78Backend::<1>::new();
        backend.initialize(Problem::Ode(&sys), 0.0, &[1.0], &tol).unwrap();

        let step = loop {
            match backend.advance(Problem::Ode(&sys), 0.0, &[1.0], 2.0).unwrap() {
                AdvanceOutcome::Step(step) => break step,
                AdvanceOutcome::Rejected { .. } => {}
            }
        };

        for k in 1..8 {
            let t = step.t_start + (step.t_end - step.t_start) * (k as f64) / 8.0;
            let y = step.dense.at(t)[0];
            assert!(
                (y - (-t).exp()).abs() < 5e-12,
                "interpolant off by {:e} at t = {}",
                (y - (-t).exp()).abs(),
                t
            );
        }
    }

    #[test]
    fn residual_problems_are_refused_at_initialize() {
        struct ImplicitDecay;

        impl crate::problem::DaeSystem<1> for ImplicitDecay {
            fn residual(&self, _t: f64, y: &[f64; 1], yd: &[f64; 1], r: &mut [f64; 1]) {
                r[0] = yd[0] + y[0];
            }
        }

        let mut backend = Rkf78Backend::<1>::new();
        let result = backend.initialize(
            Problem::Dae(&ImplicitDecay),
            0.0,
            &[1.0],
            &Tolerances::new(1e-9, 1e-9),
        );
        assert!(result.is_err());
    }
}
