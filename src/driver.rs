//! The generic time-stepping driver.
//!
//! `Driver` advances a backend from one communication point to the next,
//! tolerating internal-step sizes that differ from the external grid. It
//! detects indicator sign changes at every accepted step, localizes the
//! earliest crossing via the step's dense output, restarts the backend at
//! event boundaries, and keeps the statistics ledger consistent across
//! rejections, truncations, and restarts.
//!
//! The driver is single-threaded and cooperative: it blocks on each
//! `advance` call and yields to the streaming sink only between emitted
//! points. Cancellation requests take effect at step boundaries, never
//! inside a backend call.

use indexmap::IndexMap;

use crate::backend::{AdvanceOutcome, Backend, Problem, RestartMode, Tolerances};
use crate::error::DriverError;
use crate::events::{crossing_armed, EventHandler, EventRecord, EventResponse};
use crate::interp::DenseOutput;
use crate::problem::{EventIndicators, OdeSystem};
use crate::rootfind::find_first_crossing;
use crate::stats::{self, StatisticsLedger};

/// Where output is requested.
#[derive(Debug, Clone)]
pub enum OutputPlan {
    /// Explicit communication points, strictly monotone in the integration
    /// direction. The last point is the horizon. The first point may equal
    /// the initial time.
    Grid(Vec<f64>),
    /// A horizon with `points` evenly spaced communication points after the
    /// initial time. `points == 0` reports every accepted internal step
    /// instead.
    Span {
        /// Final time of the run
        horizon: f64,
        /// Number of evenly spaced output points (0 = every internal step)
        points: usize,
    },
}

/// Driver knobs. The defaults suit most problems.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Consecutive rejected steps tolerated before the run is fatal.
    pub max_consecutive_rejections: u32,
    /// Global bound on internal step advances.
    pub max_steps: u64,
    /// Root-localization bracket tolerance as a fraction of the local step
    /// width, so event precision scales with the local time resolution.
    pub root_tol_factor: f64,
    /// Iteration bound for the bracketed root search.
    pub root_max_iter: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_consecutive_rejections: 10,
            max_steps: 10_000_000,
            root_tol_factor: 1e-8,
            root_max_iter: 50,
        }
    }
}

/// Decision returned by a streaming sink after each emitted point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkAction {
    /// Keep integrating.
    Continue,
    /// Stop at the next step boundary.
    Stop,
}

/// External collaborator receiving points as they are produced.
///
/// When a sink is attached the driver streams instead of buffering: the
/// returned trajectory carries no times or states, only events, statistics,
/// and the run status.
pub trait StreamSink<const N: usize> {
    /// Receive one emitted point. Return [`SinkAction::Stop`] to request
    /// cooperative termination.
    fn on_point(&mut self, t: f64, y: &[f64; N]) -> SinkAction;
}

/// Optional run collaborators: event indicators, event handler, streaming
/// sink. All absent by default.
#[derive(Default)]
pub struct Hooks<'a, const N: usize> {
    /// Event-indicator vector monitored during the run
    pub indicators: Option<&'a dyn EventIndicators<N>>,
    /// Handler notified at every detected event
    pub handler: Option<&'a mut dyn EventHandler<N>>,
    /// Streaming sink replacing the buffered output
    pub sink: Option<&'a mut dyn StreamSink<N>>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The horizon was reached.
    Completed,
    /// The event handler requested termination at an event.
    StoppedByHandler,
    /// The streaming sink requested termination.
    StoppedBySink,
}

/// Result of a run: sampled output, events, statistics, status.
#[derive(Debug, Clone)]
pub struct Trajectory<const N: usize> {
    /// Emitted times, strictly monotone in the integration direction
    pub times: Vec<f64>,
    /// Emitted states, parallel to `times`
    pub states: Vec<[f64; N]>,
    /// Detected events in order of occurrence
    pub events: Vec<EventRecord>,
    /// Final statistics snapshot
    pub statistics: IndexMap<&'static str, u64>,
    /// Backend step-size suggestion at the end of the run, usable as a
    /// warm-restart hint
    pub next_step: f64,
    /// How the run ended
    pub status: RunStatus,
}

/// Buffers points or forwards them to the sink, tracking stop requests.
struct Emitter<'a, const N: usize> {
    times: Vec<f64>,
    states: Vec<[f64; N]>,
    sink: Option<&'a mut dyn StreamSink<N>>,
    stop_requested: bool,
}

impl<'a, const N: usize> Emitter<'a, N> {
    fn new(sink: Option<&'a mut dyn StreamSink<N>>) -> Self {
        Self {
            times: Vec::new(),
            states: Vec::new(),
            sink,
            stop_requested: false,
        }
    }

    fn emit(&mut self, t: f64, y: &[f64; N]) {
        if self.stop_requested {
            return;
        }
        match &mut self.sink {
            Some(sink) => {
                if sink.on_point(t, y) == SinkAction::Stop {
                    self.stop_requested = true;
                }
            }
            None => {
                self.times.push(t);
                self.states.push(*y);
            }
        }
    }
}

/// Resolved communication points plus the emission cursor.
struct OutputSchedule {
    points: Vec<f64>,
    next: usize,
    every_step: bool,
}

impl OutputSchedule {
    /// Validate the plan against the initial time and resolve the horizon.
    fn resolve(plan: &OutputPlan, t0: f64) -> Result<(Self, f64), DriverError> {
        match plan {
            OutputPlan::Grid(points) => {
                if points.is_empty() {
                    return Err(DriverError::InvalidGrid {
                        reason: "grid is empty".into(),
                    });
                }
                if points.iter().any(|p| !p.is_finite()) {
                    return Err(DriverError::InvalidGrid {
                        reason: "grid contains a non-finite point".into(),
                    });
                }
                let horizon = points[points.len() - 1];
                if horizon == t0 {
                    return Err(DriverError::InvalidGrid {
                        reason: "horizon coincides with the initial time".into(),
                    });
                }
                let direction = (horizon - t0).signum();
                for pair in points.windows(2) {
                    if (pair[1] - pair[0]) * direction <= 0.0 {
                        return Err(DriverError::InvalidGrid {
                            reason: format!(
                                "grid is not strictly monotone between {} and {}",
                                pair[0], pair[1]
                            ),
                        });
                    }
                }
                if (points[0] - t0) * direction < 0.0 {
                    return Err(DriverError::InvalidGrid {
                        reason: format!("grid point {} lies before the initial time", points[0]),
                    });
                }
                let mut schedule = Self {
                    points: points.clone(),
                    next: 0,
                    every_step: false,
                };
                // The initial point is emitted unconditionally.
                if schedule.points[0] == t0 {
                    schedule.next = 1;
                }
                Ok((schedule, horizon))
            }
            OutputPlan::Span { horizon, points } => {
                if !horizon.is_finite() {
                    return Err(DriverError::InvalidGrid {
                        reason: "horizon is not finite".into(),
                    });
                }
                if *horizon == t0 {
                    return Err(DriverError::InvalidGrid {
                        reason: "horizon coincides with the initial time".into(),
                    });
                }
                if *points == 0 {
                    return Ok((
                        Self {
                            points: Vec::new(),
                            next: 0,
                            every_step: true,
                        },
                        *horizon,
                    ));
                }
                let span = horizon - t0;
                let mut grid = Vec::with_capacity(*points);
                for i in 1..=*points {
                    grid.push(t0 + span * (i as f64) / (*points as f64));
                }
                // Guard the last point against roundoff.
                grid[*points - 1] = *horizon;
                Ok((
                    Self {
                        points: grid,
                        next: 0,
                        every_step: false,
                    },
                    *horizon,
                ))
            }
        }
    }

    /// The next unemitted communication point, or the horizon.
    fn next_target(&self, horizon: f64) -> f64 {
        if self.next < self.points.len() {
            self.points[self.next]
        } else {
            horizon
        }
    }

    /// Emit every scheduled point inside `(t_lo, t_hi)` (or `(t_lo, t_hi]`
    /// when `include_end`) through the step interpolant.
    fn emit_between<const N: usize>(
        &mut self,
        emitter: &mut Emitter<'_, N>,
        dense: &DenseOutput<N>,
        t_lo: f64,
        t_hi: f64,
        direction: f64,
        include_end: bool,
    ) {
        while self.next < self.points.len() && !emitter.stop_requested {
            let p = self.points[self.next];
            if (p - t_lo) * direction <= 0.0 {
                self.next += 1;
                continue;
            }
            let within = if include_end {
                (p - t_hi) * direction <= 0.0
            } else {
                (p - t_hi) * direction < 0.0
            };
            if !within {
                break;
            }
            let yp = dense.at(p);
            emitter.emit(p, &yp);
            self.next += 1;
        }
    }
}

/// The step orchestrator: one backend, one configuration, one ledger.
pub struct Driver<B, const N: usize> {
    backend: B,
    config: DriverConfig,
    ledger: StatisticsLedger,
}

impl<B: Backend<N>, const N: usize> Driver<B, N> {
    /// Create a driver around a backend with default configuration.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: DriverConfig::default(),
            ledger: StatisticsLedger::new(),
        }
    }

    /// Replace the driver configuration.
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current statistics. Safe to read mid-run from a sink's point of view:
    /// counters are merged after every backend call.
    pub fn statistics(&self) -> IndexMap<&'static str, u64> {
        self.ledger.snapshot()
    }

    /// Integrate an explicit system from `(t0, y0)` and sample per `plan`,
    /// with no event indicators, handler, or sink attached.
    pub fn run<S: OdeSystem<N>>(
        &mut self,
        sys: &S,
        t0: f64,
        y0: &[f64; N],
        plan: &OutputPlan,
        tol: &Tolerances<N>,
    ) -> Result<Trajectory<N>, DriverError> {
        self.run_problem(Problem::Ode(sys), t0, y0, plan, tol, Hooks::default())
    }

    /// Integrate an explicit system with the given collaborators attached.
    pub fn run_with<S: OdeSystem<N>>(
        &mut self,
        sys: &S,
        t0: f64,
        y0: &[f64; N],
        plan: &OutputPlan,
        tol: &Tolerances<N>,
        hooks: Hooks<'_, N>,
    ) -> Result<Trajectory<N>, DriverError> {
        self.run_problem(Problem::Ode(sys), t0, y0, plan, tol, hooks)
    }

    /// Integrate a problem in either formulation with the given
    /// collaborators attached. The backend decides at `initialize` whether
    /// it can handle the formulation.
    ///
    /// Configuration problems are rejected before the first backend call.
    pub fn run_problem(
        &mut self,
        problem: Problem<'_, N>,
        t0: f64,
        y0: &[f64; N],
        plan: &OutputPlan,
        tol: &Tolerances<N>,
        hooks: Hooks<'_, N>,
    ) -> Result<Trajectory<N>, DriverError> {
        validate_inputs(t0, y0, tol)?;
        let (mut schedule, horizon) = OutputSchedule::resolve(plan, t0)?;
        let direction = (horizon - t0).signum();

        let Hooks {
            indicators,
            mut handler,
            sink,
        } = hooks;
        let indicators = indicators.filter(|g| g.dim() > 0);

        self.ledger.reset();
        self.backend.initialize(problem, t0, y0, tol)?;
        let dense_capable = self.backend.capabilities().supports_dense_output;

        let mut emitter = Emitter::new(sink);
        let mut events: Vec<EventRecord> = Vec::new();
        let mut status = RunStatus::Completed;

        let mut t = t0;
        let mut y = *y0;

        emitter.emit(t0, y0);

        // Indicator caches: `g_ref` carries the reference signs (nonzero
        // values preserved across exact-zero touches), `g_now` the actual
        // values at the current point, `g_new` the values at a step end.
        let dim = indicators.map_or(0, |g| g.dim());
        let mut g_ref = vec![0.0; dim];
        let mut g_now = vec![0.0; dim];
        let mut g_new = vec![0.0; dim];
        if let Some(g) = indicators {
            g.eval(t0, y0, &mut g_ref);
            self.ledger.increment(stats::INDICATOR_EVALS, 1);
            g_now.copy_from_slice(&g_ref);
        }

        let mut consecutive_rejections: u32 = 0;

        if emitter.stop_requested {
            status = RunStatus::StoppedBySink;
        }

        'main: while status == RunStatus::Completed && (horizon - t) * direction > 0.0 {
            // Backends without dense output must land on communication
            // points themselves; dense-capable ones are clamped only by
            // the horizon.
            let t_limit = if dense_capable {
                horizon
            } else {
                schedule.next_target(horizon)
            };

            let step = match self.backend.advance(problem, t, &y, t_limit)? {
                AdvanceOutcome::Rejected { h_attempted } => {
                    self.ledger.increment(stats::REJECTED_STEPS, 1);
                    self.ledger.merge_backend(self.backend.counters());
                    consecutive_rejections += 1;
                    if consecutive_rejections > self.config.max_consecutive_rejections {
                        return Err(DriverError::ExcessiveRejections {
                            t,
                            h_last: h_attempted,
                            count: consecutive_rejections,
                        });
                    }
                    continue;
                }
                AdvanceOutcome::Step(step) => step,
            };

            consecutive_rejections = 0;
            self.ledger.increment(stats::STEPS, 1);
            self.ledger.merge_backend(self.backend.counters());
            if self.ledger.get(stats::STEPS) > self.config.max_steps {
                return Err(DriverError::MaxStepsExceeded { t });
            }
            if !step.y_end.iter().all(|v| v.is_finite()) {
                return Err(DriverError::NonFiniteState { t: step.t_end });
            }

            if let Some(g) = indicators {
                g.eval(step.t_end, &step.y_end, &mut g_new);
                self.ledger.increment(stats::INDICATOR_EVALS, 1);

                let armed = (0..dim).any(|i| crossing_armed(g_ref[i], g_new[i]));
                if armed {
                    let tol_t =
                        self.config.root_tol_factor * (step.t_end - step.t_start).abs();
                    let mut n_evals = 0u64;
                    let found = find_first_crossing(
                        g,
                        &step.dense,
                        &g_ref,
                        &g_now,
                        &g_new,
                        tol_t,
                        self.config.root_max_iter,
                        &mut n_evals,
                    );
                    self.ledger.increment(stats::INDICATOR_EVALS, n_evals);
                    let found = found.map_err(|failure| DriverError::RootLocalization {
                        t_lo: failure.t_lo,
                        t_hi: failure.t_hi,
                    })?;

                    if let Some(crossing) = found {
                        // Communication points that precede the event.
                        schedule.emit_between(
                            &mut emitter,
                            &step.dense,
                            step.t_start,
                            crossing.t,
                            direction,
                            false,
                        );

                        let y_event = step.dense.at(crossing.t);
                        let record = EventRecord {
                            t: crossing.t,
                            components: crossing.components,
                            directions: crossing.directions,
                        };
                        self.ledger.increment(stats::EVENTS, 1);
                        emitter.emit(crossing.t, &y_event);

                        let response = match &mut handler {
                            Some(h) => h.on_event(&record, &y_event),
                            None => EventResponse::Continue,
                        };

                        t = crossing.t;
                        let modified = match response {
                            EventResponse::Stop => {
                                events.push(record);
                                status = RunStatus::StoppedByHandler;
                                break 'main;
                            }
                            EventResponse::Modify(new_y) => {
                                y = new_y;
                                self.backend.restart(RestartMode::Cold);
                                true
                            }
                            EventResponse::Continue => {
                                y = y_event;
                                self.backend.restart(RestartMode::Warm);
                                false
                            }
                        };

                        // Re-arm the indicators at the restart point. The
                        // crossed components take the far-side sign so the
                        // crossing just reported is not detected again.
                        g.eval(t, &y, &mut g_now);
                        self.ledger.increment(stats::INDICATOR_EVALS, 1);
                        for i in 0..dim {
                            if !modified && record.components.contains(&i) {
                                if g_new[i] != 0.0 {
                                    g_ref[i] = g_new[i];
                                }
                            } else if g_now[i] != 0.0 {
                                g_ref[i] = g_now[i];
                            }
                        }
                        events.push(record);

                        if emitter.stop_requested {
                            status = RunStatus::StoppedBySink;
                        }
                        continue;
                    }
                }

                // No event in this step: roll the caches forward.
                for i in 0..dim {
                    if g_new[i] != 0.0 {
                        g_ref[i] = g_new[i];
                    }
                }
                g_now.copy_from_slice(&g_new);
            }

            if schedule.every_step {
                emitter.emit(step.t_end, &step.y_end);
            } else {
                schedule.emit_between(
                    &mut emitter,
                    &step.dense,
                    step.t_start,
                    step.t_end,
                    direction,
                    true,
                );
            }

            t = step.t_end;
            y = step.y_end;

            if emitter.stop_requested {
                status = RunStatus::StoppedBySink;
            }
        }

        Ok(Trajectory {
            times: emitter.times,
            states: emitter.states,
            events,
            statistics: self.ledger.snapshot(),
            next_step: self.backend.step_suggestion(),
            status,
        })
    }
}

/// Eager validation of scalar inputs, before any backend call.
fn validate_inputs<const N: usize>(
    t0: f64,
    y0: &[f64; N],
    tol: &Tolerances<N>,
) -> Result<(), DriverError> {
    if !t0.is_finite() {
        return Err(DriverError::InvalidInput {
            reason: "initial time is not finite".into(),
        });
    }
    for (i, v) in y0.iter().enumerate() {
        if !v.is_finite() {
            return Err(DriverError::InvalidInput {
                reason: format!("initial state component {} is not finite", i),
            });
        }
    }
    for i in 0..N {
        if !tol.atol[i].is_finite() || tol.atol[i] <= 0.0 {
            return Err(DriverError::InvalidTolerance {
                reason: format!("atol[{}] must be positive and finite", i),
            });
        }
        if !tol.rtol[i].is_finite() || tol.rtol[i] < 0.0 {
            return Err(DriverError::InvalidTolerance {
                reason: format!("rtol[{}] must be non-negative and finite", i),
            });
        }
    }
    Ok(())
}
