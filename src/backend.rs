//! The pluggable backend contract.
//!
//! A backend wraps one numerical method behind a uniform "advance one
//! internal step" interface. The driver owns the integration state and hands
//! the backend an explicit starting point on every call; the backend owns
//! only its method-local memory (step-size history, workspaces, counters)
//! and must not retain references to driver-owned state between calls.

use crate::error::BackendError;
use crate::interp::DenseOutput;
use crate::problem::{DaeSystem, OdeSystem};

/// The differential system handed to a backend, in whichever formulation
/// the user provided.
///
/// Explicit backends consume the ODE form and refuse the residual form at
/// `initialize`; implicit backends may accept either.
#[derive(Clone, Copy)]
pub enum Problem<'a, const N: usize> {
    /// Explicit form dy/dt = f(t, y).
    Ode(&'a dyn OdeSystem<N>),
    /// Residual form F(t, y, y') = 0.
    Dae(&'a dyn DaeSystem<N>),
}

impl<'a, const N: usize> Problem<'a, N> {
    /// The explicit right-hand side, if this problem has one.
    pub fn as_ode(self) -> Option<&'a dyn OdeSystem<N>> {
        match self {
            Self::Ode(sys) => Some(sys),
            Self::Dae(_) => None,
        }
    }

    /// The residual form, if this problem has one.
    pub fn as_dae(self) -> Option<&'a dyn DaeSystem<N>> {
        match self {
            Self::Ode(_) => None,
            Self::Dae(sys) => Some(sys),
        }
    }
}

/// Capability flags declared by a backend.
///
/// The driver branches on these flags rather than probing behavior: a
/// backend without dense output is advanced with its target clamped to the
/// next communication point, and a backend with native event handling is
/// still cross-checked by the driver's own localization.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// The method localizes state events itself.
    pub supports_native_events: bool,
    /// Steps carry an interpolant usable at arbitrary interior times.
    pub supports_dense_output: bool,
    /// The method is designed for stiff systems.
    pub is_stiff_solver: bool,
}

/// Cumulative work counters owned by a backend.
///
/// Counters are monotone from `initialize` onward; the driver merges them
/// into the statistics ledger by delta, so a backend never needs to reset
/// them mid-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCounters {
    /// Right-hand-side evaluations
    pub rhs_evals: u64,
    /// Jacobian evaluations
    pub jac_evals: u64,
}

/// How a backend should resume after an event truncation.
///
/// The driver picks the mode explicitly after every truncation: a warm
/// start keeps the method's step-size history, a cold start discards all
/// method memory (required when the event handler modified the state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartMode {
    /// Keep step-size history; the trajectory is continuous.
    Warm,
    /// Discard all method memory; the state was externally modified.
    Cold,
}

/// One internal step produced by a backend.
///
/// Ephemeral: consumed by the driver within the iteration that produced it
/// and never retained across backend calls.
#[derive(Debug, Clone)]
pub struct InternalStep<const N: usize> {
    /// Step start time
    pub t_start: f64,
    /// Step end time (strictly past `t_start` in the integration direction)
    pub t_end: f64,
    /// State at the start of the step
    pub y_start: [f64; N],
    /// State at the end of the step
    pub y_end: [f64; N],
    /// Interpolant over `[t_start, t_end]`
    pub dense: DenseOutput<N>,
}

/// Outcome of a single `advance` call.
#[derive(Debug, Clone)]
pub enum AdvanceOutcome<const N: usize> {
    /// The step passed the backend's error test.
    Step(InternalStep<N>),
    /// The step failed the backend's internal error test.
    ///
    /// The backend has already shrunk its step size; the driver re-invokes
    /// with the same starting point and only counts the rejection.
    Rejected {
        /// Step size of the failed attempt
        h_attempted: f64,
    },
}

/// Error-control tolerances, scalar or per-component.
#[derive(Debug, Clone)]
pub struct Tolerances<const N: usize> {
    /// Absolute tolerance per component
    pub atol: [f64; N],
    /// Relative tolerance per component
    pub rtol: [f64; N],
}

impl<const N: usize> Tolerances<N> {
    /// Uniform tolerances across all components.
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self {
            atol: [atol; N],
            rtol: [rtol; N],
        }
    }

    /// Per-component tolerances.
    pub fn with_components(atol: [f64; N], rtol: [f64; N]) -> Self {
        Self { atol, rtol }
    }
}

impl<const N: usize> Default for Tolerances<N> {
    fn default() -> Self {
        Self::new(1e-9, 1e-6)
    }
}

/// One numerical method behind the uniform stepping contract.
pub trait Backend<const N: usize> {
    /// Human-readable method name for diagnostics.
    fn name(&self) -> &'static str;

    /// Capability flags of this method.
    fn capabilities(&self) -> Capabilities;

    /// Prepare for a fresh run starting at `(t0, y0)`.
    ///
    /// Resets counters and step-size memory, and rejects problem
    /// formulations the method cannot integrate. Called once per run,
    /// before the first `advance`.
    fn initialize(
        &mut self,
        problem: Problem<'_, N>,
        t0: f64,
        y0: &[f64; N],
        tol: &Tolerances<N>,
    ) -> Result<(), BackendError>;

    /// Attempt one internal step from `(t, y)` toward `t_limit`.
    ///
    /// The step must not pass `t_limit`; a backend lands on it exactly when
    /// its own estimate would overshoot. `t_limit` may lie before `t` on the
    /// time axis when integrating backward.
    fn advance(
        &mut self,
        problem: Problem<'_, N>,
        t: f64,
        y: &[f64; N],
        t_limit: f64,
    ) -> Result<AdvanceOutcome<N>, BackendError>;

    /// Resume after an event truncation.
    fn restart(&mut self, mode: RestartMode);

    /// Magnitude of the step the method would attempt next (0 when the
    /// method has not chosen yet). Usable as a warm-restart hint.
    fn step_suggestion(&self) -> f64;

    /// Snapshot of the cumulative work counters.
    fn counters(&self) -> BackendCounters;
}
