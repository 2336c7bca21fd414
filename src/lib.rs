//! # odespan: event-aware driver for ODE/DAE integration backends
//!
//! A generic time-stepping layer that drives pluggable numerical
//! integration backends under one uniform contract, producing a
//! continuous, event-aware trajectory from a discrete sequence of
//! internal solver steps.
//!
//! ## What it does
//!
//! - Advances an integration from one communication point to the next,
//!   tolerating internal-step sizes that differ from the requested output
//!   grid (dense output bridges the gap)
//! - Detects user-declared state events (scalar indicator functions
//!   crossing zero) and localizes the earliest crossing inside a step with
//!   a bracketed Brent search, then restarts the backend cleanly
//! - Keeps step counts, evaluation counts, rejections, and event counts
//!   consistent across rejections, truncations, and restarts
//!
//! ## Basic usage
//!
//! ```rust
//! use odespan::{Driver, OdeSystem, OutputPlan, Rkf78Backend, Tolerances};
//!
//! // Linear test equation y' = -y
//! struct Decay;
//!
//! impl OdeSystem<1> for Decay {
//!     fn rhs(&self, _t: f64, y: &[f64; 1], dydt: &mut [f64; 1]) {
//!         dydt[0] = -y[0];
//!     }
//! }
//!
//! let mut driver = Driver::new(Rkf78Backend::<1>::new());
//! let plan = OutputPlan::Span { horizon: 2.0, points: 20 };
//! let tol = Tolerances::new(1e-10, 1e-10);
//!
//! let trajectory = driver.run(&Decay, 0.0, &[1.0], &plan, &tol).unwrap();
//! assert!((trajectory.states.last().unwrap()[0] - (-2.0f64).exp()).abs() < 1e-8);
//! ```
//!
//! ## Event detection
//!
//! Declare an indicator vector and attach it (with an optional handler)
//! through [`Hooks`]:
//!
//! ```rust
//! use odespan::{
//!     Driver, EventIndicators, Hooks, OdeSystem, OutputPlan, Rkf78Backend, Tolerances,
//! };
//!
//! struct Decay;
//! impl OdeSystem<1> for Decay {
//!     fn rhs(&self, _t: f64, y: &[f64; 1], dydt: &mut [f64; 1]) {
//!         dydt[0] = -y[0];
//!     }
//! }
//!
//! // Fires when y decays through 1/2.
//! struct HalfLife;
//! impl EventIndicators<1> for HalfLife {
//!     fn dim(&self) -> usize {
//!         1
//!     }
//!     fn eval(&self, _t: f64, y: &[f64; 1], g: &mut [f64]) {
//!         g[0] = y[0] - 0.5;
//!     }
//! }
//!
//! let mut driver = Driver::new(Rkf78Backend::<1>::new());
//! let plan = OutputPlan::Span { horizon: 2.0, points: 10 };
//! let tol = Tolerances::new(1e-12, 1e-12);
//!
//! let hooks = Hooks {
//!     indicators: Some(&HalfLife),
//!     ..Hooks::default()
//! };
//! let trajectory = driver
//!     .run_with(&Decay, 0.0, &[1.0], &plan, &tol, hooks)
//!     .unwrap();
//!
//! let event = &trajectory.events[0];
//! assert!((event.t - std::f64::consts::LN_2).abs() < 1e-8);
//! ```
//!
//! ## Architecture
//!
//! The numerical method lives behind the [`Backend`] trait: one
//! implementation per method, each declaring its capabilities explicitly
//! (dense output, native event handling, stiffness). Problems reach the
//! backend through [`Problem`], in explicit ODE form or DAE residual form;
//! each backend decides at initialization which formulations it accepts.
//! The driver owns the integration state and the statistics ledger;
//! backends own only their method-local memory. [`Rkf78Backend`]
//! (Runge-Kutta-Fehlberg 7(8)) ships as the built-in reference backend.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod backend;
pub mod driver;
pub mod error;
pub mod events;
pub mod interp;
pub mod problem;
pub mod rkf;
pub mod rootfind;
pub mod stats;
pub mod tableau;

pub use backend::{
    AdvanceOutcome, Backend, BackendCounters, Capabilities, InternalStep, Problem, RestartMode,
    Tolerances,
};
pub use driver::{
    Driver, DriverConfig, Hooks, OutputPlan, RunStatus, SinkAction, StreamSink, Trajectory,
};
pub use error::{BackendError, DriverError};
pub use events::{CrossingDirection, EventHandler, EventRecord, EventResponse};
pub use interp::DenseOutput;
pub use problem::{DaeSystem, EventIndicators, OdeSystem};
pub use rkf::Rkf78Backend;
pub use rootfind::{BrentSolver, Crossing};
pub use stats::StatisticsLedger;
