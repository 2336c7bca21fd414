//! State-event records and the external event handler contract.
//!
//! The driver evaluates the user's indicator vector at every accepted point.
//! When a component changes sign inside a step, root localization produces
//! an [`EventRecord`] and the external handler decides how integration
//! resumes: unchanged, with a modified state, or not at all.

/// Direction of a zero-crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingDirection {
    /// Indicator went from negative to positive.
    Rising,
    /// Indicator went from positive to negative.
    Falling,
}

/// One detected state event.
///
/// Immutable once created; appended to the run's ordered event sequence.
/// When several components cross at numerically indistinguishable times
/// they are reported together in a single record.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Event time, strictly inside the internal step that contained it
    pub t: f64,
    /// Indices of the indicator components that crossed
    pub components: Vec<usize>,
    /// Crossing direction per component, parallel to `components`
    pub directions: Vec<CrossingDirection>,
}

/// Decision returned by an event handler.
#[derive(Debug, Clone)]
pub enum EventResponse<const N: usize> {
    /// Resume integration from the event point unchanged.
    Continue,
    /// Resume from the event time with a replaced state vector.
    ///
    /// Forces a cold backend restart: method memory is invalid after an
    /// external state change.
    Modify([f64; N]),
    /// Terminate the run at the event point.
    Stop,
}

/// External collaborator notified at every detected event.
pub trait EventHandler<const N: usize> {
    /// Inspect a detected event and decide how integration resumes.
    ///
    /// `y` is the interpolated state at the event time.
    fn on_event(&mut self, record: &EventRecord, y: &[f64; N]) -> EventResponse<N>;
}

/// Did this component arm a crossing between the reference value and the
/// end-of-step value?
///
/// The test is a strict sign product: a component that only touches zero
/// and returns to the same side never arms. An end value of exactly zero
/// does not arm either; the reference keeps its previous nonzero sign so a
/// genuine crossing still arms on the following step.
pub fn crossing_armed(g_ref: f64, g_new: f64) -> bool {
    g_ref * g_new < 0.0
}

/// Direction of the crossing given the reference (pre-crossing) value.
pub fn crossing_direction(g_ref: f64) -> CrossingDirection {
    if g_ref < 0.0 {
        CrossingDirection::Rising
    } else {
        CrossingDirection::Falling
    }
}
