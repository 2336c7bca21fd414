//! Dense output over a single internal step.
//!
//! A backend attaches a `DenseOutput` to every step it produces. The driver
//! uses it to evaluate the trajectory at communication points and to compose
//! event indicators with the trajectory during root localization, without
//! re-integrating. Evaluation is pure: the same `t` always yields the same
//! state, and the step endpoints are reproduced exactly.

/// Interpolant over one internal step `[t_start, t_end]`.
#[derive(Debug, Clone)]
pub enum DenseOutput<const N: usize> {
    /// Straight-line interpolation between the step endpoints.
    ///
    /// Used by backends that expose no derivative or stage data. Second-order
    /// accurate in the step size.
    Linear {
        /// Step start time
        t_start: f64,
        /// Step end time
        t_end: f64,
        /// State at the start of the step
        y_start: [f64; N],
        /// State at the end of the step
        y_end: [f64; N],
    },
    /// Cubic Hermite interpolation from endpoint states and derivatives.
    ///
    /// Fourth-order accurate in the step size, which keeps interpolation
    /// error below the integration error for methods of moderate order.
    Hermite {
        /// Step start time
        t_start: f64,
        /// Step end time
        t_end: f64,
        /// State at the start of the step
        y_start: [f64; N],
        /// State at the end of the step
        y_end: [f64; N],
        /// Derivative f(t_start, y_start)
        f_start: [f64; N],
        /// Derivative f(t_end, y_end)
        f_end: [f64; N],
    },
}

impl<const N: usize> DenseOutput<N> {
    /// Start time of the owning step.
    pub fn t_start(&self) -> f64 {
        match self {
            Self::Linear { t_start, .. } | Self::Hermite { t_start, .. } => *t_start,
        }
    }

    /// End time of the owning step.
    pub fn t_end(&self) -> f64 {
        match self {
            Self::Linear { t_end, .. } | Self::Hermite { t_end, .. } => *t_end,
        }
    }

    /// Evaluate the state at time `t` within `[t_start, t_end]`.
    ///
    /// The endpoints are returned exactly, bypassing the interpolation
    /// formula, so emitted values at step boundaries match the backend's
    /// own solution bit for bit.
    pub fn at(&self, t: f64) -> [f64; N] {
        match self {
            Self::Linear {
                t_start,
                t_end,
                y_start,
                y_end,
            } => {
                if t == *t_start {
                    return *y_start;
                }
                if t == *t_end {
                    return *y_end;
                }
                let alpha = (t - t_start) / (t_end - t_start);
                let mut y = [0.0; N];
                for i in 0..N {
                    y[i] = y_start[i] + alpha * (y_end[i] - y_start[i]);
                }
                y
            }
            Self::Hermite {
                t_start,
                t_end,
                y_start,
                y_end,
                f_start,
                f_end,
            } => {
                if t == *t_start {
                    return *y_start;
                }
                if t == *t_end {
                    return *y_end;
                }
                let dt = t_end - t_start;
                let alpha = (t - t_start) / dt;
                let a2 = alpha * alpha;
                let a3 = a2 * alpha;
                // Hermite basis
                let h00 = 1.0 - 3.0 * a2 + 2.0 * a3;
                let h10 = alpha - 2.0 * a2 + a3;
                let h01 = 3.0 * a2 - 2.0 * a3;
                let h11 = -a2 + a3;
                let mut y = [0.0; N];
                for i in 0..N {
                    y[i] = h00 * y_start[i]
                        + h10 * dt * f_start[i]
                        + h01 * y_end[i]
                        + h11 * dt * f_end[i];
                }
                y
            }
        }
    }

    /// Evaluate the state rate dy/dt at time `t`.
    ///
    /// For the linear variant this is the constant secant slope; for the
    /// Hermite variant it is the derivative of the cubic.
    pub fn rate_at(&self, t: f64) -> [f64; N] {
        match self {
            Self::Linear {
                t_start,
                t_end,
                y_start,
                y_end,
            } => {
                let dt = t_end - t_start;
                let mut yd = [0.0; N];
                for i in 0..N {
                    yd[i] = (y_end[i] - y_start[i]) / dt;
                }
                yd
            }
            Self::Hermite {
                t_start,
                t_end,
                y_start,
                y_end,
                f_start,
                f_end,
            } => {
                let dt = t_end - t_start;
                let alpha = (t - t_start) / dt;
                let a2 = alpha * alpha;
                // d/dalpha of the Hermite basis, divided by dt for d/dt
                let dh00 = (-6.0 * alpha + 6.0 * a2) / dt;
                let dh10 = 1.0 - 4.0 * alpha + 3.0 * a2;
                let dh01 = (6.0 * alpha - 6.0 * a2) / dt;
                let dh11 = -2.0 * alpha + 3.0 * a2;
                let mut yd = [0.0; N];
                for i in 0..N {
                    yd[i] = dh00 * y_start[i]
                        + dh10 * f_start[i]
                        + dh01 * y_end[i]
                        + dh11 * f_end[i];
                }
                yd
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hermite_for_cubic() -> DenseOutput<1> {
        // y(t) = t^3 on [1, 2]: a cubic is reproduced exactly by Hermite.
        DenseOutput::Hermite {
            t_start: 1.0,
            t_end: 2.0,
            y_start: [1.0],
            y_end: [8.0],
            f_start: [3.0],
            f_end: [12.0],
        }
    }

    #[test]
    fn hermite_reproduces_cubic_exactly() {
        let dense = hermite_for_cubic();
        for &t in &[1.1, 1.25, 1.5, 1.75, 1.9] {
            assert_relative_eq!(dense.at(t)[0], t * t * t, max_relative = 1e-13);
            assert_relative_eq!(dense.rate_at(t)[0], 3.0 * t * t, max_relative = 1e-12);
        }
    }

    #[test]
    fn endpoints_are_exact() {
        let dense = hermite_for_cubic();
        assert_eq!(dense.at(1.0), [1.0]);
        assert_eq!(dense.at(2.0), [8.0]);

        let linear = DenseOutput::Linear {
            t_start: 0.0,
            t_end: 1.0,
            y_start: [0.3],
            y_end: [0.7],
        };
        assert_eq!(linear.at(0.0), [0.3]);
        assert_eq!(linear.at(1.0), [0.7]);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let dense = hermite_for_cubic();
        let a = dense.at(1.37);
        let b = dense.at(1.37);
        assert_eq!(a, b);
    }

    #[test]
    fn linear_midpoint() {
        let linear = DenseOutput::Linear {
            t_start: 0.0,
            t_end: 2.0,
            y_start: [1.0],
            y_end: [3.0],
        };
        assert_relative_eq!(linear.at(1.0)[0], 2.0);
        assert_relative_eq!(linear.rate_at(0.5)[0], 1.0);
    }
}
