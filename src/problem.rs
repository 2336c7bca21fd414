//! User-facing problem description traits.
//!
//! A problem supplies the right-hand side of the differential system and,
//! optionally, a Jacobian and a vector of event indicators. Backends consume
//! these traits through dynamic dispatch so that a single problem definition
//! can drive any numerical method.

/// System of ordinary differential equations: dy/dt = f(t, y)
pub trait OdeSystem<const N: usize> {
    /// Evaluate the right-hand side of the ODE system
    ///
    /// # Arguments
    /// * `t` - Current time
    /// * `y` - Current state vector
    /// * `dydt` - Output: derivative dy/dt
    fn rhs(&self, t: f64, y: &[f64; N], dydt: &mut [f64; N]);

    /// Evaluate the Jacobian df/dy at `(t, y)`.
    ///
    /// The default implementation uses forward finite differences and costs
    /// N + 1 right-hand-side evaluations. Stiff backends that need the
    /// Jacobian frequently should override this with an analytic form.
    fn jacobian(&self, t: f64, y: &[f64; N], jac: &mut [[f64; N]; N]) {
        let mut f0 = [0.0; N];
        let mut f1 = [0.0; N];
        let mut yp = *y;
        self.rhs(t, y, &mut f0);
        for j in 0..N {
            let h = 1e-8 * (1.0 + y[j].abs());
            yp[j] = y[j] + h;
            self.rhs(t, &yp, &mut f1);
            yp[j] = y[j];
            for i in 0..N {
                jac[i][j] = (f1[i] - f0[i]) / h;
            }
        }
    }
}

/// Differential-algebraic system in residual form: F(t, y, y') = 0
///
/// Implicit backends solve for `y` and `yd` such that the residual vanishes.
/// Explicit backends ignore this trait entirely.
pub trait DaeSystem<const N: usize> {
    /// Evaluate the residual `r = F(t, y, yd)`.
    fn residual(&self, t: f64, y: &[f64; N], yd: &[f64; N], r: &mut [f64; N]);
}

/// Vector of scalar event-indicator functions monitored during integration.
///
/// Each component is a scalar function of time and state whose zero-crossing
/// marks a state event. Only the sign of a component is significant; its
/// magnitude is not.
pub trait EventIndicators<const N: usize> {
    /// Number of indicator components.
    fn dim(&self) -> usize;

    /// Evaluate all indicator components at `(t, y)` into `g`.
    ///
    /// `g` has length `dim()`.
    fn eval(&self, t: f64, y: &[f64; N], g: &mut [f64]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Decay {
        rate: f64,
    }

    impl OdeSystem<1> for Decay {
        fn rhs(&self, _t: f64, y: &[f64; 1], dydt: &mut [f64; 1]) {
            dydt[0] = -self.rate * y[0];
        }
    }

    #[test]
    fn finite_difference_jacobian_matches_analytic() {
        let sys = Decay { rate: 3.0 };
        let mut jac = [[0.0; 1]; 1];
        sys.jacobian(0.0, &[2.0], &mut jac);
        assert_relative_eq!(jac[0][0], -3.0, max_relative = 1e-6);
    }

    struct Coupled;

    impl OdeSystem<2> for Coupled {
        fn rhs(&self, _t: f64, y: &[f64; 2], dydt: &mut [f64; 2]) {
            dydt[0] = y[1];
            dydt[1] = -4.0 * y[0];
        }
    }

    struct ImplicitDecay;

    // F(t, y, y') = y' + y = 0, the residual form of y' = -y.
    impl DaeSystem<1> for ImplicitDecay {
        fn residual(&self, _t: f64, y: &[f64; 1], yd: &[f64; 1], r: &mut [f64; 1]) {
            r[0] = yd[0] + y[0];
        }
    }

    #[test]
    fn residual_vanishes_on_the_analytic_solution() {
        let sys = ImplicitDecay;
        let mut r = [f64::NAN];
        let y = (-0.7f64).exp();
        sys.residual(0.7, &[y], &[-y], &mut r);
        assert_relative_eq!(r[0], 0.0);
    }

    #[test]
    fn finite_difference_jacobian_off_diagonal() {
        let sys = Coupled;
        let mut jac = [[0.0; 2]; 2];
        sys.jacobian(0.0, &[1.0, 0.5], &mut jac);
        assert_relative_eq!(jac[0][1], 1.0, max_relative = 1e-6);
        assert_relative_eq!(jac[1][0], -4.0, max_relative = 1e-6);
        assert_relative_eq!(jac[0][0], 0.0, epsilon = 1e-6);
    }
}
