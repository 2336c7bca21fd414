//! Root localization for event indicators inside one internal step.
//!
//! [`BrentSolver`] is a bracketed scalar root finder (inverse quadratic /
//! secant with bisection fallback). [`find_first_crossing`] runs it per
//! armed indicator component, composing the indicator with the step's dense
//! output, and reports the earliest crossing in the integration direction.

use crate::events::{crossing_direction, CrossingDirection};
use crate::interp::DenseOutput;
use crate::problem::EventIndicators;

/// Bracketed root finder after Brent.
///
/// Combines inverse quadratic interpolation and the secant method with a
/// bisection fallback, so convergence is superlinear on well-behaved
/// functions and never slower than bisection.
#[derive(Debug, Clone)]
pub struct BrentSolver {
    /// Bracket-width convergence tolerance
    pub tol: f64,
    /// Iteration bound
    pub max_iter: usize,
}

/// Why a bracketed search failed.
#[derive(Debug, Clone)]
pub enum BrentFailure {
    /// The endpoint values do not straddle zero.
    NotBracketed,
    /// The bracket did not shrink below tolerance within the iteration bound.
    NoConvergence {
        /// Best estimate when the bound was hit
        best: f64,
    },
}

impl BrentSolver {
    /// Create a solver with the given bracket tolerance and iteration bound.
    pub fn new(tol: f64, max_iter: usize) -> Self {
        Self { tol, max_iter }
    }

    /// Find the root of `f` in `[a, b]` given precomputed endpoint values.
    ///
    /// Returns the root and the number of iterations used.
    pub fn root<F>(
        &self,
        mut f: F,
        mut a: f64,
        mut b: f64,
        mut fa: f64,
        mut fb: f64,
    ) -> Result<(f64, usize), BrentFailure>
    where
        F: FnMut(f64) -> f64,
    {
        if fa * fb > 0.0 {
            return Err(BrentFailure::NotBracketed);
        }

        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }

        let mut c = a;
        let mut fc = fa;
        let mut bisected = true;
        let mut d = b - a;

        for iter in 0..self.max_iter {
            // Keep b the best guess: |f(a)| >= |f(b)|.
            if fa.abs() < fb.abs() {
                std::mem::swap(&mut a, &mut b);
                std::mem::swap(&mut fa, &mut fb);
            }

            if fb == 0.0 || (b - a).abs() <= self.tol {
                return Ok((b, iter + 1));
            }

            let s = if fa != fc && fb != fc && fa != fb {
                // Inverse quadratic interpolation
                a * fb * fc / ((fa - fb) * (fa - fc))
                    + b * fa * fc / ((fb - fa) * (fb - fc))
                    + c * fa * fb / ((fc - fa) * (fc - fb))
            } else if fb != fa {
                // Secant
                b - fb * (b - a) / (fb - fa)
            } else {
                (a + b) / 2.0
            };

            let mid = (a + b) / 2.0;
            let reject_interpolant = (s - (3.0 * a + b) / 4.0) * (s - b) > 0.0
                || (bisected && (s - b).abs() >= (b - c).abs() / 2.0)
                || (!bisected && (s - b).abs() >= (c - d).abs() / 2.0)
                || (bisected && (b - c).abs() < self.tol)
                || (!bisected && (c - d).abs() < self.tol);

            let s = if reject_interpolant {
                bisected = true;
                mid
            } else {
                bisected = false;
                s
            };

            let fs = f(s);
            d = c;
            c = b;
            fc = fb;

            if fa * fs < 0.0 {
                b = s;
                fb = fs;
            } else {
                a = s;
                fa = fs;
            }
        }

        Err(BrentFailure::NoConvergence { best: b })
    }
}

/// The earliest localized crossing inside one step.
#[derive(Debug, Clone)]
pub struct Crossing {
    /// Crossing time
    pub t: f64,
    /// Indices of the components whose own root lies within tolerance of `t`
    pub components: Vec<usize>,
    /// Crossing direction per component
    pub directions: Vec<CrossingDirection>,
}

/// The bracket in which localization failed to converge.
#[derive(Debug, Clone, Copy)]
pub struct LocalizationFailure {
    /// Lower end of the bracket
    pub t_lo: f64,
    /// Upper end of the bracket
    pub t_hi: f64,
}

/// Locate the earliest indicator crossing inside a step.
///
/// `g_ref` holds the reference values at the last accepted point (nonzero
/// signs preserved across exact-zero touches), `g_start`/`g_end` the actual
/// endpoint evaluations. A component is searched only when its reference
/// sign strictly opposes its end value. When several components cross, the
/// reported time is the minimum of their individual roots in the direction
/// of integration, and every component whose root lies within `tol` of that
/// minimum is named in the result.
///
/// `indicator_evals` is incremented once per indicator-vector evaluation.
#[allow(clippy::too_many_arguments)]
pub fn find_first_crossing<const N: usize>(
    indicators: &dyn EventIndicators<N>,
    dense: &DenseOutput<N>,
    g_ref: &[f64],
    g_start: &[f64],
    g_end: &[f64],
    tol: f64,
    max_iter: usize,
    indicator_evals: &mut u64,
) -> Result<Option<Crossing>, LocalizationFailure> {
    const REBRACKET_SAMPLES: usize = 16;

    let t_a = dense.t_start();
    let t_b = dense.t_end();
    let direction = (t_b - t_a).signum();
    let dim = indicators.dim();
    let brent = BrentSolver::new(tol, max_iter);

    let mut buf = vec![0.0; dim];
    let mut n_evals = 0u64;
    let mut roots: Vec<(usize, f64)> = Vec::new();

    for i in 0..dim {
        if !crate::events::crossing_armed(g_ref[i], g_end[i]) {
            continue;
        }

        let mut eval = |t: f64| {
            let y = dense.at(t);
            indicators.eval(t, &y, &mut buf);
            n_evals += 1;
            buf[i]
        };

        // The actual start value is the bracket endpoint. After an event
        // restart it can sit at zero, or even on the far side of the
        // crossing just handled, while the reference sign opposes the end
        // value; in that case scan the interior for a point carrying the
        // reference sign and bracket the return crossing from there.
        let mut t_lo = t_a;
        let mut fa = g_start[i];
        if fa == 0.0 || fa * g_end[i] > 0.0 {
            let mut rebracketed = false;
            for j in 1..REBRACKET_SAMPLES {
                let t_j = t_a + (t_b - t_a) * (j as f64) / (REBRACKET_SAMPLES as f64);
                let g_j = eval(t_j);
                if g_j * g_ref[i] > 0.0 {
                    t_lo = t_j;
                    fa = g_j;
                    rebracketed = true;
                    break;
                }
            }
            if !rebracketed {
                // No interior point resolves the reference sign; keep the
                // original endpoint with an infinitesimal value on the
                // reference side so the bracket stays strict.
                fa = g_ref[i].signum() * f64::MIN_POSITIVE;
            }
        }

        let root = match brent.root(&mut eval, t_lo, t_b, fa, g_end[i]) {
            Ok((root, _)) => root,
            Err(_) => {
                *indicator_evals += n_evals;
                return Err(LocalizationFailure { t_lo: t_a, t_hi: t_b });
            }
        };
        roots.push((i, root));
    }

    *indicator_evals += n_evals;

    if roots.is_empty() {
        return Ok(None);
    }

    // Earliest root in the direction of integration.
    let mut t_first = roots[0].1;
    for &(_, t) in &roots[1..] {
        if (t - t_first) * direction < 0.0 {
            t_first = t;
        }
    }

    let mut components = Vec::new();
    let mut directions = Vec::new();
    for &(i, t) in &roots {
        if (t - t_first).abs() <= tol {
            components.push(i);
            directions.push(crossing_direction(g_ref[i]));
        }
    }

    Ok(Some(Crossing {
        t: t_first,
        components,
        directions,
    }))
}
