// Newton root finder for the reference-distance equation
//
// Runs Newton's method on f(d) = |s(d)|² − 2·s(d)·p_ref + k_ref − d² from
// each initial guess. When both guesses land on the same root the second
// one is recovered from the deflated function f(d) / (d − r₁).

use crate::config::IterativeConfig;
use crate::error::LocalizationError;
use crate::solver::quadratic::ReducedSystem;

/// Roots closer than this (relative) count as the same root
const SAME_ROOT_TOLERANCE: f64 = 1e-6;

/// Newton iteration on `f` with derivative `df`
///
/// Stops once a step is within `tolerance · (1 + |x|)`, so far roots are
/// not held to an absolute bound below their floating-point spacing.
pub fn newton<F, D>(
    f: F,
    df: D,
    initial: f64,
    max_iterations: usize,
    tolerance: f64,
) -> Result<f64, LocalizationError>
where
    F: Fn(f64) -> f64,
    D: Fn(f64) -> f64,
{
    let mut x = initial;
    for _ in 0..max_iterations {
        let slope = df(x);
        if slope == 0.0 || !slope.is_finite() {
            break;
        }
        let step = f(x) / slope;
        if !step.is_finite() {
            break;
        }
        x -= step;
        if step.abs() <= tolerance * (1.0 + x.abs()) {
            return Ok(x);
        }
    }
    Err(LocalizationError::NoConvergence {
        iterations: max_iterations,
    })
}

/// Find both reference-distance roots numerically
///
/// `leading` is the quadratic coefficient a; the result is ordered like
/// the closed form `[(−b − Δ)/2a, (−b + Δ)/2a]`, i.e. ascending for a > 0
/// and descending for a < 0.
pub fn find_roots(
    system: &ReducedSystem,
    config: &IterativeConfig,
    leading: f64,
) -> Result<[f64; 2], LocalizationError> {
    let f = |d: f64| system.sphere_residual(d);
    let df = |d: f64| system.sphere_residual_derivative(d);
    let [first_guess, second_guess] = config.initial_guesses;

    let first = newton(f, df, first_guess, config.max_iterations, config.tolerance)?;
    let mut second = newton(f, df, second_guess, config.max_iterations, config.tolerance)?;

    if (first - second).abs() <= SAME_ROOT_TOLERANCE * (1.0 + first.abs()) {
        let deflated = |d: f64| f(d) / (d - first);
        let deflated_slope = |d: f64| {
            let offset = d - first;
            (df(d) * offset - f(d)) / (offset * offset)
        };
        // Deflation is singular exactly at the known root
        let start = if second_guess == first {
            second_guess + 1.0
        } else {
            second_guess
        };
        second = newton(
            deflated,
            deflated_slope,
            start,
            config.max_iterations,
            config.tolerance,
        )?;
    }

    let (low, high) = if first <= second {
        (first, second)
    } else {
        (second, first)
    };
    Ok(if leading > 0.0 { [low, high] } else { [high, low] })
}
