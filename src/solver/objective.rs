// Root selection
//
// The HLS objective scores a candidate by the squared mismatch between the
// delays it implies and the measured ones. The admissibility predicate can
// override the ranking when it separates the two candidates.

use crate::geometry::{Position, ReceiverArray};
use crate::solver::quadratic::implied_tdoas;
use crate::solver::RootPolicy;

/// Residuals closer than this (s², i.e. 1 ps rms) are a tie
pub const RESIDUAL_TIE_TOLERANCE: f64 = 1e-24;

/// Sum of squared TDoA residuals (s²) for one candidate
pub fn hls_residual(array: &ReceiverArray, candidate: &Position, speed_of_sound: f64) -> f64 {
    let measured = array.tdoas();
    implied_tdoas(array, candidate, speed_of_sound)
        .iter()
        .zip(measured.iter())
        .map(|(implied, measured)| (implied - measured).powi(2))
        .sum()
}

/// Index picked by the root policy alone; ties go to index 0
///
/// Two roots that both reproduce the delays exactly differ only by
/// rounding noise in their residuals, so `ResidualBest` treats residuals
/// within [`RESIDUAL_TIE_TOLERANCE`] as equal.
pub fn rank(policy: RootPolicy, distances: &[f64; 2], residuals: &[f64; 2]) -> usize {
    let prefer_second = match policy {
        RootPolicy::Minus => distances[1] < distances[0],
        RootPolicy::Plus => distances[1] > distances[0],
        RootPolicy::ResidualBest => residuals[1] + RESIDUAL_TIE_TOLERANCE < residuals[0],
    };
    usize::from(prefer_second)
}

/// Apply the admissibility override to a ranked choice
pub fn apply_admissibility(ranked: usize, admissible: &[bool; 2]) -> usize {
    match admissible {
        [true, false] => 0,
        [false, true] => 1,
        _ => ranked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_residual_ranking_and_tie() {
        let d = [1.0, 2.0];
        assert_eq!(rank(RootPolicy::ResidualBest, &d, &[0.7, 0.2]), 1);
        assert_eq!(rank(RootPolicy::ResidualBest, &d, &[0.2, 0.7]), 0);
        assert_eq!(rank(RootPolicy::ResidualBest, &d, &[0.5, 0.5]), 0);
    }

    #[test]
    fn test_residuals_at_noise_level_tie() {
        let d = [0.6, 4.3];
        assert_eq!(rank(RootPolicy::ResidualBest, &d, &[2.4e-35, 6.8e-36]), 0);
        assert_eq!(rank(RootPolicy::ResidualBest, &d, &[4e-30, 1e-33]), 0);
        assert_eq!(rank(RootPolicy::ResidualBest, &d, &[8e-6, 1e-33]), 1);
    }

    #[test]
    fn test_distance_policies() {
        let r = [0.0, 1.0];
        assert_eq!(rank(RootPolicy::Minus, &[3.0, -1.0], &r), 1);
        assert_eq!(rank(RootPolicy::Minus, &[-1.0, 3.0], &r), 0);
        assert_eq!(rank(RootPolicy::Plus, &[3.0, -1.0], &r), 0);
        assert_eq!(rank(RootPolicy::Plus, &[-1.0, 3.0], &r), 1);
        assert_eq!(rank(RootPolicy::Plus, &[2.0, 2.0], &r), 0);
    }

    #[test]
    fn test_admissibility_only_overrides_when_it_separates() {
        assert_eq!(apply_admissibility(0, &[false, true]), 1);
        assert_eq!(apply_admissibility(1, &[true, false]), 0);
        assert_eq!(apply_admissibility(1, &[true, true]), 1);
        assert_eq!(apply_admissibility(0, &[false, false]), 0);
    }
}
