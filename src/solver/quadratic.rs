// Reduction of the multilateration equations to one unknown
//
// With d = |p_ref - s| the linearized system gives s(d) = N·d + M. Putting
// s(d) back into the reference sphere equation leaves a·d² + b·d + c = 0.

use nalgebra::Vector3;

use crate::error::LocalizationError;
use crate::geometry::{Position, ReceiverArray, RECEIVER_COUNT};
use crate::solver::DiscriminantPolicy;

/// Leading coefficient magnitude treated as zero
pub const LEADING_COEFFICIENT_TOLERANCE: f64 = 1e-12;

/// Source position as an affine function of the reference distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReducedSystem {
    pub n: Vector3<f64>,
    pub m: Vector3<f64>,
    pub ref_position: Position,
    pub k_ref: f64,
}

impl ReducedSystem {
    /// Build N and M from the array constants and the delays in the array
    ///
    /// The array constants must be fresh; the solver refreshes them first.
    pub fn from_array(array: &ReceiverArray, speed_of_sound: f64) -> Self {
        let constants = array.constants();
        let k_ref = constants.k_ref;

        let mut d = Vector3::<f64>::zeros();
        let mut r = Vector3::<f64>::zeros();
        for (row, index) in array.non_reference_indices().enumerate() {
            let receiver = &array.receivers()[index];
            let distance = receiver.tdoa * speed_of_sound;
            d[row] = distance;
            r[row] = 0.5 * (distance * distance - receiver.k() + k_ref);
        }

        Self {
            n: constants.inv_c * d,
            m: constants.inv_c * r,
            ref_position: constants.ref_position,
            k_ref,
        }
    }

    /// s(d) = N·d + M
    pub fn position_at(&self, distance: f64) -> Position {
        self.n * distance + self.m
    }

    /// |s(d)|² − 2·s(d)·p_ref + k_ref − d², zero at a consistent distance
    pub fn sphere_residual(&self, distance: f64) -> f64 {
        let pos = self.position_at(distance);
        pos.norm_squared() - 2.0 * pos.dot(&self.ref_position) + self.k_ref - distance * distance
    }

    pub fn sphere_residual_derivative(&self, distance: f64) -> f64 {
        let pos = self.position_at(distance);
        2.0 * pos.dot(&self.n) - 2.0 * self.n.dot(&self.ref_position) - 2.0 * distance
    }

    pub fn quadratic(&self) -> Quadratic {
        Quadratic {
            a: self.n.dot(&self.n) - 1.0,
            b: 2.0 * (self.n.dot(&self.m) - self.n.dot(&self.ref_position)),
            c: -2.0 * self.ref_position.dot(&self.m) + self.m.dot(&self.m) + self.k_ref,
        }
    }
}

/// a·d² + b·d + c = 0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadratic {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Quadratic {
    pub fn discriminant(&self) -> f64 {
        self.b * self.b - 4.0 * self.a * self.c
    }

    pub fn check_leading(&self) -> Result<(), LocalizationError> {
        if !self.a.is_finite() || self.a.abs() < LEADING_COEFFICIENT_TOLERANCE {
            return Err(LocalizationError::degenerate(format!(
                "quadratic leading coefficient vanishes (a = {:e})",
                self.a
            )));
        }
        Ok(())
    }

    /// Both roots as `[(−b − Δ)/2a, (−b + Δ)/2a]`
    pub fn roots(&self, policy: DiscriminantPolicy) -> Result<[f64; 2], LocalizationError> {
        self.check_leading()?;

        let discriminant = self.discriminant();
        let delta = match policy {
            DiscriminantPolicy::Absolute => discriminant.abs().sqrt(),
            DiscriminantPolicy::ClampToZero => discriminant.max(0.0).sqrt(),
            DiscriminantPolicy::Reject => {
                if discriminant < 0.0 {
                    return Err(LocalizationError::NoRealSolution { discriminant });
                }
                discriminant.sqrt()
            }
        };

        let denom = 2.0 * self.a;
        Ok([(-self.b - delta) / denom, (-self.b + delta) / denom])
    }
}

/// Delays the given source would produce, in ascending non-reference order
pub fn implied_tdoas(
    array: &ReceiverArray,
    source: &Position,
    speed_of_sound: f64,
) -> [f64; RECEIVER_COUNT - 1] {
    let reference_distance = array.reference().distance_to(source);
    let mut out = [0.0; RECEIVER_COUNT - 1];
    for (slot, index) in out.iter_mut().zip(array.non_reference_indices()) {
        let distance = array.receivers()[index].distance_to(source);
        *slot = (distance - reference_distance) / speed_of_sound;
    }
    out
}
