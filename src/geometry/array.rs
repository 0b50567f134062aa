// ReceiverArray - four receivers plus the linear-algebra constants the
// solver needs every cycle
//
// Derived constants:
//   C      = [p_i - p_ref] for the three non-reference receivers (3x3, rows)
//   inv_c  = -C⁻¹
//   k_ref  = |p_ref|²
//
// Reference changes re-derive the constants immediately. Position updates
// only mark them stale; the solver refreshes them at the start of the next
// cycle.

use nalgebra::Matrix3;

use crate::config::ArrayConfig;
use crate::error::LocalizationError;
use crate::geometry::receiver::{Receiver, DEFAULT_BUFFER_CAPACITY};
use crate::geometry::{Position, RECEIVER_COUNT};

/// Relative determinant below which the geometry counts as singular
const SINGULARITY_TOLERANCE: f64 = 1e-9;

/// Constants derived from the geometry and reference choice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayConstants {
    /// Negated inverse of the relative-position matrix
    pub inv_c: Matrix3<f64>,
    /// Squared norm of the reference position
    pub k_ref: f64,
    pub ref_position: Position,
}

impl ArrayConstants {
    fn derive(
        receivers: &[Receiver; RECEIVER_COUNT],
        reference_index: usize,
    ) -> Result<Self, LocalizationError> {
        let ref_position = *receivers[reference_index].position();
        let rows: Vec<_> = receivers
            .iter()
            .filter(|rec| rec.id() != reference_index)
            .map(|rec| (rec.position() - ref_position).transpose())
            .collect();
        let c = Matrix3::from_rows(&rows);

        // Hadamard bound: |det C| <= product of row norms
        let scale: f64 = rows.iter().map(|row| row.norm()).product();
        let det = c.determinant();
        if scale == 0.0 || det.abs() <= SINGULARITY_TOLERANCE * scale {
            return Err(LocalizationError::degenerate(format!(
                "relative-position matrix is singular (det = {:e}); receivers must not be coplanar",
                det
            )));
        }

        let inverse = c.try_inverse().ok_or_else(|| {
            LocalizationError::degenerate("relative-position matrix cannot be inverted")
        })?;

        Ok(Self {
            inv_c: -inverse,
            k_ref: ref_position.norm_squared(),
            ref_position,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReceiverArray {
    receivers: [Receiver; RECEIVER_COUNT],
    reference_index: usize,
    constants: ArrayConstants,
    stale: bool,
}

fn check_index(index: usize) -> Result<(), LocalizationError> {
    if index >= RECEIVER_COUNT {
        return Err(LocalizationError::invalid_input(format!(
            "receiver index {} out of range [0, {}]",
            index,
            RECEIVER_COUNT - 1
        )));
    }
    Ok(())
}

impl ReceiverArray {
    /// Build an array, failing with `DegenerateGeometry` for singular layouts
    pub fn new(
        positions: [Position; RECEIVER_COUNT],
        reference_index: usize,
    ) -> Result<Self, LocalizationError> {
        Self::with_buffer_capacity(positions, reference_index, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_buffer_capacity(
        positions: [Position; RECEIVER_COUNT],
        reference_index: usize,
        buffer_capacity: usize,
    ) -> Result<Self, LocalizationError> {
        check_index(reference_index)?;
        if buffer_capacity == 0 {
            return Err(LocalizationError::invalid_input(
                "receiver buffer capacity must be greater than 0",
            ));
        }

        let mut receivers: [Receiver; RECEIVER_COUNT] = std::array::from_fn(|i| {
            Receiver::with_buffer_capacity(i, positions[i], buffer_capacity)
        });
        receivers[reference_index].set_reference(true);
        let constants = ArrayConstants::derive(&receivers, reference_index)?;

        Ok(Self {
            receivers,
            reference_index,
            constants,
            stale: false,
        })
    }

    pub fn from_config(
        config: &ArrayConfig,
        buffer_capacity: usize,
    ) -> Result<Self, LocalizationError> {
        Self::with_buffer_capacity(
            config.receiver_positions(),
            config.reference_index,
            buffer_capacity,
        )
    }

    pub fn receivers(&self) -> &[Receiver; RECEIVER_COUNT] {
        &self.receivers
    }

    pub fn receivers_mut(&mut self) -> &mut [Receiver; RECEIVER_COUNT] {
        &mut self.receivers
    }

    pub fn receiver(&self, index: usize) -> Option<&Receiver> {
        self.receivers.get(index)
    }

    pub fn reference_index(&self) -> usize {
        self.reference_index
    }

    pub fn reference(&self) -> &Receiver {
        &self.receivers[self.reference_index]
    }

    /// Indices of the three non-reference receivers, ascending
    pub fn non_reference_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..RECEIVER_COUNT).filter(move |&i| i != self.reference_index)
    }

    pub fn positions(&self) -> [Position; RECEIVER_COUNT] {
        std::array::from_fn(|i| *self.receivers[i].position())
    }

    /// Make receiver `index` the reference and re-derive the constants
    pub fn set_reference_index(&mut self, index: usize) -> Result<(), LocalizationError> {
        check_index(index)?;
        let constants = ArrayConstants::derive(&self.receivers, index)?;

        self.receivers[self.reference_index].set_reference(false);
        self.receivers[index].set_reference(true);
        self.receivers[index].tdoa = 0.0;
        self.reference_index = index;
        self.constants = constants;
        self.stale = false;
        Ok(())
    }

    /// Move one receiver; the constants are refreshed on the next cycle
    pub fn set_position(&mut self, index: usize, position: Position) -> Result<(), LocalizationError> {
        check_index(index)?;
        self.receivers[index].set_position(position);
        self.stale = true;
        Ok(())
    }

    /// Replace the leading receiver positions and select a reference
    ///
    /// Fewer than four positions update only the first receivers; more
    /// than four is rejected before anything changes.
    pub fn update_receiver_positions(
        &mut self,
        positions: &[Position],
        reference_index: usize,
    ) -> Result<(), LocalizationError> {
        if positions.len() > RECEIVER_COUNT {
            return Err(LocalizationError::invalid_input(format!(
                "at most {} receiver positions allowed (got {})",
                RECEIVER_COUNT,
                positions.len()
            )));
        }
        check_index(reference_index)?;

        for (index, position) in positions.iter().enumerate() {
            self.set_position(index, *position)?;
        }
        self.set_reference_index(reference_index)
    }

    /// Write this cycle's delays for the non-reference receivers
    ///
    /// `tdoas` are in ascending receiver order, skipping the reference.
    pub fn set_tdoas(&mut self, tdoas: &[f64; RECEIVER_COUNT - 1]) {
        let reference_index = self.reference_index;
        let targets = self
            .receivers
            .iter_mut()
            .filter(|rec| rec.id() != reference_index);
        for (receiver, &tdoa) in targets.zip(tdoas.iter()) {
            receiver.tdoa = tdoa;
        }
        self.receivers[reference_index].tdoa = 0.0;
    }

    /// Current delays of the non-reference receivers, ascending order
    pub fn tdoas(&self) -> [f64; RECEIVER_COUNT - 1] {
        let mut out = [0.0; RECEIVER_COUNT - 1];
        for (slot, idx) in out.iter_mut().zip(self.non_reference_indices()) {
            *slot = self.receivers[idx].tdoa;
        }
        out
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Derived constants as of the last refresh (may be stale)
    pub fn constants(&self) -> &ArrayConstants {
        &self.constants
    }

    /// Re-derive the constants if a position changed since the last refresh
    pub fn refresh_constants(&mut self) -> Result<&ArrayConstants, LocalizationError> {
        if self.stale {
            self.constants = ArrayConstants::derive(&self.receivers, self.reference_index)?;
            self.stale = false;
        }
        Ok(&self.constants)
    }
}
