// Pipeline module - one localization cycle end to end
//
// Localizer owns the receiver array, the solver and the delay estimation
// state. A cycle takes delays (given, simulated, or estimated with
// GCC-PHAT from four sample windows), writes them into the array and runs
// the solver.
//
// Module organization:
// - mod.rs: Localizer and per-cycle results
// - stream: chunked ingestion, event segmentation and streaming driver

pub mod stream;

use crate::config::AppConfig;
use crate::dsp::{
    DelayEstimate, DelayEstimator, DelayUnit, ReferenceInput, ReferenceSpectrum, SpectralTransform,
};
use crate::error::{log_localization_error, LocalizationError};
use crate::geometry::{Position, ReceiverArray, RECEIVER_COUNT};
use crate::simulation::SimulationContext;
use crate::solver::{MultilaterationSolver, SolverResult};

/// Outcome of one localization cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Localization {
    /// Sequence number of the cycle, starting at 1
    pub cycle: u64,
    /// Delays used, ascending non-reference receiver order (seconds)
    pub tdoas: [f64; RECEIVER_COUNT - 1],
    /// Peak-to-mean ratio of each correlation, when delays were estimated
    pub delay_confidence: Option<[f64; RECEIVER_COUNT - 1]>,
    pub result: SolverResult,
}

impl Localization {
    pub fn position(&self) -> Position {
        self.result.chosen()
    }
}

#[derive(Debug)]
pub struct Localizer {
    array: ReceiverArray,
    solver: MultilaterationSolver,
    transform: SpectralTransform,
    estimator: DelayEstimator,
    parallel_channels: bool,
    cycles: u64,
}

impl Localizer {
    pub fn new(config: &AppConfig) -> Result<Self, LocalizationError> {
        config.validate()?;

        let array = ReceiverArray::from_config(&config.array, config.detector.buffer_capacity)?;
        let solver = MultilaterationSolver::new(config.solver.clone())?;
        let transform = SpectralTransform::new(config.delay.fft_size, config.delay.sample_rate)?;
        let estimator = DelayEstimator::new(
            config.delay.phase_transform,
            config.delay.interpolation_factor,
            DelayUnit::Seconds,
        )?;

        tracing::info!(
            "[Localizer] Ready: reference={}, fft_size={}, sample_rate={} Hz, mode={:?}",
            array.reference_index(),
            transform.size(),
            transform.sampling_rate(),
            solver.config().mode
        );

        Ok(Self {
            array,
            solver,
            transform,
            estimator,
            parallel_channels: config.delay.parallel_channels,
            cycles: 0,
        })
    }

    /// Install a predicate that vetoes physically impossible roots
    pub fn with_admissibility<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Position) -> bool + Send + Sync + 'static,
    {
        self.solver.set_admissibility(Some(Box::new(predicate)));
        self
    }

    pub fn array(&self) -> &ReceiverArray {
        &self.array
    }

    pub fn array_mut(&mut self) -> &mut ReceiverArray {
        &mut self.array
    }

    pub fn solver(&self) -> &MultilaterationSolver {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut MultilaterationSolver {
        &mut self.solver
    }

    pub fn transform(&self) -> &SpectralTransform {
        &self.transform
    }

    pub fn estimator(&self) -> &DelayEstimator {
        &self.estimator
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Localize from delays measured elsewhere
    pub fn locate_from_tdoa(
        &mut self,
        tdoas: [f64; RECEIVER_COUNT - 1],
    ) -> Result<Localization, LocalizationError> {
        self.array.set_tdoas(&tdoas);
        self.solve(None, "Localizer::locate_from_tdoa")
    }

    /// Localize the source of a simulation run
    pub fn simulate(&mut self, context: &SimulationContext) -> Result<Localization, LocalizationError> {
        let tdoas = context.apply(&mut self.array);
        tracing::debug!(
            "[Localizer] Simulated source {:?}: tdoas={:?}",
            context.source,
            tdoas
        );
        self.solve(None, "Localizer::simulate")
    }

    /// Estimate delays from one window per receiver and localize
    pub fn locate_from_buffers(
        &mut self,
        buffers: [&[f64]; RECEIVER_COUNT],
    ) -> Result<Localization, LocalizationError> {
        let (tdoas, confidence) = match self.estimate_tdoas(buffers) {
            Ok(estimates) => estimates,
            Err(err) => {
                log_localization_error(&err, "Localizer::locate_from_buffers");
                return Err(err);
            }
        };
        self.array.set_tdoas(&tdoas);
        self.solve(Some(confidence), "Localizer::locate_from_buffers")
    }

    /// Localize from the receivers' own rings, window `[start, start + fft_size)`
    pub fn locate_window(&mut self, start: u64) -> Result<Localization, LocalizationError> {
        let size = self.transform.size();
        let end = start + size as u64;
        let windows: Vec<Vec<f64>> = self
            .array
            .receivers()
            .iter()
            .map(|receiver| receiver.buffer().range(start, end))
            .collect();

        if let Some(short) = windows.iter().find(|w| w.len() != size) {
            let err = LocalizationError::InvalidSignalLength {
                expected: size,
                actual: short.len(),
            };
            log_localization_error(&err, "Localizer::locate_window");
            return Err(err);
        }

        let buffers: [&[f64]; RECEIVER_COUNT] = std::array::from_fn(|i| windows[i].as_slice());
        self.locate_from_buffers(buffers)
    }

    /// GCC-PHAT delay of every non-reference window against the reference
    ///
    /// The reference spectrum is computed once and shared by the three
    /// estimates. With `parallel_channels` each estimate runs on its own
    /// scoped thread.
    pub fn estimate_tdoas(
        &self,
        buffers: [&[f64]; RECEIVER_COUNT],
    ) -> Result<([f64; RECEIVER_COUNT - 1], [f64; RECEIVER_COUNT - 1]), LocalizationError> {
        let reference = ReferenceSpectrum::new(&self.transform, buffers[self.array.reference_index()])?;
        let indices: Vec<usize> = self.array.non_reference_indices().collect();
        let transform = &self.transform;
        let estimator = self.estimator;
        let reference = &reference;

        let estimates: Vec<Result<DelayEstimate, LocalizationError>> = if self.parallel_channels {
            std::thread::scope(|scope| {
                let handles: Vec<_> = indices
                    .iter()
                    .map(|&index| {
                        let input = buffers[index];
                        scope.spawn(move || {
                            estimator.estimate(transform, input, ReferenceInput::Spectrum(reference))
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(join_worker)
                    .collect()
            })
        } else {
            indices
                .iter()
                .map(|&index| {
                    estimator.estimate(transform, buffers[index], ReferenceInput::Spectrum(reference))
                })
                .collect()
        };

        let mut tdoas = [0.0; RECEIVER_COUNT - 1];
        let mut confidence = [0.0; RECEIVER_COUNT - 1];
        for (slot, estimate) in estimates.into_iter().enumerate() {
            let estimate = estimate?;
            tdoas[slot] = estimate.delay;
            confidence[slot] = estimate.peak_ratio();
        }
        Ok((tdoas, confidence))
    }

    /// Replace receiver positions and reference; effective from the next cycle
    pub fn update_receiver_positions(
        &mut self,
        positions: &[Position],
        reference_index: usize,
    ) -> Result<(), LocalizationError> {
        self.array
            .update_receiver_positions(positions, reference_index)
            .map_err(|err| {
                log_localization_error(&err, "Localizer::update_receiver_positions");
                err
            })?;
        tracing::info!(
            "[Localizer] Receiver positions updated ({} given), reference={}",
            positions.len(),
            reference_index
        );
        Ok(())
    }

    pub fn set_reference_index(&mut self, reference_index: usize) -> Result<(), LocalizationError> {
        self.array
            .set_reference_index(reference_index)
            .map_err(|err| {
                log_localization_error(&err, "Localizer::set_reference_index");
                err
            })
    }

    /// Root not chosen in the last successful cycle
    pub fn other_solution(&self) -> Option<Position> {
        self.solver.other_solution()
    }

    fn solve(
        &mut self,
        delay_confidence: Option<[f64; RECEIVER_COUNT - 1]>,
        context: &str,
    ) -> Result<Localization, LocalizationError> {
        let result = match self.solver.calculate(&mut self.array) {
            Ok(result) => result,
            Err(err) => {
                log_localization_error(&err, context);
                return Err(err);
            }
        };
        self.cycles += 1;

        let position = result.chosen();
        tracing::debug!(
            "[Localizer] Cycle {}: chosen root {} at ({:.3}, {:.3}, {:.3}), residuals={:?}",
            self.cycles,
            result.chosen_index,
            position.x,
            position.y,
            position.z,
            result.residuals
        );

        Ok(Localization {
            cycle: self.cycles,
            tdoas: self.array.tdoas(),
            delay_confidence,
            result,
        })
    }
}

/// Join a scoped worker, re-raising its panic on the calling thread
fn join_worker<T>(handle: std::thread::ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}
