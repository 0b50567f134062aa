// Solver module - closed-form and iterative TDoA multilateration
//
// Module organization:
// - quadratic: reduction of the system to a·d² + b·d + c = 0
// - iterative: Newton root finder used by SolverMode::Iterative
// - objective: HLS residuals and root selection
//
// One call to `calculate` is one cycle:
//   Idle → ConstantsReady → RootsComputed → RootSelected → Idle
// The solver is back in Idle when `calculate` returns, success or not.

pub mod iterative;
pub mod objective;
pub mod quadratic;


use serde::{Deserialize, Serialize};

use crate::config::SolverConfig;
use crate::error::LocalizationError;
use crate::geometry::{Position, ReceiverArray};
use quadratic::ReducedSystem;

/// How the two reference-distance roots are found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMode {
    ClosedForm,
    Iterative,
}

/// Which root becomes the reported position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootPolicy {
    /// Smaller reference distance
    Minus,
    /// Larger reference distance
    Plus,
    /// Lower HLS residual against the measured delays
    ResidualBest,
}

/// Handling of a negative `b² − 4ac`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminantPolicy {
    /// `sqrt(|b² − 4ac|)`
    Absolute,
    /// `sqrt(max(0, b² − 4ac))`, i.e. both roots collapse to `−b/2a`
    ClampToZero,
    /// Fail with `NoRealSolution`
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Idle,
    ConstantsReady,
    RootsComputed,
    RootSelected,
}

/// Optional physical plausibility check on a candidate position
pub type AdmissibilityPredicate = Box<dyn Fn(&Position) -> bool + Send + Sync>;

/// Outcome of one solver cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverResult {
    /// Candidate positions in closed-form root order
    pub candidates: [Position; 2],
    /// Reference-to-source distance of each candidate
    pub distances: [f64; 2],
    /// HLS residual of each candidate (s²)
    pub residuals: [f64; 2],
    pub chosen_index: usize,
    /// Predicate verdicts, when a predicate is installed
    pub admissible: Option<[bool; 2]>,
    /// `b² − 4ac` before the discriminant policy (closed-form mode)
    pub discriminant: f64,
}

impl SolverResult {
    pub fn chosen(&self) -> Position {
        self.candidates[self.chosen_index]
    }

    pub fn alternate(&self) -> Position {
        self.candidates[1 - self.chosen_index]
    }
}

pub struct MultilaterationSolver {
    config: SolverConfig,
    predicate: Option<AdmissibilityPredicate>,
    state: SolverState,
    last_result: Option<SolverResult>,
}

impl std::fmt::Debug for MultilaterationSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultilaterationSolver")
            .field("config", &self.config)
            .field("has_predicate", &self.predicate.is_some())
            .field("state", &self.state)
            .field("last_result", &self.last_result)
            .finish()
    }
}

impl Default for MultilaterationSolver {
    fn default() -> Self {
        Self {
            config: SolverConfig::default(),
            predicate: None,
            state: SolverState::Idle,
            last_result: None,
        }
    }
}

impl MultilaterationSolver {
    pub fn new(config: SolverConfig) -> Result<Self, LocalizationError> {
        check_speed(config.speed_of_sound)?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Install an admissibility predicate (builder form)
    pub fn with_admissibility<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Position) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub fn set_admissibility(&mut self, predicate: Option<AdmissibilityPredicate>) {
        self.predicate = predicate;
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_speed_of_sound(&mut self, speed_of_sound: f64) -> Result<(), LocalizationError> {
        check_speed(speed_of_sound)?;
        self.config.speed_of_sound = speed_of_sound;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: SolverMode) {
        self.config.mode = mode;
    }

    pub fn set_root_policy(&mut self, policy: RootPolicy) {
        self.config.root_policy = policy;
    }

    pub fn set_discriminant_policy(&mut self, policy: DiscriminantPolicy) {
        self.config.discriminant_policy = policy;
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn last_result(&self) -> Option<&SolverResult> {
        self.last_result.as_ref()
    }

    /// Candidate not chosen in the last successful cycle
    pub fn other_solution(&self) -> Option<Position> {
        self.last_result.as_ref().map(SolverResult::alternate)
    }

    /// Run one cycle on the delays currently stored in `array`
    ///
    /// Refreshes stale array constants first. A failed cycle clears the
    /// previous result.
    pub fn calculate(&mut self, array: &mut ReceiverArray) -> Result<SolverResult, LocalizationError> {
        let outcome = self.run_cycle(array);
        self.state = SolverState::Idle;
        self.last_result = outcome.as_ref().ok().copied();
        outcome
    }

    fn run_cycle(&mut self, array: &mut ReceiverArray) -> Result<SolverResult, LocalizationError> {
        self.state = SolverState::Idle;
        let speed = self.config.speed_of_sound;

        if let Some(bad) = array.tdoas().iter().find(|t| !t.is_finite()) {
            return Err(LocalizationError::invalid_input(format!(
                "non-finite TDoA value {}",
                bad
            )));
        }
        array.refresh_constants()?;
        let system = ReducedSystem::from_array(array, speed);
        self.state = SolverState::ConstantsReady;

        let quadratic = system.quadratic();
        let distances = match self.config.mode {
            SolverMode::ClosedForm => quadratic.roots(self.config.discriminant_policy)?,
            SolverMode::Iterative => {
                quadratic.check_leading()?;
                iterative::find_roots(&system, &self.config.iterative, quadratic.a)?
            }
        };
        let candidates = distances.map(|d| system.position_at(d));
        self.state = SolverState::RootsComputed;

        let residuals = candidates.map(|c| objective::hls_residual(array, &c, speed));
        let ranked = objective::rank(self.config.root_policy, &distances, &residuals);
        let admissible = self
            .predicate
            .as_ref()
            .map(|predicate| candidates.map(|c| predicate(&c)));
        let chosen_index = match &admissible {
            Some(flags) => objective::apply_admissibility(ranked, flags),
            None => ranked,
        };
        self.state = SolverState::RootSelected;

        Ok(SolverResult {
            candidates,
            distances,
            residuals,
            chosen_index,
            admissible,
            discriminant: quadratic.discriminant(),
        })
    }
}

fn check_speed(speed_of_sound: f64) -> Result<(), LocalizationError> {
    if !(speed_of_sound.is_finite() && speed_of_sound > 0.0) {
        return Err(LocalizationError::invalid_input(format!(
            "speed of sound must be positive (got {})",
            speed_of_sound
        )));
    }
    Ok(())
}
