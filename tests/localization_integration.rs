//! End-to-end localization through the public API
//!
//! Covers:
//! - simulation → solver for both reference layouts
//! - synthetic sample buffers → GCC-PHAT → solver
//! - serial and parallel delay estimation agreeing
//! - failure reporting for impossible delays

use approx::assert_relative_eq;
use tdoa_localizer::config::ArrayConfig;
use tdoa_localizer::solver::{DiscriminantPolicy, SolverMode};
use tdoa_localizer::{
    AppConfig, ErrorCode, LocalizationError, Localizer, OutboundMessage, Position, PulseShape,
    SimulationContext,
};

const SOURCES: [[f64; 3]; 3] = [[0.4, -0.3, 0.2], [-0.8, 0.6, 0.5], [0.9, 0.2, -0.6]];

fn cube_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.array = ArrayConfig {
        positions: [
            [-1.5, -1.5, -1.5],
            [-1.5, 1.5, 1.5],
            [1.5, 1.5, -1.5],
            [1.5, -1.5, -1.5],
        ],
        reference_index: 0,
    };
    config.delay.sample_rate = 48_000;
    config.delay.interpolation_factor = 8;
    config
}

fn source(coords: [f64; 3]) -> Position {
    Position::new(coords[0], coords[1], coords[2])
}

#[test]
fn test_simulated_delays_recover_source() {
    let mut localizer = Localizer::new(&cube_config()).unwrap();
    for coords in SOURCES {
        let truth = source(coords);
        let context = SimulationContext::new(truth, 340.0).with_decimals(None);
        let localization = localizer.simulate(&context).unwrap();
        let position = localization.position();
        assert_relative_eq!(position.x, truth.x, epsilon = 1e-6);
        assert_relative_eq!(position.y, truth.y, epsilon = 1e-6);
        assert_relative_eq!(position.z, truth.z, epsilon = 1e-6);
    }
    assert_eq!(localizer.cycles(), SOURCES.len() as u64);
}

#[test]
fn test_iterative_mode_matches_closed_form() {
    let mut closed = Localizer::new(&cube_config()).unwrap();
    let mut config = cube_config();
    config.solver.mode = SolverMode::Iterative;
    let mut iterative = Localizer::new(&config).unwrap();

    for coords in SOURCES {
        let context = SimulationContext::new(source(coords), 340.0).with_decimals(None);
        let a = closed.simulate(&context).unwrap();
        let b = iterative.simulate(&context).unwrap();
        assert_eq!(a.result.chosen_index, b.result.chosen_index);
        for (x, y) in a.result.candidates.iter().zip(b.result.candidates.iter()) {
            assert!((x - y).norm() < 1e-6);
        }
    }
}

#[test]
fn test_synthetic_buffers_through_gcc_phat() {
    let mut localizer = Localizer::new(&cube_config()).unwrap();
    let pulse = PulseShape::default();

    for coords in SOURCES {
        let truth = source(coords);
        let context = SimulationContext::new(truth, 340.0);
        let channels = context.synthesize(localizer.array(), &pulse).unwrap();
        let buffers = [
            channels[0].as_slice(),
            channels[1].as_slice(),
            channels[2].as_slice(),
            channels[3].as_slice(),
        ];

        let localization = localizer.locate_from_buffers(buffers).unwrap();
        let error = (localization.position() - truth).norm();
        assert!(error < 0.01, "source {:?} off by {} m", coords, error);

        let confidence = localization.delay_confidence.unwrap();
        assert!(confidence.iter().all(|&ratio| ratio > 1.0));
    }
}

#[test]
fn test_parallel_estimation_matches_serial() {
    let serial = Localizer::new(&cube_config()).unwrap();
    let mut config = cube_config();
    config.delay.parallel_channels = true;
    let parallel = Localizer::new(&config).unwrap();

    let context = SimulationContext::new(source(SOURCES[1]), 340.0);
    let channels = context
        .synthesize(serial.array(), &PulseShape::default())
        .unwrap();
    let buffers = [
        channels[0].as_slice(),
        channels[1].as_slice(),
        channels[2].as_slice(),
        channels[3].as_slice(),
    ];

    let (serial_tdoas, _) = serial.estimate_tdoas(buffers).unwrap();
    let (parallel_tdoas, _) = parallel.estimate_tdoas(buffers).unwrap();
    assert_eq!(serial_tdoas, parallel_tdoas);
}

#[test]
fn test_reference_change_keeps_source() {
    let mut localizer = Localizer::new(&cube_config()).unwrap();
    let truth = source(SOURCES[0]);
    let context = SimulationContext::new(truth, 340.0).with_decimals(None);

    for reference in 0..4 {
        localizer.set_reference_index(reference).unwrap();
        let localization = localizer.simulate(&context).unwrap();
        assert!(
            (localization.position() - truth).norm() < 1e-6,
            "reference {}",
            reference
        );
    }
}

#[test]
fn test_impossible_delays_are_reported() {
    let mut config = cube_config();
    config.solver.discriminant_policy = DiscriminantPolicy::Reject;
    let mut localizer = Localizer::new(&config).unwrap();

    let err = localizer.locate_from_tdoa([0.01, 0.01, 0.01]).unwrap_err();
    assert!(matches!(err, LocalizationError::NoRealSolution { .. }));
    assert_eq!(err.code(), 1004);

    let message = serde_json::to_value(OutboundMessage::error(&err)).unwrap();
    assert_eq!(message["type"], "Error");
}

#[test]
fn test_desk_layout_prefers_exact_root() {
    // Nearly planar default layout: the mirror root almost fits too
    let mut localizer = Localizer::new(&AppConfig::default()).unwrap();
    let truth = Position::new(0.5, 0.5, 0.9);
    let context = SimulationContext::new(truth, 340.0).with_decimals(None);
    let localization = localizer.simulate(&context).unwrap();

    let result = localization.result;
    assert!((result.chosen() - truth).norm() < 1e-6);
    let mirror = result.residuals[1 - result.chosen_index];
    assert!(mirror > 0.0 && mirror < 1e-5, "mirror residual {}", mirror);
}
