// DSP module - spectral transforms and time-delay estimation
//
// Module organization:
// - spectral: Hann-windowed one-sided FFT, amplitude spectrum, padded inverse
// - gcc_phat: Generalized cross-correlation with phase transform

pub mod gcc_phat;
pub mod spectral;

pub use gcc_phat::{DelayEstimate, DelayEstimator, DelayUnit, ReferenceInput, ReferenceSpectrum};
pub use spectral::SpectralTransform;
