//! Lock-in (IQ) demodulation of captured waveforms.
//!
//! All routines work in units of samples rather than seconds internally; the result is the
//! same since the sample spacing cancels out of the amplitude normalization.

use std::f64::consts::{PI, TAU};

use wide::f64x4;

use crate::{Error, Result};

/// Amplitude, phase and DC offset of one frequency component of a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phasor {
    /// Amplitude in the units of the signal; never negative.
    pub amplitude: f64,
    /// Phase in radians, in `(-π, π]`.
    pub phase: f64,
    /// DC offset in the units of the signal.
    pub offset: f64,
}

/// A [`Phasor`] together with how well it describes the signal it was extracted from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Demodulation {
    pub amplitude: f64,
    pub phase: f64,
    pub offset: f64,
    /// RMS deviation of the signal from the reconstructed sinusoid.
    pub error: f64,
}

impl Demodulation {
    /// Demodulate `signal` at `frequency` and compute the reconstruction error of the result.
    pub fn analyze(signal: &[f32], frequency: f64, sample_rate: f64) -> Result<Demodulation> {
        let Phasor { amplitude, phase, offset } = demodulate(signal, frequency, sample_rate)?;
        let error = reconstruction_error(signal, sample_rate, frequency, amplitude, phase, offset)?;
        Ok(Demodulation { amplitude, phase, offset, error })
    }

    pub fn phasor(&self) -> Phasor {
        Phasor { amplitude: self.amplitude, phase: self.phase, offset: self.offset }
    }
}

fn sum(values: &[f64]) -> f64 {
    let mut chunks = values.chunks_exact(4);
    let mut acc = f64x4::splat(0.0);
    for chunk in &mut chunks {
        acc = acc + f64x4::from([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    acc.to_array().iter().sum::<f64>() + chunks.remainder().iter().sum::<f64>()
}

/// Arithmetic mean; zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0
    }
    sum(values) / values.len() as f64
}

/// Integrate equally spaced samples using the trapezoidal rule.
///
/// `dx / 2 * (buf[0] + 2 * buf[1] + ... + 2 * buf[n-2] + buf[n-1])`
///
/// No samples integrate to zero, and a single sample to `buf[0] * dx`.
pub fn integrate_trapezoidal(buf: &[f64], dx: f64) -> f64 {
    match buf {
        [] => 0.0,
        [only] => only * dx,
        [first, inner @ .., last] =>
            (first + 2.0 * sum(inner) + last) * dx / 2.0,
    }
}

/// Integrate `buf[i] * cos(2π * frequency * i + phase)` using the trapezoidal rule.
///
/// `frequency` is given in cycles per sample and `phase` in radians. A single sample
/// integrates to `buf[0] * dx * cos(phase)`.
pub fn integrate_modulated_trapezoidal(buf: &[f64], dx: f64, frequency: f64, phase: f64) -> f64 {
    let modulated = buf.iter().enumerate()
        .map(|(index, sample)| sample * (TAU * frequency * index as f64 + phase).cos())
        .collect::<Vec<_>>();
    integrate_trapezoidal(&modulated, dx)
}

/// Number of leading samples out of `len` that span a whole number of periods.
///
/// Buffers shorter than one period, and nonsensical frequencies, are used in full.
fn complete_periods(len: usize, frequency: f64, sample_rate: f64) -> usize {
    let periods = (len as f64 * frequency / sample_rate).floor();
    let samples = periods * sample_rate / frequency;
    if samples >= 1.0 {
        (samples as usize).min(len)
    } else {
        len
    }
}

/// Use IQ demodulation to get amplitude, phase and DC offset of the component of `signal` at
/// `frequency` (Hz), which was sampled at `sample_rate` (samples per second).
///
/// The signal is modelled as `offset + amplitude * cos(2π * frequency * t + phase)`. Only the
/// longest prefix spanning a whole number of periods is considered, since a partial period
/// biases both the offset and the IQ components; the offset is removed before demodulating.
pub fn demodulate(signal: &[f32], frequency: f64, sample_rate: f64) -> Result<Phasor> {
    if signal.is_empty() {
        return Err(Error::EmptyBuffer)
    }
    let len = complete_periods(signal.len(), frequency, sample_rate);
    let window = signal[..len].iter().map(|&sample| sample as f64).collect::<Vec<_>>();
    let offset = mean(&window);
    let window = window.into_iter().map(|sample| sample - offset).collect::<Vec<_>>();

    let per_sample = frequency / sample_rate;
    let i = integrate_modulated_trapezoidal(&window, 1.0, per_sample, 0.0);
    let q = integrate_modulated_trapezoidal(&window, 1.0, per_sample, -PI / 2.0);
    let amplitude = (i * i + q * q).sqrt() * 2.0 / len as f64;
    let phase = wrap_phase((-q).atan2(i));
    log::trace!("demodulate({} samples, {} Hz, {} S/s): {} of them used, I = {}, Q = {}",
        signal.len(), frequency, sample_rate, len, i, q);
    Ok(Phasor { amplitude, phase, offset })
}

/// RMS deviation of `signal` from `offset + amplitude * cos(2π * frequency * t + phase)`.
///
/// Unlike [`demodulate`], every sample is used, including any trailing partial period.
pub fn reconstruction_error(
    signal: &[f32], sample_rate: f64, frequency: f64,
    amplitude: f64, phase: f64, offset: f64
) -> Result<f64> {
    if signal.is_empty() {
        return Err(Error::EmptyBuffer)
    }
    let squares = signal.iter().enumerate()
        .map(|(index, &sample)| {
            let time = index as f64 / sample_rate;
            let deviation = sample as f64 - offset - amplitude * (TAU * frequency * time + phase).cos();
            deviation * deviation
        })
        .collect::<Vec<_>>();
    Ok(mean(&squares).sqrt())
}

/// Wrap a phase difference into `(-π, π]`.
///
/// This is `((delta + π) mod 2π) - π` with a floor-style modulo, mirrored so that a
/// difference landing exactly on the boundary (e.g. `3π` or `-3π`) becomes `+π`.
pub fn wrap_phase(delta: f64) -> f64 {
    PI - (PI - delta).rem_euclid(TAU)
}
