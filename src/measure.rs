//! Procedures run at each point of a sweep.
//!
//! * [`ResponseMeasurement`] drives output 1 continuously and demodulates both inputs, for
//!   frequency-response scans;
//! * [`DrivenCapture`] drives output 1 in burst mode from the shared external trigger line and
//!   marks a delayed instant with a TTL edge on output 2;
//! * [`DualToneCapture`] drives both outputs at independent frequencies.

use std::borrow::Cow;
use std::time::Duration;

use crate::Result;
use crate::config::{
    AcquisitionConfiguration, AcquisitionTrigger, Channel, ChannelSet, GeneratorConfiguration,
    GeneratorMode, GeneratorTrigger, Timing, WaveformKind, BASE_SAMPLE_RATE, BUFFER_SIZE,
};
use crate::params::Decimation;
use crate::capture::{ttl_step, WaveformPair};
use crate::demod::{wrap_phase, Demodulation};
use crate::session::{AcquisitionSession, Pin};
use crate::trigger::{Acquisition, TriggerMode};

/// Signal a component is extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Input1,
    Input2,
    /// `Input2 - Input1`, i.e. the voltage across the load.
    Difference,
}

impl Source {
    fn label(self) -> &'static str {
        match self {
            Self::Input1     => "1",
            Self::Input2     => "2",
            Self::Difference => "d",
        }
    }

    fn signal(self, pair: &WaveformPair) -> Cow<'_, [f32]> {
        match self {
            Self::Input1     => Cow::Borrowed(pair.ch1.samples()),
            Self::Input2     => Cow::Borrowed(pair.ch2.samples()),
            Self::Difference => Cow::Owned(pair.difference()),
        }
    }
}

/// A source demodulated at a multiple of the drive frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub source: Source,
    pub harmonic: u32,
}

impl Component {
    pub const fn new(source: Source, harmonic: u32) -> Component {
        Component { source, harmonic }
    }

    /// Column label suffix: the source, followed by the harmonic number unless it is 1.
    pub fn label(&self) -> String {
        match self.harmonic {
            1 => self.source.label().to_owned(),
            harmonic => format!("{}{}", self.source.label(), harmonic),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentSet {
    /// Input 1 only.
    Single,
    /// Both inputs at the drive frequency.
    Pair,
    /// Both inputs at the drive frequency, plus input 2 at twice the drive frequency.
    #[default]
    Harmonic,
    /// Everything in `Harmonic`, plus the voltage across the load.
    Full,
}

impl ComponentSet {
    /// Components in column order. The first one is the phase reference for the others.
    pub fn components(self) -> &'static [Component] {
        const INPUT1: Component = Component::new(Source::Input1, 1);
        const INPUT2: Component = Component::new(Source::Input2, 1);
        const INPUT2_HARMONIC: Component = Component::new(Source::Input2, 2);
        const DIFFERENCE: Component = Component::new(Source::Difference, 1);
        match self {
            Self::Single   => &[INPUT1],
            Self::Pair     => &[INPUT1, INPUT2],
            Self::Harmonic => &[INPUT1, INPUT2, INPUT2_HARMONIC],
            Self::Full     => &[INPUT1, INPUT2, INPUT2_HARMONIC, DIFFERENCE],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentResult {
    pub component: Component,
    pub amplitude: f64,
    /// Absolute phase for the reference component; for every other component, the phase
    /// relative to the reference scaled to the same harmonic, wrapped into `(-π, π]`.
    pub phase: f64,
    pub offset: f64,
    pub error: f64,
}

/// Demodulated response at one drive frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub frequency: f64,
    pub sample_rate: f64,
    pub components: Vec<ComponentResult>,
}

/// Continuous sine drive on output 1 with an immediately triggered acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseMeasurement {
    /// Drive amplitude in volts.
    pub amplitude: f64,
    pub components: ComponentSet,
    pub timing: Timing,
}

impl Default for ResponseMeasurement {
    fn default() -> Self {
        Self {
            amplitude: GeneratorConfiguration::default().amplitude,
            components: ComponentSet::default(),
            timing: Timing::default(),
        }
    }
}

impl ResponseMeasurement {
    /// Drive output 1 at `frequency` and capture both inputs once the input filters settled.
    pub fn acquire<S: AcquisitionSession>(&self, session: &mut S, frequency: f64)
            -> Result<WaveformPair> {
        let (decimation, _) = Decimation::select(frequency);
        session.configure_generator(Channel::Ch1, &GeneratorConfiguration {
            kind: WaveformKind::Sine,
            frequency,
            amplitude: self.amplitude,
            ..Default::default()
        })?;
        session.enable_output(Channel::Ch1)?;
        session.wait(self.timing.settling);

        let config = AcquisitionConfiguration { decimation, ..Default::default() };
        let result = Acquisition::new(session, config, TriggerMode::Immediate, self.timing)
            .acquire();
        session.disable_output(Channel::Ch1)?;
        result
    }

    /// Demodulate every requested component of `pair` driven at `frequency`.
    pub fn analyze(&self, frequency: f64, pair: &WaveformPair) -> Result<ResponseRecord> {
        let sample_rate = pair.sample_rate();
        let mut components = Vec::new();
        for &component in self.components.components() {
            let signal = component.source.signal(pair);
            let Demodulation { amplitude, phase, offset, error } = Demodulation::analyze(
                &signal, frequency * component.harmonic as f64, sample_rate)?;
            components.push(ComponentResult { component, amplitude, phase, offset, error });
        }
        if let Some((reference, others)) = components.split_first_mut() {
            for result in others {
                let harmonic = result.component.harmonic as f64;
                result.phase = wrap_phase(result.phase - harmonic * reference.phase);
            }
        }
        Ok(ResponseRecord { frequency, sample_rate, components })
    }

    pub fn measure<S: AcquisitionSession>(&self, session: &mut S, frequency: f64)
            -> Result<ResponseRecord> {
        let pair = self.acquire(session, frequency)?;
        self.analyze(frequency, &pair)
    }
}

/// Position of an instrument in a chain sharing one external trigger line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainRole {
    /// Fires the trigger line once the others had time to arm.
    #[default]
    Leader,
    /// Only waits for the trigger fired by the leader.
    Follower,
}

/// Burst drive and acquisition started together by a falling edge on the trigger line, with a
/// TTL marker on output 2 that falls a given delay after the trigger.
///
/// The trigger line is `DIO0_N`, which must be wired to the external trigger input `DIO0_P`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivenCapture {
    pub decimation: Decimation,
    pub role: ChainRole,
    pub timing: Timing,
}

impl Default for DrivenCapture {
    fn default() -> Self {
        Self {
            decimation: Decimation::Dec64,
            role: ChainRole::Leader,
            timing: Timing::default(),
        }
    }
}

impl DrivenCapture {
    /// Generator configuration for driving output 1; `phase` is in degrees.
    pub fn drive(frequency: f64, amplitude: f64, phase: f64) -> GeneratorConfiguration {
        GeneratorConfiguration {
            kind: WaveformKind::Sine,
            frequency,
            amplitude,
            phase,
            offset: 0.0,
            mode: GeneratorMode::Burst { count: None },
            trigger: GeneratorTrigger::ExternalFalling,
        }
    }

    /// Configure the trigger pins. Needed once before the first capture.
    pub fn prepare<S: AcquisitionSession>(&self, session: &mut S) -> Result<()> {
        session.set_pin_input(Pin::Dio0P)?;
        session.set_pin_output(Pin::Dio0N)?;
        session.set_pin_output(Pin::Dio1P)?;
        session.set_pin(Pin::Dio0N, false)?;
        session.set_pin(Pin::Dio1P, false)?;
        Ok(())
    }

    fn configure_marker<S: AcquisitionSession>(session: &mut S, delay: f64) -> Result<()> {
        session.load_arbitrary_waveform(Channel::Ch2, &ttl_step(BASE_SAMPLE_RATE, delay, BUFFER_SIZE))?;
        session.configure_generator(Channel::Ch2, &GeneratorConfiguration {
            kind: WaveformKind::Arbitrary,
            frequency: BASE_SAMPLE_RATE / BUFFER_SIZE as f64,
            amplitude: 1.0,
            phase: 0.0,
            offset: 0.0,
            mode: GeneratorMode::Burst { count: Some(1) },
            trigger: GeneratorTrigger::ExternalFalling,
        })?;
        // the first sample is high, so the marker can ring out before the trigger
        session.enable_output(Channel::Ch2)
    }

    /// Capture both inputs with the trigger at sample 200, driving output 1 with `drive` if
    /// given, and with the output 2 marker falling `marker_delay` seconds after the trigger.
    pub fn capture<S: AcquisitionSession>(
        &self,
        session: &mut S,
        drive: Option<&GeneratorConfiguration>,
        marker_delay: f64,
    ) -> Result<WaveformPair> {
        session.set_pin(Pin::Dio0N, true)?;
        session.reset_generator()?;
        if let Some(drive) = drive {
            session.configure_generator(Channel::Ch1, drive)?;
        }
        Self::configure_marker(session, marker_delay)?;

        let config = AcquisitionConfiguration {
            decimation: self.decimation,
            trigger_delay: AcquisitionConfiguration::PRETRIGGER_DELAY,
            trigger: AcquisitionTrigger::ExternalFalling,
            averaging: true,
            ..Default::default()
        };
        let mut acquisition = Acquisition::new(session, config,
            TriggerMode::External(AcquisitionTrigger::ExternalFalling), self.timing);
        acquisition.arm()?;
        if drive.is_some() {
            acquisition.session().enable_output(Channel::Ch1)?;
        }
        if self.role == ChainRole::Leader {
            acquisition.session().wait(self.timing.chain_leader_delay);
        }
        acquisition.session().set_pin(Pin::Dio0N, false)?;
        acquisition.wait_for_trigger()?;

        // keep the marker from returning high once its burst ends
        let marker_delay = Duration::try_from_secs_f64(marker_delay).unwrap_or(Duration::ZERO);
        acquisition.session().wait(marker_delay);
        acquisition.session().disable_output(Channel::Ch2)?;

        acquisition.wait_until_full()?;
        if drive.is_some() {
            acquisition.session().disable_output(Channel::Ch1)?;
        }
        acquisition.read()
    }
}

/// Continuous sine drive on both outputs at independent frequencies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualToneCapture {
    /// Drive amplitude of both outputs in volts.
    pub amplitude: f64,
    /// Outputs that are driven; the others stay off and their frequency is ignored.
    pub outputs: ChannelSet,
    pub decimation: Decimation,
    pub timing: Timing,
}

impl Default for DualToneCapture {
    fn default() -> Self {
        Self {
            amplitude: GeneratorConfiguration::default().amplitude,
            outputs: ChannelSet::all(),
            decimation: Decimation::Dec8,
            timing: Timing::default(),
        }
    }
}

impl DualToneCapture {
    pub fn capture<S: AcquisitionSession>(&self, session: &mut S, frequencies: [f64; 2])
            -> Result<WaveformPair> {
        for channel in self.outputs.channels() {
            session.configure_generator(channel, &GeneratorConfiguration {
                kind: WaveformKind::Sine,
                frequency: frequencies[channel.index()],
                amplitude: self.amplitude,
                ..Default::default()
            })?;
            session.enable_output(channel)?;
        }

        let config = AcquisitionConfiguration {
            decimation: self.decimation,
            averaging: true,
            ..Default::default()
        };
        let result = Acquisition::new(session, config, TriggerMode::Immediate, self.timing)
            .acquire();
        for channel in self.outputs.channels() {
            session.disable_output(channel)?;
        }
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::{LoadModel, SimulatedSession};

    macro_rules! assert_near {
        ($left:expr, $right:expr, $tolerance:expr) => {
            let (left, right): (f64, f64) = ($left, $right);
            assert!((left - right).abs() < $tolerance,
                "{} is not within {} of {}", left, $tolerance, right);
        };
    }

    fn position(history: &[String], entry: &str) -> usize {
        history.iter().position(|item| item == entry)
            .unwrap_or_else(|| panic!("{:?} not in {:?}", entry, history))
    }

    #[test]
    fn test_labels() {
        let labels = ComponentSet::Full.components().iter()
            .map(Component::label)
            .collect::<Vec<_>>();
        assert_eq!(labels, ["1", "2", "22", "d"]);
        assert_eq!(Component::new(Source::Input1, 2).label(), "12");
        assert_eq!(Component::new(Source::Difference, 2).label(), "d2");
        assert_eq!(ComponentSet::default(), ComponentSet::Harmonic);
    }

    #[test]
    fn test_response() {
        let mut session = SimulatedSession::new(LoadModel::default());
        let measurement = ResponseMeasurement {
            components: ComponentSet::Full,
            ..Default::default()
        };
        let record = measurement.measure(&mut session, 100e3).unwrap();
        assert_eq!(record.frequency, 100e3);
        assert_eq!(record.sample_rate, 125e6 / 8.0);

        let [input1, input2, harmonic, difference] = record.components[..] else {
            panic!("{:?}", record.components)
        };
        assert_near!(input1.amplitude, 0.5, 1e-3);
        assert_near!(input1.offset, 0.0, 1e-3);
        assert_near!(input2.amplitude, 0.25, 1e-3);
        assert_near!(input2.phase, -0.6, 1e-3);
        assert_near!(input2.offset, 0.01, 1e-3);
        assert_near!(harmonic.amplitude, 0.025, 1e-3);
        // the fundamental leaks into the harmonic over its partial period
        assert_near!(harmonic.phase, 0.0, 0.1);
        assert_near!(difference.amplitude, 0.32583, 1e-3);
        assert_near!(difference.phase, -2.69352, 1e-2);
        assert!(input1.error < 1e-3, "{:?}", input1);

        let history = session.history();
        assert!(position(history, "enable_output 1") < position(history, "start_acquisition"));
        assert!(position(history, "poll_trigger_state") < position(history, "disable_output 1"));
        // settling, look-ahead and fill
        assert_eq!(session.elapsed(),
            Timing::default().settling + Decimation::Dec8.buffer_duration() * 2);
    }

    #[test]
    fn test_response_phase_is_relative() {
        let mut session = SimulatedSession::new(LoadModel { harmonic: 0.0, ..Default::default() });
        let measurement = ResponseMeasurement { components: ComponentSet::Pair, ..Default::default() };
        let pair = measurement.acquire(&mut session, 20e3).unwrap();
        let record = measurement.analyze(20e3, &pair).unwrap();
        let input1 = Demodulation::analyze(pair.ch1.samples(), 20e3, pair.sample_rate()).unwrap();
        let input2 = Demodulation::analyze(pair.ch2.samples(), 20e3, pair.sample_rate()).unwrap();
        assert_eq!(record.components[0].phase, input1.phase);
        assert_eq!(record.components[1].phase, wrap_phase(input2.phase - input1.phase));
    }

    #[test]
    fn test_response_disables_output_on_timeout() {
        let mut session = SimulatedSession::new(LoadModel::default()).never_trigger();
        let measurement = ResponseMeasurement {
            timing: Timing { trigger_timeout: Duration::from_millis(1), ..Default::default() },
            ..Default::default()
        };
        assert!(matches!(measurement.measure(&mut session, 1e3),
            Err(crate::Error::TriggerTimeout { .. })));
        assert_eq!(session.history().last().map(String::as_str), Some("disable_output 1"));
    }

    #[test]
    fn test_driven_capture() {
        let mut session = SimulatedSession::new(LoadModel::default());
        let capture = DrivenCapture::default();
        capture.prepare(&mut session).unwrap();
        let drive = DrivenCapture::drive(100e3, 0.3, 90.0);
        let pair = capture.capture(&mut session, Some(&drive), 20e-6).unwrap();
        assert_eq!(pair.sample_rate(), 125e6 / 64.0);

        // nothing is driven before the trigger at sample 200
        assert!(pair.ch1.samples()[..200].iter().all(|&sample| sample == 0.0));
        let after = Demodulation::analyze(&pair.ch1.samples()[200..], 100e3, pair.sample_rate())
            .unwrap();
        assert_near!(after.amplitude, 0.3, 1e-3);
        assert_near!(after.phase, std::f64::consts::FRAC_PI_2, 1e-2);

        let history = session.history();
        assert!(position(history, "set_pin DIO0_N 1") < position(history, "start_acquisition"));
        assert!(position(history, "start_acquisition") < position(history, "enable_output 1"));
        let fired = history.iter().rposition(|item| item == "set_pin DIO0_N 0").unwrap();
        assert!(position(history, "enable_output 1") < fired);
        assert!(position(history, "poll_trigger_state") < position(history, "disable_output 2"));
        assert!(session.elapsed() >= Timing::default().chain_leader_delay);
    }

    #[test]
    fn test_marker_only() {
        let load = LoadModel { gain: 0.0, phase: 0.0, harmonic: 0.0, offset: 0.0 };
        let mut session = SimulatedSession::new(load);
        let capture = DrivenCapture { role: ChainRole::Follower, ..Default::default() };
        let pair = capture.capture(&mut session, None, 10e-6).unwrap();
        // 10 µs at 1.953125 MS/s is 19.5 samples past the trigger at sample 200
        let ch2 = pair.ch2.samples();
        assert!(ch2[..200].iter().all(|&sample| sample == 0.0));
        assert!(ch2[200..=219].iter().all(|&sample| sample == 1.0));
        assert!(ch2[220..].iter().all(|&sample| sample == 0.0));
        assert!(pair.ch1.samples().iter().all(|&sample| sample == 0.0));
        assert!(!session.history().iter().any(|item| item == "enable_output 1"));
        assert!(session.elapsed() < Timing::default().chain_leader_delay);
    }

    #[test]
    fn test_dual_tone() {
        let mut session = SimulatedSession::new(LoadModel::default());
        let pair = DualToneCapture::default().capture(&mut session, [100e3, 150e3]).unwrap();
        assert_eq!(pair.sample_rate(), 125e6 / 8.0);
        let input1 = Demodulation::analyze(pair.ch1.samples(), 100e3, pair.sample_rate())
            .unwrap();
        assert_near!(input1.amplitude, 0.5, 1e-3);
        let history = session.history();
        assert!(position(history, "enable_output 2") < position(history, "start_acquisition"));
        assert!(position(history, "poll_trigger_state") < position(history, "disable_output 2"));
    }

    #[test]
    fn test_dual_tone_single_output() {
        let mut session = SimulatedSession::new(LoadModel::default());
        let capture = DualToneCapture { outputs: ChannelSet::Ch1, ..Default::default() };
        let pair = capture.capture(&mut session, [100e3, 150e3]).unwrap();
        let input1 = Demodulation::analyze(pair.ch1.samples(), 100e3, pair.sample_rate())
            .unwrap();
        assert_near!(input1.amplitude, 0.5, 1e-3);
        let history = session.history();
        assert!(position(history, "enable_output 1") < position(history, "start_acquisition"));
        assert!(position(history, "poll_trigger_state") < position(history, "disable_output 1"));
        assert!(!history.iter().any(|entry| entry == "enable_output 2"
            || entry == "disable_output 2" || entry.starts_with("configure_generator 2")));
    }
}
