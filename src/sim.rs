//! In-process stand-in for the instrument, with the load under test modelled analytically.

use std::f64::consts::{PI, TAU};
use std::time::Duration;

use crate::Result;
use crate::config::{
    AcquisitionConfiguration, AcquisitionTrigger, Channel, GeneratorConfiguration,
    GeneratorMode, WaveformKind, BUFFER_SIZE,
};
use crate::session::{AcquisitionSession, Pin, TriggerState};

/// Response of input 2 to the signal driven on output 1.
///
/// Input 1 observes output 1 directly, input 2 observes
/// `gain * drive(t + phase) + harmonic * drive(2t) + offset` plus output 2 itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadModel {
    pub gain: f64,
    /// Phase shift in radians.
    pub phase: f64,
    /// Relative amplitude of the second harmonic.
    pub harmonic: f64,
    /// DC offset in volts.
    pub offset: f64,
}

impl Default for LoadModel {
    fn default() -> Self {
        LoadModel { gain: 0.5, phase: -0.6, harmonic: 0.05, offset: 0.01 }
    }
}

#[derive(Debug, Clone)]
struct Output {
    config: GeneratorConfiguration,
    arbitrary: Vec<f32>,
    enabled: bool,
}

impl Output {
    fn new() -> Output {
        Output { config: GeneratorConfiguration::default(), arbitrary: Vec::new(), enabled: false }
    }

    /// Output voltage `time` seconds after the generator started (or was triggered).
    fn voltage(&self, time: f64, harmonic: f64) -> f64 {
        let config = &self.config;
        let triggered = config.trigger != crate::GeneratorTrigger::Internal;
        if !self.enabled || (triggered && time < 0.0) {
            return 0.0
        }
        if let GeneratorMode::Burst { count: Some(count) } = config.mode {
            if time * config.frequency >= count as f64 {
                return config.offset
            }
        }
        let angle = harmonic * (TAU * config.frequency * time + config.phase.to_radians());
        let unit = match config.kind {
            WaveformKind::Sine => angle.cos(),
            WaveformKind::Square => if angle.cos() >= 0.0 { 1.0 } else { -1.0 },
            WaveformKind::Triangle => angle.cos().asin() * 2.0 / PI,
            WaveformKind::Arbitrary if self.arbitrary.is_empty() => 0.0,
            WaveformKind::Arbitrary => {
                let cycle = (angle / TAU).rem_euclid(1.0);
                let index = (cycle * self.arbitrary.len() as f64) as usize;
                self.arbitrary[index.min(self.arbitrary.len() - 1)] as f64
            }
        };
        config.amplitude * unit + config.offset
    }
}

/// Simulated generator/digitizer pair. Waits advance a virtual clock and return immediately.
#[derive(Debug, Clone)]
pub struct SimulatedSession {
    load: LoadModel,
    outputs: [Output; 2],
    acquisition: AcquisitionConfiguration,
    trigger: AcquisitionTrigger,
    started: bool,
    trigger_latency: Option<usize>,
    polls: usize,
    external_edge: bool,
    captured: Option<[Output; 2]>,
    elapsed: Duration,
    history: Vec<String>,
}

impl SimulatedSession {
    pub fn new(load: LoadModel) -> SimulatedSession {
        SimulatedSession {
            load,
            outputs: [Output::new(), Output::new()],
            acquisition: AcquisitionConfiguration::default(),
            trigger: AcquisitionTrigger::Disabled,
            started: false,
            trigger_latency: Some(0),
            polls: 0,
            external_edge: false,
            captured: None,
            elapsed: Duration::ZERO,
            history: Vec::new(),
        }
    }

    /// Report `polls` waiting states before reporting the trigger.
    pub fn with_trigger_latency(mut self, polls: usize) -> SimulatedSession {
        self.trigger_latency = Some(polls);
        self
    }

    /// Never report the trigger, as if the trigger line was disconnected.
    pub fn never_trigger(mut self) -> SimulatedSession {
        self.trigger_latency = None;
        self
    }

    /// Every operation performed so far, in order.
    pub fn history(&self) -> &[String] {
        &self.history[..]
    }

    /// Total time spent in `wait`.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn record(&mut self, entry: String) {
        log::trace!("sim: {}", entry);
        self.history.push(entry);
    }

    fn trigger_source_ready(&self) -> bool {
        match self.trigger {
            AcquisitionTrigger::Disabled => false,
            AcquisitionTrigger::ExternalRising | AcquisitionTrigger::ExternalFalling =>
                self.external_edge,
            _ => true,
        }
    }

    fn sample(&self, outputs: &[Output; 2], channel: Channel, time: f64) -> f64 {
        match channel {
            Channel::Ch1 => outputs[0].voltage(time, 1.0),
            Channel::Ch2 => {
                let shifted = time + self.load.phase / (TAU * outputs[0].config.frequency);
                self.load.gain * outputs[0].voltage(shifted, 1.0) +
                    self.load.harmonic * outputs[0].voltage(time, 2.0) +
                    self.load.offset +
                    outputs[1].voltage(time, 1.0)
            }
        }
    }
}

impl AcquisitionSession for SimulatedSession {
    fn reset_generator(&mut self) -> Result<()> {
        self.record("reset_generator".into());
        self.outputs = [Output::new(), Output::new()];
        Ok(())
    }

    fn configure_generator(&mut self, channel: Channel, config: &GeneratorConfiguration)
            -> Result<()> {
        self.record(format!("configure_generator {} {:?}", channel.number(), config));
        self.outputs[channel.index()].config = *config;
        Ok(())
    }

    fn load_arbitrary_waveform(&mut self, channel: Channel, samples: &[f32]) -> Result<()> {
        self.record(format!("load_arbitrary_waveform {} {}", channel.number(), samples.len()));
        self.outputs[channel.index()].arbitrary = samples.to_vec();
        Ok(())
    }

    fn enable_output(&mut self, channel: Channel) -> Result<()> {
        self.record(format!("enable_output {}", channel.number()));
        self.outputs[channel.index()].enabled = true;
        Ok(())
    }

    fn disable_output(&mut self, channel: Channel) -> Result<()> {
        self.record(format!("disable_output {}", channel.number()));
        self.outputs[channel.index()].enabled = false;
        Ok(())
    }

    fn reset_acquisition(&mut self) -> Result<()> {
        self.record("reset_acquisition".into());
        self.acquisition = AcquisitionConfiguration::default();
        self.trigger = AcquisitionTrigger::Disabled;
        self.started = false;
        self.external_edge = false;
        self.captured = None;
        Ok(())
    }

    fn configure_acquisition(&mut self, config: &AcquisitionConfiguration) -> Result<()> {
        self.record(format!("configure_acquisition {:?}", config.decimation));
        self.acquisition = *config;
        Ok(())
    }

    fn set_trigger(&mut self, trigger: AcquisitionTrigger) -> Result<()> {
        self.record(format!("set_trigger {}", trigger.scpi_name()));
        self.trigger = trigger;
        self.polls = 0;
        Ok(())
    }

    fn start_acquisition(&mut self) -> Result<()> {
        self.record("start_acquisition".into());
        self.started = true;
        Ok(())
    }

    fn poll_trigger_state(&mut self) -> Result<TriggerState> {
        self.record("poll_trigger_state".into());
        if self.captured.is_some() {
            return Ok(TriggerState::Triggered)
        }
        if !self.started || !self.trigger_source_ready() {
            return Ok(TriggerState::Waiting)
        }
        match self.trigger_latency {
            Some(latency) if self.polls >= latency => {
                self.captured = Some(self.outputs.clone());
                Ok(TriggerState::Triggered)
            }
            _ => {
                self.polls += 1;
                Ok(TriggerState::Waiting)
            }
        }
    }

    fn read_channel_voltages(&mut self, channel: Channel, max_samples: usize) -> Result<Vec<f32>> {
        self.record(format!("read_channel_voltages {} {}", channel.number(), max_samples));
        let outputs = self.captured.clone().unwrap_or_else(|| self.outputs.clone());
        let sample_rate = self.acquisition.decimation.sample_rate();
        let pretrigger = (BUFFER_SIZE / 2) as i64 - self.acquisition.trigger_delay as i64;
        let samples = (0..max_samples.min(BUFFER_SIZE))
            .map(|index| {
                let time = (index as i64 - pretrigger) as f64 / sample_rate;
                self.sample(&outputs, channel, time) as f32
            })
            .collect();
        Ok(samples)
    }

    fn effective_sample_rate(&mut self) -> Result<f64> {
        Ok(self.acquisition.decimation.sample_rate())
    }

    fn set_pin_output(&mut self, pin: Pin) -> Result<()> {
        self.record(format!("set_pin_output {}", pin.scpi_name()));
        Ok(())
    }

    fn set_pin_input(&mut self, pin: Pin) -> Result<()> {
        self.record(format!("set_pin_input {}", pin.scpi_name()));
        Ok(())
    }

    fn set_pin(&mut self, pin: Pin, high: bool) -> Result<()> {
        self.record(format!("set_pin {} {}", pin.scpi_name(), high as u8));
        if pin == Pin::Dio0N && !high && self.started {
            self.external_edge = true;
        }
        Ok(())
    }

    fn wait(&mut self, duration: Duration) {
        self.elapsed += duration;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Decimation;
    use crate::demod::Demodulation;

    fn drive(session: &mut SimulatedSession, frequency: f64, decimation: Decimation) {
        session.configure_generator(Channel::Ch1, &GeneratorConfiguration {
            frequency,
            amplitude: 0.4,
            ..Default::default()
        }).unwrap();
        session.enable_output(Channel::Ch1).unwrap();
        session.configure_acquisition(&AcquisitionConfiguration {
            decimation,
            ..Default::default()
        }).unwrap();
        session.set_trigger(AcquisitionTrigger::Now).unwrap();
        session.start_acquisition().unwrap();
        assert_eq!(session.poll_trigger_state().unwrap(), TriggerState::Triggered);
    }

    #[test]
    fn test_load_response() {
        let load = LoadModel { gain: 0.25, phase: 0.5, harmonic: 0.1, offset: 0.02 };
        let mut session = SimulatedSession::new(load);
        drive(&mut session, 100e3, Decimation::Dec8);
        let sample_rate = session.effective_sample_rate().unwrap();
        let ch1 = session.read_channel_voltages(Channel::Ch1, BUFFER_SIZE).unwrap();
        let ch2 = session.read_channel_voltages(Channel::Ch2, BUFFER_SIZE).unwrap();

        let reference = Demodulation::analyze(&ch1, 100e3, sample_rate).unwrap();
        assert!((reference.amplitude - 0.4).abs() < 1e-3, "{:?}", reference);
        assert!(reference.phase.abs() < 1e-3, "{:?}", reference);
        let response = Demodulation::analyze(&ch2, 100e3, sample_rate).unwrap();
        assert!((response.amplitude - 0.1).abs() < 1e-3, "{:?}", response);
        assert!((response.phase - 0.5).abs() < 1e-3, "{:?}", response);
        assert!((response.offset - 0.02).abs() < 1e-3, "{:?}", response);
        let harmonic = Demodulation::analyze(&ch2, 200e3, sample_rate).unwrap();
        assert!((harmonic.amplitude - 0.04).abs() < 1e-3, "{:?}", harmonic);
    }

    #[test]
    fn test_disabled_output_is_silent() {
        let mut session = SimulatedSession::new(LoadModel { offset: 0.0, ..Default::default() });
        session.set_trigger(AcquisitionTrigger::Now).unwrap();
        session.start_acquisition().unwrap();
        session.poll_trigger_state().unwrap();
        let ch1 = session.read_channel_voltages(Channel::Ch1, 100).unwrap();
        assert!(ch1.iter().all(|&sample| sample == 0.0));
    }

    #[test]
    fn test_external_trigger_needs_edge() {
        let mut session = SimulatedSession::new(LoadModel::default());
        session.set_trigger(AcquisitionTrigger::ExternalFalling).unwrap();
        session.start_acquisition().unwrap();
        assert_eq!(session.poll_trigger_state().unwrap(), TriggerState::Waiting);
        session.set_pin(Pin::Dio0N, false).unwrap();
        assert_eq!(session.poll_trigger_state().unwrap(), TriggerState::Triggered);
    }

    #[test]
    fn test_burst_arbitrary_step() {
        let mut session = SimulatedSession::new(LoadModel::default());
        let sample_rate = Decimation::Dec64.sample_rate();
        session.load_arbitrary_waveform(Channel::Ch2, &[1.0, 1.0, 0.0, 0.0]).unwrap();
        session.configure_generator(Channel::Ch2, &GeneratorConfiguration {
            kind: WaveformKind::Arbitrary,
            frequency: sample_rate / 40.0,
            amplitude: 1.0,
            mode: GeneratorMode::Burst { count: Some(1) },
            trigger: crate::GeneratorTrigger::ExternalFalling,
            ..Default::default()
        }).unwrap();
        session.enable_output(Channel::Ch2).unwrap();
        let output = &session.outputs[1];
        assert_eq!(output.voltage(-1.0, 1.0), 0.0);
        assert_eq!(output.voltage(5.0 / sample_rate, 1.0), 1.0);
        assert_eq!(output.voltage(25.0 / sample_rate, 1.0), 0.0);
        assert_eq!(output.voltage(45.0 / sample_rate, 1.0), 0.0);
    }
}
