//! High-level configuration of the instrument in terms of physical qualities.

use std::time::Duration;

use bitflags::bitflags;

/// Undecimated sample rate of the digitizer, in samples per second.
pub const BASE_SAMPLE_RATE: f64 = 125e6;

/// Number of samples in each acquisition buffer, equal to 2**14.
pub const BUFFER_SIZE: usize = 16384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Ch1,
    Ch2,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Ch1, Channel::Ch2];

    /// One-based channel number, as used on the front panel and in output records.
    pub fn number(self) -> u32 {
        match self {
            Self::Ch1 => 1,
            Self::Ch2 => 2,
        }
    }

    pub fn index(self) -> usize {
        self.number() as usize - 1
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelSet: u8 {
        const Ch1 = 1<<0;
        const Ch2 = 1<<1;
    }
}

impl ChannelSet {
    pub fn channels(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |&channel| self.contains(ChannelSet::from(channel)))
    }
}

impl From<Channel> for ChannelSet {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Ch1 => ChannelSet::Ch1,
            Channel::Ch2 => ChannelSet::Ch2,
        }
    }
}

/// Input range of a digitizer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    /// ±1 V full scale.
    Low,
    /// ±20 V full scale.
    #[default]
    High,
}

impl Gain {
    pub(crate) fn scpi_name(self) -> &'static str {
        match self {
            Self::Low  => "LV",
            Self::High => "HV",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveformKind {
    #[default]
    Sine,
    Square,
    Triangle,
    Arbitrary,
}

impl WaveformKind {
    pub(crate) fn scpi_name(self) -> &'static str {
        match self {
            Self::Sine      => "SINE",
            Self::Square    => "SQUARE",
            Self::Triangle  => "TRIANGLE",
            Self::Arbitrary => "ARBITRARY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratorMode {
    #[default]
    Continuous,
    /// Emit `count` periods per trigger; `None` repeats until the output is disabled.
    Burst { count: Option<u32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratorTrigger {
    #[default]
    Internal,
    ExternalRising,
    ExternalFalling,
}

impl GeneratorTrigger {
    pub(crate) fn scpi_name(self) -> &'static str {
        match self {
            Self::Internal        => "INT",
            Self::ExternalRising  => "EXT_PE",
            Self::ExternalFalling => "EXT_NE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionTrigger {
    Disabled,
    /// Trigger as soon as the source is selected.
    #[default]
    Now,
    Ch1Rising,
    Ch1Falling,
    ExternalRising,
    ExternalFalling,
}

impl AcquisitionTrigger {
    pub(crate) fn scpi_name(self) -> &'static str {
        match self {
            Self::Disabled        => "DISABLED",
            Self::Now             => "NOW",
            Self::Ch1Rising       => "CH1_PE",
            Self::Ch1Falling      => "CH1_NE",
            Self::ExternalRising  => "EXT_PE",
            Self::ExternalFalling => "EXT_NE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfiguration {
    pub kind: WaveformKind,
    /// Frequency in Hz.
    pub frequency: f64,
    /// Amplitude in volts.
    pub amplitude: f64,
    /// Phase in degrees.
    pub phase: f64,
    /// DC offset in volts.
    pub offset: f64,
    pub mode: GeneratorMode,
    pub trigger: GeneratorTrigger,
}

impl Default for GeneratorConfiguration {
    fn default() -> Self {
        Self {
            kind: WaveformKind::Sine,
            frequency: 1e3,
            amplitude: 0.5,
            phase: 0.0,
            offset: 0.0,
            mode: GeneratorMode::Continuous,
            trigger: GeneratorTrigger::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionConfiguration {
    pub gain: [Gain; 2],
    pub decimation: crate::Decimation,
    /// Position of the trigger relative to the buffer, in samples. With the default of
    /// `BUFFER_SIZE / 2` the trigger is at the very beginning of the buffer that is read out.
    pub trigger_delay: i32,
    pub trigger: AcquisitionTrigger,
    pub averaging: bool,
}

impl Default for AcquisitionConfiguration {
    fn default() -> Self {
        Self {
            gain: [Gain::High; 2],
            decimation: crate::Decimation::Dec1,
            trigger_delay: (BUFFER_SIZE / 2) as i32,
            trigger: AcquisitionTrigger::Now,
            averaging: false,
        }
    }
}

impl AcquisitionConfiguration {
    /// Trigger delay that places the trigger event at sample 200 of the buffer.
    pub const PRETRIGGER_DELAY: i32 = (BUFFER_SIZE / 2) as i32 - 200;
}

/// Waits inserted around each measurement point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Upper bound on the time spent polling for the trigger.
    pub trigger_timeout: Duration,
    /// Pause between trigger polls; zero polls back to back.
    pub poll_interval: Duration,
    /// Time for the input high-pass filters to settle after the drive is enabled.
    pub settling: Duration,
    /// Time a chain leader gives followers to arm before firing the shared trigger line.
    pub chain_leader_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            trigger_timeout: Duration::from_secs(10),
            poll_interval: Duration::ZERO,
            settling: Duration::from_millis(10),
            chain_leader_delay: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channel_set() {
        let both = ChannelSet::Ch1 | ChannelSet::Ch2;
        assert_eq!(both.channels().collect::<Vec<_>>(), [Channel::Ch1, Channel::Ch2]);
        assert_eq!(ChannelSet::Ch2.channels().collect::<Vec<_>>(), [Channel::Ch2]);
        assert_eq!(ChannelSet::empty().channels().count(), 0);
    }

    #[test]
    fn test_pretrigger_delay() {
        assert_eq!(AcquisitionConfiguration::PRETRIGGER_DELAY, 7992);
        assert_eq!(AcquisitionConfiguration::default().trigger_delay, 8192);
    }
}
