use crate::config::{Channel, BUFFER_SIZE};

/// Samples of one digitizer channel captured at a uniform rate.
///
/// Capacity is fixed at the hardware buffer size; a waveform never holds more than one
/// acquisition buffer worth of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    channel: Channel,
    sample_rate: f64,
    samples: Vec<f32>,
}

impl Waveform {
    pub fn new(channel: Channel, sample_rate: f64, mut samples: Vec<f32>) -> Waveform {
        if samples.len() > BUFFER_SIZE {
            log::warn!("truncating {} samples of {:?} to buffer size", samples.len(), channel);
            samples.truncate(BUFFER_SIZE);
        }
        Waveform { channel, sample_rate, samples }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples[..]
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Both digitizer channels from the same trigger event.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformPair {
    pub ch1: Waveform,
    pub ch2: Waveform,
}

impl WaveformPair {
    pub fn get(&self, channel: Channel) -> &Waveform {
        match channel {
            Channel::Ch1 => &self.ch1,
            Channel::Ch2 => &self.ch2,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.ch1.sample_rate
    }

    /// Sample-wise `ch2 - ch1`, over the samples both channels have.
    pub fn difference(&self) -> Vec<f32> {
        self.ch2.samples.iter().zip(self.ch1.samples.iter())
            .map(|(ch2, ch1)| ch2 - ch1)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waveform> {
        [&self.ch1, &self.ch2].into_iter()
    }
}

/// Step function sampled at `sample_rate`: high before `delay` seconds, low afterwards.
///
/// The first sample is always high, so that an output playing this waveform can be enabled
/// (and left to settle) well before it is triggered.
pub fn ttl_step(sample_rate: f64, delay: f64, len: usize) -> Vec<f32> {
    (0..len)
        .map(|index| {
            if index == 0 || (index as f64 / sample_rate) < delay { 1.0 } else { 0.0 }
        })
        .collect()
}
