//! Drives one acquisition from configuration to a complete, settled pair of buffers.
//!
//! The digitizer records into a circular buffer continuously once started. To be sure the
//! buffer read out is filled entirely with samples taken after the trigger event, the
//! acquisition goes through these states:
//!
//! ```text
//! Configuring -> Armed -> Triggered -> Full -> Read -> Idle
//! ```
//!
//! * `Armed`: the digitizer was started and one buffer duration has passed, so the
//!   pre-trigger ("look ahead") part of the buffer is valid;
//! * `Triggered`: the digitizer reported the trigger event;
//! * `Full`: one more buffer duration has passed since the trigger;
//! * `Read`: both channels were read out.
//!
//! Waiting for the trigger is bounded by `Timing::trigger_timeout`.

use std::time::{Duration, Instant};

use crate::{Error, Result};
use crate::config::{AcquisitionConfiguration, AcquisitionTrigger, Channel, Timing, BUFFER_SIZE};
use crate::capture::{Waveform, WaveformPair};
use crate::session::{AcquisitionSession, TriggerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Configuring,
    Armed,
    Triggered,
    Full,
    Read,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Software trigger issued right after the look-ahead buffer has filled.
    Immediate,
    /// Hardware trigger; the caller causes the edge after `Acquisition::arm` returns.
    External(AcquisitionTrigger),
}

#[derive(Debug)]
pub struct Acquisition<'a, S: AcquisitionSession> {
    session: &'a mut S,
    config: AcquisitionConfiguration,
    mode: TriggerMode,
    timing: Timing,
    state: AcquisitionState,
    sample_rate: f64,
}

impl<'a, S: AcquisitionSession> Acquisition<'a, S> {
    pub fn new(
        session: &'a mut S,
        config: AcquisitionConfiguration,
        mode: TriggerMode,
        timing: Timing,
    ) -> Acquisition<'a, S> {
        Acquisition {
            session,
            config,
            mode,
            timing,
            state: AcquisitionState::Idle,
            sample_rate: config.decimation.sample_rate(),
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Sample rate reported by the digitizer once armed.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Access the instrument between steps, e.g. to fire an external trigger.
    pub fn session(&mut self) -> &mut S {
        self.session
    }

    /// Time it takes the digitizer to fill its buffer at the current sample rate.
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(BUFFER_SIZE as f64 / self.sample_rate)
    }

    fn transition(&mut self, from: AcquisitionState, to: AcquisitionState) {
        assert_eq!(self.state, from, "acquisition step out of order");
        log::debug!("acquisition: {:?} -> {:?}", from, to);
        self.state = to;
    }

    /// Return to `Idle` after a failed step, so that the acquisition can be retried.
    fn abort(&mut self, error: Error) -> Error {
        log::warn!("acquisition: {:?} step failed: {}", self.state, error);
        self.state = AcquisitionState::Idle;
        error
    }

    fn start(&mut self) -> Result<()> {
        self.session.reset_acquisition()?;
        self.session.configure_acquisition(&self.config)?;
        if let TriggerMode::External(trigger) = self.mode {
            self.session.set_trigger(trigger)?;
        }
        self.session.start_acquisition()?;
        self.sample_rate = self.session.effective_sample_rate()?;
        Ok(())
    }

    /// Configure and start the digitizer, then wait for the look-ahead part of the buffer.
    pub fn arm(&mut self) -> Result<()> {
        self.transition(AcquisitionState::Idle, AcquisitionState::Configuring);
        self.start().map_err(|error| self.abort(error))?;
        let look_ahead = self.buffer_duration();
        log::debug!("acquisition: {} S/s, waiting {:?} for look-ahead buffer",
            self.sample_rate, look_ahead);
        self.session.wait(look_ahead);
        self.transition(AcquisitionState::Configuring, AcquisitionState::Armed);
        Ok(())
    }

    /// Poll the digitizer until it reports the trigger event.
    pub fn wait_for_trigger(&mut self) -> Result<()> {
        assert_eq!(self.state, AcquisitionState::Armed, "acquisition step out of order");
        if let TriggerMode::Immediate = self.mode {
            self.session.set_trigger(AcquisitionTrigger::Now).map_err(|error| self.abort(error))?;
        }
        let started = Instant::now();
        let mut polls = 0usize;
        loop {
            polls += 1;
            let state = self.session.poll_trigger_state().map_err(|error| self.abort(error))?;
            if state == TriggerState::Triggered { break }
            let waited = started.elapsed();
            if waited >= self.timing.trigger_timeout {
                log::warn!("acquisition: no trigger after {} polls in {:?}", polls, waited);
                self.state = AcquisitionState::Idle;
                return Err(Error::TriggerTimeout { waited })
            }
            self.session.wait(self.timing.poll_interval);
        }
        log::debug!("acquisition: triggered after {} polls", polls);
        self.transition(AcquisitionState::Armed, AcquisitionState::Triggered);
        Ok(())
    }

    /// Wait until the post-trigger part of the buffer has been recorded.
    pub fn wait_until_full(&mut self) -> Result<()> {
        assert_eq!(self.state, AcquisitionState::Triggered, "acquisition step out of order");
        let duration = self.buffer_duration();
        self.session.wait(duration);
        self.transition(AcquisitionState::Triggered, AcquisitionState::Full);
        Ok(())
    }

    /// Read out both channels.
    pub fn read(&mut self) -> Result<WaveformPair> {
        self.transition(AcquisitionState::Full, AcquisitionState::Read);
        let mut read_channel = |channel| -> Result<Waveform> {
            let samples = self.session.read_channel_voltages(channel, BUFFER_SIZE)?;
            if samples.is_empty() {
                log::warn!("acquisition: {:?} returned no samples", channel);
                return Err(Error::EmptyBuffer)
            } else if samples.len() < BUFFER_SIZE {
                log::warn!("acquisition: {:?} returned {} of {} samples",
                    channel, samples.len(), BUFFER_SIZE);
            }
            Ok(Waveform::new(channel, self.sample_rate, samples))
        };
        let ch1 = read_channel(Channel::Ch1);
        let ch2 = read_channel(Channel::Ch2);
        self.transition(AcquisitionState::Read, AcquisitionState::Idle);
        Ok(WaveformPair { ch1: ch1?, ch2: ch2? })
    }

    /// Run all steps for an acquisition that needs nothing done between them.
    pub fn acquire(&mut self) -> Result<WaveformPair> {
        self.arm()?;
        self.wait_for_trigger()?;
        self.wait_until_full()?;
        self.read()
    }
}
