use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use rpsweep::{
    Axis, ChainRole, ComponentSet, DrivenCapture, DualToneCapture, Error, OutputMode,
    RangeSpec, ResponseMeasurement, Result, Sweep, Timing,
};

/// Ranges are given as VALUE or START,COUNT,END; the endpoints are inclusive.
#[derive(Debug, Parser)]
#[command(name = "rpsweep", version, about = "Frequency response and driven capture sweeps")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv wire trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Instrument address, optionally with port (default port 5000)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Use the built-in simulated instrument instead of connecting to one
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Seconds to wait for an acquisition to trigger
    #[arg(long, global = true, default_value_t = 10.0, value_name = "SECONDS")]
    pub trigger_timeout: f64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Components {
    /// Input 1
    Single,
    /// Inputs 1 and 2
    Pair,
    /// Inputs 1 and 2, and input 2 at twice the frequency
    Harmonic,
    /// Everything in `harmonic`, and the input 2 - input 1 difference
    Full,
}

impl From<Components> for ComponentSet {
    fn from(components: Components) -> Self {
        match components {
            Components::Single   => ComponentSet::Single,
            Components::Pair     => ComponentSet::Pair,
            Components::Harmonic => ComponentSet::Harmonic,
            Components::Full     => ComponentSet::Full,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Drive output 1 with a sine and demodulate both inputs, on a log frequency scale
    Response {
        /// Drive frequency in Hz
        frequency: RangeSpec,

        /// Output complete buffers instead of demodulated data
        #[arg(long)]
        full: bool,

        /// Drive amplitude in V
        #[arg(long, default_value_t = 0.5)]
        amplitude: f64,

        /// Signals to demodulate
        #[arg(long, value_enum, default_value_t = Components::Harmonic)]
        components: Components,
    },

    /// Drive output 1 in burst mode from the external trigger and capture both inputs
    Drive {
        /// Drive frequency in Hz
        frequency: RangeSpec,
        /// Drive amplitude in V
        amplitude: RangeSpec,
        /// Drive phase in degrees
        #[arg(allow_hyphen_values = true)]
        phase: RangeSpec,
        /// Delay of the falling edge on output 2 after the trigger, in seconds
        ch2_delay: RangeSpec,

        /// Added to the channel numbers, to merge output of several instruments
        #[arg(long, default_value_t = 0)]
        channel_offset: u32,

        /// Wait for another instrument to fire the trigger
        #[arg(long)]
        follow: bool,
    },

    /// Capture both inputs from the external trigger without driving output 1
    Scope {
        /// Delay of the falling edge on output 2 after the trigger, in seconds
        ch2_delay: RangeSpec,

        /// Added to the channel numbers, to merge output of several instruments
        #[arg(long, default_value_t = 0)]
        channel_offset: u32,

        /// Wait for another instrument to fire the trigger
        #[arg(long)]
        follow: bool,
    },

    /// Drive both outputs with sines at independent frequencies and capture both inputs
    Dual {
        /// Output 1 frequency in Hz
        frequency1: RangeSpec,
        /// Output 2 frequency in Hz
        frequency2: RangeSpec,
    },
}

/// A fully validated experiment, ready to run.
#[derive(Debug)]
pub enum Experiment {
    Response { sweep: Sweep, measurement: ResponseMeasurement, mode: OutputMode },
    Drive { sweep: Sweep, capture: DrivenCapture, channel_offset: u32 },
    Scope { sweep: Sweep, capture: DrivenCapture, channel_offset: u32 },
    Dual { sweep: Sweep, capture: DualToneCapture },
}

fn role(follow: bool) -> ChainRole {
    if follow { ChainRole::Follower } else { ChainRole::Leader }
}

impl Cli {
    pub fn timing(&self) -> Result<Timing> {
        let trigger_timeout = Duration::try_from_secs_f64(self.trigger_timeout).map_err(|_|
            Error::InvalidRange(format!("trigger timeout {} s", self.trigger_timeout)))?;
        Ok(Timing { trigger_timeout, ..Default::default() })
    }

    pub fn experiment(&self) -> Result<Experiment> {
        let timing = self.timing()?;
        let experiment = match self.command {
            Command::Response { frequency, full, amplitude, components } => Experiment::Response {
                sweep: Sweep::new(vec![Axis::log("f", frequency)?])?,
                measurement: ResponseMeasurement {
                    amplitude,
                    components: components.into(),
                    timing,
                },
                mode: if full { OutputMode::FullData } else { OutputMode::Demodulated },
            },
            Command::Drive { frequency, amplitude, phase, ch2_delay, channel_offset, follow } =>
                Experiment::Drive {
                    sweep: Sweep::new(vec![
                        Axis::linear("f", frequency),
                        Axis::linear("amplitude", amplitude),
                        Axis::linear("phase", phase),
                        Axis::linear("ch2delay", ch2_delay),
                    ])?,
                    capture: DrivenCapture { role: role(follow), timing, ..Default::default() },
                    channel_offset,
                },
            Command::Scope { ch2_delay, channel_offset, follow } => Experiment::Scope {
                sweep: Sweep::new(vec![Axis::linear("ch2delay", ch2_delay)])?,
                capture: DrivenCapture { role: role(follow), timing, ..Default::default() },
                channel_offset,
            },
            Command::Dual { frequency1, frequency2 } => Experiment::Dual {
                sweep: Sweep::new(vec![
                    Axis::linear("f1", frequency1),
                    Axis::linear("f2", frequency2),
                ])?,
                capture: DualToneCapture { timing, ..Default::default() },
            },
        };
        Ok(experiment)
    }
}
