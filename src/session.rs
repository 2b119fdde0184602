use std::time::Duration;

use crate::Result;
use crate::config::{AcquisitionConfiguration, Channel, GeneratorConfiguration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Waiting,
    Triggered,
}

/// Digital I/O pins on the extension connector used for triggering chains of instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    /// External trigger input of the digitizer and generator.
    Dio0P,
    /// Shared trigger output line.
    Dio0N,
    /// Ground reference for the initializer pre-stage.
    Dio1P,
}

impl Pin {
    pub(crate) fn scpi_name(self) -> &'static str {
        match self {
            Self::Dio0P => "DIO0_P",
            Self::Dio0N => "DIO0_N",
            Self::Dio1P => "DIO1_P",
        }
    }
}

/// Operations the measurement engine needs from a generator/digitizer pair.
///
/// There is exactly one measurement in flight at a time, so implementations are driven
/// through `&mut self` and need no internal synchronization.
pub trait AcquisitionSession {
    fn reset_generator(&mut self) -> Result<()>;

    fn configure_generator(&mut self, channel: Channel, config: &GeneratorConfiguration)
        -> Result<()>;

    /// Replace the arbitrary waveform played by `channel` when configured with
    /// `WaveformKind::Arbitrary`. One period of the output spans all of `samples`.
    fn load_arbitrary_waveform(&mut self, channel: Channel, samples: &[f32]) -> Result<()>;

    fn enable_output(&mut self, channel: Channel) -> Result<()>;

    fn disable_output(&mut self, channel: Channel) -> Result<()>;

    /// Reset the digitizer, restoring its defaults and disarming the trigger.
    fn reset_acquisition(&mut self) -> Result<()>;

    /// Apply everything in `config` except the trigger source; selecting the trigger source
    /// is what arms the trigger and is done separately with [`Self::set_trigger`].
    fn configure_acquisition(&mut self, config: &AcquisitionConfiguration) -> Result<()>;

    fn set_trigger(&mut self, trigger: crate::AcquisitionTrigger) -> Result<()>;

    fn start_acquisition(&mut self) -> Result<()>;

    fn poll_trigger_state(&mut self) -> Result<TriggerState>;

    /// Read up to `max_samples` of the oldest samples of `channel`, in volts.
    fn read_channel_voltages(&mut self, channel: Channel, max_samples: usize) -> Result<Vec<f32>>;

    fn effective_sample_rate(&mut self) -> Result<f64>;

    fn set_pin_output(&mut self, pin: Pin) -> Result<()>;

    fn set_pin_input(&mut self, pin: Pin) -> Result<()>;

    fn set_pin(&mut self, pin: Pin, high: bool) -> Result<()>;

    /// Block for `duration`. Simulated instruments advance a virtual clock instead.
    fn wait(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration)
        }
    }
}
