mod sys;
mod config;
mod params;
mod range;
mod session;
mod capture;
mod trigger;
mod device;
mod sim;
mod sweep;
mod measure;
mod output;

pub mod demod;

use std::io;
use std::time::Duration;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Protocol(String),
    InvalidRange(String),
    EmptyBuffer,
    TriggerTimeout { waited: Duration },
    Other(Box<dyn std::error::Error + Sync + Send + 'static>),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(io_error) =>
                write!(f, "instrument I/O error: {}", io_error),
            Self::Protocol(message) =>
                write!(f, "unexpected instrument reply: {}", message),
            Self::InvalidRange(message) =>
                write!(f, "invalid range: {}", message),
            Self::EmptyBuffer =>
                write!(f, "waveform buffer is empty"),
            Self::TriggerTimeout { waited } =>
                write!(f, "acquisition did not trigger within {:?}", waited),
            Self::Other(error) =>
                write!(f, "{}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            &Self::Io(ref io_error) => Some(io_error),
            &Self::Other(ref error) => Some(error.as_ref()),
            _ => None
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(error) => error,
            Err(error) => Error::Io(error),
        }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Io(io_error) =>
                io_error,
            Error::TriggerTimeout { .. } =>
                Self::new(io::ErrorKind::TimedOut, error),
            Error::InvalidRange(_) =>
                Self::new(io::ErrorKind::InvalidInput, error),
            error =>
                Self::new(io::ErrorKind::Other, error),
        }
    }
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use config::{
    BASE_SAMPLE_RATE,
    BUFFER_SIZE,
    Channel,
    ChannelSet,
    Gain,
    WaveformKind,
    GeneratorMode,
    GeneratorTrigger,
    AcquisitionTrigger,
    GeneratorConfiguration,
    AcquisitionConfiguration,
    Timing,
};

pub use params::Decimation;

pub use range::{
    RangeSpec,
    Scale,
};

pub use session::{
    AcquisitionSession,
    TriggerState,
    Pin,
};

pub use capture::{
    Waveform,
    WaveformPair,
    ttl_step,
};

pub use trigger::{
    AcquisitionState,
    Acquisition,
    TriggerMode,
};

pub use device::Device;

pub use sys::{
    Transport,
    TcpTransport,
    SCPI_PORT,
};

pub use sim::{
    LoadModel,
    SimulatedSession,
};

pub use demod::{
    Demodulation,
    Phasor,
};

pub use sweep::{
    Axis,
    Sweep,
    SweepPoint,
    progress_percent,
};

pub use measure::{
    Source,
    Component,
    ComponentSet,
    ComponentResult,
    ResponseMeasurement,
    ResponseRecord,
    DrivenCapture,
    ChainRole,
    DualToneCapture,
};

pub use output::{
    RecordWriter,
    OutputMode,
    progress_line,
};
