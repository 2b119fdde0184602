use crate::{Error, Result};
use crate::config::{
    AcquisitionConfiguration, AcquisitionTrigger, Channel, GeneratorConfiguration, GeneratorMode,
};
use crate::params::Decimation;
use crate::session::{AcquisitionSession, Pin, TriggerState};
use crate::sys::{TcpTransport, Transport};

/// Burst count the generator treats as "repeat until disabled".
const INFINITE_BURST: u32 = 65536;

/// Generator/digitizer pair controlled through its SCPI remote-control server.
#[derive(Debug)]
pub struct Device<T: Transport> {
    transport: T,
}

impl Device<TcpTransport> {
    pub fn connect(host: &str) -> Result<Device<TcpTransport>> {
        let transport = TcpTransport::connect(host)?;
        let mut device = Device::new(transport);
        let identity = device.transport.query("*IDN?")?;
        log::info!("connected to {:?}", identity);
        Ok(device)
    }
}

impl<T: Transport> Device<T> {
    pub fn new(transport: T) -> Device<T> {
        Device { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn command(&mut self, command: &str) -> Result<()> {
        log::debug!("command({:?})", command);
        self.transport.send(command)
    }

    /// Return both outputs and the digitizer to their power-on state.
    pub fn teardown(&mut self) -> Result<()> {
        self.command("GEN:RST")?;
        self.command("ACQ:RST")?;
        Ok(())
    }
}

/// Decode a binary block of big-endian IEEE 754 single precision samples.
fn decode_samples(block: &[u8]) -> Result<Vec<f32>> {
    let words = bytemuck::try_cast_slice::<u8, [u8; 4]>(block).map_err(|_|
        Error::Protocol(format!("sample block of {} bytes is not a whole number of samples",
            block.len())))?;
    Ok(words.iter().map(|&word| f32::from_be_bytes(word)).collect())
}

impl<T: Transport> AcquisitionSession for Device<T> {
    fn reset_generator(&mut self) -> Result<()> {
        self.command("GEN:RST")
    }

    fn configure_generator(&mut self, channel: Channel, config: &GeneratorConfiguration)
            -> Result<()> {
        let n = channel.number();
        self.command(&format!("SOUR{}:FUNC {}", n, config.kind.scpi_name()))?;
        self.command(&format!("SOUR{}:FREQ:FIX {}", n, config.frequency))?;
        self.command(&format!("SOUR{}:VOLT {}", n, config.amplitude))?;
        self.command(&format!("SOUR{}:PHAS {}", n, config.phase))?;
        self.command(&format!("SOUR{}:VOLT:OFFS {}", n, config.offset))?;
        match config.mode {
            GeneratorMode::Continuous => {
                self.command(&format!("SOUR{}:BURS:STAT CONTINUOUS", n))?;
            }
            GeneratorMode::Burst { count } => {
                self.command(&format!("SOUR{}:BURS:STAT BURST", n))?;
                self.command(&format!("SOUR{}:BURS:NCYC {}", n, count.unwrap_or(INFINITE_BURST)))?;
            }
        }
        self.command(&format!("SOUR{}:TRIG:SOUR {}", n, config.trigger.scpi_name()))?;
        Ok(())
    }

    fn load_arbitrary_waveform(&mut self, channel: Channel, samples: &[f32]) -> Result<()> {
        log::debug!("load_arbitrary_waveform({:?}, {} samples)", channel, samples.len());
        let data = samples.iter()
            .map(|sample| format!("{}", sample))
            .collect::<Vec<_>>()
            .join(",");
        self.transport.send(&format!("SOUR{}:TRAC:DATA:DATA {}", channel.number(), data))
    }

    fn enable_output(&mut self, channel: Channel) -> Result<()> {
        self.command(&format!("OUTPUT{}:STATE ON", channel.number()))
    }

    fn disable_output(&mut self, channel: Channel) -> Result<()> {
        self.command(&format!("OUTPUT{}:STATE OFF", channel.number()))
    }

    fn reset_acquisition(&mut self) -> Result<()> {
        self.command("ACQ:RST")
    }

    fn configure_acquisition(&mut self, config: &AcquisitionConfiguration) -> Result<()> {
        self.command("ACQ:DATA:UNITS VOLTS")?;
        self.command("ACQ:DATA:FORMAT BIN")?;
        self.command(&format!("ACQ:DEC {}", config.decimation.factor()))?;
        for channel in Channel::ALL {
            let gain = config.gain[channel.index()];
            self.command(&format!("ACQ:SOUR{}:GAIN {}", channel.number(), gain.scpi_name()))?;
        }
        self.command(&format!("ACQ:TRIG:DLY {}", config.trigger_delay))?;
        self.command(&format!("ACQ:AVG {}", if config.averaging { "ON" } else { "OFF" }))?;
        Ok(())
    }

    fn set_trigger(&mut self, trigger: AcquisitionTrigger) -> Result<()> {
        self.command(&format!("ACQ:TRIG {}", trigger.scpi_name()))
    }

    fn start_acquisition(&mut self) -> Result<()> {
        self.command("ACQ:START")
    }

    fn poll_trigger_state(&mut self) -> Result<TriggerState> {
        match self.transport.query("ACQ:TRIG:STAT?")?.trim() {
            "TD"   => Ok(TriggerState::Triggered),
            "WAIT" => Ok(TriggerState::Waiting),
            reply  => Err(Error::Protocol(format!("trigger state {:?}", reply))),
        }
    }

    fn read_channel_voltages(&mut self, channel: Channel, max_samples: usize) -> Result<Vec<f32>> {
        self.transport.send(&format!("ACQ:SOUR{}:DATA:OLD:N? {}", channel.number(), max_samples))?;
        let mut samples = decode_samples(&self.transport.receive_block()?)?;
        if samples.len() > max_samples {
            log::warn!("{:?}: instrument returned {} samples, {} requested",
                channel, samples.len(), max_samples);
            samples.truncate(max_samples);
        }
        log::debug!("read_channel_voltages({:?}) = {} samples", channel, samples.len());
        Ok(samples)
    }

    fn effective_sample_rate(&mut self) -> Result<f64> {
        let reply = self.transport.query("ACQ:DEC?")?;
        let decimation = reply.trim().parse::<u32>().ok()
            .and_then(Decimation::from_factor)
            .ok_or_else(|| Error::Protocol(format!("decimation {:?}", reply)))?;
        Ok(decimation.sample_rate())
    }

    fn set_pin_output(&mut self, pin: Pin) -> Result<()> {
        self.command(&format!("DIG:PIN:DIR OUT,{}", pin.scpi_name()))
    }

    fn set_pin_input(&mut self, pin: Pin) -> Result<()> {
        self.command(&format!("DIG:PIN:DIR IN,{}", pin.scpi_name()))
    }

    fn set_pin(&mut self, pin: Pin, high: bool) -> Result<()> {
        self.command(&format!("DIG:PIN {},{}", pin.scpi_name(), high as u8))
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use super::*;
    use crate::config::{Gain, GeneratorTrigger, WaveformKind};

    #[derive(Debug, Default)]
    struct MockTransport {
        sent: Vec<String>,
        lines: VecDeque<String>,
        blocks: VecDeque<Vec<u8>>,
    }

    impl Transport for MockTransport {
        fn send(&mut self, command: &str) -> Result<()> {
            self.sent.push(command.to_owned());
            Ok(())
        }

        fn receive_line(&mut self) -> Result<String> {
            self.lines.pop_front()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into())
        }

        fn receive_block(&mut self) -> Result<Vec<u8>> {
            self.blocks.pop_front()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into())
        }
    }

    fn device() -> Device<MockTransport> {
        Device::new(MockTransport::default())
    }

    #[test]
    fn test_configure_generator_burst() {
        let mut device = device();
        device.configure_generator(Channel::Ch2, &GeneratorConfiguration {
            kind: WaveformKind::Arbitrary,
            frequency: 7629.39453125,
            amplitude: 1.0,
            mode: GeneratorMode::Burst { count: None },
            trigger: GeneratorTrigger::ExternalFalling,
            ..Default::default()
        }).unwrap();
        assert_eq!(device.into_inner().sent, [
            "SOUR2:FUNC ARBITRARY",
            "SOUR2:FREQ:FIX 7629.39453125",
            "SOUR2:VOLT 1",
            "SOUR2:PHAS 0",
            "SOUR2:VOLT:OFFS 0",
            "SOUR2:BURS:STAT BURST",
            "SOUR2:BURS:NCYC 65536",
            "SOUR2:TRIG:SOUR EXT_NE",
        ]);
    }

    #[test]
    fn test_configure_acquisition() {
        let mut device = device();
        device.configure_acquisition(&AcquisitionConfiguration {
            gain: [Gain::Low, Gain::High],
            decimation: Decimation::Dec64,
            trigger_delay: AcquisitionConfiguration::PRETRIGGER_DELAY,
            ..Default::default()
        }).unwrap();
        let sent = device.into_inner().sent;
        assert!(sent.contains(&"ACQ:DEC 64".to_owned()));
        assert!(sent.contains(&"ACQ:SOUR1:GAIN LV".to_owned()));
        assert!(sent.contains(&"ACQ:SOUR2:GAIN HV".to_owned()));
        assert!(sent.contains(&"ACQ:TRIG:DLY 7992".to_owned()));
        assert!(sent.contains(&"ACQ:AVG OFF".to_owned()));
        // selecting the trigger source arms the trigger, so it is left to set_trigger
        assert!(!sent.iter().any(|command| command.starts_with("ACQ:TRIG ")));
    }

    #[test]
    fn test_poll_trigger_state() {
        let mut device = device();
        device.transport.lines.extend(["WAIT", "TD", "??"].map(String::from));
        assert_eq!(device.poll_trigger_state().unwrap(), TriggerState::Waiting);
        assert_eq!(device.poll_trigger_state().unwrap(), TriggerState::Triggered);
        assert!(matches!(device.poll_trigger_state(), Err(Error::Protocol(_))));
        assert_eq!(device.transport.sent, ["ACQ:TRIG:STAT?"; 3]);
    }

    #[test]
    fn test_read_channel_voltages() {
        let mut device = device();
        let block = [0.5f32, -1.25, 2.0].iter()
            .flat_map(|sample| sample.to_be_bytes())
            .collect::<Vec<u8>>();
        device.transport.blocks.push_back(block);
        let samples = device.read_channel_voltages(Channel::Ch1, 2).unwrap();
        assert_eq!(samples, [0.5, -1.25]);
        assert_eq!(device.transport.sent, ["ACQ:SOUR1:DATA:OLD:N? 2"]);
    }

    #[test]
    fn test_read_misaligned_block() {
        let mut device = device();
        device.transport.blocks.push_back(vec![0u8; 7]);
        assert!(matches!(device.read_channel_voltages(Channel::Ch2, 16),
            Err(Error::Protocol(_))));
    }

    #[test]
    fn test_effective_sample_rate() {
        let mut device = device();
        device.transport.lines.extend(["8", "3"].map(String::from));
        assert_eq!(device.effective_sample_rate().unwrap(), 125e6 / 8.0);
        assert!(matches!(device.effective_sample_rate(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_pins() {
        let mut device = device();
        device.set_pin_output(Pin::Dio0N).unwrap();
        device.set_pin(Pin::Dio0N, false).unwrap();
        device.set_pin_input(Pin::Dio0P).unwrap();
        device.teardown().unwrap();
        assert_eq!(device.into_inner().sent, [
            "DIG:PIN:DIR OUT,DIO0_N",
            "DIG:PIN DIO0_N,0",
            "DIG:PIN:DIR IN,DIO0_P",
            "GEN:RST",
            "ACQ:RST",
        ]);
    }
}
