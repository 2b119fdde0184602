mod cli;

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;

use rpsweep::{
    AcquisitionSession, Device, DrivenCapture, LoadModel, OutputMode, RecordWriter, Result,
    SimulatedSession, progress_line,
};

use cli::{Cli, Experiment};

const EXIT_CONFIGURATION: u8 = 1;
const EXIT_SESSION: u8 = 2;

fn run_experiment<S, W>(experiment: &Experiment, session: &mut S, output: &mut RecordWriter<W>)
        -> Result<()>
    where S: AcquisitionSession, W: Write
{
    match experiment {
        Experiment::Response { sweep, measurement, mode } => {
            output.write_header(measurement.components.components())?;
            sweep.run(|point| {
                let frequency = point.values[0];
                let pair = measurement.acquire(session, frequency)?;
                let mut status = format!(" {:6.1}kHz", frequency / 1e3);
                match mode {
                    OutputMode::Demodulated => {
                        let record = measurement.analyze(frequency, &pair)?;
                        for result in record.components.iter() {
                            status.push_str(&format!("  {:5.1} mV", result.amplitude * 1e3));
                        }
                        output.write_response(&record)?;
                    }
                    OutputMode::FullData =>
                        output.write_waveforms(&[frequency, pair.sample_rate()], &pair, 0)?,
                }
                eprintln!("{}", progress_line(point.progress(), &status));
                output.flush()
            })
        }
        Experiment::Drive { sweep, capture, channel_offset } => {
            capture.prepare(session)?;
            sweep.run(|point| {
                let [frequency, amplitude, phase, delay] = point.values[..] else {
                    unreachable!()
                };
                let status = format!("{:.2}kHz {:.3}V {:.1}° {:.2}us",
                    frequency / 1e3, amplitude, phase, delay * 1e6);
                eprintln!("{}", progress_line(point.progress(), &status));
                let drive = DrivenCapture::drive(frequency, amplitude, phase);
                let pair = capture.capture(session, Some(&drive), delay)?;
                output.write_waveforms(
                    &[pair.sample_rate(), frequency, amplitude, phase, delay], &pair, *channel_offset)?;
                output.flush()
            })
        }
        Experiment::Scope { sweep, capture, channel_offset } => {
            capture.prepare(session)?;
            sweep.run(|point| {
                let delay = point.values[0];
                eprintln!("{}", progress_line(point.progress(), &format!("{:.2}us", delay * 1e6)));
                let pair = capture.capture(session, None, delay)?;
                output.write_waveforms(&[pair.sample_rate(), delay], &pair, *channel_offset)?;
                output.flush()
            })
        }
        Experiment::Dual { sweep, capture } => {
            sweep.run(|point| {
                let frequencies = [point.values[0], point.values[1]];
                eprintln!("{}", progress_line(point.progress(), &format!("{:.1}kHz {:.1}kHz",
                    frequencies[0] / 1e3, frequencies[1] / 1e3)));
                let pair = capture.capture(session, frequencies)?;
                output.write_waveforms(&frequencies, &pair, 0)?;
                output.flush()
            })
        }
    }
}

fn run<S: AcquisitionSession>(experiment: &Experiment, session: &mut S) -> Result<()> {
    let mode = match experiment {
        Experiment::Response { mode, .. } => *mode,
        _ => OutputMode::FullData,
    };
    let mut output = RecordWriter::new(io::stdout().lock(), mode);
    session.reset_generator()?;
    let result = run_experiment(experiment, session, &mut output);
    // leave the outputs off even if the sweep was cut short
    let reset = session.reset_generator();
    log::info!("{} records written", output.records());
    result.and(reset)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return if error.use_stderr() { ExitCode::from(EXIT_CONFIGURATION) } else { ExitCode::SUCCESS }
        }
    };

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .parse_default_env()
        .init();

    let experiment = match cli.experiment() {
        Ok(experiment) => experiment,
        Err(error) => {
            eprintln!("error: {}", error);
            return ExitCode::from(EXIT_CONFIGURATION)
        }
    };

    let result = match (cli.simulate, cli.host.as_deref()) {
        (true, _) =>
            run(&experiment, &mut SimulatedSession::new(LoadModel::default())),
        (false, Some(host)) =>
            Device::connect(host).and_then(|mut device| {
                let result = run(&experiment, &mut device);
                result.and(device.teardown())
            }),
        (false, None) => {
            eprintln!("error: either --host or --simulate is required");
            return ExitCode::from(EXIT_CONFIGURATION)
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {}", error);
            ExitCode::from(EXIT_SESSION)
        }
    }
}
