//! Tab-separated measurement records.
//!
//! Demodulated records are preceded by a header naming the columns:
//!
//! ```text
//! f  samplerate  A1 A2 A22  ph2 ph22  dc1 dc2 dc22  err1 err2 err22
//! ```
//!
//! Full-data records have no header; each captured channel becomes one line of metadata
//! columns, the channel number, and then every sample.

use std::io::Write;

use crate::Result;
use crate::capture::WaveformPair;
use crate::measure::{Component, ResponseRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Demodulated,
    FullData,
}

#[derive(Debug)]
pub struct RecordWriter<W: Write> {
    writer: W,
    mode: OutputMode,
    records: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W, mode: OutputMode) -> RecordWriter<W> {
        RecordWriter { writer, mode, records: 0 }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Number of records written so far.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write the column header for demodulated records of `components`. Nothing is written
    /// in full-data mode.
    pub fn write_header(&mut self, components: &[Component]) -> Result<()> {
        if self.mode == OutputMode::FullData {
            return Ok(())
        }
        let labels = components.iter().map(Component::label).collect::<Vec<_>>();
        let mut columns = vec!["f".to_owned(), "samplerate".to_owned()];
        columns.extend(labels.iter().map(|label| format!("A{}", label)));
        // the reference component has no relative phase
        columns.extend(labels.iter().skip(1).map(|label| format!("ph{}", label)));
        columns.extend(labels.iter().map(|label| format!("dc{}", label)));
        columns.extend(labels.iter().map(|label| format!("err{}", label)));
        writeln!(self.writer, "{}", columns.join("\t"))?;
        Ok(())
    }

    pub fn write_response(&mut self, record: &ResponseRecord) -> Result<()> {
        let mut columns = vec![format!("{:e}", record.frequency), format!("{:.6}", record.sample_rate)];
        let results = &record.components;
        columns.extend(results.iter().map(|result| format!("{:e}", result.amplitude)));
        columns.extend(results.iter().skip(1).map(|result| format!("{:e}", result.phase)));
        columns.extend(results.iter().map(|result| format!("{:e}", result.offset)));
        columns.extend(results.iter().map(|result| format!("{:e}", result.error)));
        writeln!(self.writer, "{}", columns.join("\t"))?;
        self.records += 1;
        Ok(())
    }

    /// Write one line per channel of `pair`, each starting with `metadata`. Channel numbers
    /// are shifted by `channel_offset` so that output of several instruments can be merged.
    pub fn write_waveforms(&mut self, metadata: &[f64], pair: &WaveformPair, channel_offset: u32)
            -> Result<()> {
        for waveform in pair.iter() {
            let mut line = String::new();
            for value in metadata {
                line.push_str(&format!("{:.6}\t", value));
            }
            line.push_str(&format!("{}", waveform.channel().number() + channel_offset));
            for sample in waveform.samples() {
                line.push_str(&format!("\t{:.6}", sample));
            }
            writeln!(self.writer, "{}", line)?;
        }
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }
}

/// Human-readable progress line for the status stream, e.g. ` 50% 10.00kHz 0.500V`.
pub fn progress_line(percent: f64, details: &str) -> String {
    format!("{:3.0}% {}", percent, details)
}
