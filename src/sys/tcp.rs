use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::{Error, Result};
use crate::config::BUFFER_SIZE;

/// Port the instrument's SCPI server listens on.
pub const SCPI_PORT: u16 = 5000;

const TERMINATOR: &str = "\r\n";

/// Longest time a single reply may take; acquisition waits happen client-side, so replies
/// are expected promptly.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest binary block accepted, one buffer of 32-bit samples.
const MAX_BLOCK_SIZE: usize = BUFFER_SIZE * 4;

#[derive(Debug)]
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpTransport {
    /// Connect to `host`, which may include a port; `SCPI_PORT` is used otherwise.
    pub fn connect(host: &str) -> Result<TcpTransport> {
        let address = if host.contains(':') { host.to_owned() } else { format!("{}:{}", host, SCPI_PORT) };
        let socket_address = address.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", address))
        })?;
        log::debug!("connecting to {}", socket_address);
        let stream = TcpStream::connect_timeout(&socket_address, REPLY_TIMEOUT)?;
        stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(TcpTransport { reader: BufReader::new(stream), writer })
    }
}

impl super::Transport for TcpTransport {
    fn send(&mut self, command: &str) -> Result<()> {
        log::trace!("> {}", command);
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(TERMINATOR.as_bytes())?;
        Ok(())
    }

    fn receive_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into())
        }
        let line = line.trim_end_matches(['\r', '\n']).to_owned();
        log::trace!("< {}", line);
        Ok(line)
    }

    fn receive_block(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.reader.read_exact(&mut header)?;
        if header[0] != b'#' || !header[1].is_ascii_digit() || header[1] == b'0' {
            return Err(Error::Protocol(format!("bad block header {:02x?}", header)))
        }
        let mut length = vec![0u8; (header[1] - b'0') as usize];
        self.reader.read_exact(&mut length)?;
        let length = std::str::from_utf8(&length).ok()
            .and_then(|length| length.parse::<usize>().ok())
            .ok_or_else(|| Error::Protocol(format!("bad block length {:02x?}", length)))?;
        if length > MAX_BLOCK_SIZE {
            return Err(Error::Protocol(format!("block of {} bytes exceeds {}", length, MAX_BLOCK_SIZE)))
        }
        let mut data = vec![0u8; length];
        self.reader.read_exact(&mut data)?;
        // the block is followed by the usual line terminator
        self.receive_line()?;
        log::trace!("< #{} bytes", length);
        Ok(data)
    }
}
