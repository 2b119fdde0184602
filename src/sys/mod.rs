use crate::Result;

/// Line-oriented request/response channel to the instrument's remote-control server.
pub trait Transport {
    fn send(&mut self, command: &str) -> Result<()>;

    /// Receive one reply line, without its terminator.
    fn receive_line(&mut self) -> Result<String>;

    /// Receive one definite-length binary block (`#<digits><length><data>`), returning
    /// `data`.
    fn receive_block(&mut self) -> Result<Vec<u8>>;

    fn query(&mut self, command: &str) -> Result<String> {
        self.send(command)?;
        self.receive_line()
    }
}

mod tcp;

pub use tcp::{TcpTransport, SCPI_PORT};
