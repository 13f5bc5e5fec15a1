//! Connection management for operator-to-vehicle communication
//!
//! Each vehicle channel accepts a single operator at a time, so each
//! connection here owns one TCP stream.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;
use rovlibgv::{
    ActuationTarget, CommandFrame, RovError, RovResult, TelemetryFrame, TelemetrySnapshot,
    TELEMETRY_HEADER_LEN,
};

/// Map a read error to the Rover error taxonomy
fn read_error(e: io::Error) -> RovError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => RovError::Timeout,
        _ => RovError::Transport(e),
    }
}

/// Read exactly one telemetry frame.
///
/// `read_exact` keeps reading across short reads, so a header or payload split
/// over several segments is reassembled.
pub fn read_telemetry_frame<R: Read>(reader: &mut R) -> RovResult<TelemetryFrame> {
    let mut header = [0u8; TELEMETRY_HEADER_LEN];
    reader.read_exact(&mut header).map_err(read_error)?;

    let len = TelemetryFrame::declared_len(&header)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(read_error)?;

    Ok(TelemetryFrame { header, payload })
}

/// Command connection to the vehicle
pub struct CommandConnection {
    stream: TcpStream,
}

impl CommandConnection {
    /// Connect to the vehicle command channel
    pub fn connect<A: ToSocketAddrs>(addr: A) -> RovResult<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Send one actuation target
    pub fn send(&mut self, target: &ActuationTarget) -> RovResult<()> {
        let frame = CommandFrame::encode(target)?;
        self.send_frame(&frame)
    }

    /// Send a pre-encoded frame
    pub fn send_frame(&mut self, frame: &CommandFrame) -> RovResult<()> {
        debug!("sending {:?}", frame);
        self.send_raw(frame.as_bytes())
    }

    /// Send arbitrary bytes on the command stream
    pub fn send_raw(&mut self, bytes: &[u8]) -> RovResult<()> {
        self.stream.write_all(bytes).map_err(RovError::Transport)?;
        self.stream.flush().map_err(RovError::Transport)?;
        Ok(())
    }

    /// Set the write timeout
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> RovResult<()> {
        self.stream.set_write_timeout(timeout)?;
        Ok(())
    }

    pub fn peer_addr(&self) -> RovResult<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Close the connection. The vehicle treats this as a hard stop.
    pub fn close(self) -> RovResult<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(RovError::Transport(e)),
        }
    }
}

/// Telemetry connection to the vehicle
pub struct TelemetryConnection {
    stream: TcpStream,
}

impl TelemetryConnection {
    /// Connect to the vehicle telemetry channel
    pub fn connect<A: ToSocketAddrs>(addr: A) -> RovResult<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nonblocking(false)?;
        Ok(Self { stream })
    }

    /// Receive the next snapshot
    pub fn receive(&mut self) -> RovResult<TelemetrySnapshot> {
        let frame = read_telemetry_frame(&mut self.stream)?;
        debug!("received telemetry frame of {} bytes", frame.payload.len());
        frame.decode()
    }

    /// Receive the next snapshot with a timeout.
    ///
    /// A timeout part way through a frame leaves the stream out of step, so
    /// the connection should be closed after a `Timeout` error.
    pub fn receive_timeout(&mut self, timeout: Duration) -> RovResult<TelemetrySnapshot> {
        self.stream.set_read_timeout(Some(timeout))?;
        let result = self.receive();
        self.stream.set_read_timeout(None)?;
        result
    }

    /// Close the connection
    pub fn close(self) -> RovResult<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(RovError::Transport(e)),
        }
    }
}
