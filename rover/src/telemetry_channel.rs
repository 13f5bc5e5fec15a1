//! Telemetry channel
//!
//! Streams sensor snapshots to one connected operator. Each frame is a
//! 5-digit length header followed by a JSON payload. A snapshot too large for
//! the header is skipped without touching the stream.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use log::{debug, info, warn};
use rovlibgv::{
    ChannelStatistics, ConnectionState, RovError, RovResult, TelemetryChannelConfig, TelemetryFrame,
    TelemetrySnapshot,
};

use crate::cancel::CancelToken;
use crate::endpoint::{accept_operator, bind_listener};
use crate::sensors::TelemetrySource;

/// Frame `snapshot` and write it. Returns the number of bytes written.
///
/// The frame is encoded before anything is written, so an encoding error
/// leaves the writer untouched.
pub fn write_frame<W: Write>(writer: &mut W, snapshot: &TelemetrySnapshot) -> RovResult<usize> {
    let frame = TelemetryFrame::encode(snapshot)?;

    writer
        .write_all(&frame.header)
        .and_then(|_| writer.write_all(&frame.payload))
        .and_then(|_| writer.flush())
        .map_err(RovError::Transport)?;

    Ok(frame.header.len() + frame.payload.len())
}

/// Telemetry channel server
pub struct TelemetryChannel {
    config: TelemetryChannelConfig,
    listener: TcpListener,
    source: Box<dyn TelemetrySource>,
    state: ConnectionState,
    stats: ChannelStatistics,
}

impl TelemetryChannel {
    /// Bind the listening socket
    pub fn bind(config: TelemetryChannelConfig, source: Box<dyn TelemetrySource>) -> RovResult<Self> {
        info!("Creating telemetry channel, listening on {}", config.listen_addr);
        let listener = bind_listener(config.listen_addr)?;

        Ok(Self {
            config,
            listener,
            source,
            state: ConnectionState::Listening,
            stats: ChannelStatistics::new(),
        })
    }

    pub fn local_addr(&self) -> RovResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn statistics(&self) -> ChannelStatistics {
        self.stats
    }

    /// Serve operators until cancelled. A lost operator returns the channel
    /// to listening.
    pub fn run(&mut self, token: &CancelToken) -> RovResult<()> {
        info!("Telemetry channel serving on {}", self.local_addr()?);

        while !token.is_cancelled() {
            let (stream, peer) = match accept_operator(&self.listener, self.config.poll_interval, token)? {
                Some(accepted) => accepted,
                None => continue,
            };

            info!("Operator {} connected to telemetry channel", peer);
            self.state = ConnectionState::Connected;
            self.stats.connections += 1;

            let outcome = self.serve(stream, token);
            self.state = ConnectionState::Closed;

            match outcome {
                Ok(()) => info!("Telemetry to {} stopped", peer),
                Err(RovError::Transport(e)) => info!("Telemetry operator {} went away: {}", peer, e),
                Err(e) => return Err(e),
            }

            self.state = ConnectionState::Listening;
        }

        info!("Telemetry channel shutting down");
        Ok(())
    }

    fn serve(&mut self, mut stream: TcpStream, token: &CancelToken) -> RovResult<()> {
        stream
            .set_write_timeout(Some(self.config.write_timeout))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(RovError::Transport)?;

        while !token.is_cancelled() {
            let snapshot = match self.source.poll() {
                Ok(snapshot) => snapshot,
                Err(RovError::Hardware(msg)) => {
                    warn!("Telemetry source failed: {}", msg);
                    if token.wait_timeout(self.config.poll_interval) {
                        break;
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            match write_frame(&mut stream, &snapshot) {
                Ok(bytes) => {
                    self.stats.frames_sent += 1;
                    self.stats.bytes_sent += bytes as u64;
                }
                Err(RovError::Encoding(msg)) => {
                    warn!("Skipping telemetry snapshot: {}", msg);
                    self.stats.frames_rejected += 1;
                }
                Err(RovError::Transport(e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    // A stalled operator is treated as gone
                    debug!("telemetry write timed out after {:?}", self.config.write_timeout);
                    return Err(RovError::Transport(e));
                }
                Err(e) => return Err(e),
            }

            if let Some(interval) = self.config.interval {
                if token.wait_timeout(interval) {
                    break;
                }
            }
        }

        Ok(())
    }
}
