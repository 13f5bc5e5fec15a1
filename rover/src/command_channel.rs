//! Command channel
//!
//! Accepts one operator at a time, reads 8-byte command frames and publishes
//! the decoded target to the actuation mailbox. Losing the operator, for any
//! reason, publishes a hard stop.

use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};

use log::{debug, error, info, trace, warn};
use rovlibgv::{
    Actuation, ChannelStatistics, CommandChannelConfig, CommandFrame, ConnectionState,
    MalformedFramePolicy, RovError, RovResult, COMMAND_FRAME_LEN,
};

use crate::cancel::CancelToken;
use crate::endpoint::{accept_operator, bind_listener};
use crate::mailbox::MailboxWriter;

/// Result of one read attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// A complete frame arrived
    Frame(CommandFrame),
    /// No complete frame yet; bytes read so far are kept
    Pending,
    /// The peer closed the stream on a frame boundary
    Closed,
}

/// Reassembles command frames from a stream that may deliver them in pieces
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: [u8; COMMAND_FRAME_LEN],
    filled: usize,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of the current frame received so far
    pub fn pending_len(&self) -> usize {
        self.filled
    }

    /// Read until a frame is complete, the reader times out, or the peer closes.
    ///
    /// A close part way through a frame is a protocol error. Any other I/O
    /// failure is a transport error.
    pub fn poll_frame<R: Read>(&mut self, reader: &mut R) -> RovResult<ReadStatus> {
        loop {
            match reader.read(&mut self.buf[self.filled..]) {
                Ok(0) if self.filled == 0 => return Ok(ReadStatus::Closed),
                Ok(0) => {
                    let got = self.filled;
                    self.filled = 0;
                    return Err(RovError::protocol(format!(
                        "connection closed after {} of {} frame bytes",
                        got, COMMAND_FRAME_LEN
                    )));
                }
                Ok(n) => {
                    self.filled += n;
                    if self.filled == COMMAND_FRAME_LEN {
                        self.filled = 0;
                        return Ok(ReadStatus::Frame(CommandFrame(self.buf)));
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Ok(ReadStatus::Pending);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RovError::Transport(e)),
            }
        }
    }
}

/// How a connection ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    PeerClosed,
    Cancelled,
}

/// Command channel server
pub struct CommandChannel {
    config: CommandChannelConfig,
    listener: TcpListener,
    writer: MailboxWriter,
    state: ConnectionState,
    stats: ChannelStatistics,
}

impl CommandChannel {
    /// Bind the listening socket
    pub fn bind(config: CommandChannelConfig, writer: MailboxWriter) -> RovResult<Self> {
        info!("Creating command channel, listening on {}", config.listen_addr);
        let listener = bind_listener(config.listen_addr)?;

        Ok(Self {
            config,
            listener,
            writer,
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

    /// Serve operators until cancelled.
    ///
    /// Only a malformed frame under the fail-stop policy, or a failure of the
    /// listening socket itself, ends the loop with an error.
    pub fn run(&mut self, token: &CancelToken) -> RovResult<()> {
        info!("Command channel serving on {}", self.local_addr()?);

        while !token.is_cancelled() {
            let (stream, peer) = match accept_operator(&self.listener, self.config.poll_interval, token)? {
                Some(accepted) => accepted,
                None => continue,
            };

            info!("Operator {} connected to command channel", peer);
            self.state = ConnectionState::Connected;
            self.stats.connections += 1;

            let outcome = self.serve(stream, token);

            // Whatever happened, the operator is gone
            self.writer.publish(Actuation::HardStop);
            self.state = ConnectionState::Closed;

            match outcome {
                Ok(SessionEnd::PeerClosed) => info!("Operator {} disconnected, hard stop", peer),
                Ok(SessionEnd::Cancelled) => info!("Command channel cancelled with operator {} attached", peer),
                Err(RovError::Transport(e)) => warn!("Command connection from {} failed: {}, hard stop", peer, e),
                Err(e @ RovError::Protocol(_)) => {
                    self.stats.frames_rejected += 1;
                    match self.config.malformed_frame {
                        MalformedFramePolicy::FailStop => {
                            error!("Malformed command from {}: {}", peer, e);
                            return Err(e);
                        }
                        MalformedFramePolicy::SubstituteStop => {
                            warn!("Malformed command from {}: {}, dropping connection", peer, e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }

            self.state = ConnectionState::Listening;
        }

        info!("Command channel shutting down");
        Ok(())
    }

    fn serve(&mut self, mut stream: TcpStream, token: &CancelToken) -> RovResult<SessionEnd> {
        stream
            .set_read_timeout(Some(self.config.poll_interval))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(RovError::Transport)?;

        // Checked every iteration: an operator streaming faster than the read
        // timeout never produces a Pending read
        let mut frames = FrameReader::new();
        while !token.is_cancelled() {
            match frames.poll_frame(&mut stream)? {
                ReadStatus::Frame(frame) => {
                    self.stats.bytes_received += COMMAND_FRAME_LEN as u64;
                    let target = frame.decode()?;
                    trace!("{:?} -> {:?}", frame, target);
                    self.writer.publish(Actuation::Drive(target));
                    self.stats.frames_received += 1;
                }
                ReadStatus::Pending => {
                    if frames.pending_len() > 0 {
                        debug!("waiting on partial frame ({} bytes)", frames.pending_len());
                    }
                }
                ReadStatus::Closed => return Ok(SessionEnd::PeerClosed),
            }
        }

        Ok(SessionEnd::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{mailbox, MailboxReader};
    use rovlibgv::{ActuationTarget, SteerDirection, ThrottleDirection};
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Reader that replays a script of chunks and errors
    struct Script(VecDeque<io::Result<Vec<u8>>>);

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(chunk)) => {
                    assert!(chunk.len() <= buf.len());
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
            }
        }
    }

    fn script(steps: Vec<io::Result<Vec<u8>>>) -> Script {
        Script(steps.into())
    }

    fn data(bytes: &[u8]) -> io::Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn timed_out() -> io::Result<Vec<u8>> {
        Err(io::Error::from(io::ErrorKind::WouldBlock))
    }

    #[test]
    fn test_frame_across_timeouts() {
        let mut reader = script(vec![data(b"lf0"), timed_out(), data(b"50"), timed_out(), data(b"075")]);
        let mut frames = FrameReader::new();

        assert_eq!(frames.poll_frame(&mut reader).unwrap(), ReadStatus::Pending);
        assert_eq!(frames.pending_len(), 3);
        assert_eq!(frames.poll_frame(&mut reader).unwrap(), ReadStatus::Pending);
        assert_eq!(
            frames.poll_frame(&mut reader).unwrap(),
            ReadStatus::Frame(CommandFrame(*b"lf050075"))
        );
        assert_eq!(frames.poll_frame(&mut reader).unwrap(), ReadStatus::Closed);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut reader = script(vec![data(b"cs000000"), data(b"rr010"), data(b"020")]);
        let mut frames = FrameReader::new();

        assert_eq!(frames.poll_frame(&mut reader).unwrap(), ReadStatus::Frame(CommandFrame(*b"cs000000")));
        assert_eq!(frames.poll_frame(&mut reader).unwrap(), ReadStatus::Frame(CommandFrame(*b"rr010020")));
    }

    #[test]
    fn test_short_frame_before_close() {
        let mut reader = script(vec![data(b"lf05")]);
        let mut frames = FrameReader::new();
        assert!(matches!(frames.poll_frame(&mut reader), Err(RovError::Protocol(_))));
    }

    #[test]
    fn test_reset_is_transport_error() {
        let mut reader = script(vec![Err(io::Error::from(io::ErrorKind::ConnectionReset))]);
        let mut frames = FrameReader::new();
        assert!(frames.poll_frame(&mut reader).unwrap_err().is_transport());
    }

    fn loopback_config(policy: MalformedFramePolicy) -> CommandChannelConfig {
        CommandChannelConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            malformed_frame: policy,
            poll_interval: Duration::from_millis(20),
        }
    }

    fn start(policy: MalformedFramePolicy) -> (SocketAddr, MailboxReader, CancelToken, thread::JoinHandle<RovResult<()>>) {
        start_with(loopback_config(policy))
    }

    fn start_with(
        config: CommandChannelConfig,
    ) -> (SocketAddr, MailboxReader, CancelToken, thread::JoinHandle<RovResult<()>>) {
        let (writer, reader) = mailbox(Actuation::HardStop);
        let mut channel = CommandChannel::bind(config, writer).unwrap();
        let addr = channel.local_addr().unwrap();
        let token = CancelToken::new();
        let run_token = token.clone();
        let handle = thread::spawn(move || channel.run(&run_token));
        (addr, reader, token, handle)
    }

    /// Poll the mailbox until `pred` holds or two seconds pass
    fn wait_for(reader: &mut MailboxReader, pred: impl Fn(&Actuation) -> bool) -> Actuation {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let actuation = reader.read();
            if pred(&actuation) || Instant::now() > deadline {
                return actuation;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_publishes_commands_and_hard_stop_on_disconnect() {
        let (addr, mut reader, token, handle) = start(MalformedFramePolicy::FailStop);
        let expected = ActuationTarget::new(SteerDirection::Left, 50, ThrottleDirection::Forward, 75);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"lf050075").unwrap();
        assert_eq!(wait_for(&mut reader, |a| *a == Actuation::Drive(expected)), Actuation::Drive(expected));

        drop(client);
        assert_eq!(wait_for(&mut reader, Actuation::is_hard_stop), Actuation::HardStop);

        // the server is listening again
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"cs000000").unwrap();
        let neutral = Actuation::Drive(ActuationTarget::neutral());
        assert_eq!(wait_for(&mut reader, |a| *a == neutral), neutral);

        token.cancel();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_malformed_frame_fail_stop() {
        let (addr, mut reader, _token, handle) = start(MalformedFramePolicy::FailStop);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"lf050075").unwrap();
        client.write_all(b"xx000000").unwrap();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(RovError::Protocol(_))));
        assert_eq!(reader.read(), Actuation::HardStop);
    }

    #[test]
    fn test_malformed_frame_substitute_stop() {
        let (addr, mut reader, token, handle) = start(MalformedFramePolicy::SubstituteStop);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"lf050075").unwrap();
        client.write_all(b"lx000000").unwrap();

        // the bad connection is dropped and a new operator can attach
        let mut closed = Vec::new();
        client.read_to_end(&mut closed).ok();
        assert_eq!(wait_for(&mut reader, Actuation::is_hard_stop), Actuation::HardStop);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"rf001002").unwrap();
        let expected = Actuation::Drive(ActuationTarget::new(SteerDirection::Right, 1, ThrottleDirection::Forward, 2));
        assert_eq!(wait_for(&mut reader, |a| *a == expected), expected);

        token.cancel();
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_cancel_with_idle_operator() {
        let (addr, mut reader, token, handle) = start(MalformedFramePolicy::FailStop);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"cf000040").unwrap();
        wait_for(&mut reader, |a| !a.is_hard_stop());

        let start = Instant::now();
        token.cancel();
        handle.join().unwrap().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(reader.read(), Actuation::HardStop);
    }

    #[test]
    fn test_cancel_with_streaming_operator() {
        let mut config = loopback_config(MalformedFramePolicy::FailStop);
        config.poll_interval = Duration::from_millis(100);
        let (addr, mut reader, token, handle) = start_with(config);

        // 60 Hz operator: every read completes before the read timeout
        let streaming = Arc::new(AtomicBool::new(true));
        let operator_streaming = Arc::clone(&streaming);
        let operator = thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            while operator_streaming.load(Ordering::SeqCst) {
                if client.write_all(b"lf050075").is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(16));
            }
        });
        wait_for(&mut reader, |a| !a.is_hard_stop());
        thread::sleep(Duration::from_millis(250));

        let start = Instant::now();
        token.cancel();
        let result = handle.join().unwrap();
        let elapsed = start.elapsed();

        streaming.store(false, Ordering::SeqCst);
        operator.join().unwrap();

        result.unwrap();
        assert!(elapsed < Duration::from_millis(500), "cancel took {:?}", elapsed);
        assert_eq!(reader.read(), Actuation::HardStop);
    }

    #[test]
    fn test_hard_stop_within_one_poll_interval() {
        let mut config = loopback_config(MalformedFramePolicy::FailStop);
        config.poll_interval = Duration::from_millis(100);
        let poll_interval = config.poll_interval;
        let (addr, mut reader, token, handle) = start_with(config);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"rf020030").unwrap();
        wait_for(&mut reader, |a| !a.is_hard_stop());

        let start = Instant::now();
        drop(client);
        while !reader.read().is_hard_stop() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(1));
        }
        let elapsed = start.elapsed();

        assert!(elapsed <= poll_interval, "hard stop published after {:?}", elapsed);

        token.cancel();
        handle.join().unwrap().unwrap();
    }
}
