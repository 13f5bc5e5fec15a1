//! Listening endpoints for the vehicle channels
//!
//! Each channel owns one listening socket with a backlog of one: the vehicle
//! serves a single operator per channel. Waiting for an operator uses poll()
//! with a timeout so the caller can check for cancellation between waits.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsFd;
use std::time::Duration;

use log::{debug, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use rovlibgv::{RovError, RovResult};
use socket2::{Domain, Protocol, Socket, Type};

use crate::cancel::CancelToken;
use crate::config::constants::LISTEN_BACKLOG;

/// Events that can occur on an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointEvent {
    /// Data or a connection is ready
    ReadReady,
    /// Timeout occurred
    Timeout,
    /// Error or hangup reported by poll
    Error,
}

/// Bind a listening TCP socket with `SO_REUSEADDR`
pub fn bind_listener(addr: SocketAddr) -> RovResult<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    let listener: TcpListener = socket.into();
    // accept() must not block if the pending connection vanished after poll()
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Wait until `fd` is readable or `timeout` passes
pub fn wait_for_event<F: AsFd>(fd: &F, timeout: Duration) -> RovResult<EndpointEvent> {
    let mut poll_fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
    let timeout = PollTimeout::try_from(timeout).unwrap_or(PollTimeout::MAX);

    match poll(&mut poll_fds, timeout) {
        Ok(0) => Ok(EndpointEvent::Timeout),
        Ok(_) => {
            if let Some(revents) = poll_fds[0].revents() {
                if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
                    return Ok(EndpointEvent::Error);
                }
                if revents.contains(PollFlags::POLLIN) {
                    return Ok(EndpointEvent::ReadReady);
                }
            }
            Ok(EndpointEvent::Timeout)
        }
        // A signal such as SIGINT interrupted the wait; let the caller look at
        // its cancellation token.
        Err(Errno::EINTR) => Ok(EndpointEvent::Timeout),
        Err(e) => Err(RovError::Io(io::Error::from(e))),
    }
}

/// Accept one operator, waiting at most `timeout`
pub fn accept_within(listener: &TcpListener, timeout: Duration) -> RovResult<Option<(TcpStream, SocketAddr)>> {
    match wait_for_event(listener, timeout)? {
        EndpointEvent::ReadReady => {}
        EndpointEvent::Timeout => return Ok(None),
        EndpointEvent::Error => {
            return Err(RovError::Io(io::Error::new(
                io::ErrorKind::Other,
                "poll reported an error on the listening socket",
            )))
        }
    }

    match listener.accept() {
        Ok((stream, peer)) => {
            stream.set_nonblocking(false)?;
            Ok(Some((stream, peer)))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            debug!("pending connection went away before accept");
            Ok(None)
        }
        // The peer reset before we got to it; nothing to serve
        Err(e) if e.kind() == io::ErrorKind::ConnectionAborted => Ok(None),
        Err(e) => Err(accept_error(e)),
    }
}

/// Classify an accept() failure.
///
/// Only errors that mean the listening socket itself is unusable are I/O
/// errors. Everything else (descriptor or buffer exhaustion, a connection
/// that failed during the handshake) is a transport error and the listener
/// stays usable.
pub fn accept_error(e: io::Error) -> RovError {
    let listener_broken = matches!(
        e.raw_os_error().map(Errno::from_raw),
        Some(Errno::EBADF | Errno::EINVAL | Errno::ENOTSOCK | Errno::EOPNOTSUPP | Errno::EFAULT)
    );

    if listener_broken {
        RovError::Io(e)
    } else {
        RovError::Transport(e)
    }
}

/// Wait for an operator, riding out accept failures that leave the listener
/// usable. After such a failure the next attempt waits one poll interval.
pub fn accept_operator(
    listener: &TcpListener,
    poll_interval: Duration,
    token: &CancelToken,
) -> RovResult<Option<(TcpStream, SocketAddr)>> {
    retry_later(accept_within(listener, poll_interval), poll_interval, token)
}

fn retry_later<T>(result: RovResult<Option<T>>, poll_interval: Duration, token: &CancelToken) -> RovResult<Option<T>> {
    match result {
        Err(RovError::Transport(e)) => {
            warn!("accept failed: {}, still listening", e);
            token.wait_timeout(poll_interval);
            Ok(None)
        }
        other => other,
    }
}
