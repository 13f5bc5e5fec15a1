//! High-level operator client
//!
//! The vehicle only acts on the latest command it has seen, so the operator
//! side keeps re-sending the current target at a fixed rate.

use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};
use rovlibgv::{ActuationTarget, RovError, RovResult, DEFAULT_ACTUATION_HZ, MIN_ACTUATION_HZ};

use crate::connection::CommandConnection;

/// Streams the current actuation target to the vehicle from a background thread
pub struct CommandTransmitter {
    target: Arc<Mutex<ActuationTarget>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<RovResult<u64>>>,
}

impl CommandTransmitter {
    /// Connect and start sending at the default command rate
    pub fn start<A: ToSocketAddrs>(addr: A) -> RovResult<Self> {
        Self::start_with_rate(addr, DEFAULT_ACTUATION_HZ)
    }

    /// Connect and start sending `frequency_hz` frames per second
    pub fn start_with_rate<A: ToSocketAddrs>(addr: A, frequency_hz: f64) -> RovResult<Self> {
        if !frequency_hz.is_finite() || frequency_hz < MIN_ACTUATION_HZ {
            return Err(RovError::Config(format!("Invalid command rate: {}", frequency_hz)));
        }
        let period = Duration::from_secs_f64(1.0 / frequency_hz);

        let mut connection = CommandConnection::connect(addr)?;
        info!("Command transmitter connected to {}", connection.peer_addr()?);

        let target = Arc::new(Mutex::new(ActuationTarget::neutral()));
        let running = Arc::new(AtomicBool::new(true));

        let thread_target = Arc::clone(&target);
        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("command-tx".to_string())
            .spawn(move || {
                let mut sent = 0u64;
                while thread_running.load(Ordering::SeqCst) {
                    let current = *thread_target.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Err(e) = connection.send(&current) {
                        warn!("Command transmitter stopped: {}", e);
                        thread_running.store(false, Ordering::SeqCst);
                        return Err(e);
                    }
                    sent += 1;
                    thread::sleep(period);
                }
                connection.close()?;
                Ok(sent)
            })?;

        Ok(Self {
            target,
            running,
            thread_handle: Some(handle),
        })
    }

    /// Replace the target sent on the next cycle
    pub fn update(&self, target: ActuationTarget) {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = target;
    }

    /// Replace the target from signed joystick axes
    pub fn update_axes(&self, steer: i32, throttle: i32) {
        self.update(ActuationTarget::from_axes(steer, throttle));
    }

    /// Current target
    pub fn target(&self) -> ActuationTarget {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if the transmitter thread is still sending
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop sending and close the connection, which the vehicle treats as a
    /// hard stop. Returns the number of frames sent.
    pub fn stop(&mut self) -> RovResult<u64> {
        self.running.store(false, Ordering::SeqCst);

        match self.thread_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| RovError::Thread("Command transmitter join failed".to_string()))?,
            None => Ok(0),
        }
    }
}

impl Drop for CommandTransmitter {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
