//! Actuation loop
//!
//! Runs at a fixed frequency whether or not an operator is connected. Each
//! cycle renders whatever the mailbox holds and writes it to the actuator.
//! This is a soft real-time loop: a cycle that overruns its period is followed
//! immediately by the next one, and the lost time is not made up later.

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use rovlibgv::{ActuatorConfig, LoopStatistics, RovResult};

use crate::actuator::{ActuatorSink, HardwarePacket, HARD_STOP_PACKET};
use crate::cancel::CancelToken;
use crate::mailbox::MailboxReader;

pub struct ActuationLoop {
    sink: Box<dyn ActuatorSink>,
    reader: MailboxReader,
    period: Duration,
    max_cycles: Option<u64>,
    stats: LoopStatistics,
}

impl ActuationLoop {
    pub fn new(config: &ActuatorConfig, sink: Box<dyn ActuatorSink>, reader: MailboxReader) -> Self {
        Self {
            sink,
            reader,
            period: config.period(),
            max_cycles: config.max_cycles,
            stats: LoopStatistics::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run until cancelled, until `max_cycles` is reached, or until the
    /// actuator fails.
    ///
    /// On a normal stop the hard-stop packet is written once more before the
    /// actuator is released. A hardware error is fatal: a hard stop is still
    /// attempted, then the error is returned without retrying.
    pub fn run(mut self, token: &CancelToken) -> RovResult<LoopStatistics> {
        info!(
            "Actuation loop starting at {:.1} Hz",
            1.0 / self.period.as_secs_f64()
        );

        while !token.is_cancelled() && !self.reached_max_cycles() {
            let actuation = match self.reader.read_update() {
                Some(actuation) => {
                    debug!("actuation update #{}: {:?}", self.reader.last_sequence(), actuation);
                    actuation
                }
                None => self.reader.read(),
            };

            let packet = match HardwarePacket::render(&actuation) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Rejected actuation {:?}: {}", actuation, e);
                    self.stats.rejected += 1;
                    HARD_STOP_PACKET
                }
            };

            let start = Instant::now();
            if let Err(e) = self.sink.write(&packet) {
                error!("Actuator write failed, stopping actuation: {}", e);
                self.fail_safe();
                return Err(e);
            }
            let latency = start.elapsed();

            self.stats.cycles += 1;
            self.stats.hardware_writes += 1;

            if latency < self.period {
                if token.wait_timeout(self.period - latency) {
                    break;
                }
            } else {
                self.stats.overruns += 1;
                debug!("actuation cycle overran: write took {:?}", latency);
            }
        }

        self.shutdown()?;
        info!(
            "Actuation loop stopped: {} cycles, {} overruns, {} rejected",
            self.stats.cycles, self.stats.overruns, self.stats.rejected
        );
        Ok(self.stats)
    }

    fn reached_max_cycles(&self) -> bool {
        self.max_cycles.map_or(false, |max| self.stats.cycles >= max)
    }

    /// Final hard stop on an orderly exit. The sink is closed even when the
    /// hard stop cannot be written; the write error is reported first.
    fn shutdown(&mut self) -> RovResult<()> {
        let written = self.sink.write(&HARD_STOP_PACKET);
        if written.is_ok() {
            self.stats.hardware_writes += 1;
        }
        let closed = self.sink.close();

        written.and(closed)
    }

    /// Best effort hard stop after a hardware fault
    fn fail_safe(&mut self) {
        match self.sink.write(&HARD_STOP_PACKET) {
            Ok(()) => self.stats.hardware_writes += 1,
            Err(e) => error!("Fail-safe hard stop could not be written: {}", e),
        }
        if let Err(e) = self.sink.close() {
            warn!("Actuator close failed: {}", e);
        }
    }
}
