//! Single-slot mailbox between the command channel and the actuation loop
//!
//! Last write wins. Superseded commands are discarded, never queued: a stale
//! command is acceptable, a backlog applied late is not. Neither handle is
//! `Clone`, so there is exactly one writer and one reader.

use std::sync::{Arc, Mutex, PoisonError};

use rovlibgv::Actuation;

struct Slot {
    actuation: Actuation,
    sequence: u64,
}

/// Create a mailbox holding `initial`
pub fn mailbox(initial: Actuation) -> (MailboxWriter, MailboxReader) {
    let slot = Arc::new(Mutex::new(Slot {
        actuation: initial,
        sequence: 0,
    }));

    (
        MailboxWriter { slot: Arc::clone(&slot) },
        MailboxReader { slot, last_sequence: 0 },
    )
}

/// Write end, owned by the command channel
pub struct MailboxWriter {
    slot: Arc<Mutex<Slot>>,
}

impl MailboxWriter {
    /// Overwrite the slot. Returns the new sequence number.
    pub fn publish(&self, actuation: Actuation) -> u64 {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.actuation = actuation;
        slot.sequence += 1;
        slot.sequence
    }
}

/// Read end, owned by the actuation loop
pub struct MailboxReader {
    slot: Arc<Mutex<Slot>>,
    last_sequence: u64,
}

impl MailboxReader {
    /// Latest value, whether or not it changed since the last read
    pub fn read(&mut self) -> Actuation {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        self.last_sequence = slot.sequence;
        slot.actuation
    }

    /// Latest value only if something was published since the last read
    pub fn read_update(&mut self) -> Option<Actuation> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.sequence == self.last_sequence {
            return None;
        }
        self.last_sequence = slot.sequence;
        Some(slot.actuation)
    }

    /// Sequence number of the value returned by the last read
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}
