//! Outstanding-request table keyed by 7-bit sequence number.
//!
//! Each of the 128 slots holds the completion channel of at most one
//! in-flight request. A slot is "used" while its sender is present. The
//! generation stamp lets a timed-out requester release its slot without
//! ever clobbering a reassignment that raced in between.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::error::{HalError, Result};
use crate::protocol::{Message, SEQ_MASK};

pub const SLOT_COUNT: usize = 128;

#[derive(Default)]
struct Slot {
    gen: u64,
    waiter: Option<Sender<Message>>,
}

/// Fixed table of pending requests.
pub struct SequenceTable {
    slots: [Slot; SLOT_COUNT],
    current: u8,
    next_gen: u64,
}

impl SequenceTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::default()),
            current: 0,
            next_gen: 0,
        }
    }

    /// Claim the next sequence number in round-robin order.
    ///
    /// Exactly one slot is probed; if it is still occupied by an earlier
    /// request the call fails with `Seq` and the cursor does not advance
    /// (the caller may retry once the window drains).
    pub fn reserve(&mut self) -> Result<(u8, u64, Receiver<Message>)> {
        let seq = (self.current + 1) & SEQ_MASK;
        let slot = &mut self.slots[seq as usize];
        if slot.waiter.is_some() {
            return Err(HalError::Seq);
        }

        self.next_gen += 1;
        let (tx, rx) = mpsc::channel();
        slot.gen = self.next_gen;
        slot.waiter = Some(tx);
        self.current = seq;
        Ok((seq, self.next_gen, rx))
    }

    /// Deliver a response to the waiter for `seq`.
    ///
    /// Returns false when the slot is vacant — a late response whose
    /// requester already timed out, or a sequence number never issued.
    /// Such frames are dropped by the caller.
    pub fn complete(&mut self, seq: u8, msg: Message) -> bool {
        let slot = &mut self.slots[(seq & SEQ_MASK) as usize];
        match slot.waiter.take() {
            Some(waiter) => {
                // A requester racing its own timeout may have dropped the
                // receiver already; that request still reports Timeout.
                let _ = waiter.send(msg);
                true
            }
            None => false,
        }
    }

    /// Release a slot after the wait, whatever its outcome. A stale
    /// generation means the slot was already reassigned; leave it alone.
    pub fn release(&mut self, seq: u8, gen: u64) {
        let slot = &mut self.slots[(seq & SEQ_MASK) as usize];
        if slot.gen == gen {
            slot.waiter = None;
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.waiter.is_some()).count()
    }
}

impl Default for SequenceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    fn reply(seq: u8) -> Message {
        let mut msg = Message::ask(Command::Sensor, 0);
        msg.seq = seq;
        msg
    }

    #[test]
    fn test_sequence_starts_at_one_and_wraps_past_127() {
        let mut table = SequenceTable::new();
        let (first, gen, _rx) = table.reserve().unwrap();
        assert_eq!(first, 1);
        table.release(first, gen);

        for expect in 2..=127u8 {
            let (seq, gen, _rx) = table.reserve().unwrap();
            assert_eq!(seq, expect);
            table.release(seq, gen);
        }

        let (wrapped, gen, _rx) = table.reserve().unwrap();
        assert_eq!(wrapped, 0);
        table.release(wrapped, gen);

        let (next, _, _rx) = table.reserve().unwrap();
        assert_eq!(next, 1);
    }

    #[test]
    fn test_full_window_gives_seq_error() {
        let mut table = SequenceTable::new();
        let mut held = Vec::new();
        for _ in 0..SLOT_COUNT {
            held.push(table.reserve().unwrap());
        }
        assert_eq!(table.in_flight(), SLOT_COUNT);

        // 129th outstanding request: next slot is still busy.
        assert!(matches!(table.reserve(), Err(HalError::Seq)));

        // Draining one slot frees exactly that sequence number.
        let (seq, gen, _) = held.remove(0);
        table.release(seq, gen);
        let (reused, _, _rx) = table.reserve().unwrap();
        assert_eq!(reused, seq);
    }

    #[test]
    fn test_complete_delivers_to_waiter() {
        let mut table = SequenceTable::new();
        let (seq, gen, rx) = table.reserve().unwrap();

        assert!(table.complete(seq, reply(seq)));
        assert_eq!(rx.try_recv().unwrap().seq, seq);

        // Post-wait release is idempotent with the delivery.
        table.release(seq, gen);
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn test_late_response_is_reported_vacant() {
        let mut table = SequenceTable::new();
        let (seq, gen, rx) = table.reserve().unwrap();

        // Requester times out and releases.
        drop(rx);
        table.release(seq, gen);

        assert!(!table.complete(seq, reply(seq)));
    }

    #[test]
    fn test_stale_release_does_not_clobber_reassigned_slot() {
        let mut table = SequenceTable::new();

        // Walk the cursor all the way around so the same slot is claimed
        // twice, simulating a timed-out request whose release races a
        // reassignment.
        let (seq, stale_gen, rx) = table.reserve().unwrap();
        drop(rx);
        table.release(seq, stale_gen);
        let mut last = None;
        for _ in 0..SLOT_COUNT {
            let (s, g, r) = table.reserve().unwrap();
            if s == seq {
                last = Some((s, g, r));
                break;
            }
            table.release(s, g);
        }
        let (s, _g, rx2) = last.expect("cursor returned to the slot");

        // The stale release must not free the new occupant.
        table.release(s, stale_gen);
        assert!(table.complete(s, reply(s)));
        assert_eq!(rx2.try_recv().unwrap().seq, s);
    }
}
