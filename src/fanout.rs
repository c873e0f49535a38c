//! Streaming fan-out: one producer, many consumers.
//!
//! The root deals frames out to its leaves with a round-robin cursor; each
//! leaf sees an ordinary point-to-point stream on its single upstream
//! handle. A leaf that has signed off (EOS observed on its reverse channel)
//! is marked closed and skipped by the cursor — participants are never
//! reordered, so the rotation the remaining leaves observe stays stable.

use crate::collective::{probe_handle, receive_from_handle, Collective, CollectiveBase};
use crate::error::{Error, Result};
use crate::handle::Handle;

/// Streaming 1→N round-robin distributor over low-level handles.
///
/// The root uses [`send`](Collective::send); leaves use
/// [`probe`](Collective::probe)/[`receive`](Collective::receive) on their
/// upstream handle (`participants[0]`).
pub struct FanOutGeneric<H> {
    base: CollectiveBase<H>,
    root: bool,
    /// Next participant the round-robin send will try.
    current: usize,
}

impl<H: Handle> FanOutGeneric<H> {
    /// Build a fan-out participant over the assembled team state.
    pub fn new(base: CollectiveBase<H>, root: bool) -> Self {
        FanOutGeneric {
            base,
            root,
            current: 0,
        }
    }
}

impl<H: Handle> Collective<H> for FanOutGeneric<H> {
    fn base(&self) -> &CollectiveBase<H> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CollectiveBase<H> {
        &mut self.base
    }

    fn probe(&mut self, blocking: bool) -> Result<u64> {
        if self.base.participants.is_empty() {
            return Err(Error::ConnectionReset);
        }
        // A leaf watches its single upstream handle; at the root this
        // doubles as the reverse-channel EOS detector for leaf 0.
        probe_handle(&mut self.base.participants[0], blocking)
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        let count = self.base.participants.len();
        // Skip leaves that already signed off; one full rotation with no
        // live leaf means the group is gone.
        for _ in 0..count {
            if self.current >= count {
                self.current = 0;
            }
            let idx = self.current;
            self.current += 1;
            if self.base.participants[idx].closed_rd() {
                continue;
            }
            return self.base.participants[idx].send(buf);
        }
        Err(Error::ConnectionReset)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let h = self.base.participants.first_mut().ok_or(Error::BadHandle)?;
        receive_from_handle(h, buf)
    }

    fn close(&mut self, _close_wr: bool, _close_rd: bool) {
        // The root retires the stream for every leaf; a leaf has nothing
        // to close downstream.
        if self.root {
            for h in &mut self.base.participants {
                h.close(true, false);
            }
        }
    }

    fn into_participants(self: Box<Self>) -> Vec<H> {
        self.base.participants
    }
}
