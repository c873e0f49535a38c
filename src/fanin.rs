//! Streaming fan-in: many producers, one consumer.
//!
//! Unlike the synchronous collectives, fan-in is not group-synchronous: the
//! root drives it through the point-to-point `probe`/`receive` pattern and
//! takes frames from whichever producer has one ready. The scan cursor
//! persists across calls, so repeated probes rotate through the producers
//! instead of always favoring the head of the vector.
//!
//! A producer that sends EOS (or vanishes) is pruned from the participant
//! set; when the set drains empty the whole group reports EOS.

use crate::collective::{receive_from_handle, Collective, CollectiveBase};
use crate::error::{Error, Result};
use crate::handle::Handle;

/// Streaming N→1 fair selector over low-level handles.
///
/// The root calls [`probe`](Collective::probe) (blocking or not) and then
/// [`receive`](Collective::receive), which consumes the frame from the
/// participant the probe selected. Non-root members use their point-to-point
/// handle directly and only come here to [`close`](Collective::close),
/// which sends EOS upstream.
pub struct FanInGeneric<H> {
    base: CollectiveBase<H>,
    root: bool,
    /// Participant index the last successful probe selected.
    probed_idx: Option<usize>,
    /// Where the next scan resumes.
    cursor: usize,
}

impl<H: Handle> FanInGeneric<H> {
    /// Build a fan-in participant over the assembled team state.
    pub fn new(base: CollectiveBase<H>, root: bool) -> Self {
        FanInGeneric {
            base,
            root,
            probed_idx: None,
            cursor: 0,
        }
    }

    /// Drop participant `idx` from the scan set and close it fully.
    fn prune(&mut self, idx: usize) {
        let mut gone = self.base.participants.remove(idx);
        gone.close(true, true);
    }
}

impl<H: Handle> Collective<H> for FanInGeneric<H> {
    fn base(&self) -> &CollectiveBase<H> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CollectiveBase<H> {
        &mut self.base
    }

    fn probe(&mut self, blocking: bool) -> Result<u64> {
        loop {
            if self.base.participants.is_empty() {
                // Every producer has closed: EOS for the entire group.
                return Ok(0);
            }

            // One pass over the current participant set, resuming at the
            // cursor. Pruning shrinks the set under the scan; the removed
            // slot's successor slides into place and is inspected next.
            let mut inspected = 0;
            while inspected < self.base.participants.len() {
                if self.cursor >= self.base.participants.len() {
                    self.cursor = 0;
                }
                let idx = self.cursor;

                match self.base.participants[idx].probe(false) {
                    Ok(Some(size)) if size > 0 => {
                        self.base.participants[idx].probe_cache_mut().cache_size(size);
                        self.probed_idx = Some(idx);
                        self.cursor = idx + 1;
                        return Ok(size);
                    }
                    // EOS, a vanished peer, or a reset: prune and go on
                    // looking for a real message.
                    Ok(Some(_)) | Ok(None) => {
                        self.prune(idx);
                    }
                    Err(e) if e.is_connection_reset() => {
                        self.prune(idx);
                    }
                    Err(e) if e.is_would_block() => {
                        self.cursor = idx + 1;
                        inspected += 1;
                    }
                    Err(e) => return Err(e),
                }

                if self.base.participants.is_empty() {
                    return Ok(0);
                }
            }

            if !blocking {
                return Err(Error::WouldBlock);
            }
            std::thread::yield_now();
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        // Reverse channel: the root pushes one frame to every producer.
        for h in &mut self.base.participants {
            h.send(buf)?;
        }
        Ok(buf.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let idx = match self.probed_idx {
            Some(idx) => idx,
            // Not probed yet: select a producer with a blocking probe.
            None => match self.probe(true)? {
                0 => return Ok(0),
                _ => self.probed_idx.ok_or(Error::BadHandle)?,
            },
        };

        let res = receive_from_handle(&mut self.base.participants[idx], buf)?;
        self.probed_idx = None;
        Ok(res)
    }

    fn close(&mut self, _close_wr: bool, _close_rd: bool) {
        // A producer signs off by sending EOS upstream; the root has
        // nothing to do until every producer has done so.
        if !self.root {
            if let Some(h) = self.base.participants.first_mut() {
                h.close(true, false);
            }
        }
    }

    fn into_participants(self: Box<Self>) -> Vec<H> {
        self.base.participants
    }
}
