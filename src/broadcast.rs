//! Generic broadcast: root fans one buffer out to every team member.
//!
//! This implementation is intended for transports without an optimized
//! broadcast of their own; it is selected through
//! [`CollectiveType::Broadcast`](crate::CollectiveType) with the
//! [`Generic`](crate::ImplementationType::Generic) implementation.

use crate::collective::{receive_from_handle, Collective, CollectiveBase};
use crate::error::{Error, Result};
use crate::handle::Handle;

/// Root→all fan-out of one buffer over low-level handles.
///
/// The root sends the whole send buffer to each non-root peer in
/// participant order; non-root members receive exactly one frame from the
/// root. The only supported operation is
/// [`sendrecv`](Collective::sendrecv).
pub struct BroadcastGeneric<H> {
    base: CollectiveBase<H>,
    root: bool,
}

impl<H: Handle> BroadcastGeneric<H> {
    /// Build a broadcast participant over the assembled team state.
    pub fn new(base: CollectiveBase<H>, root: bool) -> Self {
        BroadcastGeneric { base, root }
    }
}

impl<H: Handle> Collective<H> for BroadcastGeneric<H> {
    fn base(&self) -> &CollectiveBase<H> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CollectiveBase<H> {
        &mut self.base
    }

    fn sendrecv(
        &mut self,
        sendbuf: Option<&[u8]>,
        recvbuf: Option<&mut [u8]>,
        recvsize: usize,
        _datasize: usize,
    ) -> Result<usize> {
        if self.root {
            let sendbuf = sendbuf.ok_or(Error::MissingBuffer("sendbuf"))?;
            for h in &mut self.base.participants {
                if h.send(sendbuf).is_err() {
                    return Err(Error::ConnectionReset);
                }
            }
            // The root's own copy, when it asked for one.
            if let Some(recvbuf) = recvbuf {
                if recvbuf.len() < sendbuf.len() {
                    return Err(Error::BufferTooSmall {
                        required: sendbuf.len(),
                        available: recvbuf.len(),
                    });
                }
                recvbuf[..sendbuf.len()].copy_from_slice(sendbuf);
            }
            Ok(sendbuf.len())
        } else {
            let recvbuf = recvbuf.ok_or(Error::MissingBuffer("recvbuf"))?;
            let cap = recvsize.min(recvbuf.len());
            let h = self.base.participants.first_mut().ok_or(Error::BadHandle)?;
            let res = receive_from_handle(h, &mut recvbuf[..cap])?;
            if res == 0 {
                h.close(true, false);
            }
            Ok(res)
        }
    }

    fn close(&mut self, _close_wr: bool, _close_rd: bool) {
        // The root issues an explicit close to every non-root member; the
        // non-root side sees the implicit EOS when the root's write side
        // goes down, so its close is a no-op.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inproc::{star_topology, InprocHandle};
    use std::thread;

    fn run_team<F>(n: usize, payload: &'static [u8], leaf_check: F)
    where
        F: Fn(usize, usize, &[u8]) + Send + Sync + Copy + 'static,
    {
        let (root_side, leaf_side) = star_topology(n);

        let root = thread::spawn(move || {
            let base = CollectiveBase::new(root_side, n, 0, 1);
            let mut bcast = BroadcastGeneric::new(base, true);
            let sent = bcast.sendrecv(Some(payload), None, 0, 1).unwrap();
            assert_eq!(sent, payload.len());
            bcast.close(true, false);
        });

        let mut leaves = Vec::new();
        for (i, h) in leaf_side.into_iter().enumerate() {
            leaves.push(thread::spawn(move || {
                let base = CollectiveBase::new(vec![h], n, i + 1, 1);
                let mut bcast = BroadcastGeneric::new(base, false);
                let mut recv = vec![0u8; payload.len()];
                let len = recv.len();
                let got = bcast.sendrecv(None, Some(&mut recv), len, 1).unwrap();
                leaf_check(i + 1, got, &recv);
            }));
        }

        root.join().unwrap();
        for t in leaves {
            t.join().unwrap();
        }
    }

    #[test]
    fn every_rank_receives_the_root_buffer() {
        run_team(4, &[0xAA, 0xBB, 0xCC], |_rank, got, recv| {
            assert_eq!(got, 3);
            assert_eq!(recv, &[0xAA, 0xBB, 0xCC]);
        });
    }

    #[test]
    fn root_copies_into_its_own_recvbuf() {
        let (root_side, _leaves) = star_topology(2);
        let base = CollectiveBase::new(root_side, 2, 0, 1);
        let mut bcast = BroadcastGeneric::new(base, true);

        let send = [1u8, 2, 3, 4];
        let mut recv = [0u8; 4];
        let sent = bcast.sendrecv(Some(&send), Some(&mut recv), 4, 1).unwrap();
        assert_eq!(sent, 4);
        assert_eq!(recv, send);
    }

    #[test]
    fn root_close_reads_as_eos_on_the_leaf() {
        let (mut root_side, leaf_side) = star_topology(2);
        root_side[0].close(true, false);
        drop(root_side);

        let mut leaf = leaf_side;
        let base = CollectiveBase::new(vec![leaf.remove(0)], 2, 1, 1);
        let mut bcast = BroadcastGeneric::new(base, false);
        let mut recv = [0u8; 4];
        assert_eq!(bcast.sendrecv(None, Some(&mut recv), 4, 1).unwrap(), 0);
    }

    #[test]
    fn missing_buffers_are_argument_errors() {
        let base = CollectiveBase::new(Vec::<InprocHandle>::new(), 2, 0, 1);
        let mut root = BroadcastGeneric::new(base, true);
        assert_eq!(
            root.sendrecv(None, None, 0, 1).unwrap_err(),
            Error::MissingBuffer("sendbuf")
        );

        let base = CollectiveBase::new(Vec::<InprocHandle>::new(), 2, 1, 1);
        let mut leaf = BroadcastGeneric::new(base, false);
        assert_eq!(
            leaf.sendrecv(Some(&[1]), None, 0, 1).unwrap_err(),
            Error::MissingBuffer("recvbuf")
        );
    }

    #[test]
    fn dead_peer_aborts_with_connection_reset() {
        let (a, b) = InprocHandle::pair();
        drop(b);
        let base = CollectiveBase::new(vec![a], 2, 0, 1);
        let mut bcast = BroadcastGeneric::new(base, true);
        assert_eq!(
            bcast.sendrecv(Some(&[1, 2]), None, 0, 1).unwrap_err(),
            Error::ConnectionReset
        );
    }
}
