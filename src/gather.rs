//! Generic gather: every member's chunk is concatenated at the root.
//!
//! The receive-side size (`recvsize`) is the aggregate byte size and must
//! be the same on every rank: each member derives its own chunk from the
//! canonical partition of `recvsize / datasize` elements, so the root knows
//! exactly how many bytes to expect from whom, in participant order.

use tracing::error;

use crate::collective::{receive_from_handle, Collective, CollectiveBase};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::partition::byte_chunks;

/// All→root concatenation of chunks over low-level handles.
///
/// The only supported operation is [`sendrecv`](Collective::sendrecv).
/// Non-root members send their partition-sized chunk to the root; the root
/// copies its own chunk first, then receives one chunk per peer into the
/// aggregate buffer at the peer's displacement.
pub struct GatherGeneric<H> {
    base: CollectiveBase<H>,
    root: bool,
}

impl<H: Handle> GatherGeneric<H> {
    /// Build a gather participant over the assembled team state.
    pub fn new(base: CollectiveBase<H>, root: bool) -> Self {
        GatherGeneric { base, root }
    }
}

impl<H: Handle> Collective<H> for GatherGeneric<H> {
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
        datasize: usize,
    ) -> Result<usize> {
        let sendbuf = sendbuf.ok_or(Error::MissingBuffer("sendbuf"))?;
        if datasize == 0 || recvsize % datasize != 0 {
            return Err(Error::StrideMismatch {
                size: recvsize,
                datasize,
            });
        }

        let chunks = byte_chunks(recvsize / datasize, self.base.nparticipants, datasize);

        if self.root {
            let selfrecvcount = chunks[0];
            if sendbuf.len() < selfrecvcount {
                error!(
                    available = sendbuf.len(),
                    required = selfrecvcount,
                    "gather send buffer too small"
                );
                return Err(Error::BufferTooSmall {
                    required: selfrecvcount,
                    available: sendbuf.len(),
                });
            }

            let recvbuf = recvbuf.ok_or(Error::MissingBuffer("recvbuf"))?;
            if recvbuf.len() < recvsize {
                return Err(Error::BufferTooSmall {
                    required: recvsize,
                    available: recvbuf.len(),
                });
            }

            recvbuf[..selfrecvcount].copy_from_slice(&sendbuf[..selfrecvcount]);

            let mut displ = selfrecvcount;
            for (i, h) in self.base.participants.iter_mut().enumerate() {
                let chunksize = chunks[i + 1];
                let got = receive_from_handle(h, &mut recvbuf[displ..displ + chunksize])?;
                if got == 0 {
                    // A peer left before contributing; the aggregate is
                    // incomplete and the call reports end-of-stream.
                    return Ok(0);
                }
                displ += chunksize;
            }

            Ok(selfrecvcount)
        } else {
            let chunksize = chunks[self.base.rank];
            if chunksize > sendbuf.len() {
                error!(
                    available = sendbuf.len(),
                    required = chunksize,
                    "gather send buffer too small"
                );
                return Err(Error::BufferTooSmall {
                    required: chunksize,
                    available: sendbuf.len(),
                });
            }

            let h = self.base.participants.first_mut().ok_or(Error::BadHandle)?;
            if h.send(&sendbuf[..chunksize]).is_err() {
                return Err(Error::ConnectionReset);
            }

            Ok(chunksize)
        }
    }

    fn close(&mut self, _close_wr: bool, _close_rd: bool) {
        // Symmetric teardown: every member closes its write side on every
        // handle it holds.
        for h in &mut self.base.participants {
            h.close(true, false);
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

    fn gather_team(n: usize, contributions: Vec<Vec<u8>>, datasize: usize) -> (usize, Vec<u8>) {
        let recvsize: usize = contributions.iter().map(Vec::len).sum();
        let (root_side, leaf_side) = star_topology(n);

        let root_send = contributions[0].clone();
        let root = thread::spawn(move || {
            let base = CollectiveBase::new(root_side, n, 0, 1);
            let mut gather = GatherGeneric::new(base, true);
            let mut recv = vec![0u8; recvsize];
            let got = gather
                .sendrecv(Some(&root_send), Some(&mut recv), recvsize, datasize)
                .unwrap();
            (got, recv)
        });

        let mut leaves = Vec::new();
        for (i, h) in leaf_side.into_iter().enumerate() {
            let send = contributions[i + 1].clone();
            leaves.push(thread::spawn(move || {
                let base = CollectiveBase::new(vec![h], n, i + 1, 1);
                let mut gather = GatherGeneric::new(base, false);
                let got = gather
                    .sendrecv(Some(&send), None, recvsize, datasize)
                    .unwrap();
                assert_eq!(got, send.len());
            }));
        }

        for t in leaves {
            t.join().unwrap();
        }
        root.join().unwrap()
    }

    #[test]
    fn chunks_concatenate_in_rank_order() {
        // 7 elements of 2 bytes over 3 ranks: bytes {6, 4, 4}.
        let a: Vec<u8> = (0xA0..0xA6).collect();
        let b: Vec<u8> = (0xB0..0xB4).collect();
        let c: Vec<u8> = (0xC0..0xC4).collect();
        let (got, recv) = gather_team(3, vec![a.clone(), b.clone(), c.clone()], 2);

        assert_eq!(got, 6);
        let mut expected = a;
        expected.extend(b);
        expected.extend(c);
        assert_eq!(recv, expected);
    }

    #[test]
    fn single_byte_elements() {
        let (got, recv) = gather_team(3, vec![vec![1, 2, 3], vec![4, 5], vec![6, 7]], 1);
        assert_eq!(got, 3);
        assert_eq!(recv, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn nonroot_rejects_short_send_buffer() {
        let base = CollectiveBase::new(Vec::<InprocHandle>::new(), 3, 1, 1);
        let mut gather = GatherGeneric::new(base, false);
        // 7 elements over 3 ranks gives rank 1 two elements; offering one
        // byte is an argument error, not a short send.
        let err = gather.sendrecv(Some(&[9]), None, 7, 1).unwrap_err();
        assert_eq!(
            err,
            Error::BufferTooSmall {
                required: 2,
                available: 1
            }
        );
    }

    #[test]
    fn ragged_recv_size_is_rejected() {
        let base = CollectiveBase::new(Vec::<InprocHandle>::new(), 3, 0, 1);
        let mut gather = GatherGeneric::new(base, true);
        let mut recv = [0u8; 7];
        let err = gather
            .sendrecv(Some(&[1, 2]), Some(&mut recv), 7, 2)
            .unwrap_err();
        assert_eq!(
            err,
            Error::StrideMismatch {
                size: 7,
                datasize: 2
            }
        );
    }

    #[test]
    fn departed_peer_reads_as_group_eos() {
        let (a, mut b) = InprocHandle::pair();
        b.close(true, false); // EOS instead of a contribution
        drop(b);

        let base = CollectiveBase::new(vec![a], 2, 0, 1);
        let mut gather = GatherGeneric::new(base, true);
        let mut recv = [0u8; 2];
        let got = gather
            .sendrecv(Some(&[7]), Some(&mut recv), 2, 1)
            .unwrap();
        assert_eq!(got, 0);
    }
}
