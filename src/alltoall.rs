//! Generic all-to-all: full N×N chunk exchange, staged through the root.
//!
//! Every rank's send buffer is partitioned into one chunk per destination
//! (canonical partition of `sendsize / datasize` elements). The root
//! collects every rank's whole send buffer, assembles one contiguous
//! rank-ordered output per destination, and delivers it. Correct but not
//! bandwidth-optimal; accelerated backends may replace it behind the same
//! operation contract.

use tracing::error;

use crate::collective::{receive_from_handle, Collective, CollectiveBase};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::partition::{byte_chunks, offsets};

/// Root-mediated N×N chunk exchange over low-level handles.
///
/// The only supported operation is [`sendrecv`](Collective::sendrecv).
/// After the call, rank `i` holds — at position `j * chunksize(i)` — the
/// bytes rank `j` placed at displacement `displ(i)` of its own send buffer.
pub struct AlltoallGeneric<H> {
    base: CollectiveBase<H>,
    root: bool,
}

impl<H: Handle> AlltoallGeneric<H> {
    /// Build an all-to-all participant over the assembled team state.
    pub fn new(base: CollectiveBase<H>, root: bool) -> Self {
        AlltoallGeneric { base, root }
    }

    /// Assemble destination `d`'s contiguous output: the `d`-th slice of
    /// every rank's send buffer, in ascending rank order. Rank 0 is the
    /// root's own `sendbuf`; ranks 1.. come from the staging area.
    fn assemble(
        out: &mut [u8],
        sendbuf: &[u8],
        allsend: &[u8],
        sendsize: usize,
        nparticipants: usize,
        chunksize: usize,
        displ: usize,
    ) {
        out[..chunksize].copy_from_slice(&sendbuf[displ..displ + chunksize]);
        let mut offset = chunksize;
        for j in 0..(nparticipants - 1) {
            let src = j * sendsize + displ;
            out[offset..offset + chunksize].copy_from_slice(&allsend[src..src + chunksize]);
            offset += chunksize;
        }
    }
}

impl<H: Handle> Collective<H> for AlltoallGeneric<H> {
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
        let recvbuf = recvbuf.ok_or(Error::MissingBuffer("recvbuf"))?;

        let sendsize = sendbuf.len();
        if datasize == 0 || sendsize % datasize != 0 {
            return Err(Error::StrideMismatch {
                size: sendsize,
                datasize,
            });
        }

        let n = self.base.nparticipants;
        let chunks = byte_chunks(sendsize / datasize, n, datasize);
        let selfrecvcount = chunks[self.base.rank] * n;

        if recvsize < selfrecvcount || recvbuf.len() < selfrecvcount {
            error!(
                available = recvsize.min(recvbuf.len()),
                required = selfrecvcount,
                "alltoall receive buffer too small"
            );
            return Err(Error::BufferTooSmall {
                required: selfrecvcount,
                available: recvsize.min(recvbuf.len()),
            });
        }

        if self.root {
            // Stage every non-root rank's whole send buffer.
            let mut allsend = vec![0u8; sendsize * (n - 1)];
            for (i, h) in self.base.participants.iter_mut().enumerate() {
                let slot = &mut allsend[i * sendsize..(i + 1) * sendsize];
                let got = receive_from_handle(h, slot)?;
                if got == 0 {
                    return Ok(0);
                }
            }

            // One contiguous output per destination, in rank order.
            let displs = offsets(&chunks);
            for d in 0..n {
                let chunksize = chunks[d];
                if d == 0 {
                    Self::assemble(
                        recvbuf,
                        sendbuf,
                        &allsend,
                        sendsize,
                        n,
                        chunksize,
                        displs[d],
                    );
                } else {
                    let mut chunkbuf = vec![0u8; chunksize * n];
                    Self::assemble(
                        &mut chunkbuf,
                        sendbuf,
                        &allsend,
                        sendsize,
                        n,
                        chunksize,
                        displs[d],
                    );
                    if self.base.participants[d - 1].send(&chunkbuf).is_err() {
                        return Err(Error::ConnectionReset);
                    }
                }
            }

            Ok(selfrecvcount)
        } else {
            let h = self.base.participants.first_mut().ok_or(Error::BadHandle)?;
            if h.send(sendbuf).is_err() {
                return Err(Error::ConnectionReset);
            }

            let cap = recvsize.min(recvbuf.len());
            if receive_from_handle(h, &mut recvbuf[..cap])? == 0 {
                h.close(true, false);
            }

            Ok(selfrecvcount)
        }
    }

    fn close(&mut self, _close_wr: bool, _close_rd: bool) {
        for h in &mut self.base.participants {
            h.close(true, false);
        }
    }

    fn into_participants(self: Box<Self>) -> Vec<H> {
        self.base.participants
    }
}
