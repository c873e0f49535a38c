//! Generic all-gather: gather at the root, then broadcast of the aggregate.
//!
//! Phase one is identical to [`gather`](crate::gather): the root collects
//! every member's partition-sized chunk into the aggregate buffer. Phase
//! two fans the completed aggregate back out, so every rank finishes with
//! the concatenation of all contributions in ascending rank order.

use tracing::error;

use crate::collective::{receive_from_handle, Collective, CollectiveBase};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::partition::byte_chunks;

/// Gather-then-broadcast of the concatenated result.
///
/// The only supported operation is [`sendrecv`](Collective::sendrecv).
/// Unlike plain gather, every rank supplies a real receive buffer of the
/// aggregate size, because every rank ends up holding the whole result.
pub struct AllGatherGeneric<H> {
    base: CollectiveBase<H>,
    root: bool,
}

impl<H: Handle> AllGatherGeneric<H> {
    /// Build an all-gather participant over the assembled team state.
    pub fn new(base: CollectiveBase<H>, root: bool) -> Self {
        AllGatherGeneric { base, root }
    }
}

impl<H: Handle> Collective<H> for AllGatherGeneric<H> {
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
        if datasize == 0 || recvsize % datasize != 0 {
            return Err(Error::StrideMismatch {
                size: recvsize,
                datasize,
            });
        }
        if recvbuf.len() < recvsize {
            return Err(Error::BufferTooSmall {
                required: recvsize,
                available: recvbuf.len(),
            });
        }

        let chunks = byte_chunks(recvsize / datasize, self.base.nparticipants, datasize);

        if self.root {
            let selfrecvcount = chunks[0];
            if sendbuf.len() < selfrecvcount {
                error!(
                    available = sendbuf.len(),
                    required = selfrecvcount,
                    "allgather send buffer too small"
                );
                return Err(Error::BufferTooSmall {
                    required: selfrecvcount,
                    available: sendbuf.len(),
                });
            }

            recvbuf[..selfrecvcount].copy_from_slice(&sendbuf[..selfrecvcount]);

            let mut displ = selfrecvcount;
            for (i, h) in self.base.participants.iter_mut().enumerate() {
                let chunksize = chunks[i + 1];
                let got = receive_from_handle(h, &mut recvbuf[displ..displ + chunksize])?;
                if got == 0 {
                    return Ok(0);
                }
                displ += chunksize;
            }

            // Fan the finished aggregate back out.
            for h in &mut self.base.participants {
                if h.send(&recvbuf[..recvsize]).is_err() {
                    return Err(Error::ConnectionReset);
                }
            }

            Ok(selfrecvcount)
        } else {
            let chunksize = chunks[self.base.rank];
            if chunksize > sendbuf.len() {
                error!(
                    available = sendbuf.len(),
                    required = chunksize,
                    "allgather send buffer too small"
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

            // A premature EOS here counts as a successful end-of-group.
            if receive_from_handle(h, &mut recvbuf[..recvsize])? == 0 {
                h.close(true, false);
            }

            Ok(chunksize)
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
