//! Generic scatter: root deals disjoint chunks of one buffer out to the team.
//!
//! Chunk sizes follow the canonical partition of `sendsize / datasize`
//! elements across the team (see [`partition`](crate::partition)), with the
//! root consuming the first remainder slice itself before dealing the rest
//! out in participant order.

use tracing::error;

use crate::collective::{receive_from_handle, Collective, CollectiveBase};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::partition::byte_chunks;

/// Root→all distribution of disjoint chunks over low-level handles.
///
/// The only supported operation is [`sendrecv`](Collective::sendrecv). The
/// root walks its send buffer once, front to back: its own chunk first
/// (copied into its receive buffer), then one `send` per non-root peer.
pub struct ScatterGeneric<H> {
    base: CollectiveBase<H>,
    root: bool,
}

impl<H: Handle> ScatterGeneric<H> {
    /// Build a scatter participant over the assembled team state.
    pub fn new(base: CollectiveBase<H>, root: bool) -> Self {
        ScatterGeneric { base, root }
    }
}

impl<H: Handle> Collective<H> for ScatterGeneric<H> {
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
        let recvbuf = recvbuf.ok_or(Error::MissingBuffer("recvbuf"))?;

        if !self.root {
            let cap = recvsize.min(recvbuf.len());
            let h = self.base.participants.first_mut().ok_or(Error::BadHandle)?;
            let res = receive_from_handle(h, &mut recvbuf[..cap])?;
            if res == 0 {
                h.close(true, false);
            }
            return Ok(res);
        }

        let sendbuf = sendbuf.ok_or(Error::MissingBuffer("sendbuf"))?;
        if datasize == 0 || sendbuf.len() % datasize != 0 {
            return Err(Error::StrideMismatch {
                size: sendbuf.len(),
                datasize,
            });
        }

        // One chunk per rank, remainder to the front ranks; the root is
        // rank 0, so it takes the first (and possibly widest) slice.
        let chunks = byte_chunks(sendbuf.len() / datasize, self.base.nparticipants, datasize);
        let selfsendcount = chunks[0];

        if recvsize < selfsendcount || recvbuf.len() < selfsendcount {
            error!(
                available = recvsize,
                required = selfsendcount,
                "scatter receive buffer too small"
            );
            return Err(Error::BufferTooSmall {
                required: selfsendcount,
                available: recvsize.min(recvbuf.len()),
            });
        }
        recvbuf[..selfsendcount].copy_from_slice(&sendbuf[..selfsendcount]);

        let mut offset = selfsendcount;
        for (i, h) in self.base.participants.iter_mut().enumerate() {
            let chunksize = chunks[i + 1];
            if h.send(&sendbuf[offset..offset + chunksize]).is_err() {
                return Err(Error::ConnectionReset);
            }
            offset += chunksize;
        }

        Ok(selfsendcount)
    }

    fn close(&mut self, _close_wr: bool, _close_rd: bool) {
        // Root-driven teardown, as for broadcast.
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
