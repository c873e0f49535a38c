//! The uniform collective operation surface and its shared machinery.
//!
//! Every collective variant — synchronous ([`BroadcastGeneric`],
//! [`ScatterGeneric`], [`GatherGeneric`], [`AllGatherGeneric`],
//! [`AlltoallGeneric`]) or streaming ([`FanInGeneric`], [`FanOutGeneric`]) —
//! implements the [`Collective`] trait over a shared [`CollectiveBase`]. The
//! trait carries default implementations that reject operations a variant
//! does not support, so each variant only implements the calls that are
//! meaningful for it: `sendrecv` for the synchronous family,
//! `probe`/`send`/`receive` for the streaming one.
//!
//! The probe→receive bridge every variant leans on lives here as the free
//! functions [`probe_handle`] and [`receive_from_handle`].
//!
//! [`BroadcastGeneric`]: crate::broadcast::BroadcastGeneric
//! [`ScatterGeneric`]: crate::scatter::ScatterGeneric
//! [`GatherGeneric`]: crate::gather::GatherGeneric
//! [`AllGatherGeneric`]: crate::allgather::AllGatherGeneric
//! [`AlltoallGeneric`]: crate::alltoall::AlltoallGeneric
//! [`FanInGeneric`]: crate::fanin::FanInGeneric
//! [`FanOutGeneric`]: crate::fanout::FanOutGeneric

use tracing::error;

use crate::allgather::AllGatherGeneric;
use crate::alltoall::AlltoallGeneric;
use crate::broadcast::BroadcastGeneric;
use crate::error::{Error, Result};
use crate::fanin::FanInGeneric;
use crate::fanout::FanOutGeneric;
use crate::gather::GatherGeneric;
use crate::handle::Handle;
use crate::partition::partition_size;
use crate::scatter::ScatterGeneric;
use crate::{CollectiveType, ImplementationType};

/// State shared by every collective variant.
///
/// `participants` is the ordered handle vector the Team hands over at
/// collective-call time. For non-root members of root-centric collectives it
/// holds exactly one handle (to the root); for root members it enumerates
/// the N−1 non-root peers in ascending peer-rank order. The collective owns
/// the handles for the duration of the call; [`into_participants`] releases
/// them back to the Team afterwards.
///
/// [`into_participants`]: CollectiveBase::into_participants
pub struct CollectiveBase<H> {
    pub(crate) participants: Vec<H>,
    pub(crate) nparticipants: usize,
    pub(crate) rank: usize,
    pub(crate) uniqtag: i32,
}

impl<H: Handle> CollectiveBase<H> {
    /// Assemble the shared state for one collective call.
    pub fn new(participants: Vec<H>, nparticipants: usize, rank: usize, uniqtag: i32) -> Self {
        CollectiveBase {
            participants,
            nparticipants,
            rank,
            uniqtag,
        }
    }

    /// The tag distinguishing this collective's traffic on the team.
    pub fn uniqtag(&self) -> i32 {
        self.uniqtag
    }

    /// The ordered participant handles.
    pub fn participants(&self) -> &[H] {
        &self.participants
    }

    /// Release the handles back to their owner.
    pub fn into_participants(self) -> Vec<H> {
        self.participants
    }
}

/// The uniform operation surface every collective exposes.
///
/// Synchronous collectives implement [`sendrecv`](Collective::sendrecv) and
/// inherit rejection defaults for the streaming calls; streaming collectives
/// do the reverse. The return convention follows the handle layer:
/// non-negative byte counts on success, `Ok(0)` for end-of-stream, a
/// structured [`Error`] (with its errno tag) on failure.
pub trait Collective<H: Handle> {
    /// The shared state of this collective.
    fn base(&self) -> &CollectiveBase<H>;

    /// Mutable access to the shared state.
    fn base_mut(&mut self) -> &mut CollectiveBase<H>;

    /// True if at least one participant has something ready to be read.
    ///
    /// Protocols that stage traffic differently may override this.
    fn peek(&self) -> bool {
        self.base().participants.iter().any(|h| h.peek())
    }

    /// Reveal the next inbound frame length. `Ok(0)` reports end-of-stream
    /// for the group. Only meaningful for streaming collectives.
    fn probe(&mut self, _blocking: bool) -> Result<u64> {
        error!("probe is not supported by this collective");
        Err(Error::Unsupported("probe"))
    }

    /// Emit one frame. Only meaningful for streaming collectives.
    fn send(&mut self, _buf: &[u8]) -> Result<usize> {
        error!("send is not supported by this collective, use sendrecv");
        Err(Error::Unsupported("send"))
    }

    /// Consume one frame. Only meaningful for streaming collectives.
    fn receive(&mut self, _buf: &mut [u8]) -> Result<usize> {
        error!("receive is not supported by this collective, use sendrecv");
        Err(Error::Unsupported("receive"))
    }

    /// The single synchronous entry point for the root-centric collectives.
    ///
    /// `datasize` is the byte stride of one logical element; partitioning
    /// arithmetic is done in elements and scaled by it. `recvsize` is the
    /// receive-side byte size driving that arithmetic — it exists
    /// separately from `recvbuf` because some parties (a non-root gather
    /// member) need the aggregate size to compute their chunk without ever
    /// writing a receive buffer. Buffers the local party does not use may
    /// be `None`; when `recvbuf` is provided, at most `recvsize` bytes are
    /// written into it.
    fn sendrecv(
        &mut self,
        _sendbuf: Option<&[u8]>,
        _recvbuf: Option<&mut [u8]>,
        _recvsize: usize,
        _datasize: usize,
    ) -> Result<usize> {
        error!("sendrecv is not supported by this collective");
        Err(Error::Unsupported("sendrecv"))
    }

    /// Group-level teardown; the exact protocol is per variant.
    fn close(&mut self, close_wr: bool, close_rd: bool);

    /// The local rank within the team.
    fn team_rank(&self) -> usize {
        self.base().rank
    }

    /// The local share of `count` elements split across the team.
    fn team_partition_size(&self, count: usize) -> usize {
        partition_size(self.base().rank, count, self.base().nparticipants)
    }

    /// Backend hook invoked when the team retires the collective. A no-op
    /// for the generic family.
    fn finalize(&mut self, _flush: bool, _name: &str) {}

    /// Consume the collective and release its handles back to the Team.
    fn into_participants(self: Box<Self>) -> Vec<H>;
}

/// Probe `h` for its next inbound frame, going through the one-slot cache.
///
/// Returns the frame length, with `Ok(0)` meaning end-of-stream (either an
/// explicit EOS frame, a peer that vanished, or a connection reset — all
/// three close the affected side(s) of the handle). A successful probe
/// parks the length in the handle's cache, where the matching
/// [`receive_from_handle`] will find it; a repeated probe is answered from
/// the cache without touching the wire.
///
/// With `blocking` false, `Err(Error::WouldBlock)` reports that nothing is
/// pending yet.
pub fn probe_handle<H: Handle>(h: &mut H, blocking: bool) -> Result<u64> {
    if let Some(size) = h.probe_cache().size() {
        // Previously probed; a cached 0 means EOS was already observed.
        return Ok(size);
    }
    if h.closed_rd() {
        return Ok(0);
    }

    match h.probe(blocking) {
        // Peer vanished without sending EOS.
        Ok(None) => {
            h.close(true, true);
            Ok(0)
        }
        // Explicit EOS frame: remember it and retire the read side.
        Ok(Some(0)) => {
            h.probe_cache_mut().cache_size(0);
            h.close(false, true);
            Ok(0)
        }
        Ok(Some(size)) => {
            h.probe_cache_mut().cache_size(size);
            Ok(size)
        }
        Err(e) if e.is_connection_reset() => {
            h.close(true, true);
            Ok(0)
        }
        Err(e) => Err(e),
    }
}

/// Receive the next whole frame from `h` into `buf`.
///
/// Runs a blocking [`probe_handle`] first if no probe result is cached. A
/// frame longer than `buf` is refused with [`Error::FrameTooLarge`] rather
/// than truncated (the frame stays cached). On success the cache is cleared
/// and the frame length returned; `Ok(0)` reports end-of-stream.
pub fn receive_from_handle<H: Handle>(h: &mut H, buf: &mut [u8]) -> Result<usize> {
    let size = match h.probe_cache().size() {
        Some(size) => {
            if h.closed_rd() {
                return Ok(0);
            }
            size
        }
        None => match probe_handle(h, true)? {
            0 => return Ok(0),
            size => size,
        },
    };

    if size > buf.len() as u64 {
        error!(
            frame = size,
            capacity = buf.len(),
            "refusing receive, would deliver less data than the frame holds"
        );
        return Err(Error::FrameTooLarge {
            frame: size,
            capacity: buf.len(),
        });
    }

    h.probe_cache_mut().clear();
    h.receive(&mut buf[..size as usize])
}

/// Construct the collective implementation for one collective call.
///
/// The Team calls this once per collective operation, handing over the
/// ordered peer handles, the team size (including self), the local rank,
/// a `root` flag, and a tag unique to this call. The generic family is the
/// only one specified here; accelerated substrate backends select a
/// different [`ImplementationType`] behind the same trait.
pub fn new_collective<H: Handle + 'static>(
    ctype: CollectiveType,
    itype: ImplementationType,
    participants: Vec<H>,
    nparticipants: usize,
    root: bool,
    rank: usize,
    uniqtag: i32,
) -> Box<dyn Collective<H>> {
    // Only the generic family is implemented in this crate.
    match itype {
        ImplementationType::Generic => {}
    }

    let base = CollectiveBase::new(participants, nparticipants, rank, uniqtag);
    match ctype {
        CollectiveType::Broadcast => Box::new(BroadcastGeneric::new(base, root)),
        CollectiveType::Scatter => Box::new(ScatterGeneric::new(base, root)),
        CollectiveType::Gather => Box::new(GatherGeneric::new(base, root)),
        CollectiveType::AllGather => Box::new(AllGatherGeneric::new(base, root)),
        CollectiveType::AllToAll => Box::new(AlltoallGeneric::new(base, root)),
        CollectiveType::FanIn => Box::new(FanInGeneric::new(base, root)),
        CollectiveType::FanOut => Box::new(FanOutGeneric::new(base, root)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inproc::InprocHandle;

    #[test]
    fn probe_then_receive_consumes_exactly_that_frame() {
        let (mut a, mut b) = InprocHandle::pair();
        b.send(&[1, 2, 3, 4]).unwrap();
        b.send(&[9, 9]).unwrap();

        let size = probe_handle(&mut a, true).unwrap();
        assert_eq!(size, 4);
        assert!(a.probe_cache().is_cached());

        // A second probe is answered from the cache, not the wire.
        assert_eq!(probe_handle(&mut a, true).unwrap(), 4);

        let mut buf = [0u8; 8];
        let n = receive_from_handle(&mut a, &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        // Cache is cleared after the matching receive.
        assert!(!a.probe_cache().is_cached());

        // The next frame is still intact.
        let mut buf2 = [0u8; 2];
        assert_eq!(receive_from_handle(&mut a, &mut buf2).unwrap(), 2);
        assert_eq!(buf2, [9, 9]);
    }

    #[test]
    fn oversized_frame_is_refused_not_truncated() {
        let (mut a, mut b) = InprocHandle::pair();
        b.send(&[0xAB; 16]).unwrap();

        let mut small = [0u8; 8];
        let err = receive_from_handle(&mut a, &mut small).unwrap_err();
        assert_eq!(
            err,
            Error::FrameTooLarge {
                frame: 16,
                capacity: 8
            }
        );
        assert_eq!(err.errno(), libc::ENOMEM);

        // The frame is still cached and receivable with a big enough buffer.
        let mut big = [0u8; 16];
        assert_eq!(receive_from_handle(&mut a, &mut big).unwrap(), 16);
        assert_eq!(big, [0xAB; 16]);
    }

    #[test]
    fn eos_closes_read_side_and_is_idempotent() {
        let (mut a, mut b) = InprocHandle::pair();
        b.close(true, false); // emits EOS

        assert_eq!(probe_handle(&mut a, true).unwrap(), 0);
        assert!(a.closed_rd());

        // Once closed_rd is set, both helpers report EOS without the wire.
        assert_eq!(probe_handle(&mut a, true).unwrap(), 0);
        let mut buf = [0u8; 4];
        assert_eq!(receive_from_handle(&mut a, &mut buf).unwrap(), 0);
        assert_eq!(receive_from_handle(&mut a, &mut buf).unwrap(), 0);
    }

    #[test]
    fn vanished_peer_reads_as_eos() {
        let (mut a, b) = InprocHandle::pair();
        drop(b); // no EOS frame, the peer is just gone

        assert_eq!(probe_handle(&mut a, true).unwrap(), 0);
        assert!(a.closed_rd());
    }

    #[test]
    fn nonblocking_probe_preserves_would_block() {
        let (mut a, _b) = InprocHandle::pair();
        let err = probe_handle(&mut a, false).unwrap_err();
        assert!(err.is_would_block());
        assert_eq!(err.errno(), libc::EWOULDBLOCK);
    }

    #[test]
    fn factory_dispatches_every_variant() {
        for ctype in [
            CollectiveType::Broadcast,
            CollectiveType::Scatter,
            CollectiveType::Gather,
            CollectiveType::AllGather,
            CollectiveType::AllToAll,
            CollectiveType::FanIn,
            CollectiveType::FanOut,
        ] {
            let coll = new_collective::<InprocHandle>(
                ctype,
                ImplementationType::Generic,
                Vec::new(),
                4,
                true,
                0,
                7,
            );
            assert_eq!(coll.team_rank(), 0);
            assert_eq!(coll.base().uniqtag(), 7);
        }
    }

    #[test]
    fn team_partition_size_follows_the_policy() {
        let coll = new_collective::<InprocHandle>(
            CollectiveType::Gather,
            ImplementationType::Generic,
            Vec::new(),
            3,
            false,
            1,
            0,
        );
        // 7 elements over 3 ranks -> {3, 2, 2}; rank 1 holds 2.
        assert_eq!(coll.team_partition_size(7), 2);
        assert_eq!(coll.team_partition_size(6), 2);
        assert_eq!(coll.team_partition_size(2), 1);
    }

    #[test]
    fn synchronous_collectives_reject_streaming_calls() {
        let mut coll = new_collective::<InprocHandle>(
            CollectiveType::Broadcast,
            ImplementationType::Generic,
            Vec::new(),
            2,
            true,
            0,
            0,
        );
        assert_eq!(
            coll.probe(true).unwrap_err(),
            Error::Unsupported("probe")
        );
        assert_eq!(
            coll.send(&[1]).unwrap_err(),
            Error::Unsupported("send")
        );
        let mut buf = [0u8; 1];
        assert_eq!(
            coll.receive(&mut buf).unwrap_err(),
            Error::Unsupported("receive")
        );
    }

    #[test]
    fn streaming_collectives_reject_sendrecv() {
        for ctype in [CollectiveType::FanIn, CollectiveType::FanOut] {
            let mut coll = new_collective::<InprocHandle>(
                ctype,
                ImplementationType::Generic,
                Vec::new(),
                2,
                true,
                0,
                0,
            );
            assert_eq!(
                coll.sendrecv(None, None, 0, 1).unwrap_err(),
                Error::Unsupported("sendrecv")
            );
        }
    }
}
