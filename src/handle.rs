//! The point-to-point handle contract consumed by the collective engine.
//!
//! A [`Handle`] is a bidirectional, reliable, ordered, length-framed byte
//! channel to exactly one peer. The engine never sees raw streams: each
//! `send` produces one frame, each `receive` consumes one frame whole, and
//! `probe` reveals the next frame's length without consuming it. A frame of
//! length 0 is the in-band end-of-stream marker (EOS): the peer has closed
//! its write side.
//!
//! Transport construction is the surrounding layer's business; the engine
//! only requires the operations below plus two pieces of per-handle state it
//! manipulates itself — the sticky `closed_rd` flag and the one-slot
//! [`ProbeCache`].

use crate::error::Result;

/// One-slot cache of a previously probed inbound frame length.
///
/// Logically the slot belongs to the handle, but it is written by the
/// collective engine: a successful probe parks the frame length here, and
/// the matching receive takes it back out. The invariant the engine
/// maintains is that the slot is occupied iff the last probe succeeded and
/// the corresponding receive has not yet run.
///
/// A cached size of 0 records that EOS was already observed on this handle.
#[derive(Debug, Default, Clone)]
pub struct ProbeCache {
    size: Option<u64>,
}

impl ProbeCache {
    /// An empty cache.
    pub fn new() -> Self {
        ProbeCache { size: None }
    }

    /// Park a probed frame length. Overwrites any previous value.
    pub fn cache_size(&mut self, size: u64) {
        self.size = Some(size);
    }

    /// The cached length, if any, without clearing the slot.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Take the cached length out of the slot, leaving it empty.
    pub fn take_size(&mut self) -> Option<u64> {
        self.size.take()
    }

    /// Empty the slot.
    pub fn clear(&mut self) {
        self.size = None;
    }

    /// True if a probed length is parked in the slot.
    pub fn is_cached(&self) -> bool {
        self.size.is_some()
    }
}

/// A reliable, ordered, length-framed byte channel to one peer.
///
/// # Framing
///
/// * `send(buf)` emits exactly one frame of `buf.len()` bytes; an empty
///   buffer emits the EOS frame.
/// * `probe(blocking)` reveals the next frame's length without consuming
///   it: `Ok(Some(n))` for a pending frame of `n` bytes (`n == 0` is an
///   explicit EOS frame), `Ok(None)` for end-of-file without EOS (the peer
///   vanished mid-stream).
/// * `receive(buf)` consumes exactly one frame. The caller guarantees
///   `buf.len()` is at least the frame length — the engine enforces this
///   through [`probe_handle`]/[`receive_from_handle`] before ever calling
///   `receive`, refusing oversized frames instead of truncating them.
///
/// [`probe_handle`]: crate::collective::probe_handle
/// [`receive_from_handle`]: crate::collective::receive_from_handle
///
/// # State the engine touches
///
/// The only mutable per-handle state the engine manipulates is the
/// [`ProbeCache`] and the directional close flags. The engine assumes
/// exclusive access to each participant for the lifetime of a collective;
/// no locking happens at this layer.
pub trait Handle {
    /// Reveal the next inbound frame's length without consuming it.
    ///
    /// Returns `Ok(Some(size))` when a frame header is available (`size`
    /// may be 0 for an explicit EOS frame), `Ok(None)` when the peer is
    /// gone without having sent EOS, `Err(Error::WouldBlock)` when
    /// `blocking` is false and nothing is pending, and
    /// `Err(Error::ConnectionReset)` on transport failure.
    ///
    /// Once `closed_rd()` is true this must return `Ok(None)` without
    /// touching the wire.
    fn probe(&mut self, blocking: bool) -> Result<Option<u64>>;

    /// Consume the next frame into `buf`, returning the frame length.
    ///
    /// Returns `Ok(0)` for an EOS frame or when `closed_rd()` is already
    /// set. Partial delivery is not supported.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Emit one frame carrying `buf`. An empty `buf` emits EOS.
    ///
    /// Returns the number of payload bytes framed.
    fn send(&mut self, buf: &[u8]) -> Result<usize>;

    /// Cheap readiness predicate: true if a frame (or a cached probe
    /// result) can be consumed without blocking.
    fn peek(&self) -> bool;

    /// Shut down the selected direction(s). Closing the write side emits
    /// EOS to the peer; closing the read side sets the sticky `closed_rd`
    /// flag.
    fn close(&mut self, close_wr: bool, close_rd: bool);

    /// Sticky flag: once true, all probes and receives report EOF.
    fn closed_rd(&self) -> bool;

    /// The engine-owned one-slot probe cache.
    fn probe_cache(&self) -> &ProbeCache;

    /// Mutable access to the probe cache.
    fn probe_cache_mut(&mut self) -> &mut ProbeCache;
}

impl<H: Handle + ?Sized> Handle for Box<H> {
    fn probe(&mut self, blocking: bool) -> Result<Option<u64>> {
        (**self).probe(blocking)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).receive(buf)
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).send(buf)
    }

    fn peek(&self) -> bool {
        (**self).peek()
    }

    fn close(&mut self, close_wr: bool, close_rd: bool) {
        (**self).close(close_wr, close_rd)
    }

    fn closed_rd(&self) -> bool {
        (**self).closed_rd()
    }

    fn probe_cache(&self) -> &ProbeCache {
        (**self).probe_cache()
    }

    fn probe_cache_mut(&mut self) -> &mut ProbeCache {
        (**self).probe_cache_mut()
    }
}
