//! In-process frame-pipe transport.
//!
//! [`InprocHandle`] is a minimal, complete [`Handle`] implementation that
//! moves whole frames between two endpoints of the same process through a
//! mutex-guarded queue. It exists so teams can be wired up inside one
//! process — one thread per rank — which is how the unit tests, the
//! property tests, and the runnable demos exercise the collective engine
//! without a network.
//!
//! It is not a production transport: frames are copied through the heap and
//! there is no flow control beyond the blocking receive path.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::handle::{Handle, ProbeCache};

/// One direction of a pipe: frames flowing producer → consumer.
struct PipeState {
    frames: VecDeque<Vec<u8>>,
    /// The producing endpoint is gone (dropped without EOS).
    producer_gone: bool,
    /// The consuming endpoint closed its read side or was dropped.
    consumer_gone: bool,
    /// A hard transport failure was injected.
    reset: bool,
}

struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

impl Pipe {
    fn new() -> Arc<Self> {
        Arc::new(Pipe {
            state: Mutex::new(PipeState {
                frames: VecDeque::new(),
                producer_gone: false,
                consumer_gone: false,
                reset: false,
            }),
            readable: Condvar::new(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, PipeState>> {
        // A poisoned lock means a peer thread died mid-operation; surface
        // it the same way a dead peer on a real transport would read.
        self.state.lock().map_err(|_| Error::ConnectionReset)
    }
}

/// One endpoint of an in-process frame pipe.
///
/// Create connected endpoints with [`InprocHandle::pair`], or a whole
/// root-centric team's worth of wiring with [`star_topology`].
pub struct InprocHandle {
    /// Frames we produce for the peer.
    tx: Arc<Pipe>,
    /// Frames the peer produced for us.
    rx: Arc<Pipe>,
    probed: ProbeCache,
    closed_wr: bool,
    closed_rd: bool,
}

impl InprocHandle {
    /// Two connected endpoints, each the other's peer.
    pub fn pair() -> (InprocHandle, InprocHandle) {
        let ab = Pipe::new();
        let ba = Pipe::new();
        (
            InprocHandle {
                tx: Arc::clone(&ab),
                rx: Arc::clone(&ba),
                probed: ProbeCache::new(),
                closed_wr: false,
                closed_rd: false,
            },
            InprocHandle {
                tx: ba,
                rx: ab,
                probed: ProbeCache::new(),
                closed_wr: false,
                closed_rd: false,
            },
        )
    }

    /// Inject a transport failure on both directions, as a peer reset would
    /// surface it. Subsequent operations on either endpoint fail with
    /// `ConnectionReset`. Intended for tests.
    pub fn inject_reset(&mut self) {
        if let Ok(mut st) = self.tx.state.lock() {
            st.reset = true;
        }
        if let Ok(mut st) = self.rx.state.lock() {
            st.reset = true;
        }
        self.tx.readable.notify_all();
        self.rx.readable.notify_all();
    }
}

impl Handle for InprocHandle {
    fn probe(&mut self, blocking: bool) -> Result<Option<u64>> {
        if self.closed_rd {
            return Ok(None);
        }
        let mut st = self.rx.lock()?;
        loop {
            if st.reset {
                return Err(Error::ConnectionReset);
            }
            if let Some(front) = st.frames.front() {
                return Ok(Some(front.len() as u64));
            }
            if st.producer_gone {
                return Ok(None);
            }
            if !blocking {
                return Err(Error::WouldBlock);
            }
            st = self
                .rx
                .readable
                .wait(st)
                .map_err(|_| Error::ConnectionReset)?;
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed_rd {
            return Ok(0);
        }
        let mut st = self.rx.lock()?;
        loop {
            if st.reset {
                return Err(Error::ConnectionReset);
            }
            if let Some(frame) = st.frames.pop_front() {
                if frame.len() > buf.len() {
                    // Contract violation; keep the frame so nothing is lost.
                    let len = frame.len() as u64;
                    st.frames.push_front(frame);
                    return Err(Error::FrameTooLarge {
                        frame: len,
                        capacity: buf.len(),
                    });
                }
                buf[..frame.len()].copy_from_slice(&frame);
                return Ok(frame.len());
            }
            if st.producer_gone {
                return Ok(0);
            }
            st = self
                .rx
                .readable
                .wait(st)
                .map_err(|_| Error::ConnectionReset)?;
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed_wr {
            return Err(Error::BadHandle);
        }
        let mut st = self.tx.lock()?;
        if st.reset {
            return Err(Error::ConnectionReset);
        }
        if st.consumer_gone {
            return Err(Error::ConnectionReset);
        }
        st.frames.push_back(buf.to_vec());
        drop(st);
        self.tx.readable.notify_all();
        Ok(buf.len())
    }

    fn peek(&self) -> bool {
        if self.probed.is_cached() {
            return true;
        }
        if self.closed_rd {
            return false;
        }
        match self.rx.state.lock() {
            Ok(st) => !st.frames.is_empty(),
            Err(_) => false,
        }
    }

    fn close(&mut self, close_wr: bool, close_rd: bool) {
        if close_wr && !self.closed_wr {
            self.closed_wr = true;
            if let Ok(mut st) = self.tx.state.lock() {
                if !st.consumer_gone && !st.reset {
                    // In-band EOS frame.
                    st.frames.push_back(Vec::new());
                }
            }
            self.tx.readable.notify_all();
        }
        if close_rd && !self.closed_rd {
            self.closed_rd = true;
            if let Ok(mut st) = self.rx.state.lock() {
                st.consumer_gone = true;
            }
        }
    }

    fn closed_rd(&self) -> bool {
        self.closed_rd
    }

    fn probe_cache(&self) -> &ProbeCache {
        &self.probed
    }

    fn probe_cache_mut(&mut self) -> &mut ProbeCache {
        &mut self.probed
    }
}

impl Drop for InprocHandle {
    fn drop(&mut self) {
        if let Ok(mut st) = self.tx.state.lock() {
            st.producer_gone = true;
        }
        self.tx.readable.notify_all();
        if let Ok(mut st) = self.rx.state.lock() {
            st.consumer_gone = true;
        }
    }
}

/// Wire a root-centric team of `nparticipants` ranks as a star.
///
/// Returns `(root_side, leaf_side)`: `root_side` is the root's ordered
/// participant vector (one handle per non-root peer, ascending rank), and
/// `leaf_side[i]` is the single handle non-root rank `i + 1` holds to the
/// root.
pub fn star_topology(nparticipants: usize) -> (Vec<InprocHandle>, Vec<InprocHandle>) {
    let mut root_side = Vec::new();
    let mut leaf_side = Vec::new();
    for _ in 1..nparticipants {
        let (r, l) = InprocHandle::pair();
        root_side.push(r);
        leaf_side.push(l);
    }
    (root_side, leaf_side)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_arrive_whole_and_in_order() {
        let (mut a, mut b) = InprocHandle::pair();
        a.send(&[1, 2, 3]).unwrap();
        a.send(&[4]).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(b.receive(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(b.receive(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 4);
    }

    #[test]
    fn probe_reveals_without_consuming() {
        let (mut a, mut b) = InprocHandle::pair();
        a.send(&[7; 5]).unwrap();

        assert_eq!(b.probe(true).unwrap(), Some(5));
        assert_eq!(b.probe(true).unwrap(), Some(5));

        let mut buf = [0u8; 5];
        assert_eq!(b.receive(&mut buf).unwrap(), 5);
    }

    #[test]
    fn nonblocking_probe_on_empty_pipe_would_block() {
        let (_a, mut b) = InprocHandle::pair();
        assert_eq!(b.probe(false).unwrap_err(), Error::WouldBlock);
    }

    #[test]
    fn empty_send_is_an_eos_frame() {
        let (mut a, mut b) = InprocHandle::pair();
        a.send(&[]).unwrap();
        assert_eq!(b.probe(true).unwrap(), Some(0));
    }

    #[test]
    fn write_close_emits_eos() {
        let (mut a, mut b) = InprocHandle::pair();
        a.send(&[1]).unwrap();
        a.close(true, false);

        let mut buf = [0u8; 1];
        assert_eq!(b.receive(&mut buf).unwrap(), 1);
        assert_eq!(b.probe(true).unwrap(), Some(0));
    }

    #[test]
    fn dropped_peer_reads_as_eof() {
        let (a, mut b) = InprocHandle::pair();
        drop(a);
        assert_eq!(b.probe(true).unwrap(), None);
        let mut buf = [0u8; 1];
        assert_eq!(b.receive(&mut buf).unwrap(), 0);
    }

    #[test]
    fn send_to_gone_receiver_is_a_reset() {
        let (mut a, b) = InprocHandle::pair();
        drop(b);
        assert_eq!(a.send(&[1]).unwrap_err(), Error::ConnectionReset);
    }

    #[test]
    fn send_after_write_close_is_refused() {
        let (mut a, _b) = InprocHandle::pair();
        a.close(true, false);
        assert_eq!(a.send(&[1]).unwrap_err(), Error::BadHandle);
    }

    #[test]
    fn closed_read_side_is_sticky() {
        let (mut a, mut b) = InprocHandle::pair();
        a.send(&[1, 2]).unwrap();
        b.close(false, true);

        assert_eq!(b.probe(true).unwrap(), None);
        let mut buf = [0u8; 4];
        assert_eq!(b.receive(&mut buf).unwrap(), 0);
    }

    #[test]
    fn peek_is_nonconsuming() {
        let (mut a, mut b) = InprocHandle::pair();
        assert!(!b.peek());
        a.send(&[1]).unwrap();
        assert!(b.peek());
        assert!(b.peek());
        let mut buf = [0u8; 1];
        b.receive(&mut buf).unwrap();
        assert!(!b.peek());
    }

    #[test]
    fn injected_reset_fails_both_sides() {
        let (mut a, mut b) = InprocHandle::pair();
        a.inject_reset();
        assert_eq!(a.send(&[1]).unwrap_err(), Error::ConnectionReset);
        assert_eq!(b.probe(true).unwrap_err(), Error::ConnectionReset);
    }

    #[test]
    fn blocking_receive_waits_for_the_sender() {
        let (mut a, mut b) = InprocHandle::pair();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            a.send(&[5, 6, 7]).unwrap();
        });
        let mut buf = [0u8; 3];
        assert_eq!(b.receive(&mut buf).unwrap(), 3);
        assert_eq!(buf, [5, 6, 7]);
        writer.join().unwrap();
    }

    #[test]
    fn star_topology_wires_every_leaf_to_the_root() {
        let (mut root_side, leaf_side) = star_topology(4);
        assert_eq!(root_side.len(), 3);
        assert_eq!(leaf_side.len(), 3);

        for (i, mut leaf) in leaf_side.into_iter().enumerate() {
            leaf.send(&[i as u8]).unwrap();
            let mut buf = [0u8; 1];
            assert_eq!(root_side[i].receive(&mut buf).unwrap(), 1);
            assert_eq!(buf[0], i as u8);
        }
    }
}
