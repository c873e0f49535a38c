//! # teamcomm
//!
//! Transport-agnostic collective communication engine over point-to-point
//! byte-stream handles.
//!
//! This crate implements group communication patterns — broadcast, scatter,
//! gather, all-gather, all-to-all, fan-in, fan-out — on top of a thin
//! [`Handle`] abstraction: a reliable, ordered, length-framed byte channel
//! to one peer. It is designed to sit inside a larger multi-transport
//! communication layer that already provides such handles over
//! heterogeneous substrates (TCP, shared memory, RDMA, MPI-like
//! transports); the layer's Team machinery constructs one collective
//! instance per call and drives it through the uniform [`Collective`]
//! surface.
//!
//! ## What lives here
//!
//! - The six collective operations of the generic family and their
//!   partitioning arithmetic ([`partition`]).
//! - The per-handle probe cache bridging probe→receive
//!   ([`handle::ProbeCache`], [`collective::probe_handle`],
//!   [`collective::receive_from_handle`]).
//! - End-of-stream propagation on groups and the per-variant close
//!   protocols.
//! - An in-process frame-pipe transport ([`inproc`]) used by the tests and
//!   the demos to run whole teams inside one process.
//!
//! Transport-specific handle construction, rendezvous/team formation, and
//! tag allocation belong to the surrounding layer. The engine moves
//! uninterpreted bytes plus an element-size hint; it performs no
//! reductions and gives no ordering guarantees across independent
//! collectives on the same team.
//!
//! ## Quick start
//!
//! ```
//! use teamcomm::inproc::star_topology;
//! use teamcomm::{new_collective, Collective, CollectiveType, ImplementationType};
//!
//! // A team of two ranks wired through the in-process transport.
//! let (root_side, mut leaf_side) = star_topology(2);
//!
//! let leaf = std::thread::spawn(move || {
//!     let mut bcast = new_collective(
//!         CollectiveType::Broadcast,
//!         ImplementationType::Generic,
//!         vec![leaf_side.remove(0)],
//!         2,
//!         false, // not the root
//!         1,     // team rank
//!         42,    // tag for this collective call
//!     );
//!     let mut recv = [0u8; 3];
//!     let got = bcast.sendrecv(None, Some(&mut recv), 3, 1).unwrap();
//!     assert_eq!(got, 3);
//!     recv
//! });
//!
//! let mut bcast = new_collective(
//!     CollectiveType::Broadcast,
//!     ImplementationType::Generic,
//!     root_side,
//!     2,
//!     true, // root
//!     0,
//!     42,
//! );
//! bcast.sendrecv(Some(&[10, 20, 30]), None, 0, 1).unwrap();
//! bcast.close(true, false);
//!
//! assert_eq!(leaf.join().unwrap(), [10, 20, 30]);
//! ```
//!
//! ## Error model
//!
//! Operations return `Result<usize, Error>`: the byte count produced or
//! consumed at the local party on success, `Ok(0)` for end-of-stream, and
//! a structured [`Error`] — with an errno tag for the handle layer — on
//! failure. A failed collective leaves the instance and its handles in a
//! well-defined but unusable state; the team must discard it. There is no
//! cross-rank error dissemination and no recovery after a peer reset.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod allgather;
pub mod alltoall;
pub mod broadcast;
pub mod collective;
mod error;
pub mod fanin;
pub mod fanout;
pub mod gather;
pub mod handle;
pub mod inproc;
pub mod partition;
pub mod scatter;

pub use collective::{new_collective, probe_handle, receive_from_handle, Collective, CollectiveBase};
pub use error::{Error, Result};
pub use handle::{Handle, ProbeCache};

/// The collective communication patterns the engine implements.
///
/// Together with [`ImplementationType`] this selects the concrete
/// implementation a team instantiates for one collective call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectiveType {
    /// Root→all fan-out of one buffer.
    Broadcast,
    /// Root→all distribution of disjoint chunks.
    Scatter,
    /// All→root concatenation of chunks.
    Gather,
    /// Gather followed by a broadcast of the concatenated result.
    AllGather,
    /// Full N×N chunk exchange.
    AllToAll,
    /// Streaming N→1 fair selector (not group-synchronous).
    FanIn,
    /// Streaming 1→N round-robin distributor (not group-synchronous).
    FanOut,
}

/// The implementation family servicing a collective.
///
/// This crate specifies the generic family, built purely on the [`Handle`]
/// contract. Substrate-accelerated backends (a native MPI or UCC
/// implementation, for instance) plug in behind the same [`Collective`]
/// trait and are selected with their own variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ImplementationType {
    /// Handle-based implementation usable over any transport.
    Generic,
}
