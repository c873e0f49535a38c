//! Error types for teamcomm.
//!
//! This module provides structured error handling for the collective engine.
//! Each variant carries an errno-style tag (see [`Error::errno`]) so the
//! surrounding handle layer, which reports failures through POSIX error
//! numbers, can interoperate without string matching.

use thiserror::Error;

/// Result type for collective operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for collective operations.
///
/// End-of-stream is *not* an error: operations that observe a peer close
/// return `Ok(0)` and the engine closes the local read side. Everything in
/// this enum is a genuine failure and leaves the collective instance in a
/// well-defined but unusable state — the team must discard it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The operation is not part of this collective's surface (e.g. `send`
    /// on a synchronous collective, `sendrecv` on a streaming one).
    #[error("operation not supported by this collective: {0}")]
    Unsupported(&'static str),

    /// A buffer required by the operation was not provided.
    #[error("missing required buffer: {0}")]
    MissingBuffer(&'static str),

    /// A buffer size is not a multiple of the element stride, or the
    /// stride itself is zero.
    #[error("buffer of {size} bytes is not a multiple of element stride {datasize}")]
    StrideMismatch {
        /// Offending buffer size in bytes.
        size: usize,
        /// Element stride in bytes.
        datasize: usize,
    },

    /// A caller buffer is smaller than the computed partition requires.
    #[error("buffer too small: {available} bytes instead of {required}")]
    BufferTooSmall {
        /// Bytes the operation needs.
        required: usize,
        /// Bytes the caller provided.
        available: usize,
    },

    /// An inbound frame exceeds the caller's buffer. The receive is refused
    /// rather than truncated; the frame stays cached on the handle.
    #[error("incoming frame of {frame} bytes exceeds buffer capacity {capacity}")]
    FrameTooLarge {
        /// Length of the probed frame.
        frame: u64,
        /// Capacity of the caller's buffer.
        capacity: usize,
    },

    /// The handle is not valid for the requested operation.
    #[error("handle is closed or invalid")]
    BadHandle,

    /// A non-blocking probe found nothing ready.
    #[error("operation would block")]
    WouldBlock,

    /// The peer reset the connection mid-collective. Fatal for the call;
    /// never retried.
    #[error("connection reset by peer")]
    ConnectionReset,
}

impl Error {
    /// The errno-style tag for this error.
    ///
    /// Matches the reporting convention of the surrounding handle layer:
    /// `EINVAL` for argument errors, `EFAULT` for absent buffers, `ENOMEM`
    /// for oversized frames, `EBADF` for dead handles, `EWOULDBLOCK` for
    /// non-blocking probes that found nothing, `ECONNRESET` for transport
    /// failures.
    pub fn errno(&self) -> i32 {
        match self {
            Error::Unsupported(_) => libc::EINVAL,
            Error::MissingBuffer(_) => libc::EFAULT,
            Error::StrideMismatch { .. } => libc::EINVAL,
            Error::BufferTooSmall { .. } => libc::EINVAL,
            Error::FrameTooLarge { .. } => libc::ENOMEM,
            Error::BadHandle => libc::EBADF,
            Error::WouldBlock => libc::EWOULDBLOCK,
            Error::ConnectionReset => libc::ECONNRESET,
        }
    }

    /// True if this error means "retry the non-blocking probe later".
    pub fn is_would_block(&self) -> bool {
        matches!(self, Error::WouldBlock)
    }

    /// True if the peer reset the connection.
    pub fn is_connection_reset(&self) -> bool {
        matches!(self, Error::ConnectionReset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_tags_match_libc_values() {
        assert_eq!(Error::Unsupported("probe").errno(), libc::EINVAL);
        assert_eq!(Error::MissingBuffer("recvbuf").errno(), libc::EFAULT);
        assert_eq!(
            Error::StrideMismatch {
                size: 7,
                datasize: 2
            }
            .errno(),
            libc::EINVAL
        );
        assert_eq!(
            Error::BufferTooSmall {
                required: 10,
                available: 4
            }
            .errno(),
            libc::EINVAL
        );
        assert_eq!(
            Error::FrameTooLarge {
                frame: 100,
                capacity: 10
            }
            .errno(),
            libc::ENOMEM
        );
        assert_eq!(Error::BadHandle.errno(), libc::EBADF);
        assert_eq!(Error::WouldBlock.errno(), libc::EWOULDBLOCK);
        assert_eq!(Error::ConnectionReset.errno(), libc::ECONNRESET);
    }

    #[test]
    fn error_display_formats() {
        let err = Error::Unsupported("sendrecv");
        assert_eq!(
            format!("{err}"),
            "operation not supported by this collective: sendrecv"
        );

        let err = Error::BufferTooSmall {
            required: 14,
            available: 8,
        };
        assert_eq!(format!("{err}"), "buffer too small: 8 bytes instead of 14");

        let err = Error::FrameTooLarge {
            frame: 64,
            capacity: 16,
        };
        assert_eq!(
            format!("{err}"),
            "incoming frame of 64 bytes exceeds buffer capacity 16"
        );
    }

    #[test]
    fn would_block_predicate() {
        assert!(Error::WouldBlock.is_would_block());
        assert!(!Error::ConnectionReset.is_would_block());
        assert!(Error::ConnectionReset.is_connection_reset());
        assert!(!Error::WouldBlock.is_connection_reset());
    }
}
