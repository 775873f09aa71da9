//! The transport capability the engines are written against.
//!
//! [`Transport`] hides whether bytes travel over a TCP stream, a UDP socket,
//! or the in-memory [`crate::simulator`].  The engines only need to send a
//! framed record, block for the next incoming unit, and release the resource
//! when the run ends.

use std::io;
use std::time::Duration;

use crate::record::Framing;

/// Outcome of one blocking receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// `n` bytes were written into the caller's buffer.
    ///
    /// For [`Framing::Line`] this is an arbitrary slice of the byte stream;
    /// for [`Framing::Datagram`] it is exactly one datagram.
    Data(usize),
    /// Orderly end-of-stream from the peer.
    Closed,
    /// Nothing arrived within the idle timeout.
    Idle,
}

/// A byte-stream or datagram channel between one sender and one receiver.
pub trait Transport {
    /// How records must be delimited on this transport.
    fn framing(&self) -> Framing;

    /// Send one already-framed unit.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Block until the next unit arrives, the peer closes, or the idle
    /// timeout expires.
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Incoming>;

    /// Bound how long [`Transport::receive`] may block.  `None` blocks
    /// indefinitely.
    fn set_idle_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Release the underlying resource.  Must be safe to call more than once.
    fn close(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn framing(&self) -> Framing {
        (**self).framing()
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).send(frame)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Incoming> {
        (**self).receive(buf)
    }

    fn set_idle_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_idle_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Returns true if `e` is how the OS reports an expired read timeout.
///
/// Unix reports `WouldBlock` (EAGAIN) for `SO_RCVTIMEO`, Windows reports
/// `TimedOut`.
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Errors during a blocking call that are retried in place rather than
/// ending the run.
pub fn is_interrupted(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::Interrupted
}
