//! In-memory network for deterministic testing.
//!
//! Real networks drop, reorder, and duplicate datagrams, and TCP hands the
//! application arbitrary slices of the byte stream.  To exercise the engines
//! without depending on actual network conditions, this module provides:
//!
//! - [`MemoryTransport`]: a [`Transport`] that records everything sent and
//!   replays a scripted queue of incoming [`Event`]s.
//! - [`Simulator`]: a seeded fault model that turns what one
//!   [`MemoryTransport`] sent into the script for another:
//!
//! | Fault         | Framing    | Description                                  |
//! |---------------|------------|----------------------------------------------|
//! | Loss          | datagram   | Drop a datagram with probability `loss_rate`. |
//! | Duplication   | datagram   | Deliver a datagram twice.                     |
//! | Reordering    | datagram   | Let the next datagram overtake this one.      |
//! | Re-chunking   | line       | Split the byte stream at random boundaries.   |
//!
//! The same seed always produces the same delivery, so failures reproduce.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::record::Framing;
use crate::transport::{Incoming, Transport};

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// One scripted receive result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Bytes(Vec<u8>),
    Idle,
    Closed,
    Error(io::ErrorKind),
}

/// A [`Transport`] backed by plain vectors.
///
/// When the script runs out, a line transport reports [`Incoming::Closed`]
/// and a datagram transport reports [`Incoming::Idle`].
#[derive(Debug)]
pub struct MemoryTransport {
    framing: Framing,
    sent: Vec<Vec<u8>>,
    incoming: VecDeque<Event>,
    fail_sends_after: Option<usize>,
    idle_timeout: Option<Duration>,
    closed: bool,
}

impl MemoryTransport {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            sent: Vec::new(),
            incoming: VecDeque::new(),
            fail_sends_after: None,
            idle_timeout: None,
            closed: false,
        }
    }

    /// Fail every send once `n` sends have succeeded.
    pub fn fail_sends_after(mut self, n: usize) -> Self {
        self.fail_sends_after = Some(n);
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.incoming.extend(events);
        self
    }

    pub fn push_bytes(&mut self, bytes: impl Into<Vec<u8>>) {
        self.incoming.push_back(Event::Bytes(bytes.into()));
    }

    pub fn push_event(&mut self, event: Event) {
        self.incoming.push_back(event);
    }

    /// Every frame passed to [`Transport::send`], in order.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Events not yet consumed by [`Transport::receive`].
    pub fn remaining(&self) -> usize {
        self.incoming.len()
    }
}

impl Transport for MemoryTransport {
    fn framing(&self) -> Framing {
        self.framing
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }
        if self.fail_sends_after.is_some_and(|n| self.sent.len() >= n) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated send failure"));
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Incoming> {
        let Some(event) = self.incoming.pop_front() else {
            return Ok(match self.framing {
                Framing::Line => Incoming::Closed,
                Framing::Datagram => Incoming::Idle,
            });
        };
        match event {
            Event::Bytes(mut bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                // A stream keeps what did not fit; a datagram is truncated.
                if self.framing == Framing::Line && n < bytes.len() {
                    self.incoming.push_front(Event::Bytes(bytes.split_off(n)));
                }
                Ok(Incoming::Data(n))
            }
            Event::Idle => Ok(Incoming::Idle),
            Event::Closed => Ok(Incoming::Closed),
            Event::Error(kind) => Err(io::Error::new(kind, "simulated receive failure")),
        }
    }

    fn set_idle_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.idle_timeout = timeout;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Configuration for the fault model.
///
/// All probabilities are in the range `[0.0, 1.0]`; out-of-range values are
/// clamped.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a datagram swaps places with its successor.
    pub reorder_rate: f64,
    /// Largest chunk a line transport hands to a single receive.
    pub max_chunk: usize,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default; the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            max_chunk: 1024,
            seed: 0,
        }
    }
}

/// What the fault model did to the last delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

/// A seeded fault-injecting link.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    stats: FaultStats,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            stats: FaultStats::default(),
        }
    }

    pub fn stats(&self) -> FaultStats {
        self.stats
    }

    /// Carry `frames` across the link and return the receiving end, scripted
    /// with whatever survived.
    pub fn deliver(&mut self, framing: Framing, frames: &[Vec<u8>]) -> MemoryTransport {
        self.stats = FaultStats::default();
        let events = match framing {
            Framing::Line => self.rechunk(frames),
            Framing::Datagram => self.datagrams(frames),
        };
        MemoryTransport::new(framing).with_events(events)
    }

    fn chance(&mut self, p: f64) -> bool {
        self.rng.random_bool(p.clamp(0.0, 1.0))
    }

    fn datagrams(&mut self, frames: &[Vec<u8>]) -> Vec<Event> {
        let mut out: Vec<Event> = Vec::with_capacity(frames.len());
        // A datagram waiting to be released after its successor.
        let mut held: Option<(Vec<u8>, usize)> = None;

        for frame in frames {
            if self.chance(self.config.loss_rate) {
                self.stats.dropped += 1;
                continue;
            }
            let copies = if self.chance(self.config.duplicate_rate) {
                self.stats.duplicated += 1;
                2
            } else {
                1
            };
            if self.chance(self.config.reorder_rate) && held.is_none() {
                self.stats.reordered += 1;
                held = Some((frame.clone(), copies));
                continue;
            }
            out.extend(std::iter::repeat(Event::Bytes(frame.clone())).take(copies));
            if let Some((late, n)) = held.take() {
                out.extend(std::iter::repeat(Event::Bytes(late)).take(n));
            }
        }
        if let Some((late, n)) = held {
            out.extend(std::iter::repeat(Event::Bytes(late)).take(n));
        }
        out
    }

    fn rechunk(&mut self, frames: &[Vec<u8>]) -> Vec<Event> {
        let stream: Vec<u8> = frames.concat();
        let max = self.config.max_chunk.max(1);
        let mut events = Vec::new();
        let mut rest = stream.as_slice();
        while !rest.is_empty() {
            let n = self.rng.random_range(1..=max).min(rest.len());
            let (chunk, tail) = rest.split_at(n);
            events.push(Event::Bytes(chunk.to_vec()));
            rest = tail;
        }
        events.push(Event::Closed);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("{i}").into_bytes()).collect()
    }

    fn bytes_of(events: &mut MemoryTransport) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while let Ok(Incoming::Data(n)) = events.receive(&mut buf) {
            out.push(buf[..n].to_vec());
        }
        out
    }

    #[test]
    fn memory_transport_records_sends() {
        let mut t = MemoryTransport::new(Framing::Datagram);
        t.send(b"a").unwrap();
        t.send(b"b").unwrap();
        assert_eq!(t.sent(), &[b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn memory_transport_rejects_send_after_close() {
        let mut t = MemoryTransport::new(Framing::Line);
        t.close().unwrap();
        t.close().unwrap();
        assert_eq!(
            t.send(b"x").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
    }

    #[test]
    fn exhausted_script_depends_on_framing() {
        let mut buf = [0u8; 4];
        assert_eq!(
            MemoryTransport::new(Framing::Line).receive(&mut buf).unwrap(),
            Incoming::Closed
        );
        assert_eq!(
            MemoryTransport::new(Framing::Datagram).receive(&mut buf).unwrap(),
            Incoming::Idle
        );
    }

    #[test]
    fn line_transport_keeps_overflow_for_next_read() {
        let mut t = MemoryTransport::new(Framing::Line);
        t.push_bytes(b"abcdef".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(t.receive(&mut buf).unwrap(), Incoming::Data(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(t.receive(&mut buf).unwrap(), Incoming::Data(2));
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn datagram_transport_truncates() {
        let mut t = MemoryTransport::new(Framing::Datagram);
        t.push_bytes(b"abcdef".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(t.receive(&mut buf).unwrap(), Incoming::Data(4));
        assert_eq!(t.receive(&mut buf).unwrap(), Incoming::Idle);
    }

    #[test]
    fn scripted_error_is_returned() {
        let mut t = MemoryTransport::new(Framing::Line)
            .with_events([Event::Error(io::ErrorKind::ConnectionReset)]);
        let mut buf = [0u8; 4];
        assert_eq!(
            t.receive(&mut buf).unwrap_err().kind(),
            io::ErrorKind::ConnectionReset
        );
    }

    #[test]
    fn default_simulator_is_pass_through() {
        let sent = frames(20);
        let mut sim = Simulator::new(SimulatorConfig::default());
        let mut rx = sim.deliver(Framing::Datagram, &sent);
        assert_eq!(bytes_of(&mut rx), sent);
        assert_eq!(sim.stats(), FaultStats::default());
    }

    #[test]
    fn full_loss_drops_everything() {
        let mut sim = Simulator::new(SimulatorConfig {
            loss_rate: 1.0,
            ..Default::default()
        });
        let rx = sim.deliver(Framing::Datagram, &frames(10));
        assert_eq!(rx.remaining(), 0);
        assert_eq!(sim.stats().dropped, 10);
    }

    #[test]
    fn full_duplication_doubles_everything() {
        let mut sim = Simulator::new(SimulatorConfig {
            duplicate_rate: 1.0,
            ..Default::default()
        });
        let rx = sim.deliver(Framing::Datagram, &frames(5));
        assert_eq!(rx.remaining(), 10);
    }

    #[test]
    fn reordering_keeps_every_datagram() {
        let sent = frames(50);
        let mut sim = Simulator::new(SimulatorConfig {
            reorder_rate: 0.5,
            seed: 7,
            ..Default::default()
        });
        let mut rx = sim.deliver(Framing::Datagram, &sent);
        let mut got = bytes_of(&mut rx);
        assert!(sim.stats().reordered > 0);
        assert_ne!(got, sent);
        got.sort();
        let mut want = sent.clone();
        want.sort();
        assert_eq!(got, want);
    }

    #[test]
    fn same_seed_same_delivery() {
        let cfg = SimulatorConfig {
            loss_rate: 0.3,
            duplicate_rate: 0.1,
            reorder_rate: 0.2,
            seed: 42,
            ..Default::default()
        };
        let sent = frames(100);
        let a = bytes_of(&mut Simulator::new(cfg.clone()).deliver(Framing::Datagram, &sent));
        let b = bytes_of(&mut Simulator::new(cfg).deliver(Framing::Datagram, &sent));
        assert_eq!(a, b);
    }

    #[test]
    fn rechunked_stream_preserves_bytes() {
        let sent: Vec<Vec<u8>> = vec![b"0:1.0:XX\n".to_vec(), b"STOP\n".to_vec()];
        let mut sim = Simulator::new(SimulatorConfig {
            max_chunk: 3,
            seed: 1,
            ..Default::default()
        });
        let mut rx = sim.deliver(Framing::Line, &sent);
        let joined: Vec<u8> = bytes_of(&mut rx).concat();
        assert_eq!(joined, sent.concat());
    }
}
