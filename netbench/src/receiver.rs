//! Receiver engine: consume one run and turn it into a report.
//!
//! The [`Receiver`] is responsible for everything between the transport and
//! the [`Aggregator`]:
//! - Reassembling newline-delimited records from the byte stream (TCP) or
//!   taking one record per datagram (UDP).
//! - Decoding each record and stamping it with the local receive time.
//! - Deciding when the run is over (see [`crate::state`]).
//! - Producing exactly one [`ReceiveSummary`] when it is.
//!
//! # Malformed input
//! A bad record on the stream transport ends the run: the byte stream is
//! ordered and reliable, so garbage means the peer is not speaking this
//! protocol.  A bad datagram is skipped and counted; the datagram transport
//! already tolerates loss, so one unreadable datagram is just one more loss.

use std::fmt;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::record::{Framing, LineBuffer, Record};
use crate::state::{ReceiverState, StopReason};
use crate::stats::{Aggregator, LossPolicy, RunReport};
use crate::transport::{is_interrupted, Incoming, Transport};

/// Silence after which a datagram receiver ends the run.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Message count assumed by the stream receiver when none is configured.
pub const DEFAULT_EXPECTED_COUNT: u64 = 10_000;

/// Largest unit read in one call (maximum UDP payload).
const MAX_UNIT: usize = 65_535;

/// Parameters of one receiver run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Declared sender message count; only the stream transport uses it.
    pub expected_count: u64,
    /// Only the datagram transport uses it.
    pub idle_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            expected_count: DEFAULT_EXPECTED_COUNT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Everything a receiver run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveSummary {
    pub framing: Framing,
    pub stop: StopReason,
    /// Datagrams that failed to decode and were ignored.
    pub malformed_skipped: u64,
    pub report: RunReport,
}

impl fmt::Display for ReceiveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} Receiver Finished ---", self.framing)?;
        if !self.stop.is_clean() {
            writeln!(f, "Stopped early: {}", self.stop)?;
        }
        if self.malformed_skipped > 0 {
            writeln!(f, "Malformed datagrams skipped: {}", self.malformed_skipped)?;
        }
        write!(f, "{}", self.report)
    }
}

/// Per-run mutable state, dropped once the summary is built.
#[derive(Debug, Default)]
struct Run {
    state: ReceiverState,
    aggregator: Aggregator,
    malformed_skipped: u64,
}

impl Run {
    /// Move to `Finished`.  The first reason wins.
    fn finish(&mut self, reason: StopReason) {
        if self.state.is_finished() {
            return;
        }
        log::info!(
            "receiver finished after {} messages: {reason}",
            self.aggregator.observations()
        );
        self.state = ReceiverState::Finished(reason);
    }

    fn accept(&mut self, record: Record, clock: &impl Clock) {
        match record {
            Record::Stop => self.finish(StopReason::Terminated),
            Record::Data(m) => {
                let latency_ms = (clock.now() - m.send_timestamp) * 1000.0;
                log::trace!("← seq={} latency={latency_ms:.4}ms", m.sequence);
                self.aggregator.observe(m.sequence, latency_ms);
            }
        }
    }
}

/// Drives one receiver run.
#[derive(Debug)]
pub struct Receiver<C = SystemClock> {
    config: ReceiverConfig,
    clock: C,
}

impl Receiver<SystemClock> {
    pub fn new(config: ReceiverConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Receiver<C> {
    pub fn with_clock(config: ReceiverConfig, clock: C) -> Self {
        Self { config, clock }
    }

    /// Read from `transport` until the run ends, release it, and report.
    pub fn run<T: Transport>(&self, mut transport: T) -> ReceiveSummary {
        let framing = transport.framing();
        let mut run = Run::default();

        if framing == Framing::Datagram {
            if let Err(e) = transport.set_idle_timeout(Some(self.config.idle_timeout)) {
                run.finish(StopReason::TransportError(e.to_string()));
            }
        }
        log::info!("{framing} receiver listening");

        let mut buf = vec![0u8; MAX_UNIT];
        let mut lines = LineBuffer::new();
        while !run.state.is_finished() {
            match transport.receive(&mut buf) {
                Ok(Incoming::Data(n)) => self.consume(framing, &buf[..n], &mut lines, &mut run),
                Ok(Incoming::Closed) => run.finish(StopReason::Closed),
                Ok(Incoming::Idle) => run.finish(StopReason::IdleTimeout),
                Err(e) if is_interrupted(&e) => {}
                Err(e) => run.finish(StopReason::TransportError(e.to_string())),
            }
        }

        if let Err(e) = transport.close() {
            log::debug!("close after receive failed: {e}");
        }
        drop(transport);

        if lines.pending() > 0 {
            log::debug!("discarding {} bytes of unterminated input", lines.pending());
        }

        let stop = match run.state {
            ReceiverState::Finished(reason) => reason,
            ReceiverState::Listening => unreachable!("receive loop exits only when finished"),
        };
        ReceiveSummary {
            framing,
            stop,
            malformed_skipped: run.malformed_skipped,
            report: run
                .aggregator
                .finalize(LossPolicy::for_framing(framing, self.config.expected_count)),
        }
    }

    fn consume(&self, framing: Framing, unit: &[u8], lines: &mut LineBuffer, run: &mut Run) {
        match framing {
            Framing::Datagram => match Record::decode(unit) {
                Ok(record) => run.accept(record, &self.clock),
                Err(e) => {
                    run.malformed_skipped += 1;
                    log::warn!("skipping datagram: {e}");
                }
            },
            Framing::Line => {
                lines.extend(unit);
                // Anything after STOP in the same chunk is left unread.
                while !run.state.is_finished() {
                    let Some(line) = lines.next_line() else {
                        break;
                    };
                    if line.is_empty() {
                        continue;
                    }
                    match Record::decode(&line) {
                        Ok(record) => run.accept(record, &self.clock),
                        Err(e) => run.finish(StopReason::Malformed(e)),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::record::{Measurement, RecordError};
    use crate::simulator::{Event, MemoryTransport};
    use std::io;

    fn line(seq: u64, ts: f64) -> Vec<u8> {
        Record::Data(Measurement::new(seq, ts, "XXXXXXXXXX"))
            .encode_framed(Framing::Line)
            .unwrap()
    }

    fn datagram(seq: u64, ts: f64) -> Vec<u8> {
        Record::Data(Measurement::new(seq, ts, "XX")).encode()
    }

    fn config(expected: u64) -> ReceiverConfig {
        ReceiverConfig {
            expected_count: expected,
            idle_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn stream_reassembles_records_across_chunks() {
        let mut stream = Vec::new();
        for seq in 0..3 {
            stream.extend(line(seq, 10.0));
        }
        stream.extend_from_slice(b"STOP\n");
        // Split mid-record and pack several records into one chunk.
        let (a, b) = stream.split_at(7);
        let mut t = MemoryTransport::new(Framing::Line);
        t.push_bytes(a.to_vec());
        t.push_bytes(b.to_vec());

        let clock = ManualClock::new(10.002, 0.0);
        let summary = Receiver::with_clock(config(3), &clock).run(&mut t);

        assert_eq!(summary.stop, StopReason::Terminated);
        assert_eq!(summary.report.total_received, 3);
        assert_eq!(summary.report.lost, 0);
        let latency = summary.report.latency.unwrap();
        assert!((latency.avg_ms - 2.0).abs() < 1e-6);
        assert!(t.is_closed());
    }

    #[test]
    fn stream_uses_declared_message_count() {
        let mut t = MemoryTransport::new(Framing::Line);
        for seq in 0..9 {
            t.push_bytes(line(seq, 1.0));
        }
        t.push_bytes(b"STOP\n".to_vec());

        let summary = Receiver::new(config(10)).run(&mut t);
        assert_eq!(summary.report.expected, 10);
        assert_eq!(summary.report.lost, 1);
        assert_eq!(format!("{:.2}", summary.report.loss_percentage), "10.00");
    }

    #[test]
    fn stream_end_of_stream_is_a_clean_stop() {
        let mut t = MemoryTransport::new(Framing::Line);
        t.push_bytes(line(0, 1.0));
        t.push_event(Event::Closed);

        let summary = Receiver::new(config(1)).run(&mut t);
        assert_eq!(summary.stop, StopReason::Closed);
        assert!(summary.stop.is_clean());
        assert_eq!(summary.report.total_received, 1);
    }

    #[test]
    fn stream_malformed_record_aborts_with_partial_results() {
        let mut t = MemoryTransport::new(Framing::Line);
        t.push_bytes(line(0, 1.0));
        t.push_bytes(b"garbage\n".to_vec());
        t.push_bytes(line(1, 1.0));
        t.push_bytes(b"STOP\n".to_vec());

        let summary = Receiver::new(config(2)).run(&mut t);
        assert_eq!(
            summary.stop,
            StopReason::Malformed(RecordError::FieldCount(1))
        );
        assert_eq!(summary.report.total_received, 1);
        assert!(t.remaining() > 0);
    }

    #[test]
    fn stream_ignores_records_after_stop() {
        let mut chunk = line(0, 1.0);
        chunk.extend_from_slice(b"STOP\n");
        chunk.extend(line(1, 1.0));
        let mut t = MemoryTransport::new(Framing::Line);
        t.push_bytes(chunk);

        let summary = Receiver::new(config(1)).run(&mut t);
        assert_eq!(summary.stop, StopReason::Terminated);
        assert_eq!(summary.report.total_received, 1);
    }

    #[test]
    fn stream_skips_empty_lines() {
        let mut t = MemoryTransport::new(Framing::Line);
        t.push_bytes(b"\n\n".to_vec());
        t.push_bytes(line(0, 1.0));
        t.push_bytes(b"\nSTOP\n".to_vec());

        let summary = Receiver::new(config(1)).run(&mut t);
        assert_eq!(summary.stop, StopReason::Terminated);
        assert_eq!(summary.report.total_received, 1);
    }

    #[test]
    fn stream_never_sets_an_idle_timeout() {
        let mut t = MemoryTransport::new(Framing::Line);
        Receiver::new(config(0)).run(&mut t);
        assert_eq!(t.idle_timeout(), None);
    }

    #[test]
    fn datagram_sets_idle_timeout_and_stops_on_silence() {
        let mut t = MemoryTransport::new(Framing::Datagram);
        t.push_bytes(datagram(0, 1.0));
        t.push_event(Event::Idle);
        t.push_bytes(datagram(1, 1.0));

        let summary = Receiver::new(config(0)).run(&mut t);
        assert_eq!(t.idle_timeout(), Some(Duration::from_millis(50)));
        assert_eq!(summary.stop, StopReason::IdleTimeout);
        assert!(summary.stop.is_clean());
        assert_eq!(summary.report.total_received, 1);
    }

    #[test]
    fn datagram_skips_malformed_units() {
        let mut t = MemoryTransport::new(Framing::Datagram);
        t.push_bytes(datagram(0, 1.0));
        t.push_bytes(b"1:not-a-time:XX".to_vec());
        t.push_bytes(vec![0xff, 0x00]);
        t.push_bytes(datagram(2, 1.0));
        t.push_bytes(b"STOP".to_vec());

        let summary = Receiver::new(config(0)).run(&mut t);
        assert_eq!(summary.stop, StopReason::Terminated);
        assert_eq!(summary.malformed_skipped, 2);
        assert_eq!(summary.report.total_received, 2);
        assert!(summary.to_string().contains("Malformed datagrams skipped: 2"));
    }

    #[test]
    fn datagram_uses_observed_ceiling() {
        let mut t = MemoryTransport::new(Framing::Datagram);
        for seq in [0, 1, 3, 4] {
            t.push_bytes(datagram(seq, 1.0));
        }
        t.push_bytes(b"STOP".to_vec());

        let summary = Receiver::new(config(10_000)).run(&mut t);
        assert_eq!(summary.report.expected, 5);
        assert_eq!(summary.report.lost, 1);
        assert_eq!(format!("{:.2}", summary.report.loss_percentage), "20.00");
    }

    #[test]
    fn transport_error_stops_with_partial_results() {
        let mut t = MemoryTransport::new(Framing::Line);
        t.push_bytes(line(0, 1.0));
        t.push_event(Event::Error(io::ErrorKind::ConnectionReset));

        let summary = Receiver::new(config(5)).run(&mut t);
        assert!(matches!(summary.stop, StopReason::TransportError(_)));
        assert_eq!(summary.report.total_received, 1);
        assert_eq!(summary.report.lost, 4);
        assert!(summary.to_string().contains("Stopped early"));
        assert!(t.is_closed());
    }

    #[test]
    fn interrupted_receive_is_retried() {
        let mut t = MemoryTransport::new(Framing::Datagram);
        t.push_event(Event::Error(io::ErrorKind::Interrupted));
        t.push_bytes(datagram(0, 1.0));
        t.push_bytes(b"STOP".to_vec());

        let summary = Receiver::new(config(0)).run(&mut t);
        assert_eq!(summary.stop, StopReason::Terminated);
        assert_eq!(summary.report.total_received, 1);
    }

    #[test]
    fn empty_run_reports_no_data() {
        let mut t = MemoryTransport::new(Framing::Datagram);
        t.push_bytes(b"STOP".to_vec());

        let summary = Receiver::new(config(0)).run(&mut t);
        assert!(summary.report.no_data());
        assert!(summary.to_string().contains("No messages received."));
    }

    #[test]
    fn latency_uses_receive_time_per_message() {
        let mut t = MemoryTransport::new(Framing::Datagram);
        t.push_bytes(datagram(0, 100.0));
        t.push_bytes(datagram(1, 100.0));
        t.push_bytes(b"STOP".to_vec());

        // Readings: 100.001, then 100.003.
        let clock = ManualClock::new(100.001, 0.002);
        let summary = Receiver::with_clock(config(0), &clock).run(&mut t);
        let latency = summary.report.latency.unwrap();
        assert!((latency.min_ms - 1.0).abs() < 1e-6);
        assert!((latency.max_ms - 3.0).abs() < 1e-6);
    }
}
