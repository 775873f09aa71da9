//! Sender engine: emit a bounded, sequenced run of measurement records.
//!
//! [`Sender::run`] takes ownership of a [`Transport`], writes
//! `message_count` data records with sequences `0..message_count`, then one
//! `STOP` marker, then closes the transport.
//!
//! # Contract
//! - Sequences go out in strictly increasing order, each exactly once.
//! - The send timestamp is read from the clock immediately before the record
//!   is encoded, not when the run starts.
//! - Datagram runs sleep `pacing` after every data record to bound the burst
//!   rate; stream runs rely on TCP flow control and never sleep.
//! - The transport is closed on every exit path, including a failed send.
//!   A failed send ends the run early; whatever was sent is still reported.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::error::BenchError;
use crate::record::{Framing, Measurement, Record};
use crate::transport::Transport;

/// Payload length used when none is configured.
pub const DEFAULT_PAYLOAD_SIZE: usize = 100;

/// Delay between datagrams when none is configured.
pub const DEFAULT_PACING: Duration = Duration::from_millis(1);

const PAYLOAD_FILL: &str = "X";

/// Parameters of one sender run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    pub message_count: u64,
    pub payload_size: usize,
    /// Sleep after each data record; `None` sends back-to-back.
    pub pacing: Option<Duration>,
}

impl SenderConfig {
    /// Build a config with pacing applied only where the transport needs it.
    pub fn for_framing(
        framing: Framing,
        message_count: u64,
        payload_size: usize,
        pacing_interval: Duration,
    ) -> Self {
        let pacing = match framing {
            Framing::Datagram if !pacing_interval.is_zero() => Some(pacing_interval),
            _ => None,
        };
        Self {
            message_count,
            payload_size,
            pacing,
        }
    }
}

/// What a sender run achieved.
#[derive(Debug)]
pub struct SendSummary {
    pub framing: Framing,
    /// Data records handed to the transport (the `STOP` marker excluded).
    pub messages_sent: u64,
    pub stop_sent: bool,
    /// From just before the first send until the transport was released.
    pub elapsed: Duration,
    /// The failure that ended the run early, if any.
    pub error: Option<BenchError>,
}

impl SendSummary {
    /// Data records per second over [`SendSummary::elapsed`].
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.messages_sent as f64 / secs
        } else {
            0.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.stop_sent
    }
}

impl fmt::Display for SendSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} Sender Finished ---", self.framing)?;
        if let Some(e) = &self.error {
            writeln!(f, "Stopped early: {e}")?;
        }
        writeln!(
            f,
            "Sent {} messages in {:.4} seconds.",
            self.messages_sent,
            self.elapsed.as_secs_f64()
        )?;
        writeln!(f, "Throughput: {:.2} msgs/sec", self.throughput())
    }
}

/// Drives one sender run.
#[derive(Debug)]
pub struct Sender<C = SystemClock> {
    config: SenderConfig,
    clock: C,
}

impl Sender<SystemClock> {
    pub fn new(config: SenderConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Sender<C> {
    pub fn with_clock(config: SenderConfig, clock: C) -> Self {
        Self { config, clock }
    }

    /// Send the whole run over `transport` and release it.
    pub fn run<T: Transport>(&self, mut transport: T) -> SendSummary {
        let framing = transport.framing();
        let payload = PAYLOAD_FILL.repeat(self.config.payload_size);
        log::info!(
            "sending {} {} messages ({} byte payload)",
            self.config.message_count,
            framing,
            self.config.payload_size
        );

        let start = Instant::now();
        let mut messages_sent = 0;
        let result = self.send_all(&mut transport, &payload, &mut messages_sent);

        if let Err(e) = transport.close() {
            log::debug!("close after send failed: {e}");
        }
        drop(transport);
        let elapsed = start.elapsed();

        let error = result.err();
        if let Some(e) = &error {
            log::warn!("sender stopped after {messages_sent} messages: {e}");
        }
        SendSummary {
            framing,
            messages_sent,
            stop_sent: error.is_none(),
            elapsed,
            error,
        }
    }

    fn send_all<T: Transport>(
        &self,
        transport: &mut T,
        payload: &str,
        sent: &mut u64,
    ) -> Result<(), BenchError> {
        let framing = transport.framing();

        for sequence in 0..self.config.message_count {
            let record = Record::Data(Measurement::new(sequence, self.clock.now(), payload));
            let frame = record.encode_framed(framing)?;
            transport.send(&frame).map_err(BenchError::SendFailure)?;
            *sent += 1;

            if let Some(pacing) = self.config.pacing {
                thread::sleep(pacing);
            }
        }

        let stop = Record::Stop.encode_framed(framing)?;
        transport.send(&stop).map_err(BenchError::SendFailure)?;
        log::debug!("→ STOP after {sent} messages");
        Ok(())
    }
}
