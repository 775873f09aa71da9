//! Latency and loss accounting for one receiver run.
//!
//! The [`Aggregator`] is fed one `(sequence, latency_ms)` observation per
//! decoded message and turned into a [`RunReport`] once the run ends.  It
//! keeps only running min/max/sum plus the set of sequences seen, so memory
//! grows with distinct sequences, never with stored samples.
//!
//! # Loss policies
//!
//! The two transports disagree on what "expected" means, so the caller picks
//! a [`LossPolicy`] at finalize time:
//!
//! | Policy                          | expected              | lost                          |
//! |---------------------------------|-----------------------|-------------------------------|
//! | [`LossPolicy::KnownTotal`]      | declared message count| `expected − received`         |
//! | [`LossPolicy::ObservedCeiling`] | `max(sequence) + 1`   | `expected − distinct_received`|
//!
//! The observed-ceiling policy cannot see messages lost after the highest
//! sequence that did arrive, so it under-reports trailing loss.  That bias is
//! part of the measurement and is reported as-is.

use std::collections::HashSet;
use std::fmt;

use crate::record::Framing;

/// How the expected message count is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossPolicy {
    /// The sender's message count is known out of band.
    KnownTotal(u64),
    /// Infer the total from the highest sequence observed.
    ObservedCeiling,
}

impl LossPolicy {
    /// The policy each transport uses: known total for streams, observed
    /// ceiling for datagrams.
    pub fn for_framing(framing: Framing, message_count: u64) -> Self {
        match framing {
            Framing::Line => LossPolicy::KnownTotal(message_count),
            Framing::Datagram => LossPolicy::ObservedCeiling,
        }
    }
}

/// Min / mean / max of all latency samples, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

/// Final figures for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Every decoded message, duplicates included.
    pub total_received: u64,
    /// Number of different sequence numbers seen.
    pub distinct_received: u64,
    pub expected: u64,
    pub lost: u64,
    pub loss_percentage: f64,
    /// `None` when nothing was received.
    pub latency: Option<LatencySummary>,
}

impl RunReport {
    /// `true` for an empty run; latency figures are absent.
    pub fn no_data(&self) -> bool {
        self.total_received == 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(latency) = self.latency else {
            return writeln!(f, "No messages received.");
        };
        writeln!(f, "Total Packets Received: {}", self.total_received)?;
        writeln!(
            f,
            "Packet Loss:            {} / {} ({:.2}%)",
            self.lost, self.expected, self.loss_percentage
        )?;
        writeln!(f, "--- Latency (ms) ---")?;
        writeln!(f, "Average: {:.4} ms", latency.avg_ms)?;
        writeln!(f, "Min:     {:.4} ms", latency.min_ms)?;
        writeln!(f, "Max:     {:.4} ms", latency.max_ms)
    }
}

/// Running totals for one receiver run.
#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    observations: u64,
    sequences: HashSet<u64>,
    min_ms: f64,
    max_ms: f64,
    sum_ms: f64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one decoded message.
    pub fn observe(&mut self, sequence: u64, latency_ms: f64) {
        if self.observations == 0 {
            self.min_ms = latency_ms;
            self.max_ms = latency_ms;
        } else {
            self.min_ms = self.min_ms.min(latency_ms);
            self.max_ms = self.max_ms.max(latency_ms);
        }
        self.sum_ms += latency_ms;
        self.observations += 1;
        self.sequences.insert(sequence);
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn distinct(&self) -> u64 {
        self.sequences.len() as u64
    }

    /// Build the report under `policy`.  Does not modify the aggregator, so
    /// calling it twice yields the same report.
    pub fn finalize(&self, policy: LossPolicy) -> RunReport {
        let distinct = self.distinct();
        let (expected, lost) = match policy {
            LossPolicy::KnownTotal(total) => (total, total.saturating_sub(self.observations)),
            LossPolicy::ObservedCeiling => {
                let expected = self.sequences.iter().max().map_or(0, |&max| max.saturating_add(1));
                (expected, expected.saturating_sub(distinct))
            }
        };
        let loss_percentage = if expected > 0 {
            lost as f64 / expected as f64 * 100.0
        } else {
            0.0
        };

        let latency = (self.observations > 0).then(|| LatencySummary {
            min_ms: self.min_ms,
            avg_ms: self.sum_ms / self.observations as f64,
            max_ms: self.max_ms,
        });

        RunReport {
            total_received: self.observations,
            distinct_received: distinct,
            expected,
            lost,
            loss_percentage,
            latency,
        }
    }
}
