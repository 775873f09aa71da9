//! `netbench`: one-way latency, loss and throughput over TCP and UDP
//! multicast.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  records   ┌───────────┐  bytes   ┌───────────┐
//!  │  Sender  │───────────▶│ Transport │─────────▶│ Receiver  │
//!  └────┬─────┘            └───────────┘          └─────┬─────┘
//!       │ seq + send time                               │ (seq, latency)
//!       ▼                                               ▼
//!  ┌──────────┐                                   ┌────────────┐
//!  │  record  │  "<seq>:<ts>:<payload>" | STOP    │ Aggregator │──▶ RunReport
//!  └──────────┘                                   └────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`record`]    : wire format and stream reassembly
//! - [`sender`]    : paced, bounded message generation
//! - [`receiver`]  : receive loop, stop conditions, latency samples
//! - [`stats`]     : loss policies and latency aggregation
//! - [`state`]     : receiver state machine types
//! - [`transport`] : the transport capability the engines consume
//! - [`socket`]    : TCP and UDP (multicast) transports
//! - [`simulator`] : in-memory transport with a seeded fault model
//! - [`clock`]     : wall-clock sources
//! - [`config`]    : run configuration and YAML loading
//! - [`error`]     : error types

pub mod clock;
pub mod config;
pub mod error;
pub mod receiver;
pub mod record;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod stats;
pub mod transport;

pub use config::BenchConfig;
pub use error::{BenchError, Result};
pub use receiver::{ReceiveSummary, Receiver, ReceiverConfig};
pub use record::{Framing, Measurement, Record, RecordError};
pub use sender::{SendSummary, Sender, SenderConfig};
pub use state::StopReason;
pub use stats::{Aggregator, LossPolicy, RunReport};
pub use transport::{Incoming, Transport};
