//! Run configuration.
//!
//! [`BenchConfig`] carries every recognised option with the defaults of the
//! classic harness (port 5007, group 224.1.1.1, 10 000 messages of 100 bytes,
//! 1 ms datagram pacing, 5 s idle timeout).  It can be read from a YAML file;
//! the command line then overrides individual fields.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BenchError;
use crate::receiver::{ReceiverConfig, DEFAULT_EXPECTED_COUNT, DEFAULT_IDLE_TIMEOUT};
use crate::record::Framing;
use crate::sender::{SenderConfig, DEFAULT_PACING, DEFAULT_PAYLOAD_SIZE};
use crate::socket::{DEFAULT_MULTICAST_GROUP, DEFAULT_MULTICAST_TTL, DEFAULT_PORT};

/// Largest payload that still fits one UDP datagram with its header fields.
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Where the TCP sender connects.
    pub target: IpAddr,
    /// Local address the receivers bind.
    pub listen: Ipv4Addr,
    pub port: u16,
    /// Datagram destination; joined by the UDP receiver when multicast.
    pub multicast_group: Ipv4Addr,
    pub multicast_ttl: u32,
    pub message_count: u64,
    pub payload_size: usize,
    /// Delay between datagrams, in milliseconds.
    pub pacing_ms: u64,
    /// Silence that ends a datagram run, in milliseconds.
    pub idle_timeout_ms: u64,
    /// Message count the TCP receiver measures loss against.
    pub expected_count: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            target: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen: Ipv4Addr::UNSPECIFIED,
            port: DEFAULT_PORT,
            multicast_group: DEFAULT_MULTICAST_GROUP,
            multicast_ttl: DEFAULT_MULTICAST_TTL,
            message_count: DEFAULT_EXPECTED_COUNT,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            pacing_ms: DEFAULT_PACING.as_millis() as u64,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT.as_millis() as u64,
            expected_count: DEFAULT_EXPECTED_COUNT,
        }
    }
}

impl BenchConfig {
    /// Read a YAML file.  Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BenchError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, BenchError> {
        serde_yaml::from_str(text).map_err(|e| BenchError::Config(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, BenchError> {
        serde_yaml::to_string(self).map_err(|e| BenchError::Config(e.to_string()))
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self, framing: Framing) -> Result<(), BenchError> {
        if self.port == 0 {
            return Err(BenchError::Config("port must be non-zero".into()));
        }
        if framing == Framing::Datagram && self.payload_size > MAX_DATAGRAM_PAYLOAD {
            return Err(BenchError::Config(format!(
                "payload of {} bytes does not fit in a datagram (max {MAX_DATAGRAM_PAYLOAD})",
                self.payload_size
            )));
        }
        if framing == Framing::Datagram && self.idle_timeout_ms == 0 {
            return Err(BenchError::Config("idle timeout must be non-zero".into()));
        }
        Ok(())
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn sender_config(&self, framing: Framing) -> SenderConfig {
        SenderConfig::for_framing(framing, self.message_count, self.payload_size, self.pacing())
    }

    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            expected_count: self.expected_count,
            idle_timeout: self.idle_timeout(),
        }
    }
}
