use std::time::Duration;

use anyhow::bail;

/// Configuration for the datagram endpoint and its per-peer sessions. Written
///  once at startup, read-only afterwards.
pub struct EndPointConfig {
    /// Listening port, kept as a string because it comes straight from the
    ///  command line.
    pub port: String,

    /// Deadline on each blocking read of the server loop. Expiry is silent -
    ///  the loop just polls again.
    pub read_deadline: Duration,

    /// Deadline on each outbound send attempt. Expiry is logged, never fatal.
    pub write_deadline: Duration,

    /// Capacity of each session's packet inbox. Packets arriving at a full
    ///  inbox are dropped.
    pub inbox_capacity: usize,
}

impl EndPointConfig {
    pub fn new(port: impl Into<String>) -> EndPointConfig {
        EndPointConfig {
            port: port.into(),
            read_deadline: Duration::from_secs(1),
            write_deadline: Duration::from_secs(2),
            inbox_capacity: 1024,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port.parse::<u16>().is_err() {
            bail!("invalid listening port {:?}", self.port);
        }
        if self.inbox_capacity == 0 {
            bail!("session inbox capacity must be positive");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

impl Default for EndPointConfig {
    fn default() -> EndPointConfig {
        EndPointConfig::new("8080")
    }
}
