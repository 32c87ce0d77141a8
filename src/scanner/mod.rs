pub mod error;
pub mod socket;
pub mod syn;
pub mod timer;
pub mod types;
pub mod util;

use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::info;

pub use error::ScanError;
pub use types::{PortState, ScanResult};

use socket::RawSocket;
use timer::{ProbeTimer, Timer};

pub const DEFAULT_START_PORT: u16 = 1;
/// Exclusive; the default scan covers the well-known ports 1..=1023.
pub const DEFAULT_END_PORT: u32 = 1024;
pub const DEFAULT_SOURCE_PORT: u16 = 0xA5A5;
pub const DEFAULT_SEQUENCE: u32 = 0x1234_5678;
pub const DEFAULT_IP_ID: u16 = 0x1337;
pub const DEFAULT_TTL: u8 = 128;
pub const DEFAULT_WINDOW: u16 = 8192;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Everything one scan needs; the header constants stay fixed for its whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanConfig {
    pub local: Ipv4Addr,
    pub target: Ipv4Addr,
    pub start_port: u16,
    /// First port not scanned.
    pub end_port: u32,
    pub source_port: u16,
    pub sequence: u32,
    pub ip_id: u16,
    pub ttl: u8,
    pub window: u16,
    pub probe_timeout: Duration,
    /// Longest single blocking receive while waiting for an answer.
    pub poll_interval: Duration,
    pub abort_on_send_error: bool,
}

impl ScanConfig {
    pub fn new(local: Ipv4Addr, target: Ipv4Addr) -> Self {
        Self {
            local,
            target,
            start_port: DEFAULT_START_PORT,
            end_port: DEFAULT_END_PORT,
            source_port: DEFAULT_SOURCE_PORT,
            sequence: DEFAULT_SEQUENCE,
            ip_id: DEFAULT_IP_ID,
            ttl: DEFAULT_TTL,
            window: DEFAULT_WINDOW,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            abort_on_send_error: true,
        }
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.start_port == 0 {
            return Err(ScanError::InvalidArgument("port 0 cannot be scanned".into()));
        }
        if u32::from(self.start_port) >= self.end_port || self.end_port > 1 << 16 {
            return Err(ScanError::InvalidArgument(format!(
                "empty or out of range port range {}..{}",
                self.start_port, self.end_port
            )));
        }
        if self.probe_timeout.is_zero() || self.poll_interval.is_zero() {
            return Err(ScanError::InvalidArgument(
                "timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> {
        (u32::from(self.start_port)..self.end_port).filter_map(|port| u16::try_from(port).ok())
    }

    pub fn port_count(&self) -> usize {
        self.end_port.saturating_sub(u32::from(self.start_port)) as usize
    }
}

pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Opens the raw socket and timer, probes every port, then releases both.
    /// `on_open` sees each open port as soon as it answers.
    pub fn run<F>(&self, on_open: F) -> Result<Vec<ScanResult>, ScanError>
    where
        F: FnMut(&ScanResult),
    {
        self.config.validate()?;

        let mut socket = RawSocket::open(self.config.local, self.config.target)?;
        let mut timer = ProbeTimer::create();

        info!(
            local = %self.config.local,
            target = %self.config.target,
            ports = self.config.port_count(),
            "starting SYN scan"
        );
        let started = Instant::now();
        let outcome = syn::scan(&self.config, &mut socket, &mut timer, on_open);
        let closed = timer.close().map_err(ScanError::timer("timer close"));
        drop(socket);

        let results = outcome?;
        closed?;
        info!(
            probed = results.len(),
            open = results.iter().filter(|r| r.is_open()).count(),
            elapsed = ?started.elapsed(),
            "scan complete"
        );
        Ok(results)
    }
}
