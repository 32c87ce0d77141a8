use crate::scanner::{ScanConfig, DEFAULT_END_PORT, DEFAULT_SOURCE_PORT, DEFAULT_START_PORT};
use clap::{CommandFactory, Parser};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Largest value allowed in the first octet of either address.
const MAX_FIRST_OCTET: u32 = 224;

#[derive(Parser, Debug)]
#[command(
    name = "portscan",
    version,
    about = "TCP SYN port scanner over a raw IPv4 socket (needs root or CAP_NET_RAW)"
)]
pub struct Args {
    /// Address of the local interface the probes are sent from
    #[arg(value_parser = parse_address)]
    pub local: Ipv4Addr,

    /// Host to scan
    #[arg(value_parser = parse_address)]
    pub target: Ipv4Addr,

    /// First port to probe
    #[arg(long, default_value_t = DEFAULT_START_PORT)]
    pub start_port: u16,

    /// First port not probed
    #[arg(
        long,
        default_value_t = DEFAULT_END_PORT,
        value_parser = clap::value_parser!(u32).range(2..=65536)
    )]
    pub max_port: u32,

    /// Wait per probe, in milliseconds
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_ms: u64,

    /// TCP source port carried by every probe
    #[arg(long, default_value_t = DEFAULT_SOURCE_PORT)]
    pub source_port: u16,

    /// Skip ports whose probe cannot be sent instead of stopping the scan
    #[arg(long)]
    pub keep_going: bool,

    /// Print every probed port as JSON once the scan finishes
    #[arg(long)]
    pub json: bool,

    /// More log output on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn config(&self) -> ScanConfig {
        let mut config = ScanConfig::new(self.local, self.target);
        config.start_port = self.start_port;
        config.end_port = self.max_port;
        config.probe_timeout = Duration::from_millis(self.timeout_ms);
        config.poll_interval = config.poll_interval.min(config.probe_timeout);
        config.source_port = self.source_port;
        config.abort_on_send_error = !self.keep_going;
        config
    }

    pub fn usage() -> String {
        Self::command().render_usage().to_string()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("expected four dot-separated octets, found {0}")]
    OctetCount(usize),

    #[error("octet {0:?} is not a decimal number")]
    NotDecimal(String),

    #[error("octet {value} is larger than 255")]
    OutOfRange { value: u32 },

    #[error("first octet {0} is larger than 224")]
    FirstOctet(u32),

    #[error("0.0.0.0 is not a usable address")]
    Unspecified,
}

/// Parses a dotted-decimal IPv4 address for either end of the scan.
///
/// Each octet must be a plain decimal number up to 255, the first at most
/// 224, and the address must not be all zeros.
pub fn parse_address(text: &str) -> Result<Ipv4Addr, AddressError> {
    let parts: Vec<&str> = text.split('.').collect();
    if parts.len() != 4 {
        return Err(AddressError::OctetCount(parts.len()));
    }

    let mut octets = [0u8; 4];
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressError::NotDecimal(part.to_string()));
        }
        let value: u32 = part
            .parse()
            .map_err(|_| AddressError::NotDecimal(part.to_string()))?;
        if index == 0 && value > MAX_FIRST_OCTET {
            return Err(AddressError::FirstOctet(value));
        }
        octets[index] = u8::try_from(value).map_err(|_| AddressError::OutOfRange { value })?;
    }

    let address = Ipv4Addr::from(octets);
    if address.is_unspecified() {
        return Err(AddressError::Unspecified);
    }
    Ok(address)
}
