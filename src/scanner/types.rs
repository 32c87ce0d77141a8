use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    /// A matching SYN+ACK arrived before the probe timed out.
    Open,
    /// No matching answer; closed and filtered ports look the same here.
    Filtered,
    /// The probe could not be sent (only in keep-going mode).
    Skipped,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Filtered => write!(f, "filtered"),
            PortState::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub port: u16,
    pub state: PortState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt: Option<Duration>,
}

impl ScanResult {
    pub fn new_open(port: u16, rtt: Duration) -> Self {
        Self {
            port,
            state: PortState::Open,
            service: service_name(port),
            rtt: Some(rtt),
        }
    }

    pub fn new_filtered(port: u16) -> Self {
        Self {
            port,
            state: PortState::Filtered,
            service: None,
            rtt: None,
        }
    }

    pub fn new_skipped(port: u16) -> Self {
        Self {
            port,
            state: PortState::Skipped,
            service: None,
            rtt: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == PortState::Open
    }
}

/// `<port>[ - <service>]`, the console line for an open port.
impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.service {
            Some(name) => write!(f, "{} - {}", self.port, name),
            None => write!(f, "{}", self.port),
        }
    }
}

/// Service name for a TCP port, from the system services database when it
/// has an entry, otherwise from a short list of well-known ports.
pub(crate) fn service_name(port: u16) -> Option<String> {
    system_service_name(port).or_else(|| well_known(port).map(str::to_string))
}

/// Held across every `getservbyport` call and the copy of its result.
#[cfg(unix)]
static SERVICES_DB: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(unix)]
fn system_service_name(port: u16) -> Option<String> {
    use std::ffi::CStr;

    let _guard = SERVICES_DB
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    // SAFETY: the protocol name is a valid C string. The returned entry points
    // into static storage owned by libc; `SERVICES_DB` keeps other callers in
    // this crate out until the name has been copied.
    unsafe {
        let entry = libc::getservbyport(libc::c_int::from(port.to_be()), c"tcp".as_ptr());
        if entry.is_null() || (*entry).s_name.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*entry).s_name).to_string_lossy().into_owned())
    }
}

#[cfg(not(unix))]
fn system_service_name(_port: u16) -> Option<String> {
    None
}

fn well_known(port: u16) -> Option<&'static str> {
    let name = match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        80 => "http",
        110 => "pop3",
        111 => "sunrpc",
        135 => "epmap",
        139 => "netbios-ssn",
        143 => "imap",
        443 => "https",
        445 => "microsoft-ds",
        993 => "imaps",
        995 => "pop3s",
        3389 => "ms-wbt-server",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_port_line_includes_service() {
        let result = ScanResult {
            port: 80,
            state: PortState::Open,
            service: Some("http".into()),
            rtt: None,
        };
        assert_eq!(result.to_string(), "80 - http");
    }

    #[test]
    fn test_open_port_line_without_service() {
        let result = ScanResult {
            port: 1,
            state: PortState::Open,
            service: None,
            rtt: None,
        };
        assert_eq!(result.to_string(), "1");
    }

    #[test]
    fn test_well_known_ports_resolve() {
        assert_eq!(service_name(80).as_deref(), Some("http"));
        assert_eq!(well_known(22), Some("ssh"));
        assert_eq!(well_known(65000), None);
    }

    #[test]
    fn test_concurrent_lookups_agree() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    let port = if i % 2 == 0 { 80 } else { 22 };
                    (0..200).map(|_| service_name(port)).collect::<Vec<_>>()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let expected = service_name(if i % 2 == 0 { 80 } else { 22 });
            assert!(expected.is_some());
            assert!(handle.join().unwrap().iter().all(|name| *name == expected));
        }
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(ScanResult::new_filtered(7)).unwrap();
        assert_eq!(json, serde_json::json!({ "port": 7, "state": "filtered" }));
    }
}
