// src/scanner/syn.rs
use super::error::ScanError;
use super::socket::Transport;
use super::timer::Timer;
use super::types::ScanResult;
use super::util;
use super::ScanConfig;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{Ipv4Flags, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::tcp::{MutableTcpPacket, TcpFlags, TcpPacket};
use pnet::packet::Packet;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, trace, warn};

pub const IP_HEADER_LEN: usize = 20;
pub const TCP_HEADER_LEN: usize = 20;
pub const PROBE_LEN: usize = IP_HEADER_LEN + TCP_HEADER_LEN;

/// Largest IPv4 datagram.
const RX_BUFFER_LEN: usize = 65_535;

/// IPv4 + TCP SYN probe, built once per scan.
///
/// Only the TCP destination port and checksum change between probes. The
/// TCP checksum over everything else (pseudo-header included) is summed up
/// front, so each probe only folds in its destination port.
pub struct SynTemplate {
    packet: [u8; PROBE_LEN],
    tcp_sum: u32,
}

impl SynTemplate {
    pub fn new(config: &ScanConfig) -> Self {
        let mut packet = [0u8; PROBE_LEN];
        let (ip_bytes, tcp_bytes) = packet.split_at_mut(IP_HEADER_LEN);

        // ----- TCP Header -----
        let mut tcp = MutableTcpPacket::new(tcp_bytes).expect("template holds a TCP header");
        tcp.set_source(config.source_port);
        tcp.set_destination(0);
        tcp.set_sequence(config.sequence);
        tcp.set_acknowledgement(0);
        tcp.set_data_offset(5); // 20 bytes
        tcp.set_flags(TcpFlags::SYN);
        tcp.set_window(config.window);
        tcp.set_checksum(0);
        tcp.set_urgent_ptr(0);
        let tcp_sum = util::accumulate(
            util::pseudo_header_sum(config.local, config.target, TCP_HEADER_LEN as u16),
            tcp.packet(),
        );

        // ----- IPv4 Header -----
        let mut ip = MutableIpv4Packet::new(ip_bytes).expect("template holds an IPv4 header");
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_dscp(0);
        ip.set_ecn(0);
        ip.set_total_length(PROBE_LEN as u16);
        ip.set_identification(config.ip_id);
        ip.set_flags(Ipv4Flags::DontFragment);
        ip.set_fragment_offset(0);
        ip.set_ttl(config.ttl);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
        ip.set_checksum(0);
        ip.set_source(config.local);
        ip.set_destination(config.target);
        let checksum = pnet::util::checksum(ip.packet(), 5);
        ip.set_checksum(checksum);

        Self { packet, tcp_sum }
    }

    pub fn tcp_checksum(&self, port: u16) -> u16 {
        util::finish(util::add_word(self.tcp_sum, port))
    }

    /// Patches the template for `port` and returns the datagram to send.
    pub fn probe(&mut self, port: u16) -> &[u8] {
        let checksum = self.tcp_checksum(port);
        let mut tcp = MutableTcpPacket::new(&mut self.packet[IP_HEADER_LEN..])
            .expect("template holds a TCP header");
        tcp.set_destination(port);
        tcp.set_checksum(checksum);
        &self.packet
    }
}

/// The 4-tuple an answer to one probe must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeKey {
    pub local: Ipv4Addr,
    pub target: Ipv4Addr,
    pub source_port: u16,
    pub port: u16,
}

/// True when `packet` is a bare SYN+ACK from `key.target:key.port` to our
/// source port. Any other flag combination does not match.
pub fn is_syn_ack(packet: &[u8], key: &ProbeKey) -> bool {
    let Some(ip) = Ipv4Packet::new(packet) else {
        return false;
    };
    let header_len = usize::from(ip.get_header_length()) * 4;
    if header_len < IP_HEADER_LEN || packet.len() < header_len + TCP_HEADER_LEN {
        return false;
    }
    if ip.get_source() != key.target
        || ip.get_destination() != key.local
        || ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp
    {
        return false;
    }
    let Some(tcp) = TcpPacket::new(&packet[header_len..]) else {
        return false;
    };
    tcp.get_source() == key.port
        && tcp.get_destination() == key.source_port
        && tcp.get_flags() == TcpFlags::SYN | TcpFlags::ACK
}

/// Probes every port in `config.ports()` in order, one SYN each, no retries.
///
/// Returns one result per probed port, in scan order, whatever its state.
/// `on_open` is called as soon as a port answers. A send failure ends the
/// scan unless `abort_on_send_error` is off; timer and receive failures always do.
pub fn scan<T, M, F>(
    config: &ScanConfig,
    transport: &mut T,
    timer: &mut M,
    mut on_open: F,
) -> Result<Vec<ScanResult>, ScanError>
where
    T: Transport + ?Sized,
    M: Timer + ?Sized,
    F: FnMut(&ScanResult),
{
    let mut template = SynTemplate::new(config);
    let mut rx = vec![0u8; RX_BUFFER_LEN];
    let mut results = Vec::with_capacity(config.port_count());

    for port in config.ports() {
        let probe = template.probe(port);
        if let Err(source) = transport.send(probe) {
            if config.abort_on_send_error {
                return Err(ScanError::TransmitFailed { port, source });
            }
            warn!(port, error = %source, "probe not sent, skipping port");
            results.push(ScanResult::new_skipped(port));
            continue;
        }
        debug!(port, "SYN sent");

        timer
            .start(config.probe_timeout)
            .map_err(ScanError::timer("timer start"))?;
        let key = ProbeKey {
            local: config.local,
            target: config.target,
            source_port: config.source_port,
            port,
        };
        let result = match await_syn_ack(transport, timer, &mut rx, &key, config.poll_interval)? {
            Some(rtt) => {
                timer
                    .cancel()
                    .map_err(ScanError::timer("timer cancel"))?;
                let result = ScanResult::new_open(port, rtt);
                on_open(&result);
                result
            }
            None => ScanResult::new_filtered(port),
        };
        results.push(result);
    }

    Ok(results)
}

/// Receives until a matching SYN+ACK shows up or the armed timer fires.
/// Returns the time since the probe was sent on a match.
fn await_syn_ack<T, M>(
    transport: &mut T,
    timer: &M,
    rx: &mut [u8],
    key: &ProbeKey,
    poll_interval: Duration,
) -> Result<Option<Duration>, ScanError>
where
    T: Transport + ?Sized,
    M: Timer + ?Sized,
{
    loop {
        let Some(remaining) = timer.remaining() else {
            return Ok(None);
        };
        let wait = remaining.min(poll_interval);
        if let Some(len) = transport.recv(rx, wait).map_err(ScanError::ReceiveFailed)? {
            if is_syn_ack(&rx[..len], key) {
                return Ok(Some(timer.elapsed().unwrap_or_default()));
            }
            trace!(port = key.port, len, "ignoring unrelated packet");
        }
        if timer.expired() {
            return Ok(None);
        }
    }
}
