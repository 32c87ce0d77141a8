//! One's-complement arithmetic for the IPv4 and TCP header checksums (RFC 1071).

use pnet::packet::ip::IpNextHeaderProtocols;
use std::net::Ipv4Addr;

/// Adds `data` to a running checksum as big-endian 16-bit words.
///
/// The result is not folded, so partial sums can be chained and finished
/// once with [`finish`]. Used for the TCP checksum, where only the
/// destination port changes between probes. An odd trailing byte is padded
/// with a zero low byte.
pub fn accumulate(mut sum: u32, data: &[u8]) -> u32 {
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = add_word(sum, u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum = add_word(sum, u16::from_be_bytes([*last, 0]));
    }
    sum
}

/// Adds one 16-bit word, keeping the accumulator from overflowing.
pub fn add_word(sum: u32, word: u16) -> u32 {
    let sum = sum + u32::from(word);
    (sum & 0xFFFF) + (sum >> 16)
}

/// Folds the carries back into the low 16 bits and complements the result.
pub fn finish(mut sum: u32) -> u16 {
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Unfolded sum of the TCP pseudo-header for a segment of `tcp_len` bytes.
pub fn pseudo_header_sum(source: Ipv4Addr, destination: Ipv4Addr, tcp_len: u16) -> u32 {
    let mut sum = accumulate(0, &source.octets());
    sum = accumulate(sum, &destination.octets());
    sum = add_word(sum, u16::from(IpNextHeaderProtocols::Tcp.0));
    add_word(sum, tcp_len)
}

/// True when `data`, checksum field included, sums to zero.
pub fn verify(sum: u32) -> bool {
    finish(sum) == 0
}
