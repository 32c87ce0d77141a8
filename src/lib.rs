//! TCP SYN port scanner over a raw IPv4 socket.
//!
//! [`scanner::Scanner`] probes a contiguous port range on one target with
//! hand-built SYN segments and reports the ports that answer SYN+ACK.

pub mod cli;
pub mod scanner;
