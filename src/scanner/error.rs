use super::timer::TimerError;
use std::io;

/// `EINVAL`, reported for every argument validation failure.
pub const EINVAL: i32 = 22;

/// Status used when a failure carries no OS error number.
const GENERIC_FAILURE: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{op} failed: {source}")]
    ResourceUnavailable {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("sending probe to port {port} failed: {source}")]
    TransmitFailed {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    #[error("timer {op} failed: {source}")]
    TimerFailed {
        op: &'static str,
        #[source]
        source: TimerError,
    },
}

impl ScanError {
    pub fn resource(op: &'static str, source: io::Error) -> Self {
        Self::ResourceUnavailable { op, source }
    }

    pub fn timer(op: &'static str) -> impl FnOnce(TimerError) -> Self {
        move |source| Self::TimerFailed { op, source }
    }

    /// Name of the failing operation, as shown in the `ERROR - ...` line.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "argument",
            Self::ResourceUnavailable { op, .. } => *op,
            Self::TransmitFailed { .. } => "sendto",
            Self::ReceiveFailed(_) => "recvfrom",
            Self::TimerFailed { op, .. } => *op,
        }
    }

    /// Process status for this failure: `EINVAL` for bad arguments, the OS
    /// error number for socket failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => EINVAL,
            Self::ResourceUnavailable { source, .. }
            | Self::TransmitFailed { source, .. }
            | Self::ReceiveFailed(source) => os_code(source),
            Self::TimerFailed { .. } => GENERIC_FAILURE,
        }
    }
}

fn os_code(err: &io::Error) -> i32 {
    match err.raw_os_error() {
        Some(code) if code != 0 => code,
        _ => GENERIC_FAILURE,
    }
}
