// src/main.rs
use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use portscan::cli::Args;
use portscan::scanner::error::EINVAL;
use portscan::scanner::{ScanError, Scanner};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            eprint!("{err}");
            println!("{}", Args::usage());
            return exit_code(EINVAL);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    init_logging(args.verbose)?;

    let scanner = Scanner::new(args.config());
    debug!(
        config = %serde_json::to_string(scanner.config()).context("serializing config")?,
        "effective configuration"
    );

    let results = scanner.run(|result| {
        if !args.json {
            println!("{result}");
        }
    })?;

    if args.json {
        let json = serde_json::to_string_pretty(&results).context("serializing results")?;
        println!("{json}");
    }
    Ok(())
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("initializing logging")
}

/// Console lines and process status for a failed run.
#[derive(Debug, PartialEq, Eq)]
struct Failure {
    lines: Vec<String>,
    status: i32,
}

/// Status for failures that are not `ScanError`s, same as `ExitCode::FAILURE`.
const FAILURE_STATUS: i32 = 1;

fn failure(err: &anyhow::Error) -> Failure {
    match err.downcast_ref::<ScanError>() {
        Some(ScanError::InvalidArgument(reason)) => Failure {
            lines: vec![reason.clone(), Args::usage()],
            status: EINVAL,
        },
        Some(scan) => Failure {
            lines: vec![format!(
                "ERROR - {} error, errno/status: {}",
                scan.operation(),
                scan.exit_code()
            )],
            status: scan.exit_code(),
        },
        None => Failure {
            lines: vec![format!("ERROR - {err:#}")],
            status: FAILURE_STATUS,
        },
    }
}

fn report(err: &anyhow::Error) -> ExitCode {
    let failure = failure(err);
    for line in &failure.lines {
        println!("{line}");
    }
    exit_code(failure.status)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use portscan::scanner::timer::TimerError;
    use std::io;

    #[test]
    fn test_socket_failure_reports_os_error() {
        let err = anyhow::Error::from(ScanError::resource("socket", io::Error::from_raw_os_error(1)));
        assert_eq!(
            failure(&err),
            Failure {
                lines: vec!["ERROR - socket error, errno/status: 1".to_string()],
                status: 1,
            }
        );
    }

    #[test]
    fn test_send_failure_reports_sendto() {
        let err = anyhow::Error::from(ScanError::TransmitFailed {
            port: 443,
            source: io::Error::from_raw_os_error(101),
        });
        let failure = failure(&err);
        assert_eq!(failure.lines, vec!["ERROR - sendto error, errno/status: 101"]);
        assert_eq!(failure.status, 101);
    }

    #[test]
    fn test_context_keeps_scan_error_visible() {
        let err = anyhow::Error::from(ScanError::timer("timer start")(TimerError::Closed))
            .context("scanning");
        assert_eq!(failure(&err).lines, vec!["ERROR - timer start error, errno/status: 1"]);
    }

    #[test]
    fn test_invalid_argument_prints_usage() {
        let err = anyhow::Error::from(ScanError::InvalidArgument("empty port range".into()));
        let failure = failure(&err);
        assert_eq!(failure.status, EINVAL);
        assert_eq!(failure.lines[0], "empty port range");
        assert!(failure.lines[1].starts_with("Usage:"), "{:?}", failure.lines);
    }

    #[test]
    fn test_other_errors_fall_back_to_failure() {
        let err = anyhow::anyhow!("initializing logging");
        let failure = failure(&err);
        assert_eq!(failure.status, FAILURE_STATUS);
        assert_eq!(failure.lines, vec!["ERROR - initializing logging"]);
    }
}
