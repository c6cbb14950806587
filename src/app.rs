//! Core run loop (business logic) for `meter-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit
//! codes so it can be tested deterministically with an injected scanner,
//! output stream, and shutdown signal.

use crate::advert::{Advertisement, scan_response_records};
use crate::mac_address::MacAddress;
use crate::meter::{Metric, is_meter_service_data};
use crate::scanner::{self, ScanError};
use clap::Parser;
use log::debug;
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::mpsc;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// MAC address of the meter device. Other devices are ignored.
    #[arg(short = 'a', long = "address")]
    pub address: Option<MacAddress>,

    /// Timeout in seconds before exiting. Has no effect with '--daemon'.
    #[arg(short = 't', long = "timeout", default_value_t = 10)]
    pub timeout: u64,

    /// Run as daemon: emit every reading until interrupted.
    #[arg(short = 'd', long = "daemon")]
    pub daemon: bool,
}

/// Errors returned by the core run loop.
///
/// Serialization failures indicate a programming defect (the metric shape is
/// fixed); they are still surfaced rather than silently dropped.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("could not marshal metric: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth
/// hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Advertisement>, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the BlueZ backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Advertisement>, ScanError>> + Send + '_>>
    {
        Box::pin(async move { scanner::start_scan().await })
    }
}

/// Run the scan loop, writing one JSON line per decoded reading to `out`.
///
/// Each received advertisement flows through classification (scan-response
/// frame, optional address filter), service-data matching, and payload
/// decoding; records failing any stage are skipped silently (malformed
/// payloads at debug level). Without `--daemon` the loop is single-shot: it
/// returns right after the first emitted reading, or when `timeout` expires.
/// With `--daemon` it runs until `shutdown` resolves or the scanner stops.
/// All three endings are normal termination.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
    shutdown: impl Future<Output = ()>,
) -> Result<(), RunError> {
    let mut advertisements = scanner.start_scan().await?;

    let deadline = async {
        if options.daemon {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(Duration::from_secs(options.timeout)).await;
        }
    };
    tokio::pin!(shutdown);
    tokio::pin!(deadline);

    loop {
        let ad = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = &mut deadline => return Ok(()),
            received = advertisements.recv() => match received {
                Some(ad) => ad,
                None => return Ok(()),
            },
        };

        for record in scan_response_records(&ad, options.address.as_ref()) {
            if !is_meter_service_data(record) {
                continue;
            }
            match Metric::decode(record, ad.address, SystemTime::now()) {
                Ok(metric) => {
                    let line = serde_json::to_string(&metric)?;
                    writeln!(out, "{}", line)?;
                    if !options.daemon {
                        return Ok(());
                    }
                }
                Err(e) => debug!("skipping service data from {}: {}", ad.address, e),
            }
        }
    }
}
