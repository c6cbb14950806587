//! BLE scanner for meter advertisements.
//!
//! The backend owns all Bluetooth state and reduces every received broadcast
//! to an [`Advertisement`] snapshot on a channel; classification and decoding
//! happen downstream in [`crate::app`].

pub mod bluer;

use crate::advert::Advertisement;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for scanner operations.
///
/// Adapter acquisition failures are fatal to the caller; the process cannot
/// scan without a radio.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// Channel buffer size for advertisement snapshots.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Start scanning for BLE advertisements.
///
/// Returns a receiver of advertisement snapshots. The scan runs until the
/// receiver is dropped.
pub async fn start_scan() -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    bluer::start_scan().await
}
