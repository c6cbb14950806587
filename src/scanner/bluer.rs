//! BlueZ D-Bus backend for meter scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, ScanError};
use crate::advert::{Advertisement, ServiceData};
use bluer::{Adapter, AdapterEvent, Address, DeviceEvent, DeviceProperty, Session};
use futures::StreamExt;
use log::debug;
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start scanning for BLE advertisements using the BlueZ D-Bus backend.
///
/// Initializes the default adapter and starts an LE discovery with duplicate
/// data reporting enabled. Every discovered device yields an initial
/// [`Advertisement`] snapshot, and a per-device watcher forwards a fresh
/// snapshot on each service-data update so repeated broadcasts are seen.
/// Runs until the returned receiver is dropped.
pub async fn start_scan() -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let filter = bluer::DiscoveryFilter {
        transport: bluer::DiscoveryTransport::Le,
        // Report every advertisement, not just the first per device.
        duplicate_data: true,
        ..Default::default()
    };
    adapter.set_discovery_filter(filter).await?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);
    let mut discover = adapter.discover_devices().await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        let _session = session;

        while let Some(event) = discover.next().await {
            if tx.is_closed() {
                break;
            }
            if let AdapterEvent::DeviceAdded(address) = event {
                if let Err(e) = process_device(&adapter, address, &tx).await {
                    debug!("skipping device {}: {}", address, e);
                }
            }
        }
    });

    Ok(rx)
}

/// Send an initial snapshot for a discovered device and keep forwarding
/// snapshots whenever its service data changes.
async fn process_device(
    adapter: &Adapter,
    address: Address,
    tx: &mpsc::Sender<Advertisement>,
) -> Result<(), ScanError> {
    let device = adapter.device(address)?;

    if let Some(ad) = snapshot(&device, address).await? {
        let _ = tx.send(ad).await;
    }

    let tx = tx.clone();
    tokio::spawn(async move {
        let mut events = match device.events().await {
            Ok(events) => events,
            Err(e) => {
                debug!("no event stream for {}: {}", address, e);
                return;
            }
        };
        while let Some(DeviceEvent::PropertyChanged(property)) = events.next().await {
            if let DeviceProperty::ServiceData(_) = property {
                match snapshot(&device, address).await {
                    Ok(Some(ad)) => {
                        if tx.send(ad).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!("lost advertisement from {}: {}", address, e),
                }
            }
        }
    });

    Ok(())
}

/// Read the device's advertised services and service data into a snapshot.
///
/// Returns `None` for devices without service data; they can never carry a
/// reading.
async fn snapshot(
    device: &bluer::Device,
    address: Address,
) -> Result<Option<Advertisement>, ScanError> {
    let service_data = match device.service_data().await? {
        Some(data) => data,
        None => return Ok(None),
    };

    let services = device.uuids().await?.unwrap_or_default();

    Ok(Some(Advertisement {
        address: address.into(),
        services: services.into_iter().collect(),
        service_data: service_data
            .into_iter()
            .map(|(uuid, data)| ServiceData { uuid, data })
            .collect(),
    }))
}
