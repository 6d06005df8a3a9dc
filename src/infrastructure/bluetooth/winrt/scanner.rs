//! BLE Scanner Module
//!
//! Emulates the device picker with an advertisement watcher: the first
//! advertiser matching the request within the scan window is selected.

use crate::domain::error::AdapterError;
use crate::domain::models::{DeviceRequest, PeripheralDescriptor};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Foundation::TypedEventHandler;

struct Sighting {
    address: u64,
    name: Option<String>,
    rssi: i16,
}

/// Scan until a matching device advertises or `window` elapses
pub async fn scan_for_device(
    request: &DeviceRequest,
    window: Duration,
) -> Result<PeripheralDescriptor<u64>, AdapterError> {
    info!("Starting BLE scan ({} filters)", request.filters.len());

    let watcher = BluetoothLEAdvertisementWatcher::new()?;
    watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

    let (sender, mut sightings) = mpsc::unbounded_channel();
    let filter = request.clone();

    let handler = TypedEventHandler::new(
        move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
              args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
            if let Some(args) = args.as_ref() {
                let name = args.Advertisement()?.LocalName()?.to_string();
                let name = if name.is_empty() { None } else { Some(name) };

                if filter.matches(name.as_deref()) {
                    let _ = sender.send(Sighting {
                        address: args.BluetoothAddress()?,
                        name,
                        rssi: args.RawSignalStrengthInDBm()?,
                    });
                }
            }
            Ok(())
        },
    );

    watcher.Received(&handler)?;
    watcher.Start()?;

    let found = tokio::time::timeout(window, sightings.recv()).await;

    info!("Stopping BLE scan...");
    let _ = watcher.Stop();

    match found {
        Ok(Some(sighting)) => {
            debug!(
                "Matched {:#X} ({:?}) at {} dBm",
                sighting.address, sighting.name, sighting.rssi
            );
            Ok(PeripheralDescriptor::new(
                format!("{:012X}", sighting.address),
                sighting.name,
                sighting.address,
            ))
        }
        _ => Err(AdapterError::NotFound),
    }
}
