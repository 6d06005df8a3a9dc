//! WinRT Bluetooth adapter
//!
//! Native Windows implementation of [`BluetoothAdapter`]. Devices are addressed
//! by their 48-bit Bluetooth address; a session is the `BluetoothLEDevice`.

mod scanner;

use crate::domain::error::AdapterError;
use crate::domain::models::{DeviceRequest, PeripheralDescriptor};
use crate::infrastructure::bluetooth::adapter::{
    BluetoothAdapter, CharacteristicProperties, ValueChangedHandler,
};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use windows::core::GUID;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattCharacteristicProperties,
    GattClientCharacteristicConfigurationDescriptorValue, GattCommunicationStatus,
    GattDeviceService, GattValueChangedEventArgs,
};
use windows::Devices::Bluetooth::{BluetoothAdapter as RadioAdapter, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter, IBuffer};
use windows::Win32::Foundation::E_ACCESSDENIED;

impl From<windows::core::Error> for AdapterError {
    fn from(e: windows::core::Error) -> Self {
        if e.code() == E_ACCESSDENIED {
            AdapterError::PermissionDenied
        } else {
            AdapterError::Failed(e.message().to_string())
        }
    }
}

fn check_status(status: GattCommunicationStatus, what: &str) -> Result<(), AdapterError> {
    if status == GattCommunicationStatus::Success {
        Ok(())
    } else if status == GattCommunicationStatus::AccessDenied {
        Err(AdapterError::PermissionDenied)
    } else {
        Err(AdapterError::Failed(format!("{}: {:?}", what, status)))
    }
}

fn guid(uuid: Uuid) -> GUID {
    GUID::from_u128(uuid.as_u128())
}

fn read_buffer(buffer: &IBuffer) -> windows::core::Result<Vec<u8>> {
    let reader = DataReader::FromBuffer(buffer)?;
    let length = reader.UnconsumedBufferLength()? as usize;
    let mut bytes = vec![0u8; length];
    reader.ReadBytes(&mut bytes)?;
    Ok(bytes)
}

/// GATT characteristic plus its value-changed registration
pub struct WinRtCharacteristic {
    inner: GattCharacteristic,
    token: Mutex<Option<i64>>,
}

impl WinRtCharacteristic {
    fn new(inner: GattCharacteristic) -> Self {
        Self {
            inner,
            token: Mutex::new(None),
        }
    }
}

pub struct WinRtAdapter {
    capability_present: bool,
    scan_window: Duration,
}

impl WinRtAdapter {
    /// Probe the default radio once; `scan_window` bounds the emulated picker
    pub async fn new(scan_window: Duration) -> Self {
        let capability_present = match Self::probe_radio().await {
            Ok(supported) => supported,
            Err(e) => {
                warn!("No usable Bluetooth radio: {}", e);
                false
            }
        };
        info!("Bluetooth LE supported: {}", capability_present);

        Self {
            capability_present,
            scan_window,
        }
    }

    async fn probe_radio() -> windows::core::Result<bool> {
        let radio = RadioAdapter::GetDefaultAsync()?.await?;
        radio.IsLowEnergySupported()
    }
}

#[async_trait]
impl BluetoothAdapter for WinRtAdapter {
    type Device = u64;
    type Session = BluetoothLEDevice;
    type Service = GattDeviceService;
    type Characteristic = WinRtCharacteristic;

    fn is_capability_present(&self) -> bool {
        self.capability_present
    }

    fn is_secure_context(&self) -> bool {
        true
    }

    async fn prompt_for_device(
        &self,
        request: &DeviceRequest,
    ) -> Result<PeripheralDescriptor<u64>, AdapterError> {
        scanner::scan_for_device(request, self.scan_window).await
    }

    async fn open_session(&self, address: &u64) -> Result<BluetoothLEDevice, AdapterError> {
        info!("Connecting to Bluetooth device: {:#X}", address);
        let device = BluetoothLEDevice::FromBluetoothAddressAsync(*address)?.await?;
        info!("Device connected: {:?}", device.Name()?);
        Ok(device)
    }

    async fn close_session(&self, device: BluetoothLEDevice) -> Result<(), AdapterError> {
        device.Close()?;
        Ok(())
    }

    async fn primary_service(
        &self,
        device: &BluetoothLEDevice,
        uuid: Uuid,
    ) -> Result<GattDeviceService, AdapterError> {
        let result = device.GetGattServicesForUuidAsync(guid(uuid))?.await?;
        check_status(result.Status()?, "get GATT services")?;

        let services = result.Services()?;
        if services.Size()? == 0 {
            return Err(AdapterError::NotFound);
        }
        Ok(services.GetAt(0)?)
    }

    async fn primary_services(
        &self,
        device: &BluetoothLEDevice,
    ) -> Result<Vec<GattDeviceService>, AdapterError> {
        let result = device.GetGattServicesAsync()?.await?;
        check_status(result.Status()?, "get GATT services")?;

        let services = result.Services()?;
        let mut found = Vec::new();
        for i in 0..services.Size()? {
            found.push(services.GetAt(i)?);
        }
        debug!("Found {} primary services", found.len());
        Ok(found)
    }

    async fn characteristic(
        &self,
        service: &GattDeviceService,
        uuid: Uuid,
    ) -> Result<WinRtCharacteristic, AdapterError> {
        let result = service
            .GetCharacteristicsForUuidAsync(guid(uuid))?
            .await?;
        check_status(result.Status()?, "get characteristics")?;

        let characteristics = result.Characteristics()?;
        if characteristics.Size()? == 0 {
            return Err(AdapterError::NotFound);
        }
        Ok(WinRtCharacteristic::new(characteristics.GetAt(0)?))
    }

    async fn characteristics(
        &self,
        service: &GattDeviceService,
    ) -> Result<Vec<WinRtCharacteristic>, AdapterError> {
        let result = service.GetCharacteristicsAsync()?.await?;
        check_status(result.Status()?, "get characteristics")?;

        let characteristics = result.Characteristics()?;
        let mut found = Vec::new();
        for i in 0..characteristics.Size()? {
            found.push(WinRtCharacteristic::new(characteristics.GetAt(i)?));
        }
        Ok(found)
    }

    fn properties(&self, characteristic: &WinRtCharacteristic) -> CharacteristicProperties {
        let raw = match characteristic.inner.CharacteristicProperties() {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not read characteristic properties: {}", e);
                return CharacteristicProperties::default();
            }
        };
        let has = |flag: GattCharacteristicProperties| (raw.0 & flag.0) != 0;

        CharacteristicProperties {
            read: has(GattCharacteristicProperties::Read),
            write: has(GattCharacteristicProperties::Write),
            write_without_response: has(GattCharacteristicProperties::WriteWithoutResponse),
            notify: has(GattCharacteristicProperties::Notify),
            indicate: has(GattCharacteristicProperties::Indicate),
        }
    }

    async fn write_value(
        &self,
        characteristic: &WinRtCharacteristic,
        value: &[u8],
    ) -> Result<(), AdapterError> {
        let writer = DataWriter::new()?;
        writer.WriteBytes(value)?;
        let buffer = writer.DetachBuffer()?;

        let status = characteristic.inner.WriteValueAsync(&buffer)?.await?;
        check_status(status, "write value")
    }

    async fn subscribe(
        &self,
        characteristic: &WinRtCharacteristic,
        on_value_changed: ValueChangedHandler,
    ) -> Result<(), AdapterError> {
        let status = characteristic
            .inner
            .WriteClientCharacteristicConfigurationDescriptorAsync(
                GattClientCharacteristicConfigurationDescriptorValue::Notify,
            )?
            .await?;
        check_status(status, "enable notifications")?;

        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<GattCharacteristic>,
                  args: windows::core::Ref<GattValueChangedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    if let Ok(value) = args.CharacteristicValue() {
                        if let Ok(bytes) = read_buffer(&value) {
                            on_value_changed(&bytes);
                        }
                    }
                }
                Ok(())
            },
        );

        let token = characteristic.inner.ValueChanged(&handler)?;
        if let Ok(mut slot) = characteristic.token.lock() {
            *slot = Some(token);
        }
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &WinRtCharacteristic) -> Result<(), AdapterError> {
        let token = characteristic
            .token
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(token) = token {
            characteristic.inner.RemoveValueChanged(token)?;
        }

        let status = characteristic
            .inner
            .WriteClientCharacteristicConfigurationDescriptorAsync(
                GattClientCharacteristicConfigurationDescriptorValue::None,
            )?
            .await?;
        check_status(status, "disable notifications")
    }
}
