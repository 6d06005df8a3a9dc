//! Host Bluetooth capability consumed by the link
//!
//! Everything that touches a real radio sits behind [`BluetoothAdapter`], so the
//! link logic runs unchanged against WinRT, a browser bridge, or the in-memory
//! fake used in tests.

use crate::domain::error::AdapterError;
use crate::domain::models::{DeviceRequest, PeripheralDescriptor};
use async_trait::async_trait;
use uuid::Uuid;

/// Capabilities advertised by a GATT characteristic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicProperties {
    /// Accepts writes in either mode
    pub fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }
}

/// Invoked once per characteristic-value-changed event, in adapter order
pub type ValueChangedHandler = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Native device handle carried by a [`PeripheralDescriptor`]
    type Device: Clone + Send + Sync + 'static;
    type Session: Send + Sync;
    type Service: Send + Sync;
    type Characteristic: Send + Sync;

    fn is_capability_present(&self) -> bool;
    fn is_secure_context(&self) -> bool;

    async fn prompt_for_device(
        &self,
        request: &DeviceRequest,
    ) -> Result<PeripheralDescriptor<Self::Device>, AdapterError>;

    async fn open_session(&self, device: &Self::Device) -> Result<Self::Session, AdapterError>;
    async fn close_session(&self, session: Self::Session) -> Result<(), AdapterError>;

    async fn primary_service(
        &self,
        session: &Self::Session,
        uuid: Uuid,
    ) -> Result<Self::Service, AdapterError>;
    async fn primary_services(
        &self,
        session: &Self::Session,
    ) -> Result<Vec<Self::Service>, AdapterError>;

    async fn characteristic(
        &self,
        service: &Self::Service,
        uuid: Uuid,
    ) -> Result<Self::Characteristic, AdapterError>;
    async fn characteristics(
        &self,
        service: &Self::Service,
    ) -> Result<Vec<Self::Characteristic>, AdapterError>;
    fn properties(&self, characteristic: &Self::Characteristic) -> CharacteristicProperties;

    async fn write_value(
        &self,
        characteristic: &Self::Characteristic,
        value: &[u8],
    ) -> Result<(), AdapterError>;
    async fn subscribe(
        &self,
        characteristic: &Self::Characteristic,
        on_value_changed: ValueChangedHandler,
    ) -> Result<(), AdapterError>;
    async fn unsubscribe(&self, characteristic: &Self::Characteristic) -> Result<(), AdapterError>;
}
