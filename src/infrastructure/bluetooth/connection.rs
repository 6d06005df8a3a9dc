//! GATT Connection Module
//!
//! Opens the GATT session, resolves the characteristic used for both writes and
//! notifications, and tears the resulting channel down again.

use crate::domain::error::{AdapterError, LinkError};
use crate::domain::settings::{UART_CHARACTERISTIC_UUID, UART_SERVICE_UUID};
use crate::infrastructure::bluetooth::adapter::{
    BluetoothAdapter, CharacteristicProperties, ValueChangedHandler,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for characteristic resolution
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Service tried before falling back to enumeration
    pub service_uuid: Uuid,
    /// Characteristic looked up inside `service_uuid`
    pub characteristic_uuid: Uuid,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            service_uuid: UART_SERVICE_UUID,
            characteristic_uuid: UART_CHARACTERISTIC_UUID,
        }
    }
}

/// How the bound characteristic was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KnownProfile,
    Fallback,
}

/// Service and characteristic picked inside an open session
pub struct BoundCharacteristic<A: BluetoothAdapter> {
    pub service: A::Service,
    pub characteristic: A::Characteristic,
    pub properties: CharacteristicProperties,
    pub resolution: Resolution,
}

/// Session, service and characteristic of one live connection
pub struct ActiveChannel<A: BluetoothAdapter> {
    pub session: A::Session,
    pub service: A::Service,
    pub characteristic: A::Characteristic,
    pub properties: CharacteristicProperties,
    pub resolution: Resolution,
    pub subscribed: bool,
}

impl<A: BluetoothAdapter> ActiveChannel<A> {
    pub fn new(session: A::Session, bound: BoundCharacteristic<A>) -> Self {
        Self {
            session,
            service: bound.service,
            characteristic: bound.characteristic,
            properties: bound.properties,
            resolution: bound.resolution,
            subscribed: false,
        }
    }
}

/// GATT connection handler
pub struct GattConnection<'a, A: BluetoothAdapter> {
    adapter: &'a A,
    config: &'a ConnectionConfig,
}

impl<'a, A: BluetoothAdapter> GattConnection<'a, A> {
    pub fn new(adapter: &'a A, config: &'a ConnectionConfig) -> Self {
        Self { adapter, config }
    }

    /// Step 1: GATT session
    pub async fn open_session(&self, device: &A::Device) -> Result<A::Session, LinkError> {
        let session = self
            .adapter
            .open_session(device)
            .await
            .map_err(|e| LinkError::GattConnectFailed(e.to_string()))?;
        debug!("GATT session opened");
        Ok(session)
    }

    /// Step 2: known profile, then enumeration.
    ///
    /// The session is only borrowed; closing it on failure is up to the owner.
    pub async fn resolve(&self, session: &A::Session) -> Result<BoundCharacteristic<A>, LinkError> {
        let resolved = match self.resolve_known_profile(session).await {
            Ok((service, characteristic)) => Some((service, characteristic, Resolution::KnownProfile)),
            Err(e) => {
                info!(
                    "Known UART profile unavailable ({}), falling back to service enumeration",
                    e
                );
                self.resolve_fallback(session)
                    .await
                    .map(|(service, characteristic)| (service, characteristic, Resolution::Fallback))
            }
        };

        let Some((service, characteristic, resolution)) = resolved else {
            warn!("No usable characteristic found");
            return Err(LinkError::NoCharacteristicFound);
        };

        let properties = self.adapter.properties(&characteristic);
        info!(
            "Resolved characteristic via {:?}, properties: {:?}",
            resolution, properties
        );

        Ok(BoundCharacteristic {
            service,
            characteristic,
            properties,
            resolution,
        })
    }

    async fn resolve_known_profile(
        &self,
        session: &A::Session,
    ) -> Result<(A::Service, A::Characteristic), AdapterError> {
        let service = self
            .adapter
            .primary_service(session, self.config.service_uuid)
            .await?;
        let characteristic = self
            .adapter
            .characteristic(&service, self.config.characteristic_uuid)
            .await?;
        Ok((service, characteristic))
    }

    /// First primary service; its first writable characteristic, else its first one
    async fn resolve_fallback(
        &self,
        session: &A::Session,
    ) -> Option<(A::Service, A::Characteristic)> {
        let services = match self.adapter.primary_services(session).await {
            Ok(services) => services,
            Err(e) => {
                warn!("Service enumeration failed: {}", e);
                return None;
            }
        };
        debug!("Fallback found {} primary services", services.len());

        let service = services.into_iter().next()?;
        let characteristics = match self.adapter.characteristics(&service).await {
            Ok(characteristics) => characteristics,
            Err(e) => {
                warn!("Characteristic enumeration failed: {}", e);
                return None;
            }
        };
        debug!("Fallback service has {} characteristics", characteristics.len());

        let writable = characteristics
            .iter()
            .position(|c| self.adapter.properties(c).write)
            .unwrap_or(0);
        let characteristic = characteristics.into_iter().nth(writable)?;

        Some((service, characteristic))
    }

    /// Subscribe to value changes on the bound characteristic
    pub async fn enable_notifications(
        &self,
        channel: &mut ActiveChannel<A>,
        handler: ValueChangedHandler,
    ) -> Result<(), AdapterError> {
        info!("Enabling notifications...");
        self.adapter
            .subscribe(&channel.characteristic, handler)
            .await?;
        channel.subscribed = true;
        info!("Notifications enabled successfully");
        Ok(())
    }

    /// Best-effort teardown: unsubscribe, then close the session
    pub async fn close(&self, channel: ActiveChannel<A>) {
        if channel.subscribed {
            if let Err(e) = self.adapter.unsubscribe(&channel.characteristic).await {
                warn!("Failed to stop notifications: {}", e);
            }
        }

        let ActiveChannel { session, .. } = channel;
        self.close_session(session).await;
    }

    /// Close a session that never got a channel bound to it
    pub async fn close_session(&self, session: A::Session) {
        if let Err(e) = self.adapter.close_session(session).await {
            warn!("Failed to close GATT session: {}", e);
        }
    }
}
