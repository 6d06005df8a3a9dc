use thiserror::Error;

/// Why the host cannot talk Bluetooth at all
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityIssue {
    #[error("Bluetooth is not available on this host. Use a browser or system with Bluetooth LE support.")]
    NoAdapter,

    #[error("Bluetooth requires a secure context. Serve the application over HTTPS.")]
    InsecureContext,
}

/// Failures surfaced by [`crate::PeripheralLink`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Bluetooth capability unavailable: {0}")]
    CapabilityUnavailable(CapabilityIssue),

    #[error("no compatible Bluetooth device found. Check that the device is powered on and advertising.")]
    NoDeviceFound,

    #[error("Bluetooth permission denied. Allow Bluetooth access in the browser or system settings.")]
    PermissionDenied,

    #[error("failed to request Bluetooth device: {0}")]
    RequestFailed(String),

    #[error("failed to connect to GATT server: {0}")]
    GattConnectFailed(String),

    #[error("no suitable characteristic found")]
    NoCharacteristicFound,

    #[error("not connected to a device")]
    NotConnected,

    #[error("failed to send message: {0}")]
    WriteFailed(String),

    #[error("link worker has stopped")]
    WorkerStopped,
}

impl LinkError {
    /// Whether retrying the same operation can succeed without changing the peripheral
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::CapabilityUnavailable(_)
                | Self::NoCharacteristicFound
                | Self::NotConnected
                | Self::WorkerStopped
        )
    }
}

/// Failures reported by a [`crate::BluetoothAdapter`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("{0}")]
    Failed(String),
}

impl AdapterError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}
