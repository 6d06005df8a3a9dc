//! Connection core for a BLE UART terminal.
//!
//! A [`PeripheralLink`] picks a peripheral through an injected
//! [`BluetoothAdapter`], binds one characteristic for writes and notifications,
//! and reports state changes and terminal messages as [`LinkEvent`]s.
//!
//! # Features
//!
//! - `logging` (default): `init_logger` for console and rolling-file output.
//!   Without it the crate only emits `tracing` events.
//! - `test-util`: `infrastructure::bluetooth::fake::FakeAdapter`, an in-memory
//!   adapter that records every call, for testing code built on the link.

pub mod domain;
pub mod infrastructure;

pub use domain::error::{AdapterError, CapabilityIssue, LinkError};
pub use domain::log::MessageLog;
pub use domain::models::{
    ConnectionState, DeviceFilter, DeviceRequest, LinkEvent, LinkMessage, MessageKind,
    PeripheralDescriptor, PeripheralInfo,
};
pub use domain::settings::{LinkSettings, LogSettings, SettingsService};
pub use infrastructure::bluetooth::adapter::{
    BluetoothAdapter, CharacteristicProperties, ValueChangedHandler,
};
pub use infrastructure::bluetooth::worker::{spawn_link_worker, LinkHandle};
pub use infrastructure::bluetooth::PeripheralLink;
#[cfg(feature = "logging")]
pub use infrastructure::logging::{init_logger, LoggingGuard};
