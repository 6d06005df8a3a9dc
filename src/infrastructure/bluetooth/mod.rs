//! Bluetooth Module
//!
//! Talks to one BLE peripheral over a UART-like GATT characteristic.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              LinkHandle (worker task)                    │
//! │   (single-writer queue shared across threads)            │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  PeripheralLink                          │
//! │  (state machine, events, send/receive)                   │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │  Adapter  │  │ Connection │  │ Protocol │
//! │           │  │            │  │          │
//! │ - picker  │  │ - session  │  │ - line   │
//! │ - GATT    │  │ - fallback │  │   encode │
//! │   calls   │  │ - teardown │  │ - decode │
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`adapter`] - Host Bluetooth capability the link is built on
//! - [`connection`] - Session opening, characteristic resolution and teardown
//! - [`protocol`] - Outbound line encoding and inbound decoding
//! - [`service`] - The peripheral link itself
//! - [`worker`] - Task wrapper serialising access to a link
//! - `fake` - Deterministic in-memory test double (`test-util` feature)
//! - `winrt` - Native Windows adapter (Windows only)

pub mod adapter;
pub mod connection;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod protocol;
pub mod service;
pub mod worker;
#[cfg(windows)]
pub mod winrt;

// Re-export main service for convenience
pub use service::PeripheralLink;
