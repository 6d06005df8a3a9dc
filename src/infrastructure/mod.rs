pub mod bluetooth;
#[cfg(feature = "logging")]
pub mod logging;
