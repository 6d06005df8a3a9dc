pub mod error;
pub mod log;
pub mod models;
pub mod settings;
