use crate::domain::models::{DeviceFilter, DeviceRequest};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// UART-like service exposed by HM-10 style modules
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);
/// Combined TX/RX characteristic of the UART-like service
pub const UART_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);
/// Nordic UART Service
pub const NORDIC_UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
/// Service used by the custom board firmware
pub const CUSTOM_SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_1234_1234_123456789abc);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ble_uart_link".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    // Device picker
    #[serde(default = "default_name_prefixes")]
    pub name_prefixes: Vec<String>,
    #[serde(default = "default_false")]
    pub accept_all_devices: bool,
    #[serde(default = "default_optional_services")]
    pub optional_services: Vec<Uuid>,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    // Known profile
    #[serde(default = "default_uart_service_uuid")]
    pub uart_service_uuid: Uuid,
    #[serde(default = "default_uart_characteristic_uuid")]
    pub uart_characteristic_uuid: Uuid,

    // Wire framing
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            name_prefixes: default_name_prefixes(),
            accept_all_devices: false,
            optional_services: default_optional_services(),
            scan_timeout_ms: default_scan_timeout_ms(),
            uart_service_uuid: default_uart_service_uuid(),
            uart_characteristic_uuid: default_uart_characteristic_uuid(),
            line_terminator: default_line_terminator(),
            log_settings: LogSettings::default(),
        }
    }
}

impl LinkSettings {
    /// Picker request built from the configured prefixes and optional services
    pub fn device_request(&self) -> DeviceRequest {
        DeviceRequest {
            filters: self
                .name_prefixes
                .iter()
                .map(|p| DeviceFilter::NamePrefix(p.clone()))
                .collect(),
            accept_all_devices: self.accept_all_devices,
            optional_services: self.optional_services.clone(),
        }
    }
}

fn default_name_prefixes() -> Vec<String> {
    vec!["ESP32".to_string(), "Arduino".to_string(), "HC-".to_string()]
}
fn default_optional_services() -> Vec<Uuid> {
    vec![
        UART_SERVICE_UUID,
        NORDIC_UART_SERVICE_UUID,
        CUSTOM_SERVICE_UUID,
    ]
}
fn default_scan_timeout_ms() -> u64 {
    10_000
}
fn default_uart_service_uuid() -> Uuid {
    UART_SERVICE_UUID
}
fn default_uart_characteristic_uuid() -> Uuid {
    UART_CHARACTERISTIC_UUID
}
fn default_line_terminator() -> String {
    "\n".to_string()
}

pub struct SettingsService {
    settings: LinkSettings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit path, falling back to defaults when it is missing or corrupt
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                LinkSettings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BleUartLink");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<LinkSettings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut LinkSettings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}
