use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Display name used when a peripheral does not advertise one
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// A discoverable peripheral, as returned by the device picker.
///
/// `device` is the adapter-native handle. It is only meaningful to the adapter
/// that produced it and has no further meaning once the link is torn down.
#[derive(Debug, Clone)]
pub struct PeripheralDescriptor<D> {
    pub id: String,
    pub name: String,
    pub device: Option<D>,
}

impl<D> PeripheralDescriptor<D> {
    pub fn new(id: impl Into<String>, name: Option<String>, device: D) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());

        Self {
            id: id.into(),
            name,
            device: Some(device),
        }
    }

    /// Identity without the native handle
    pub fn info(&self) -> PeripheralInfo {
        PeripheralInfo {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting(PeripheralInfo),
    Connected(PeripheralInfo),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    pub fn peripheral(&self) -> Option<&PeripheralInfo> {
        match self {
            Self::Disconnected => None,
            Self::Connecting(info) | Self::Connected(info) => Some(info),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Outbound,
    Inbound,
    System,
}

/// One entry of the terminal log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkMessage {
    pub kind: MessageKind,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

impl LinkMessage {
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            device_name: None,
        }
    }

    pub fn outbound(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Outbound, content)
    }

    pub fn inbound(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Inbound, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageKind::System, content)
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }
}

/// One device-picker filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFilter {
    NamePrefix(String),
}

impl DeviceFilter {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::NamePrefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

/// What the device picker is asked for.
///
/// `optional_services` become accessible after selection even though they
/// take no part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceRequest {
    pub filters: Vec<DeviceFilter>,
    pub accept_all_devices: bool,
    pub optional_services: Vec<Uuid>,
}

impl DeviceRequest {
    pub fn matches(&self, name: Option<&str>) -> bool {
        if self.accept_all_devices {
            return true;
        }
        match name {
            Some(name) => self.filters.iter().any(|f| f.matches(name)),
            None => false,
        }
    }
}

/// Everything the link pushes to its owner, in emission order
#[derive(Debug, Clone)]
pub enum LinkEvent {
    State(ConnectionState),
    Message(LinkMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_name_placeholder() {
        let named = PeripheralDescriptor::new("aa", Some("ESP32-Terminal".to_string()), ());
        assert_eq!(named.name, "ESP32-Terminal");

        let unnamed = PeripheralDescriptor::new("bb", None, ());
        assert_eq!(unnamed.name, UNKNOWN_DEVICE_NAME);

        let blank = PeripheralDescriptor::new("cc", Some("  ".to_string()), ());
        assert_eq!(blank.name, UNKNOWN_DEVICE_NAME);
    }

    #[test]
    fn test_connection_state_peripheral() {
        let info = PeripheralInfo {
            id: "aa".to_string(),
            name: "HC-08".to_string(),
        };
        assert!(ConnectionState::Disconnected.peripheral().is_none());
        assert_eq!(
            ConnectionState::Connecting(info.clone()).peripheral(),
            Some(&info)
        );
        assert!(ConnectionState::Connected(info).is_connected());
    }

    #[test]
    fn test_device_request_matching() {
        let request = DeviceRequest {
            filters: vec![
                DeviceFilter::NamePrefix("ESP32".to_string()),
                DeviceFilter::NamePrefix("HC-".to_string()),
            ],
            ..Default::default()
        };
        assert!(request.matches(Some("ESP32-Terminal")));
        assert!(request.matches(Some("HC-05")));
        assert!(!request.matches(Some("Arduino Nano")));
        assert!(!request.matches(None));

        let any = DeviceRequest {
            accept_all_devices: true,
            ..Default::default()
        };
        assert!(any.matches(None));
    }

    #[test]
    fn test_message_serializes_kind_lowercase() {
        let msg = LinkMessage::system("Connected to HC-08").with_device_name("HC-08");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "system");
        assert_eq!(json["device_name"], "HC-08");

        let inbound = serde_json::to_value(LinkMessage::inbound("OK")).unwrap();
        assert!(inbound.get("device_name").is_none());
    }
}
