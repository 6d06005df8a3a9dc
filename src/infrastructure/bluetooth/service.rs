//! Peripheral Link
//!
//! Owns the lifecycle of one logical connection: device selection, GATT
//! connection, characteristic resolution, notification subscription, outbound
//! writes, inbound decoding and teardown. State changes and log messages are
//! pushed to the owner over an unbounded channel, in emission order.
//!
//! Every adapter resource is stored on the link before the next await point,
//! so a `connect` future dropped halfway leaves nothing that `disconnect`
//! cannot reach.

use crate::domain::error::{AdapterError, CapabilityIssue, LinkError};
use crate::domain::models::{
    ConnectionState, DeviceRequest, LinkEvent, LinkMessage, PeripheralDescriptor,
    UNKNOWN_DEVICE_NAME,
};
use crate::domain::settings::LinkSettings;
use crate::infrastructure::bluetooth::{
    adapter::{BluetoothAdapter, ValueChangedHandler},
    connection::{ActiveChannel, ConnectionConfig, GattConnection},
    protocol,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct PeripheralLink<A: BluetoothAdapter> {
    adapter: A,
    request: DeviceRequest,
    config: ConnectionConfig,
    line_terminator: String,
    state: ConnectionState,
    bound: Option<PeripheralDescriptor<A::Device>>,
    // Session opened by an in-flight connect, before a characteristic is bound
    pending_session: Option<A::Session>,
    channel: Option<ActiveChannel<A>>,
    // Cleared on teardown; inbound handlers of older channels check it
    live: Arc<AtomicBool>,
    event_sender: mpsc::UnboundedSender<LinkEvent>,
}

impl<A: BluetoothAdapter> PeripheralLink<A> {
    pub fn new(
        adapter: A,
        settings: &LinkSettings,
        event_sender: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        Self {
            adapter,
            request: settings.device_request(),
            config: ConnectionConfig {
                service_uuid: settings.uart_service_uuid,
                characteristic_uuid: settings.uart_characteristic_uuid,
            },
            line_terminator: settings.line_terminator.clone(),
            state: ConnectionState::Disconnected,
            bound: None,
            pending_session: None,
            channel: None,
            live: Arc::new(AtomicBool::new(false)),
            event_sender,
        }
    }

    /// Present the device picker
    pub async fn discover(&self) -> Result<PeripheralDescriptor<A::Device>, LinkError> {
        if !self.adapter.is_capability_present() {
            warn!("Bluetooth capability not present");
            return Err(LinkError::CapabilityUnavailable(CapabilityIssue::NoAdapter));
        }
        if !self.adapter.is_secure_context() {
            warn!("Bluetooth requested from an insecure context");
            return Err(LinkError::CapabilityUnavailable(
                CapabilityIssue::InsecureContext,
            ));
        }

        info!("Requesting Bluetooth device...");
        match self.adapter.prompt_for_device(&self.request).await {
            Ok(descriptor) => {
                info!("Device selected: {} ({})", descriptor.name, descriptor.id);
                Ok(descriptor)
            }
            Err(AdapterError::NotFound) => {
                info!("No compatible device selected");
                Err(LinkError::NoDeviceFound)
            }
            Err(AdapterError::PermissionDenied) => {
                warn!("Bluetooth permission denied");
                Err(LinkError::PermissionDenied)
            }
            Err(AdapterError::Failed(reason)) => {
                error!("Bluetooth request error: {}", reason);
                Err(LinkError::RequestFailed(reason))
            }
        }
    }

    /// Connect to a picked device.
    ///
    /// An existing connection, or the leftovers of a cancelled connect, is torn
    /// down first. Every error path ends in `Disconnected` with no session left
    /// open. If the future is dropped midway the link stays `Connecting` until
    /// the next `disconnect` or `connect`, which release the session.
    pub async fn connect(
        &mut self,
        descriptor: PeripheralDescriptor<A::Device>,
    ) -> Result<(), LinkError> {
        if !self.is_idle() {
            info!("Already connected, disconnecting before new connection");
            self.disconnect().await;
        }

        let Some(device) = descriptor.device.clone() else {
            error!("Descriptor {} carries no device handle", descriptor.id);
            return Err(LinkError::GattConnectFailed(
                "invalid device: no native handle".to_string(),
            ));
        };

        info!("Connecting to {} ({})", descriptor.name, descriptor.id);
        self.set_state(ConnectionState::Connecting(descriptor.info()));
        self.live = Arc::new(AtomicBool::new(true));

        let opened = GattConnection::new(&self.adapter, &self.config)
            .open_session(&device)
            .await;
        let session = match opened {
            Ok(session) => session,
            Err(e) => return Err(self.fail_connect(e).await),
        };

        let session = self.pending_session.insert(session);
        let resolved = GattConnection::new(&self.adapter, &self.config)
            .resolve(session)
            .await;
        let bound = match resolved {
            Ok(bound) => bound,
            Err(e) => return Err(self.fail_connect(e).await),
        };
        if let Some(session) = self.pending_session.take() {
            self.channel = Some(ActiveChannel::new(session, bound));
        }

        let subscription = match self.channel.as_mut() {
            Some(channel) if channel.properties.notify => {
                let handler = inbound_handler(self.event_sender.clone(), self.live.clone());
                let result = GattConnection::new(&self.adapter, &self.config)
                    .enable_notifications(channel, handler)
                    .await;
                Some(result)
            }
            _ => {
                debug!("Characteristic does not support notifications");
                None
            }
        };

        if let Some(Err(e)) = subscription {
            warn!("Notification subscription failed: {}", e);
            self.send_message(LinkMessage::system(format!(
                "Notifications unavailable: {}",
                e
            )));
        }

        self.set_state(ConnectionState::Connected(descriptor.info()));
        self.send_message(
            LinkMessage::system(format!("Connected to {}", descriptor.name))
                .with_device_name(descriptor.name.clone()),
        );
        info!("Connected to {}", descriptor.name);
        self.bound = Some(descriptor);

        Ok(())
    }

    /// Tear down the current connection. Never fails; a no-op when already disconnected.
    pub async fn disconnect(&mut self) {
        if self.is_idle() {
            debug!("Disconnect requested while already disconnected");
            return;
        }

        self.release().await;

        self.set_state(ConnectionState::Disconnected);
        info!("Disconnected from device");
        self.send_message(LinkMessage::system("Disconnected"));
    }

    /// Write one command line. The logged message omits the terminator.
    pub async fn send(&mut self, text: &str) -> Result<(), LinkError> {
        let channel = match (&self.state, self.channel.as_ref()) {
            (ConnectionState::Connected(_), Some(channel)) if channel.properties.is_writable() => {
                channel
            }
            _ => {
                debug!("Send attempted without a writable channel");
                return Err(LinkError::NotConnected);
            }
        };

        let bytes = protocol::encode_line(text, &self.line_terminator);
        if let Err(e) = self
            .adapter
            .write_value(&channel.characteristic, &bytes)
            .await
        {
            warn!("Write failed: {}", e);
            return Err(LinkError::WriteFailed(e.to_string()));
        }

        debug!("Sent {} bytes", bytes.len());
        self.send_message(LinkMessage::outbound(text));
        Ok(())
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn bound_device(&self) -> Option<&PeripheralDescriptor<A::Device>> {
        self.bound.as_ref()
    }

    pub fn device_name(&self) -> String {
        self.bound
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string())
    }

    pub fn has_active_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    fn is_idle(&self) -> bool {
        self.channel.is_none()
            && self.pending_session.is_none()
            && matches!(self.state, ConnectionState::Disconnected)
    }

    /// Best-effort release of whatever adapter resources the link holds
    async fn release(&mut self) {
        self.live.store(false, Ordering::SeqCst);

        let connection = GattConnection::new(&self.adapter, &self.config);
        if let Some(channel) = self.channel.take() {
            connection.close(channel).await;
        }
        if let Some(session) = self.pending_session.take() {
            debug!("Closing session of an unfinished connect");
            connection.close_session(session).await;
        }
        self.bound = None;
    }

    async fn fail_connect(&mut self, e: LinkError) -> LinkError {
        error!("Connection failed: {}", e);
        self.release().await;
        self.set_state(ConnectionState::Disconnected);
        e
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state.clone();
        let _ = self.event_sender.send(LinkEvent::State(state));
    }

    fn send_message(&self, message: LinkMessage) {
        let _ = self.event_sender.send(LinkEvent::Message(message));
    }
}

/// Decode notifications into inbound messages, dropping blank ones and
/// anything delivered after `live` was cleared
fn inbound_handler(
    sender: mpsc::UnboundedSender<LinkEvent>,
    live: Arc<AtomicBool>,
) -> ValueChangedHandler {
    Box::new(move |payload: &[u8]| {
        if !live.load(Ordering::SeqCst) {
            debug!("Dropping notification for a closed channel");
            return;
        }
        if let Some(text) = protocol::decode_notification(payload) {
            let _ = sender.send(LinkEvent::Message(LinkMessage::inbound(text)));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{MessageKind, PeripheralInfo};
    use crate::domain::settings::{UART_CHARACTERISTIC_UUID, UART_SERVICE_UUID};
    use crate::infrastructure::bluetooth::adapter::CharacteristicProperties;
    use crate::infrastructure::bluetooth::fake::{
        write_notify, FakeAdapter, FakeCharacteristic, FakeService,
    };
    use std::time::Duration;
    use tokio::time::timeout;
    use uuid::Uuid;

    type Events = mpsc::UnboundedReceiver<LinkEvent>;

    fn link(adapter: &FakeAdapter) -> (PeripheralLink<FakeAdapter>, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            PeripheralLink::new(adapter.clone(), &LinkSettings::default(), tx),
            rx,
        )
    }

    fn drain(rx: &mut Events) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn messages(events: &[LinkEvent]) -> Vec<LinkMessage> {
        events
            .iter()
            .filter_map(|e| match e {
                LinkEvent::Message(m) => Some(m.clone()),
                LinkEvent::State(_) => None,
            })
            .collect()
    }

    fn states(events: &[LinkEvent]) -> Vec<ConnectionState> {
        events
            .iter()
            .filter_map(|e| match e {
                LinkEvent::State(s) => Some(s.clone()),
                LinkEvent::Message(_) => None,
            })
            .collect()
    }

    fn props(write: bool, notify: bool) -> CharacteristicProperties {
        CharacteristicProperties {
            read: true,
            write,
            notify,
            ..Default::default()
        }
    }

    async fn connected(adapter: &FakeAdapter) -> (PeripheralLink<FakeAdapter>, Events) {
        let (mut link, mut rx) = link(adapter);
        let descriptor = link.discover().await.unwrap();
        link.connect(descriptor).await.unwrap();
        drain(&mut rx);
        (link, rx)
    }

    #[tokio::test]
    async fn test_discover_requires_capability() {
        let adapter = FakeAdapter::uart();
        let (link, _rx) = link(&adapter);

        adapter.set_capability_present(false);
        assert_eq!(
            link.discover().await.unwrap_err(),
            LinkError::CapabilityUnavailable(CapabilityIssue::NoAdapter)
        );

        adapter.set_capability_present(true);
        adapter.set_secure_context(false);
        assert_eq!(
            link.discover().await.unwrap_err(),
            LinkError::CapabilityUnavailable(CapabilityIssue::InsecureContext)
        );
        assert!(adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_discover_distinguishes_failures() {
        let adapter = FakeAdapter::uart();
        let (link, _rx) = link(&adapter);

        adapter.set_prompt_result(Err(AdapterError::NotFound));
        assert_eq!(link.discover().await.unwrap_err(), LinkError::NoDeviceFound);

        adapter.set_prompt_result(Err(AdapterError::PermissionDenied));
        assert_eq!(
            link.discover().await.unwrap_err(),
            LinkError::PermissionDenied
        );

        adapter.set_prompt_result(Err(AdapterError::failed("chooser closed")));
        assert_eq!(
            link.discover().await.unwrap_err(),
            LinkError::RequestFailed("chooser closed".to_string())
        );
    }

    #[tokio::test]
    async fn test_connect_known_profile() {
        let adapter = FakeAdapter::uart();
        let (mut link, mut rx) = link(&adapter);
        let descriptor = link.discover().await.unwrap();
        link.connect(descriptor).await.unwrap();

        assert!(link.is_connected());
        assert!(link.has_active_channel());
        assert_eq!(link.device_name(), "ESP32-Terminal");
        assert!(adapter.is_subscribed());

        let calls = adapter.calls();
        assert_eq!(
            calls,
            vec![
                "prompt".to_string(),
                "open_session:fake-device-1".to_string(),
                format!("primary_service:{}", UART_SERVICE_UUID),
                format!("characteristic:{}", UART_CHARACTERISTIC_UUID),
                format!("subscribe:{}", UART_CHARACTERISTIC_UUID),
            ]
        );

        let events = drain(&mut rx);
        let info = PeripheralInfo {
            id: "fake-device-1".to_string(),
            name: "ESP32-Terminal".to_string(),
        };
        assert_eq!(
            states(&events),
            vec![
                ConnectionState::Connecting(info.clone()),
                ConnectionState::Connected(info)
            ]
        );
        let msgs = messages(&events);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, MessageKind::System);
        assert_eq!(msgs[0].content, "Connected to ESP32-Terminal");
        assert_eq!(msgs[0].device_name.as_deref(), Some("ESP32-Terminal"));
    }

    #[tokio::test]
    async fn test_fallback_picks_first_writable() {
        let first = Uuid::from_u128(0xa1);
        let writable = Uuid::from_u128(0xa2);
        let adapter = FakeAdapter::new(vec![
            FakeService::new(
                Uuid::from_u128(0xa0),
                vec![
                    FakeCharacteristic::new(first, props(false, true)),
                    FakeCharacteristic::new(writable, props(true, false)),
                    FakeCharacteristic::new(Uuid::from_u128(0xa3), props(true, true)),
                ],
            ),
            FakeService::new(
                Uuid::from_u128(0xb0),
                vec![FakeCharacteristic::new(Uuid::from_u128(0xb1), write_notify())],
            ),
        ]);
        let (mut link, _rx) = connected(&adapter).await;

        link.send("PING").await.unwrap();
        assert!(adapter
            .calls()
            .contains(&format!("write:{}", writable)));
        // the chosen characteristic has no notify, so nothing was subscribed
        assert!(!adapter.is_subscribed());
        assert!(!adapter.calls().contains(&format!("subscribe:{}", first)));
    }

    #[tokio::test]
    async fn test_fallback_without_writable_takes_first() {
        let first = Uuid::from_u128(0xc1);
        let adapter = FakeAdapter::new(vec![FakeService::new(
            Uuid::from_u128(0xc0),
            vec![
                FakeCharacteristic::new(first, props(false, true)),
                FakeCharacteristic::new(Uuid::from_u128(0xc2), props(false, false)),
            ],
        )]);
        let (link, _rx) = connected(&adapter).await;

        assert!(link.is_connected());
        assert!(adapter.calls().contains(&format!("subscribe:{}", first)));
    }

    #[tokio::test]
    async fn test_send_to_non_writable_characteristic_is_not_connected() {
        let adapter = FakeAdapter::new(vec![FakeService::new(
            Uuid::from_u128(0xd0),
            vec![FakeCharacteristic::new(
                Uuid::from_u128(0xd1),
                props(false, true),
            )],
        )]);
        let (mut link, _rx) = connected(&adapter).await;

        assert_eq!(link.send("1").await.unwrap_err(), LinkError::NotConnected);
        assert!(adapter.writes().is_empty());
    }

    #[tokio::test]
    async fn test_known_service_without_characteristic_falls_back() {
        let other = Uuid::from_u128(0xe1);
        let adapter = FakeAdapter::new(vec![FakeService::new(
            UART_SERVICE_UUID,
            vec![FakeCharacteristic::new(other, write_notify())],
        )]);
        let (link, _rx) = connected(&adapter).await;

        assert!(link.is_connected());
        let calls = adapter.calls();
        assert!(calls.contains(&"primary_services".to_string()));
        assert!(calls.contains(&format!("subscribe:{}", other)));
    }

    #[tokio::test]
    async fn test_no_services_fails_without_leaking_session() {
        let adapter = FakeAdapter::new(Vec::new());
        let (mut link, mut rx) = link(&adapter);
        let descriptor = link.discover().await.unwrap();

        let err = link.connect(descriptor).await.unwrap_err();
        assert_eq!(err, LinkError::NoCharacteristicFound);
        assert!(!err.is_retryable());
        assert_eq!(link.state(), &ConnectionState::Disconnected);
        assert!(!link.has_active_channel());
        assert!(link.bound_device().is_none());
        assert_eq!(adapter.open_sessions(), 0);
        assert_eq!(adapter.calls().last().unwrap(), "close_session:1");

        let events = drain(&mut rx);
        assert_eq!(
            states(&events).last(),
            Some(&ConnectionState::Disconnected)
        );
        assert!(messages(&events).is_empty());
    }

    #[tokio::test]
    async fn test_empty_service_fails() {
        let adapter = FakeAdapter::new(vec![FakeService::new(Uuid::from_u128(0xf0), Vec::new())]);
        let (mut link, _rx) = link(&adapter);
        let descriptor = link.discover().await.unwrap();

        assert_eq!(
            link.connect(descriptor).await.unwrap_err(),
            LinkError::NoCharacteristicFound
        );
        assert_eq!(adapter.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_enumeration_error_fails() {
        let adapter = FakeAdapter::new(Vec::new());
        adapter.fail_enumeration(Some(AdapterError::failed("GATT busy")));
        let (mut link, _rx) = link(&adapter);
        let descriptor = link.discover().await.unwrap();

        assert_eq!(
            link.connect(descriptor).await.unwrap_err(),
            LinkError::NoCharacteristicFound
        );
        assert_eq!(link.state(), &ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_gatt_connect_failure_resets_state() {
        let adapter = FakeAdapter::uart();
        adapter.fail_open(Some(AdapterError::failed("device unreachable")));
        let (mut link, mut rx) = link(&adapter);
        let descriptor = link.discover().await.unwrap();

        let err = link.connect(descriptor).await.unwrap_err();
        assert_eq!(
            err,
            LinkError::GattConnectFailed("device unreachable".to_string())
        );
        assert!(err.is_retryable());
        assert_eq!(link.state(), &ConnectionState::Disconnected);
        assert_eq!(
            states(&drain(&mut rx)).last(),
            Some(&ConnectionState::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_descriptor_without_handle_is_rejected() {
        let adapter = FakeAdapter::uart();
        let (mut link, _rx) = link(&adapter);
        let mut descriptor = link.discover().await.unwrap();
        descriptor.device = None;

        assert!(matches!(
            link.connect(descriptor).await,
            Err(LinkError::GattConnectFailed(_))
        ));
        assert_eq!(link.state(), &ConnectionState::Disconnected);
        assert_eq!(adapter.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_reported_caveat() {
        let adapter = FakeAdapter::uart();
        adapter.fail_subscribe(Some(AdapterError::failed("CCCD write rejected")));
        let (mut link, mut rx) = link(&adapter);
        let descriptor = link.discover().await.unwrap();

        link.connect(descriptor).await.unwrap();
        assert!(link.is_connected());

        let msgs = messages(&drain(&mut rx));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].kind, MessageKind::System);
        assert_eq!(
            msgs[0].content,
            "Notifications unavailable: CCCD write rejected"
        );
        assert_eq!(msgs[1].content, "Connected to ESP32-Terminal");

        // writes still work
        link.send("1").await.unwrap();

        // no unsubscribe for a channel that never subscribed
        link.disconnect().await;
        assert!(!adapter
            .calls()
            .iter()
            .any(|c| c.starts_with("unsubscribe")));
    }

    #[tokio::test]
    async fn test_send_round_trip() {
        let adapter = FakeAdapter::uart();
        let (mut link, mut rx) = connected(&adapter).await;

        link.send("PING").await.unwrap();

        assert_eq!(adapter.writes(), vec![b"PING\n".to_vec()]);
        let msgs = messages(&drain(&mut rx));
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, MessageKind::Outbound);
        assert_eq!(msgs[0].content, "PING");
    }

    #[tokio::test]
    async fn test_send_uses_configured_terminator() {
        let adapter = FakeAdapter::uart();
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = LinkSettings {
            line_terminator: "\r\n".to_string(),
            ..Default::default()
        };
        let mut link = PeripheralLink::new(adapter.clone(), &settings, tx);
        let descriptor = link.discover().await.unwrap();
        link.connect(descriptor).await.unwrap();

        link.send("AT").await.unwrap();
        assert_eq!(adapter.writes(), vec![b"AT\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let adapter = FakeAdapter::uart();
        let (mut link, mut rx) = link(&adapter);

        assert_eq!(link.send("").await.unwrap_err(), LinkError::NotConnected);
        assert_eq!(link.send("PING").await.unwrap_err(), LinkError::NotConnected);
        assert!(adapter.writes().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_connection() {
        let adapter = FakeAdapter::uart();
        let (mut link, mut rx) = connected(&adapter).await;

        adapter.fail_writes(Some(AdapterError::failed("GATT operation failed")));
        assert_eq!(
            link.send("PING").await.unwrap_err(),
            LinkError::WriteFailed("GATT operation failed".to_string())
        );
        assert!(link.is_connected());
        assert!(drain(&mut rx).is_empty());

        adapter.fail_writes(None);
        link.send("PING").await.unwrap();
        assert_eq!(adapter.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_inbound_notifications() {
        let adapter = FakeAdapter::uart();
        let (_link, mut rx) = connected(&adapter).await;

        assert!(adapter.notify(b"  \n"));
        assert!(messages(&drain(&mut rx)).is_empty());

        adapter.notify(b" STATUS:OK \n");
        adapter.notify(b"\r\n");
        adapter.notify(b"TEMP 21.5\r\n");
        let msgs = messages(&drain(&mut rx));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].kind, MessageKind::Inbound);
        assert_eq!(msgs[0].content, "STATUS:OK");
        assert_eq!(msgs[1].content, "TEMP 21.5");
    }

    #[tokio::test]
    async fn test_disconnect_tears_down_in_order() {
        let adapter = FakeAdapter::uart();
        let (mut link, mut rx) = connected(&adapter).await;
        adapter.clear_calls();

        link.disconnect().await;

        assert_eq!(
            adapter.calls(),
            vec![
                format!("unsubscribe:{}", UART_CHARACTERISTIC_UUID),
                "close_session:1".to_string(),
            ]
        );
        assert_eq!(link.state(), &ConnectionState::Disconnected);
        assert!(!link.has_active_channel());
        assert!(link.bound_device().is_none());
        assert_eq!(link.device_name(), UNKNOWN_DEVICE_NAME);
        assert!(!adapter.notify(b"late\n"));

        let events = drain(&mut rx);
        assert_eq!(states(&events), vec![ConnectionState::Disconnected]);
        let msgs = messages(&events);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "Disconnected");
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_noop() {
        let adapter = FakeAdapter::uart();
        let (mut link, mut rx) = connected(&adapter).await;

        link.disconnect().await;
        drain(&mut rx);
        adapter.clear_calls();

        link.disconnect().await;
        assert!(adapter.calls().is_empty());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(link.state(), &ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_swallows_teardown_errors() {
        let adapter = FakeAdapter::uart();
        let (mut link, _rx) = connected(&adapter).await;
        adapter.fail_unsubscribe(Some(AdapterError::failed("already gone")));
        adapter.fail_close(Some(AdapterError::failed("already gone")));

        link.disconnect().await;

        assert_eq!(link.state(), &ConnectionState::Disconnected);
        assert!(!link.has_active_channel());
        assert_eq!(adapter.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_tears_down_previous_channel_first() {
        let adapter = FakeAdapter::uart();
        let (mut link, _rx) = connected(&adapter).await;
        adapter.clear_calls();

        let descriptor = link.discover().await.unwrap();
        link.connect(descriptor).await.unwrap();

        let calls = adapter.calls();
        let unsubscribe = calls
            .iter()
            .position(|c| c.starts_with("unsubscribe"))
            .unwrap();
        let close = calls.iter().position(|c| c == "close_session:1").unwrap();
        let open = calls
            .iter()
            .position(|c| c.starts_with("open_session"))
            .unwrap();
        assert!(unsubscribe < close);
        assert!(close < open);
        assert_eq!(adapter.open_sessions(), 1);
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn test_cancelled_connect_session_closed_by_disconnect() {
        let adapter = FakeAdapter::uart();
        let (mut link, mut rx) = link(&adapter);
        let descriptor = link.discover().await.unwrap();
        adapter.stall_service_lookup(true);

        let attempt = timeout(Duration::from_millis(20), link.connect(descriptor)).await;
        assert!(attempt.is_err());
        assert!(matches!(link.state(), ConnectionState::Connecting(_)));
        assert_eq!(adapter.open_sessions(), 1);

        link.disconnect().await;

        assert_eq!(link.state(), &ConnectionState::Disconnected);
        assert_eq!(adapter.open_sessions(), 0);
        assert_eq!(adapter.calls().last().unwrap(), "close_session:1");
        let events = drain(&mut rx);
        assert_eq!(
            states(&events).last(),
            Some(&ConnectionState::Disconnected)
        );
        assert_eq!(messages(&events).last().unwrap().content, "Disconnected");
    }

    #[tokio::test]
    async fn test_connect_after_cancelled_connect_releases_old_session() {
        let adapter = FakeAdapter::uart();
        let (mut link, _rx) = link(&adapter);
        let descriptor = link.discover().await.unwrap();
        adapter.stall_service_lookup(true);
        let _ = timeout(Duration::from_millis(20), link.connect(descriptor.clone())).await;

        adapter.stall_service_lookup(false);
        link.connect(descriptor).await.unwrap();

        let calls = adapter.calls();
        let close = calls.iter().position(|c| c == "close_session:1").unwrap();
        let reopen = calls
            .iter()
            .rposition(|c| c.starts_with("open_session"))
            .unwrap();
        assert!(close < reopen);
        assert_eq!(adapter.open_sessions(), 1);
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn test_cancelled_subscribe_leaves_channel_for_teardown() {
        let adapter = FakeAdapter::uart();
        let (mut link, _rx) = link(&adapter);
        let descriptor = link.discover().await.unwrap();
        adapter.stall_subscribe(true);

        let attempt = timeout(Duration::from_millis(20), link.connect(descriptor)).await;
        assert!(attempt.is_err());
        assert!(link.has_active_channel());
        assert!(!link.is_connected());
        assert_eq!(link.send("1").await.unwrap_err(), LinkError::NotConnected);

        link.disconnect().await;

        assert!(!link.has_active_channel());
        assert_eq!(adapter.open_sessions(), 0);
        assert_eq!(link.state(), &ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_notifications_after_disconnect_are_dropped() {
        let adapter = FakeAdapter::uart();
        let (mut link, mut rx) = connected(&adapter).await;
        adapter.fail_unsubscribe(Some(AdapterError::failed("descriptor write failed")));

        link.disconnect().await;
        drain(&mut rx);

        // the adapter still holds the callback, but the link no longer listens
        assert!(adapter.notify(b"STATUS:LATE\n"));
        assert!(drain(&mut rx).is_empty());
    }
}
