//! In-memory adapter for tests and demos.
//!
//! Every adapter call is recorded in order so callers can assert on the exact
//! setup/teardown sequence. Clones share state. Failures can be injected per
//! call, and `stall_*` switches make a call hang forever so cancellation can
//! be exercised.
//!
//! Only compiled for this crate's tests or with the `test-util` feature.

use crate::domain::error::AdapterError;
use crate::domain::models::{DeviceRequest, PeripheralDescriptor};
use crate::domain::settings::{UART_CHARACTERISTIC_UUID, UART_SERVICE_UUID};
use crate::infrastructure::bluetooth::adapter::{
    BluetoothAdapter, CharacteristicProperties, ValueChangedHandler,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FakeCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
}

impl FakeCharacteristic {
    pub fn new(uuid: Uuid, properties: CharacteristicProperties) -> Self {
        Self { uuid, properties }
    }
}

#[derive(Debug, Clone)]
pub struct FakeService {
    pub uuid: Uuid,
    pub characteristics: Vec<FakeCharacteristic>,
}

impl FakeService {
    pub fn new(uuid: Uuid, characteristics: Vec<FakeCharacteristic>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FakeSession(pub u32);

pub fn write_notify() -> CharacteristicProperties {
    CharacteristicProperties {
        read: true,
        write: true,
        write_without_response: true,
        notify: true,
        indicate: false,
    }
}

struct FakeState {
    capability_present: bool,
    secure_context: bool,
    prompt_result: Result<PeripheralDescriptor<String>, AdapterError>,
    services: Vec<FakeService>,
    open_error: Option<AdapterError>,
    enumerate_error: Option<AdapterError>,
    write_error: Option<AdapterError>,
    subscribe_error: Option<AdapterError>,
    unsubscribe_error: Option<AdapterError>,
    close_error: Option<AdapterError>,
    stall_service_lookup: bool,
    stall_subscribe: bool,
    calls: Vec<String>,
    writes: Vec<Vec<u8>>,
    next_session: u32,
    open_sessions: HashSet<FakeSession>,
}

#[derive(Clone)]
pub struct FakeAdapter {
    state: Arc<Mutex<FakeState>>,
    handler: Arc<Mutex<Option<ValueChangedHandler>>>,
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FakeAdapter {
    /// Adapter exposing `services` and offering one "ESP32-Terminal" device
    pub fn new(services: Vec<FakeService>) -> Self {
        let device = PeripheralDescriptor::new(
            "fake-device-1",
            Some("ESP32-Terminal".to_string()),
            "fake-device-1".to_string(),
        );

        Self {
            state: Arc::new(Mutex::new(FakeState {
                capability_present: true,
                secure_context: true,
                prompt_result: Ok(device),
                services,
                open_error: None,
                enumerate_error: None,
                write_error: None,
                subscribe_error: None,
                unsubscribe_error: None,
                close_error: None,
                stall_service_lookup: false,
                stall_subscribe: false,
                calls: Vec::new(),
                writes: Vec::new(),
                next_session: 1,
                open_sessions: HashSet::new(),
            })),
            handler: Arc::new(Mutex::new(None)),
        }
    }

    /// Peripheral exposing the well-known UART service
    pub fn uart() -> Self {
        Self::new(vec![FakeService::new(
            UART_SERVICE_UUID,
            vec![FakeCharacteristic::new(
                UART_CHARACTERISTIC_UUID,
                write_notify(),
            )],
        )])
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    pub fn set_capability_present(&self, present: bool) {
        self.lock().capability_present = present;
    }

    pub fn set_secure_context(&self, secure: bool) {
        self.lock().secure_context = secure;
    }

    pub fn set_prompt_result(&self, result: Result<PeripheralDescriptor<String>, AdapterError>) {
        self.lock().prompt_result = result;
    }

    pub fn fail_open(&self, error: Option<AdapterError>) {
        self.lock().open_error = error;
    }

    pub fn fail_enumeration(&self, error: Option<AdapterError>) {
        self.lock().enumerate_error = error;
    }

    pub fn fail_writes(&self, error: Option<AdapterError>) {
        self.lock().write_error = error;
    }

    pub fn fail_subscribe(&self, error: Option<AdapterError>) {
        self.lock().subscribe_error = error;
    }

    pub fn fail_unsubscribe(&self, error: Option<AdapterError>) {
        self.lock().unsubscribe_error = error;
    }

    pub fn fail_close(&self, error: Option<AdapterError>) {
        self.lock().close_error = error;
    }

    /// `primary_service` never completes while set
    pub fn stall_service_lookup(&self, stall: bool) {
        self.lock().stall_service_lookup = stall;
    }

    /// `subscribe` never completes while set
    pub fn stall_subscribe(&self, stall: bool) {
        self.lock().stall_subscribe = stall;
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions.len()
    }

    pub fn is_subscribed(&self) -> bool {
        self.handler
            .lock()
            .map(|h| h.is_some())
            .unwrap_or(false)
    }

    /// Deliver a characteristic-value-changed event; returns false if nobody is subscribed
    pub fn notify(&self, payload: &[u8]) -> bool {
        let guard = self.handler.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl BluetoothAdapter for FakeAdapter {
    type Device = String;
    type Session = FakeSession;
    type Service = FakeService;
    type Characteristic = FakeCharacteristic;

    fn is_capability_present(&self) -> bool {
        self.lock().capability_present
    }

    fn is_secure_context(&self) -> bool {
        self.lock().secure_context
    }

    async fn prompt_for_device(
        &self,
        _request: &DeviceRequest,
    ) -> Result<PeripheralDescriptor<String>, AdapterError> {
        self.record("prompt".to_string());
        self.lock().prompt_result.clone()
    }

    async fn open_session(&self, device: &String) -> Result<FakeSession, AdapterError> {
        self.record(format!("open_session:{}", device));
        let mut state = self.lock();
        if let Some(e) = state.open_error.clone() {
            return Err(e);
        }
        let session = FakeSession(state.next_session);
        state.next_session += 1;
        state.open_sessions.insert(session);
        Ok(session)
    }

    async fn close_session(&self, session: FakeSession) -> Result<(), AdapterError> {
        self.record(format!("close_session:{}", session.0));
        let mut state = self.lock();
        state.open_sessions.remove(&session);
        match state.close_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn primary_service(
        &self,
        _session: &FakeSession,
        uuid: Uuid,
    ) -> Result<FakeService, AdapterError> {
        self.record(format!("primary_service:{}", uuid));
        let stall = self.lock().stall_service_lookup;
        if stall {
            std::future::pending::<()>().await;
        }
        self.lock()
            .services
            .iter()
            .find(|s| s.uuid == uuid)
            .cloned()
            .ok_or(AdapterError::NotFound)
    }

    async fn primary_services(
        &self,
        _session: &FakeSession,
    ) -> Result<Vec<FakeService>, AdapterError> {
        self.record("primary_services".to_string());
        let state = self.lock();
        match state.enumerate_error.clone() {
            Some(e) => Err(e),
            None => Ok(state.services.clone()),
        }
    }

    async fn characteristic(
        &self,
        service: &FakeService,
        uuid: Uuid,
    ) -> Result<FakeCharacteristic, AdapterError> {
        self.record(format!("characteristic:{}", uuid));
        service
            .characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(AdapterError::NotFound)
    }

    async fn characteristics(
        &self,
        service: &FakeService,
    ) -> Result<Vec<FakeCharacteristic>, AdapterError> {
        self.record(format!("characteristics:{}", service.uuid));
        Ok(service.characteristics.clone())
    }

    fn properties(&self, characteristic: &FakeCharacteristic) -> CharacteristicProperties {
        characteristic.properties
    }

    async fn write_value(
        &self,
        characteristic: &FakeCharacteristic,
        value: &[u8],
    ) -> Result<(), AdapterError> {
        self.record(format!("write:{}", characteristic.uuid));
        let mut state = self.lock();
        if let Some(e) = state.write_error.clone() {
            return Err(e);
        }
        state.writes.push(value.to_vec());
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: &FakeCharacteristic,
        on_value_changed: ValueChangedHandler,
    ) -> Result<(), AdapterError> {
        self.record(format!("subscribe:{}", characteristic.uuid));
        let stall = self.lock().stall_subscribe;
        if stall {
            std::future::pending::<()>().await;
        }
        if let Some(e) = self.lock().subscribe_error.clone() {
            return Err(e);
        }
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = Some(on_value_changed);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &FakeCharacteristic) -> Result<(), AdapterError> {
        self.record(format!("unsubscribe:{}", characteristic.uuid));
        // a failed unsubscribe leaves the callback attached
        if let Some(e) = self.lock().unsubscribe_error.clone() {
            return Err(e);
        }
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
