//! Scripted terminal session against the in-memory adapter.
//!
//! `cargo run --example terminal --features test-util`

use ble_uart_link::infrastructure::bluetooth::fake::FakeAdapter;
use ble_uart_link::{init_logger, spawn_link_worker, LinkSettings, MessageLog, PeripheralLink};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = LinkSettings::default();
    let _guard = init_logger(&settings.log_settings)?;
    info!("Starting BLE UART terminal demo");

    let adapter = FakeAdapter::uart();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let link = PeripheralLink::new(adapter.clone(), &settings, events_tx);
    let (handle, worker) = spawn_link_worker(link);

    let descriptor = handle.discover().await?;
    handle.connect(descriptor).await?;

    for command in ["STATUS", "LED:ON", "TEMP?"] {
        handle.send(command).await?;
    }
    adapter.notify(b"STATUS:OK\r\n");
    adapter.notify(b"TEMP 21.5\n");

    handle.disconnect().await;
    drop(handle);
    worker.await?;

    let mut log = MessageLog::new();
    let last_state = log.drain_events(&mut events);
    info!("Session ended in {:?} with {} messages", last_state, log.len());
    println!("{}", log.to_json()?);

    Ok(())
}
