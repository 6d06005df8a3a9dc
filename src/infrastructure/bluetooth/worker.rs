//! Single-writer command queue around a [`PeripheralLink`]
//!
//! The link itself takes `&mut self` for every state transition. To share it
//! across threads the link is moved into one tokio task and driven through
//! [`LinkHandle`], so connect/disconnect/send are applied strictly in the
//! order they were issued.

use crate::domain::error::LinkError;
use crate::domain::models::{ConnectionState, PeripheralDescriptor};
use crate::infrastructure::bluetooth::adapter::BluetoothAdapter;
use crate::infrastructure::bluetooth::service::PeripheralLink;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type Reply<T> = oneshot::Sender<T>;

pub enum LinkCommand<D> {
    Discover(Reply<Result<PeripheralDescriptor<D>, LinkError>>),
    Connect(PeripheralDescriptor<D>, Reply<Result<(), LinkError>>),
    Disconnect(Reply<()>),
    Send(String, Reply<Result<(), LinkError>>),
    State(Reply<ConnectionState>),
}

pub struct LinkHandle<D> {
    commands: mpsc::UnboundedSender<LinkCommand<D>>,
}

impl<D> Clone for LinkHandle<D> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

/// Move `link` into a background task and return a handle to it.
///
/// The task runs until every handle is dropped; it disconnects on the way out.
pub fn spawn_link_worker<A>(link: PeripheralLink<A>) -> (LinkHandle<A::Device>, JoinHandle<()>)
where
    A: BluetoothAdapter + 'static,
{
    let (commands, receiver) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(link, receiver));
    (LinkHandle { commands }, task)
}

async fn run<A: BluetoothAdapter>(
    mut link: PeripheralLink<A>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand<A::Device>>,
) {
    info!("Link worker started");

    while let Some(command) = commands.recv().await {
        match command {
            LinkCommand::Discover(reply) => {
                let _ = reply.send(link.discover().await);
            }
            LinkCommand::Connect(descriptor, reply) => {
                let result = link.connect(descriptor).await;
                if let Err(e) = &result {
                    error!("Connection failed: {}", e);
                }
                let _ = reply.send(result);
            }
            LinkCommand::Disconnect(reply) => {
                link.disconnect().await;
                let _ = reply.send(());
            }
            LinkCommand::Send(text, reply) => {
                let _ = reply.send(link.send(&text).await);
            }
            LinkCommand::State(reply) => {
                let _ = reply.send(link.state().clone());
            }
        }
    }

    debug!("All link handles dropped, shutting down worker");
    link.disconnect().await;
    info!("Link worker stopped");
}

impl<D> LinkHandle<D> {
    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> LinkCommand<D>,
    ) -> Option<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).ok()?;
        response.await.ok()
    }

    /// Fails with [`LinkError::WorkerStopped`] once the worker task is gone,
    /// as do `connect` and `send`
    pub async fn discover(&self) -> Result<PeripheralDescriptor<D>, LinkError> {
        self.request(LinkCommand::Discover)
            .await
            .unwrap_or(Err(LinkError::WorkerStopped))
    }

    pub async fn connect(&self, descriptor: PeripheralDescriptor<D>) -> Result<(), LinkError> {
        self.request(|reply| LinkCommand::Connect(descriptor, reply))
            .await
            .unwrap_or(Err(LinkError::WorkerStopped))
    }

    pub async fn disconnect(&self) {
        let _ = self.request(LinkCommand::Disconnect).await;
    }

    pub async fn send(&self, text: impl Into<String>) -> Result<(), LinkError> {
        let text = text.into();
        self.request(|reply| LinkCommand::Send(text, reply))
            .await
            .unwrap_or(Err(LinkError::WorkerStopped))
    }

    /// Current state, or `Disconnected` once the worker has stopped
    pub async fn state(&self) -> ConnectionState {
        self.request(LinkCommand::State)
            .await
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
