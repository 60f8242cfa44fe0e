//! Device actor: one task owning a [`Connection`](crate::protocol::session::Connection),
//! the packed read areas, the pending write queue and the reconnect state.
//!
//! The [`Device`] handle talks to that task over a bounded mailbox. Read
//! samples, write outcomes and port state changes are published on a
//! broadcast channel; the current port state is also kept in a watch.

mod actor;

use crate::{
    address::Address,
    area::WriteArea,
    protocol::{
        error::{Error, Result},
        session::DeviceIdentity,
    },
    types::DeviceConfig,
};
use actor::DeviceActor;
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use std::sync::Arc;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// Errors fan out to every write waiter and event subscriber.
pub type SharedError = Arc<Error>;

/// Result type of the device surface.
pub type DeviceResult<T> = std::result::Result<T, SharedError>;

const EVENT_CAPACITY: usize = 256;

/// Link state as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortState {
    #[default]
    Unknown,
    /// Handshake in progress
    Opening,
    /// Connected and answering
    Listening,
    Closed,
    /// Socket failure or timeout
    NotResponding,
    /// The PLC answered with an error or out of step
    ResponseError,
}

/// One member address of a read cycle.
#[derive(Debug, Clone)]
pub struct Sample {
    pub address: Address,
    pub data: DeviceResult<Bytes>,
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    PortState(PortState),
    Sample(Sample),
    WriteCompleted { address: Address },
    WriteFailed { address: Address, error: SharedError },
}

/// What one `execute()` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// A reconnect attempt ran during this cycle
    pub reconnected: bool,
    pub writes_completed: usize,
    pub writes_failed: usize,
    pub areas_read: usize,
    pub areas_failed: usize,
}

/// Resolves with the outcome of the queued area that carried a write.
#[derive(Debug)]
pub struct WriteTicket(oneshot::Receiver<DeviceResult<()>>);

impl WriteTicket {
    pub async fn wait(self) -> DeviceResult<()> {
        self.0.await.unwrap_or_else(|_| Err(Arc::new(Error::DeviceClosed)))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Status {
    pub connected: bool,
    pub should_reconnect: bool,
}

pub(crate) enum Command {
    Open(oneshot::Sender<DeviceResult<()>>),
    Close(oneshot::Sender<()>),
    Execute(oneshot::Sender<DeviceResult<CycleReport>>),
    Write {
        area: WriteArea,
        reply: oneshot::Sender<DeviceResult<()>>,
    },
    SetTags {
        tags: Vec<Address>,
        reply: oneshot::Sender<()>,
    },
    Status(oneshot::Sender<Status>),
}

/// Handle to a device task.
///
/// Dropping the handle cancels the task and with it the socket.
pub struct Device {
    mailbox: mpsc::Sender<Command>,
    state: watch::Receiver<PortState>,
    events: broadcast::Sender<DeviceEvent>,
    identity: Arc<ArcSwapOption<DeviceIdentity>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Device {
    /// Validate `config` and start the device task. The device stays closed
    /// until [`Device::open`] is called.
    pub fn spawn(config: DeviceConfig) -> Result<Self> {
        let session = Arc::new(config.session_config()?);
        let (mailbox, rx) = mpsc::channel(config.mailbox_capacity);
        let (state_tx, state) = watch::channel(PortState::Unknown);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let identity = Arc::new(ArcSwapOption::from(None));
        let cancel = CancellationToken::new();

        let actor = DeviceActor::new(
            session,
            &config,
            rx,
            state_tx,
            events.clone(),
            Arc::clone(&identity),
            cancel.child_token(),
        );
        let task = tokio::spawn(actor.run());
        tracing::debug!(host = %config.host, port = config.port, "S7 device task started");

        Ok(Self {
            mailbox,
            state,
            events,
            identity,
            cancel,
            task: Some(task),
        })
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> DeviceResult<T> {
        let (tx, rx) = oneshot::channel();
        self.mailbox
            .send(command(tx))
            .await
            .map_err(|_| Arc::new(Error::DeviceClosed))?;
        rx.await.map_err(|_| Arc::new(Error::DeviceClosed))
    }

    /// Connect, handshake and query the identity.
    pub async fn open(&self) -> DeviceResult<()> {
        self.call(Command::Open).await?
    }

    /// Drop the connection. Queued writes fail with `DeviceClosed`.
    pub async fn close(&self) -> DeviceResult<()> {
        self.call(Command::Close).await
    }

    /// Run one cycle: reconnect when flagged, otherwise one queued write
    /// followed by every read area.
    pub async fn execute(&self) -> DeviceResult<CycleReport> {
        self.call(Command::Execute).await?
    }

    pub async fn is_connected(&self) -> bool {
        self.call(Command::Status)
            .await
            .map(|s| s.connected)
            .unwrap_or(false)
    }

    /// Whether the next cycle will try to reconnect.
    pub async fn pending_reconnect(&self) -> bool {
        self.call(Command::Status)
            .await
            .map(|s| s.should_reconnect)
            .unwrap_or(false)
    }

    /// Queue `data` for `address`. Returns once the write is in the mailbox;
    /// the ticket resolves after the cycle that sends it.
    pub async fn write(&self, address: Address, data: &[u8]) -> DeviceResult<WriteTicket> {
        address.area().to_s7()?;
        let area = WriteArea::new(address, data)?;
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(Command::Write { area, reply })
            .await
            .map_err(|_| Arc::new(Error::DeviceClosed))?;
        Ok(WriteTicket(rx))
    }

    pub async fn write_bit(&self, address: Address, value: bool) -> DeviceResult<WriteTicket> {
        if !address.is_bit() {
            return Err(Arc::new(Error::ErrInvalidAddress(format!("{address} is not a bit"))));
        }
        self.write(address, &[value as u8]).await
    }

    /// Replace the polled tag set.
    pub async fn set_tags<I>(&self, tags: I) -> DeviceResult<()>
    where
        I: IntoIterator<Item = Address>,
    {
        let tags: Vec<Address> = tags.into_iter().collect();
        for tag in &tags {
            tag.area().to_s7()?;
        }
        self.call(|reply| Command::SetTags { tags, reply }).await
    }

    /// Identity read after the last successful connect.
    pub fn identity(&self) -> Option<Arc<DeviceIdentity>> {
        self.identity.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn port_state(&self) -> watch::Receiver<PortState> {
        self.state.clone()
    }

    /// Stop the task and wait for it to release the socket.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "S7 device task ended abnormally");
            }
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
