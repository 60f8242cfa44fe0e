use super::{
    Command, CycleReport, DeviceEvent, DeviceResult, PortState, Sample, SharedError, Status,
};
use crate::{
    address::Address,
    area::{pack_reads, PendingWrite, ReadArea, WriteQueue},
    protocol::{
        error::{Error, ErrorClass},
        session::{read_limit, write_limit, Connection, DeviceIdentity, SessionConfig},
    },
    supervisor::{reconnect, ReconnectBackoff},
    types::{DeviceConfig, Schedule},
};
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    time::{interval, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

type Waiter = oneshot::Sender<DeviceResult<()>>;

pub(super) struct DeviceActor {
    config: Arc<SessionConfig>,
    schedule: Schedule,
    conn: Option<Connection>,
    /// Set by `open()` and cleared by `close()`; scheduled cycles only run
    /// while the device is meant to be connected
    opened: bool,
    should_reconnect: bool,
    backoff: ReconnectBackoff,
    /// Frame limit the read areas were packed for
    pdu_len: u16,
    tags: Vec<Address>,
    areas: Vec<ReadArea>,
    writes: WriteQueue<Waiter>,
    mailbox: mpsc::Receiver<Command>,
    state: watch::Sender<PortState>,
    events: broadcast::Sender<DeviceEvent>,
    identity: Arc<ArcSwapOption<DeviceIdentity>>,
    cancel: CancellationToken,
}

impl DeviceActor {
    pub(super) fn new(
        config: Arc<SessionConfig>,
        device: &DeviceConfig,
        mailbox: mpsc::Receiver<Command>,
        state: watch::Sender<PortState>,
        events: broadcast::Sender<DeviceEvent>,
        identity: Arc<ArcSwapOption<DeviceIdentity>>,
        cancel: CancellationToken,
    ) -> Self {
        let pdu_len = config.preferred_pdu_size;
        Self {
            config,
            schedule: device.schedule,
            conn: None,
            opened: false,
            should_reconnect: false,
            backoff: ReconnectBackoff::new(device.max_reconnect_ceiling),
            pdu_len,
            tags: Vec::new(),
            areas: Vec::new(),
            writes: WriteQueue::new(write_limit(pdu_len)),
            mailbox,
            state,
            events,
            identity,
            cancel,
        }
    }

    fn timer(&self) -> Option<Interval> {
        let period = match self.schedule {
            Schedule::External => return None,
            Schedule::Periodic { period_ms } => period_ms,
            Schedule::Continuous { min_idle_ms } => min_idle_ms,
        };
        let mut timer = interval(Duration::from_millis(period.max(1)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(timer)
    }

    pub(super) async fn run(mut self) {
        let mut timer = self.timer();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = tick(&mut timer), if self.opened => {
                    if let Err(e) = self.execute().await {
                        tracing::debug!(error = %e, "Scheduled S7 cycle failed");
                    }
                    if let (Schedule::Continuous { .. }, Some(t)) =
                        (self.schedule, timer.as_mut())
                    {
                        t.reset();
                    }
                }
            }
        }
        self.close().await;
        tracing::debug!("S7 device task stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Open(reply) => {
                let result = self.open().await;
                let _ = reply.send(result);
            }
            Command::Close(reply) => {
                self.close().await;
                let _ = reply.send(());
            }
            Command::Execute(reply) => {
                let result = self.execute().await;
                let _ = reply.send(result);
            }
            Command::Write { area, reply } => {
                tracing::trace!(address = %area.address(), len = area.data().len(), "Write queued");
                self.writes.push(area, reply);
            }
            Command::SetTags { tags, reply } => {
                self.tags = tags;
                self.repack();
                let _ = reply.send(());
            }
            Command::Status(reply) => {
                let _ = reply.send(Status {
                    connected: self.conn.is_some(),
                    should_reconnect: self.should_reconnect,
                });
            }
        }
    }

    fn set_state(&self, next: PortState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::debug!(state = ?next, "S7 port state");
            let _ = self.events.send(DeviceEvent::PortState(next));
        }
    }

    fn repack(&mut self) {
        self.areas = pack_reads(self.tags.iter().copied(), read_limit(self.pdu_len));
        tracing::debug!(
            tags = self.tags.len(),
            areas = self.areas.len(),
            pdu_len = self.pdu_len,
            "Read areas packed"
        );
    }

    async fn open(&mut self) -> DeviceResult<()> {
        self.opened = true;
        if self.conn.is_some() {
            return Ok(());
        }
        self.set_state(PortState::Opening);
        match Connection::open(Arc::clone(&self.config)).await {
            Ok(conn) => self.on_connected(conn).await,
            Err(e) => {
                tracing::warn!(addr = %self.config.socket_addr, error = %e, "S7 open failed");
                let e = Arc::new(e);
                self.mark_for_reconnect(&e);
                Err(e)
            }
        }
    }

    /// Adopt a fresh link. Fails when the identity query already broke it.
    async fn on_connected(&mut self, mut conn: Connection) -> DeviceResult<()> {
        self.should_reconnect = false;
        self.backoff.reset();
        self.set_state(PortState::Listening);

        let pdu_len = conn.negotiated_pdu_len();
        if pdu_len != self.pdu_len {
            self.pdu_len = pdu_len;
            self.repack();
        }
        self.writes.set_limit(write_limit(pdu_len));

        let failure = match conn.read_identity().await {
            Ok(identity) => {
                tracing::info!(
                    order_number = identity.order_number.as_deref().unwrap_or("-"),
                    firmware = identity.firmware_version.as_deref().unwrap_or("-"),
                    "S7 device identified"
                );
                self.identity.store(Some(Arc::new(identity)));
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "S7 identity query failed");
                Some(e)
            }
        };
        if conn.is_broken() {
            let e = failure.unwrap_or(Error::ErrUseClosedConnection);
            self.mark_for_reconnect(&e);
            return Err(Arc::new(e));
        }
        self.conn = Some(conn);
        Ok(())
    }

    /// Drop the link and flag the next cycle for a reconnect.
    fn mark_for_reconnect(&mut self, error: &Error) {
        self.conn = None;
        self.should_reconnect = true;
        self.set_state(match error.class() {
            ErrorClass::Transport => PortState::NotResponding,
            _ => PortState::ResponseError,
        });
    }

    async fn close(&mut self) {
        self.opened = false;
        self.should_reconnect = false;
        self.backoff.reset();
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "S7 socket close failed");
            }
        }
        let closed: SharedError = Arc::new(Error::DeviceClosed);
        for pending in self.writes.drain() {
            for waiter in pending.waiters {
                let _ = waiter.send(Err(Arc::clone(&closed)));
            }
        }
        self.identity.store(None);
        self.set_state(PortState::Closed);
    }

    async fn execute(&mut self) -> DeviceResult<CycleReport> {
        let mut report = CycleReport::default();
        if self.should_reconnect {
            report.reconnected = true;
            if !self.backoff.should_attempt() {
                self.set_state(PortState::NotResponding);
                return Ok(report);
            }
            self.set_state(PortState::Opening);
            match reconnect(&mut self.backoff, &self.config).await {
                Ok(conn) => self.on_connected(conn).await?,
                Err(e) => {
                    self.set_state(PortState::NotResponding);
                    return Err(Arc::new(e));
                }
            }
            return Ok(report);
        }
        if self.conn.is_none() {
            return Err(Arc::new(Error::ErrNotConnected));
        }

        let responding = *self.state.borrow() != PortState::NotResponding;
        if responding {
            if let Some(pending) = self.writes.pop() {
                match self.write_area(pending).await {
                    Ok(()) => report.writes_completed += 1,
                    Err(e) => {
                        report.writes_failed += 1;
                        if e.requires_reconnect() {
                            self.mark_for_reconnect(&e);
                            return Err(e);
                        }
                    }
                }
            }
        }

        let mut plc_error = false;
        for index in 0..self.areas.len() {
            match self.read_area(index).await {
                Ok(()) => report.areas_read += 1,
                Err(e) if e.requires_reconnect() => {
                    self.mark_for_reconnect(&e);
                    return Err(e);
                }
                Err(_) => {
                    report.areas_failed += 1;
                    plc_error = true;
                }
            }
        }
        self.set_state(if plc_error {
            PortState::ResponseError
        } else {
            PortState::Listening
        });
        Ok(report)
    }

    async fn write_area(&mut self, pending: PendingWrite<Waiter>) -> DeviceResult<()> {
        let PendingWrite { area, waiters } = pending;
        let address = *area.address();
        let result = match self.conn.as_mut() {
            Some(conn) => match address.area().to_s7() {
                Ok(s7) if area.is_bit() => {
                    conn.write_bits(s7, address.db(), address.bit_address(), 1, area.data())
                        .await
                }
                Ok(s7) => {
                    conn.write_bytes(s7, address.db(), address.byte_offset(), area.data())
                        .await
                }
                Err(e) => Err(e),
            },
            None => Err(Error::ErrNotConnected),
        };

        let outcome: DeviceResult<()> = result.map_err(Arc::new);
        match &outcome {
            Ok(()) => {
                tracing::debug!(%address, len = area.data().len(), "S7 write completed");
                let _ = self.events.send(DeviceEvent::WriteCompleted { address });
            }
            Err(e) => {
                tracing::warn!(%address, error = %e, "S7 write failed");
                let _ = self.events.send(DeviceEvent::WriteFailed {
                    address,
                    error: Arc::clone(e),
                });
            }
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        outcome
    }

    /// Read one area and publish a sample per member.
    async fn read_area(&mut self, index: usize) -> DeviceResult<()> {
        let area = &self.areas[index];
        let start = *area.start();
        let result = match self.conn.as_mut() {
            Some(conn) => match start.area().to_s7() {
                Ok(s7) => {
                    conn.read_bytes(s7, start.db(), start.byte_offset(), area.len())
                        .await
                }
                Err(e) => Err(e),
            },
            None => Err(Error::ErrNotConnected),
        };

        match result {
            Ok(buffer) => {
                for member in area.members() {
                    let data = match area.slice_for(member, &buffer) {
                        Some(slice) => Ok(buffer.slice_ref(slice)),
                        None => Err(Arc::new(Error::InsufficientData {
                            needed: (member.end() - area.start_byte()) as usize,
                            available: buffer.len(),
                        })),
                    };
                    self.publish(*member, data);
                }
                Ok(())
            }
            Err(e) => {
                let e = Arc::new(e);
                if !e.requires_reconnect() {
                    tracing::warn!(
                        address = %start,
                        len = area.len(),
                        error = %e,
                        "S7 area read failed"
                    );
                }
                for member in area.members() {
                    self.publish(*member, Err(Arc::clone(&e)));
                }
                Err(e)
            }
        }
    }

    fn publish(&self, address: Address, data: DeviceResult<Bytes>) {
        let _ = self.events.send(DeviceEvent::Sample(Sample { address, data }));
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
