//! One poll cycle: open both connections, read every device, close both.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::broker::{BrokerConnection, BrokerConnector};
use crate::bus::{BusConnector, BusSession};
use crate::error::{ConnectionError, ItemError};
use crate::publisher::Publisher;
use crate::reader::read_measurement;
use crate::registers::{Register, RegisterMap};

/// Lifecycle states of a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    ConnectingBroker,
    ConnectingBus,
    Iterating,
    Closing,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every (device, register) pair was attempted.
    Completed,
    /// A connection could not be opened; nothing was read.
    Aborted(String),
}

/// Summary of a finished cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub id: u64,
    pub published: usize,
    pub failed: usize,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    fn aborted(id: u64, err: &ConnectionError) -> Self {
        Self {
            id,
            published: 0,
            failed: 0,
            outcome: CycleOutcome::Aborted(err.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == CycleOutcome::Completed
    }
}

/// Everything a cycle needs, built once at startup and shared by all cycles.
pub struct PollCycle<B, M> {
    bus: B,
    broker: M,
    devices: Arc<[u8]>,
    registers: Arc<RegisterMap>,
    publisher: Publisher,
}

impl<B, M> PollCycle<B, M>
where
    B: BusConnector,
    M: BrokerConnector,
{
    pub fn new(
        bus: B,
        broker: M,
        devices: impl Into<Arc<[u8]>>,
        registers: Arc<RegisterMap>,
        publisher: Publisher,
    ) -> Self {
        Self {
            bus,
            broker,
            devices: devices.into(),
            registers,
            publisher,
        }
    }

    /// Run one cycle. Never fails: per-item errors are logged and counted,
    /// connection errors abort the cycle after closing what was opened.
    pub async fn run(&self, id: u64) -> CycleReport {
        transition(id, CycleState::ConnectingBroker);
        let mut broker = match self.broker.open().await {
            Ok(connection) => connection,
            Err(e) => {
                error!(cycle = id, error = %e, "Cannot connect to MQTT broker");
                transition(id, CycleState::Closing);
                transition(id, CycleState::Idle);
                return CycleReport::aborted(id, &e);
            }
        };

        transition(id, CycleState::ConnectingBus);
        let mut bus = match self.bus.open().await {
            Ok(session) => session,
            Err(e) => {
                error!(cycle = id, error = %e, "Cannot connect to serial device");
                transition(id, CycleState::Closing);
                broker.close().await;
                transition(id, CycleState::Idle);
                return CycleReport::aborted(id, &e);
            }
        };

        transition(id, CycleState::Iterating);
        let mut report = CycleReport {
            id,
            published: 0,
            failed: 0,
            outcome: CycleOutcome::Completed,
        };

        for &device in self.devices.iter() {
            info!(cycle = id, device, "Handling device");
            for register in self.registers.iter() {
                match self.poll_item(&mut bus, &broker, device, register).await {
                    Ok(()) => report.published += 1,
                    Err(e) => {
                        error!(
                            cycle = id,
                            device,
                            register = %register.name,
                            error = %e,
                            "Error handling register"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        transition(id, CycleState::Closing);
        bus.close().await;
        broker.close().await;
        transition(id, CycleState::Idle);

        info!(
            cycle = id,
            published = report.published,
            failed = report.failed,
            "Done, cleaned up"
        );
        report
    }

    /// Read, decode and publish a single measurement.
    async fn poll_item(
        &self,
        bus: &mut B::Session,
        broker: &M::Connection,
        device: u8,
        register: &Register,
    ) -> Result<(), ItemError> {
        debug!(device, register = %register.name, "Handling register");
        let value = read_measurement(bus, device, register).await?;
        debug!(device, register = %register.name, value, "Register value read");

        self.publisher
            .publish(broker, device, &register.name, value)
            .await?;
        Ok(())
    }
}

fn transition(id: u64, state: CycleState) {
    debug!(cycle = id, state = ?state, "Cycle state");
}
