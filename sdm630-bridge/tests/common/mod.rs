//! In-memory bus and broker used by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sdm630_bridge::broker::{BrokerConnection, BrokerConnector};
use sdm630_bridge::bus::{BusConnector, BusSession};
use sdm630_bridge::cycle::PollCycle;
use sdm630_bridge::error::{ConnectionError, PublishError, ReadErrorKind};
use sdm630_bridge::publisher::Publisher;
use sdm630_bridge::reader::encode_f32;
use sdm630_bridge::registers::RegisterMap;
use sdm630_common::PayloadFormat;
use tokio::sync::{Notify, Semaphore};

/// Value every meter reports unless a test overrides it.
pub fn default_value(device: u8, address: u16) -> f32 {
    f32::from(device) * 1000.0 + f32::from(address)
}

#[derive(Debug, Default)]
pub struct BusLog {
    pub opens: usize,
    pub closes: usize,
    pub reads: Vec<(u8, u16, u16)>,
}

/// A fake serial bus. Clones share their log.
#[derive(Clone, Default)]
pub struct MockBus {
    pub log: Arc<Mutex<BusLog>>,
    pub fail_open: bool,
    pub failures: HashSet<(u8, u16)>,
    pub raw: HashMap<(u8, u16), Vec<u16>>,
    pub gate: Option<Arc<Semaphore>>,
    pub read_started: Arc<Notify>,
}

impl MockBus {
    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn with_failure(mut self, device: u8, address: u16) -> Self {
        self.failures.insert((device, address));
        self
    }

    pub fn with_value(mut self, device: u8, address: u16, value: f32) -> Self {
        self.raw.insert((device, address), encode_f32(value).to_vec());
        self
    }

    pub fn with_words(mut self, device: u8, address: u16, words: Vec<u16>) -> Self {
        self.raw.insert((device, address), words);
        self
    }

    /// Block every read until the returned semaphore gets permits.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.log.lock().unwrap().closes
    }

    pub fn reads(&self) -> Vec<(u8, u16, u16)> {
        self.log.lock().unwrap().reads.clone()
    }
}

pub struct MockBusSession {
    bus: MockBus,
    closed: bool,
}

#[async_trait]
impl BusConnector for MockBus {
    type Session = MockBusSession;

    async fn open(&self) -> Result<MockBusSession, ConnectionError> {
        if self.fail_open {
            return Err(ConnectionError::Bus("/dev/ttyUSB0: No such file".to_string()));
        }
        self.log.lock().unwrap().opens += 1;
        Ok(MockBusSession {
            bus: self.clone(),
            closed: false,
        })
    }
}

#[async_trait]
impl BusSession for MockBusSession {
    async fn read_input_registers(
        &mut self,
        device: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ReadErrorKind> {
        self.bus.log.lock().unwrap().reads.push((device, address, count));

        if let Some(gate) = &self.bus.gate {
            self.bus.read_started.notify_one();
            gate.acquire()
                .await
                .map_err(|e| ReadErrorKind::Transport(e.to_string()))?
                .forget();
        }

        if self.bus.failures.contains(&(device, address)) {
            return Err(ReadErrorKind::Timeout(Duration::from_secs(1)));
        }

        Ok(self
            .bus
            .raw
            .get(&(device, address))
            .cloned()
            .unwrap_or_else(|| encode_f32(default_value(device, address)).to_vec()))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.bus.log.lock().unwrap().closes += 1;
        }
    }
}

#[derive(Debug, Default)]
pub struct BrokerLog {
    pub opens: usize,
    pub closes: usize,
    pub published: Vec<(String, String)>,
}

/// A fake MQTT broker. Clones share their log.
#[derive(Clone, Default)]
pub struct MockBroker {
    pub log: Arc<Mutex<BrokerLog>>,
    pub fail_open: bool,
    pub fail_topics: HashSet<String>,
}

impl MockBroker {
    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn failing_topic(mut self, topic: &str) -> Self {
        self.fail_topics.insert(topic.to_string());
        self
    }

    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.log.lock().unwrap().closes
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().published.clone()
    }

    pub fn payload(&self, topic: &str) -> Option<String> {
        self.published()
            .into_iter()
            .find(|(t, _)| t == topic)
            .map(|(_, p)| p)
    }
}

pub struct MockConnection {
    broker: MockBroker,
    closed: bool,
}

#[async_trait]
impl BrokerConnector for MockBroker {
    type Connection = MockConnection;

    async fn open(&self) -> Result<MockConnection, ConnectionError> {
        if self.fail_open {
            return Err(ConnectionError::Broker("connection refused".to_string()));
        }
        self.log.lock().unwrap().opens += 1;
        Ok(MockConnection {
            broker: self.clone(),
            closed: false,
        })
    }
}

#[async_trait]
impl BrokerConnection for MockConnection {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if self.closed || self.broker.fail_topics.contains(topic) {
            return Err(PublishError {
                topic: topic.to_string(),
                message: "session is not connected".to_string(),
            });
        }
        let payload = String::from_utf8_lossy(&payload).into_owned();
        self.broker
            .log
            .lock()
            .unwrap()
            .published
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.broker.log.lock().unwrap().closes += 1;
        }
    }
}

/// A cycle over `devices` with the given map, plain payloads and the default prefix.
pub fn cycle(
    bus: &MockBus,
    broker: &MockBroker,
    devices: &[u8],
    registers: RegisterMap,
) -> PollCycle<MockBus, MockBroker> {
    cycle_with_format(bus, broker, devices, registers, PayloadFormat::Plain)
}

pub fn cycle_with_format(
    bus: &MockBus,
    broker: &MockBroker,
    devices: &[u8],
    registers: RegisterMap,
    format: PayloadFormat,
) -> PollCycle<MockBus, MockBroker> {
    PollCycle::new(
        bus.clone(),
        broker.clone(),
        devices.to_vec(),
        Arc::new(registers),
        Publisher::new("power/sdm630/", format),
    )
}
