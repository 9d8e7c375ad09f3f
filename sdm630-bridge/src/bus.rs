//! Serial bus access (Modbus RTU).

use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::client::{Client, Context, Reader};
use tokio_modbus::prelude::*;
use tracing::{info, warn};

use crate::config::SerialConfig;
use crate::error::{ConnectionError, ReadErrorKind};

/// Opens a session on the shared bus.
#[async_trait]
pub trait BusConnector: Send + Sync + 'static {
    type Session: BusSession;

    async fn open(&self) -> Result<Self::Session, ConnectionError>;
}

/// An open bus session. Requests are issued one at a time by a single owner.
#[async_trait]
pub trait BusSession: Send {
    /// Read `count` input registers (function 0x04) starting at `address` from `device`.
    async fn read_input_registers(
        &mut self,
        device: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ReadErrorKind>;

    /// Release the bus. Closing twice is a no-op.
    async fn close(&mut self);
}

/// Opens Modbus RTU sessions on a serial port.
#[derive(Debug, Clone)]
pub struct RtuConnector {
    serial: SerialConfig,
    timeout: Duration,
}

impl RtuConnector {
    pub fn new(serial: SerialConfig, timeout: Duration) -> Self {
        Self { serial, timeout }
    }

    fn builder(&self) -> tokio_serial::SerialPortBuilder {
        let parity = match self.serial.parity.to_lowercase().as_str() {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let stop_bits = match self.serial.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        let data_bits = match self.serial.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        tokio_serial::new(&self.serial.port, self.serial.baud_rate)
            .parity(parity)
            .stop_bits(stop_bits)
            .data_bits(data_bits)
    }

    /// Open the serial port and attach a Modbus RTU client to it.
    fn attach(&self) -> Result<Context, ConnectionError> {
        let serial = tokio_serial::SerialStream::open(&self.builder())
            .map_err(|e| ConnectionError::Bus(format!("{}: {}", self.serial.port, e)))?;
        Ok(rtu::attach(serial))
    }
}

#[async_trait]
impl BusConnector for RtuConnector {
    type Session = RtuSession;

    async fn open(&self) -> Result<RtuSession, ConnectionError> {
        let connector = self.clone();
        let session = RtuSession::new(Box::new(move || connector.attach()), self.timeout)?;

        info!(
            port = %self.serial.port,
            baud_rate = self.serial.baud_rate,
            "Connected to serial device"
        );

        Ok(session)
    }
}

type Attach = Box<dyn Fn() -> Result<Context, ConnectionError> + Send + Sync>;

/// An open Modbus RTU client on the serial line.
///
/// A request that times out may still be answered later. The transport is
/// reopened after every timeout so that such a reply is discarded with the old
/// one instead of being read as the answer to the next request.
pub struct RtuSession {
    ctx: Option<Context>,
    attach: Attach,
    timeout: Duration,
}

impl RtuSession {
    fn new(attach: Attach, timeout: Duration) -> Result<Self, ConnectionError> {
        let ctx = attach()?;
        Ok(Self {
            ctx: Some(ctx),
            attach,
            timeout,
        })
    }

    fn reattach(&mut self) {
        // The old port must be released before it can be opened again.
        self.ctx = None;
        match (self.attach)() {
            Ok(ctx) => self.ctx = Some(ctx),
            Err(e) => warn!(error = %e, "Failed to reopen serial device after timeout"),
        }
    }
}

#[async_trait]
impl BusSession for RtuSession {
    async fn read_input_registers(
        &mut self,
        device: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ReadErrorKind> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| ReadErrorKind::Transport("bus session is closed".to_string()))?;

        ctx.set_slave(Slave(device));

        let Ok(response) =
            tokio::time::timeout(self.timeout, ctx.read_input_registers(address, count)).await
        else {
            self.reattach();
            return Err(ReadErrorKind::Timeout(self.timeout));
        };

        response
            .map_err(|e| ReadErrorKind::Transport(e.to_string()))?
            .map_err(|e| ReadErrorKind::Exception(format!("{:?}", e)))
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.disconnect().await {
                warn!(error = %e, "Error closing serial device");
            }
            info!("Serial device closed");
        }
    }
}
