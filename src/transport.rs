use crate::prelude::*;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio_modbus::client::{rtu, Client, Context, Reader};
use tokio_modbus::slave::{Slave, SlaveContext};
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Register access to one serial bus.
///
/// `connect` may be called on an already-connected transport and must then do
/// nothing. `close` must be safe to call at any time.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn read_input_registers(&mut self, address: u16, count: u16, unit: u8)
        -> Result<Vec<u16>>;

    async fn read_holding_registers(&mut self, address: u16, count: u16, unit: u8)
        -> Result<Vec<u16>>;

    async fn close(&mut self);
}

/// Modbus RTU over a local serial port, 8N1.
pub struct ModbusRtuTransport {
    port: String,
    baud_rate: u32,
    read_timeout: Duration,
    ctx: Option<Context>,
}

impl std::fmt::Debug for ModbusRtuTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusRtuTransport")
            .field("port", &self.port)
            .field("baud_rate", &self.baud_rate)
            .field("connected", &self.ctx.is_some())
            .finish()
    }
}

impl ModbusRtuTransport {
    pub fn new(port: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            read_timeout,
            ctx: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn read(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
        unit: u8,
    ) -> Result<Vec<u16>> {
        let timeout = self.read_timeout;
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| Error::read_failed(address, count, "not connected"))?;
        ctx.set_slave(Slave(unit));

        debug!(
            "{}: reading {} {:?} registers at {} from unit {}",
            self.port, count, kind, address, unit
        );
        let reply = match kind {
            RegisterKind::Input => {
                tokio::time::timeout(timeout, ctx.read_input_registers(address, count)).await
            }
            RegisterKind::Holding => {
                tokio::time::timeout(timeout, ctx.read_holding_registers(address, count)).await
            }
        };

        match reply {
            Ok(Ok(Ok(words))) => Ok(words),
            Ok(Ok(Err(exception))) => Err(Error::read_failed(
                address,
                count,
                format!("device exception {:?}", exception),
            )),
            Ok(Err(err)) => Err(Error::read_failed(address, count, err)),
            Err(_) => Err(Error::read_failed(
                address,
                count,
                format!("no reply within {:?}", timeout),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RegisterKind {
    Input,
    Holding,
}

#[async_trait]
impl Transport for ModbusRtuTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.ctx.is_some() {
            return Ok(());
        }

        if !Path::new(&self.port).exists() {
            debug!("serial port {} is not available", self.port);
            return Err(Error::TransportUnavailable {
                port: self.port.clone(),
            });
        }

        let builder = tokio_serial::new(&self.port, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(self.read_timeout);

        let stream = SerialStream::open(&builder).map_err(|err| Error::ConnectionFailed {
            port: self.port.clone(),
            reason: err.to_string(),
        })?;

        debug!("{}: serial port open at {} baud", self.port, self.baud_rate);
        self.ctx = Some(rtu::attach(stream));
        Ok(())
    }

    async fn read_input_registers(&mut self, address: u16, count: u16, unit: u8)
        -> Result<Vec<u16>>
    {
        self.read(RegisterKind::Input, address, count, unit).await
    }

    async fn read_holding_registers(&mut self, address: u16, count: u16, unit: u8)
        -> Result<Vec<u16>>
    {
        self.read(RegisterKind::Holding, address, count, unit).await
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(err) = ctx.disconnect().await {
                warn!("{}: error closing serial port: {}", self.port, err);
            }
            debug!("{}: serial port closed", self.port);
        }
    }
}
