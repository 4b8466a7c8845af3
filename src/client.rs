use crate::decode::decode;
use crate::growatt::identity::{IDENTITY_LENGTH, IDENTITY_START};
use crate::growatt::DeviceIdentity;
use crate::prelude::*;
use crate::register::{Attribute, AttributeDef, Registry};
use crate::register_group::ReadGroup;
use crate::transport::{ModbusRtuTransport, Transport};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Every attribute value from one successful poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One inverter on one transport.
///
/// The transport is connected at the start of every `poll` and closed before
/// it returns, whatever the outcome. The device identity is the only state
/// kept between polls.
pub struct GrowattClient<T: Transport> {
    transport: T,
    address: u8,
    registry: Arc<Registry>,
    identity: Option<DeviceIdentity>,
}

impl GrowattClient<ModbusRtuTransport> {
    /// Client for an inverter on a local serial port.
    pub fn open(
        port: &str,
        address: u8,
        baud_rate: u32,
        read_timeout: Duration,
        registry: Arc<Registry>,
    ) -> Self {
        Self::new(
            ModbusRtuTransport::new(port, baud_rate, read_timeout),
            address,
            registry,
        )
    }
}

impl<T: Transport> GrowattClient<T> {
    pub fn new(transport: T, address: u8, registry: Arc<Registry>) -> Self {
        Self {
            transport,
            address,
            registry,
            identity: None,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// All attributes, register-backed and derived.
    pub fn attributes(&self) -> Vec<Attribute<'_>> {
        self.registry.list()
    }

    pub fn attribute(&self, name: &str) -> Option<Attribute<'_>> {
        self.registry.find(name)
    }

    pub fn cached_identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Device identity, read from the inverter on first use.
    pub async fn identity(&mut self) -> Result<DeviceIdentity> {
        if let Some(identity) = &self.identity {
            return Ok(identity.clone());
        }

        let result = match self.transport.connect().await {
            Ok(()) => self.ensure_identity().await,
            Err(err) => Err(err),
        };
        self.transport.close().await;
        result
    }

    /// Read every attribute once.
    pub async fn poll(&mut self) -> Result<Snapshot> {
        let result = match self.transport.connect().await {
            Ok(()) => self.poll_connected().await,
            Err(err) => Err(err),
        };
        self.transport.close().await;
        result
    }

    /// Release the transport. Needed when a poll future was dropped mid-way.
    pub async fn close(&mut self) {
        self.transport.close().await;
    }

    async fn poll_connected(&mut self) -> Result<Snapshot> {
        self.ensure_identity().await?;

        let registry = Arc::clone(&self.registry);
        let captured_at = Utc::now();
        let mut values = BTreeMap::new();

        for group in registry.groups() {
            match group.address() {
                Some(address) => {
                    let words = self.read_group(address, group.length).await?;
                    for member in &group.members {
                        let value = decode(
                            &words,
                            group.index_of(member),
                            member.encoding,
                            member.scale,
                        )
                        .ok_or_else(|| short_reply(group, address, member))?;
                        values.insert(member.name.clone(), value);
                    }
                }
                None => {
                    for member in &group.members {
                        values.insert(member.name.clone(), computed_value(member, captured_at)?);
                    }
                }
            }
        }

        for (def, formula) in registry.formulas() {
            let value = formula.evaluate(&values)?;
            values.insert(def.name.clone(), value);
        }

        debug!(
            "unit {}: polled {} values in {} groups",
            self.address,
            values.len(),
            registry.groups().len()
        );

        Ok(Snapshot {
            captured_at,
            values,
        })
    }

    async fn ensure_identity(&mut self) -> Result<DeviceIdentity> {
        if let Some(identity) = &self.identity {
            return Ok(identity.clone());
        }

        let words = self
            .transport
            .read_holding_registers(IDENTITY_START, IDENTITY_LENGTH, self.address)
            .await?;
        let identity = DeviceIdentity::decode(&words).ok_or_else(|| {
            Error::read_failed(
                IDENTITY_START,
                IDENTITY_LENGTH,
                format!("identity reply has {} words", words.len()),
            )
        })?;

        info!("unit {}: {}", self.address, identity);
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    async fn read_group(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let words = self
            .transport
            .read_input_registers(address, count, self.address)
            .await?;

        if words.len() < count as usize {
            return Err(Error::read_failed(
                address,
                count,
                format!("short reply of {} words", words.len()),
            ));
        }

        Ok(words)
    }
}

fn short_reply(group: &ReadGroup, address: u16, member: &AttributeDef) -> Error {
    Error::read_failed(
        address,
        group.length,
        format!("reply too short for {}", member.name),
    )
}

/// `Registry::new` only admits names from `COMPUTED_ATTRIBUTES`, so the error
/// arm means that list grew without a value being added here.
fn computed_value(attribute: &AttributeDef, captured_at: DateTime<Utc>) -> Result<f64> {
    match attribute.name.as_str() {
        "last_update" => Ok(captured_at.timestamp_millis() as f64 / 1000.0),
        other => Err(Error::configuration(format!(
            "no host-side value for attribute {}",
            other
        ))),
    }
}
