#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use growatt_client::client::GrowattClient;
use growatt_client::prelude::*;
use growatt_client::register::{AttributeDef, DerivedAttributeDef, Encoding, Registry};
use growatt_client::transport::Transport;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A transport that answers from a script and records every call.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub connected: bool,
    pub connects: usize,
    pub closes: usize,
    pub input_reads: Vec<(u16, u16, u8)>,
    pub holding_reads: Vec<(u16, u16, u8)>,

    inputs: HashMap<u16, Vec<u16>>,
    failing_inputs: HashSet<u16>,
    failing_once: HashSet<u16>,
    stalled_inputs: HashSet<u16>,
    holding: Option<Vec<u16>>,
    unavailable: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to holding register reads with `words`.
    pub fn with_identity(mut self, words: Vec<u16>) -> Self {
        self.holding = Some(words);
        self
    }

    /// Reply to an input read starting at `address` with `words`.
    pub fn with_input(mut self, address: u16, words: Vec<u16>) -> Self {
        self.inputs.insert(address, words);
        self
    }

    pub fn failing_input(mut self, address: u16) -> Self {
        self.failing_inputs.insert(address);
        self
    }

    /// Fail the first input read at `address`, answer normally afterwards.
    pub fn failing_once(mut self, address: u16) -> Self {
        self.failing_once.insert(address);
        self
    }

    /// Never answer an input read at `address`.
    pub fn stalled_input(mut self, address: u16) -> Self {
        self.stalled_inputs.insert(address);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        self.connects += 1;
        if self.unavailable {
            return Err(Error::TransportUnavailable {
                port: "/dev/ttyMOCK".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn read_input_registers(&mut self, address: u16, count: u16, unit: u8)
        -> Result<Vec<u16>>
    {
        assert!(self.connected, "read on a closed transport");
        self.input_reads.push((address, count, unit));

        if self.stalled_inputs.contains(&address) {
            return std::future::pending().await;
        }
        if self.failing_inputs.contains(&address) || self.failing_once.remove(&address) {
            return Err(Error::read_failed(address, count, "timeout"));
        }
        Ok(self
            .inputs
            .get(&address)
            .cloned()
            .unwrap_or_else(|| vec![0; count as usize]))
    }

    async fn read_holding_registers(&mut self, address: u16, count: u16, unit: u8)
        -> Result<Vec<u16>>
    {
        assert!(self.connected, "read on a closed transport");
        self.holding_reads.push((address, count, unit));

        self.holding
            .clone()
            .ok_or_else(|| Error::read_failed(address, count, "illegal data address"))
    }

    async fn close(&mut self) {
        self.connected = false;
        self.closes += 1;
    }
}

pub struct Factory;

impl Factory {
    /// Three raw attributes in two read groups plus one derived attribute.
    pub fn registry() -> Arc<Registry> {
        let attributes = vec![
            AttributeDef::new("photovoltaics_1", 5, "kW", "Photovoltaics (PV) 1")
                .encoded(Encoding::Scaled32, 0.0001),
            AttributeDef::new("photovoltaics_2_voltage", 7, "V", "Photovoltaics (PV) 2 voltage")
                .encoded(Encoding::Scaled16, 0.1),
            AttributeDef::new("battery_voltage", 1013, "V", "Battery voltage")
                .encoded(Encoding::Scaled16, 0.1),
        ];
        let derived = vec![DerivedAttributeDef::new(
            "voltage_sum",
            "V",
            "PV 2 and battery voltage",
            "{photovoltaics_2_voltage} + {battery_voltage}",
        )];

        Arc::new(Registry::new(attributes, derived).unwrap())
    }

    /// Holding registers [0, 30) of an inverter with serial "AB12345678",
    /// firmware "DH1.0 " and model T1 Q2 P3 U4 M5 S6.
    pub fn identity_words() -> Vec<u16> {
        let mut words = vec![0u16; 30];
        words[9..12].copy_from_slice(&[0x4448, 0x312E, 0x3020]);
        words[23..28].copy_from_slice(&[0x4142, 0x3132, 0x3334, 0x3536, 0x3738]);
        words[28..30].copy_from_slice(&[0x0012, 0x3456]);
        words
    }

    /// A transport scripted for `registry()`.
    pub fn transport() -> MockTransport {
        MockTransport::new()
            .with_identity(Self::identity_words())
            .with_input(5, vec![0x0001, 0x0002, 2304])
            .with_input(1013, vec![532])
    }

    pub fn client(transport: MockTransport) -> GrowattClient<MockTransport> {
        GrowattClient::new(transport, 1, Self::registry())
    }
}
