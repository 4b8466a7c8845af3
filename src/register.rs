use crate::formula::Formula;
use crate::prelude::*;
use crate::register_group::{self, ReadGroup};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Attributes with a negative offset are computed on the host. These are the
/// only names allowed to use one.
pub const COMPUTED_ATTRIBUTES: &[&str] = &["last_update"];

/// How a measurement is laid out in the input registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// One word, reported as-is.
    #[serde(alias = "int_byte")]
    Int,
    /// One word multiplied by the scale.
    #[serde(alias = "single_byte")]
    Scaled16,
    /// Two words, high word first, multiplied by the scale.
    #[serde(alias = "double_byte")]
    Scaled32,
}

impl Encoding {
    pub fn words(&self) -> u16 {
        match self {
            Encoding::Scaled32 => 2,
            Encoding::Int | Encoding::Scaled16 => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(alias = "pos")]
    pub offset: i32,
    #[serde(default = "default_encoding", alias = "type")]
    pub encoding: Encoding,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
}

fn default_encoding() -> Encoding {
    Encoding::Scaled32
}

fn default_scale() -> f64 {
    0.1
}

impl AttributeDef {
    pub fn new(name: &str, offset: i32, unit: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            offset,
            encoding: default_encoding(),
            scale: default_scale(),
            unit: unit.to_string(),
            description: description.to_string(),
        }
    }

    pub fn encoded(mut self, encoding: Encoding, scale: f64) -> Self {
        self.encoding = encoding;
        self.scale = scale;
        self
    }

    pub fn is_computed(&self) -> bool {
        self.offset < 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedAttributeDef {
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "template")]
    pub formula: String,
}

impl DerivedAttributeDef {
    pub fn new(name: &str, unit: &str, description: &str, formula: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            description: description.to_string(),
            formula: formula.to_string(),
        }
    }
}

/// Either kind of attribute, as returned by lookups.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Attribute<'a> {
    Register(&'a AttributeDef),
    Derived(&'a DerivedAttributeDef),
}

impl<'a> Attribute<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Attribute::Register(a) => &a.name,
            Attribute::Derived(d) => &d.name,
        }
    }

    pub fn unit(&self) -> &'a str {
        match self {
            Attribute::Register(a) => &a.unit,
            Attribute::Derived(d) => &d.unit,
        }
    }

    pub fn description(&self) -> &'a str {
        match self {
            Attribute::Register(a) => &a.description,
            Attribute::Derived(d) => &d.description,
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Attribute::Derived(_))
    }
}

/// On-disk form of a register table, one per firmware family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterTable {
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub derived: Vec<DerivedAttributeDef>,
}

/// Validated attribute tables plus everything precomputed from them: read
/// groups and parsed formulas. Immutable once built.
#[derive(Debug, Clone)]
pub struct Registry {
    attributes: Vec<AttributeDef>,
    derived: Vec<DerivedAttributeDef>,
    formulas: Vec<Formula>,
    groups: Vec<ReadGroup>,
}

impl Registry {
    pub fn new(attributes: Vec<AttributeDef>, derived: Vec<DerivedAttributeDef>) -> Result<Self> {
        let mut names = HashSet::new();

        for attribute in &attributes {
            if !names.insert(attribute.name.as_str()) {
                return Err(Error::configuration(format!(
                    "duplicate attribute name {}",
                    attribute.name
                )));
            }
            Self::validate_attribute(attribute)?;
        }

        let mut derived = derived;
        for def in &mut derived {
            // templates are often wrapped across lines in table files
            def.formula = def.formula.split_whitespace().collect::<Vec<_>>().join(" ");
        }

        let mut formulas = Vec::with_capacity(derived.len());
        for def in &derived {
            let formula = Formula::parse(&def.formula).map_err(|err| {
                Error::configuration(format!("derived attribute {}: {}", def.name, err))
            })?;

            // only raw attributes and derived attributes declared above are visible
            for reference in formula.references() {
                if !names.contains(reference) {
                    return Err(Error::configuration(format!(
                        "derived attribute {} references {} before it is defined",
                        def.name, reference
                    )));
                }
            }

            if !names.insert(def.name.as_str()) {
                return Err(Error::configuration(format!(
                    "duplicate attribute name {}",
                    def.name
                )));
            }
            formulas.push(formula);
        }

        let groups = register_group::group(&attributes);
        debug!(
            "registry built: {} attributes, {} derived, {} read groups",
            attributes.len(),
            derived.len(),
            groups.len()
        );

        Ok(Self {
            attributes,
            derived,
            formulas,
            groups,
        })
    }

    fn validate_attribute(attribute: &AttributeDef) -> Result<()> {
        if attribute.is_computed() {
            if !COMPUTED_ATTRIBUTES.contains(&attribute.name.as_str()) {
                return Err(Error::configuration(format!(
                    "attribute {} has offset {} but is not a computed attribute",
                    attribute.name, attribute.offset
                )));
            }
            return Ok(());
        }

        let end = attribute.offset as i64 + attribute.encoding.words() as i64;
        if end > u16::MAX as i64 + 1 {
            return Err(Error::configuration(format!(
                "attribute {} at offset {} is outside the register space",
                attribute.name, attribute.offset
            )));
        }
        if !attribute.scale.is_finite() {
            return Err(Error::configuration(format!(
                "attribute {} has invalid scale {}",
                attribute.name, attribute.scale
            )));
        }

        Ok(())
    }

    pub fn from_table(table: RegisterTable) -> Result<Self> {
        Self::new(table.attributes, table.derived)
    }

    /// Load a register table from a YAML (or JSON) file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading register table from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::configuration(format!("error reading {}: {}", path.display(), err))
        })?;
        let table: RegisterTable = serde_yaml::from_str(&content).map_err(|err| {
            Error::configuration(format!("error parsing {}: {}", path.display(), err))
        })?;

        Self::from_table(table)
    }

    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    pub fn derived(&self) -> &[DerivedAttributeDef] {
        &self.derived
    }

    /// Derived attributes in evaluation order, with their parsed formulas.
    pub fn formulas(&self) -> impl Iterator<Item = (&DerivedAttributeDef, &Formula)> {
        self.derived.iter().zip(self.formulas.iter())
    }

    pub fn groups(&self) -> &[ReadGroup] {
        &self.groups
    }

    /// Every attribute, raw ones first, in declaration order.
    pub fn list(&self) -> Vec<Attribute<'_>> {
        self.attributes
            .iter()
            .map(Attribute::Register)
            .chain(self.derived.iter().map(Attribute::Derived))
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<Attribute<'_>> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(Attribute::Register)
            .or_else(|| {
                self.derived
                    .iter()
                    .find(|d| d.name == name)
                    .map(Attribute::Derived)
            })
    }

    /// Reference table of every attribute, sorted by name.
    pub fn markdown_table(&self) -> String {
        let mut attributes = self.list();
        attributes.sort_by_key(|a| a.name());

        let mut out = String::new();
        out.push_str("| Attribute | Register | Unit | Calculated | Description | Misc |\n");
        out.push_str("| --- | ---: | --- | --- | --- | --- |\n");

        for attribute in attributes {
            let row = match attribute {
                Attribute::Register(a) => format!(
                    "| {} | {} | {} | | {} | |\n",
                    a.name, a.offset, a.unit, a.description
                ),
                Attribute::Derived(d) => format!(
                    "| {} | - | {} | &check; | {} | {} |\n",
                    d.name, d.unit, d.description, d.formula
                ),
            };
            out.push_str(&row);
        }

        out
    }
}
