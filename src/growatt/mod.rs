pub mod attributes;
pub mod identity;

pub use identity::DeviceIdentity;

use crate::prelude::*;
use crate::register::Registry;

/// Registry for the built-in Growatt register table.
pub fn registry() -> Result<Registry> {
    Registry::new(attributes::attributes(), attributes::derived())
}
