pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::error::{Error, Result};
pub use crate::options::Options;

pub use log::{debug, error, info, trace, warn};
