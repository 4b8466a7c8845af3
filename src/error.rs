use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while building a registry or polling an inverter.
///
/// Runtime variants abort the poll in progress; nothing is retried or replaced
/// with a default value here. `Configuration` reports a bad register table or
/// formula. It comes from building a registry or from parsing a formula,
/// including the one-shot `formula::evaluate`.
#[derive(Debug, Error)]
pub enum Error {
    /// The serial device path does not exist.
    #[error("serial port {port} is not available")]
    TransportUnavailable { port: String },

    /// The serial port exists but could not be opened.
    #[error("modbus connection failed on {port}: {reason}")]
    ConnectionFailed { port: String, reason: String },

    /// A register range could not be read, or the reply was unusable.
    #[error("modbus read failed for {count} registers at {start}: {reason}")]
    ReadFailed {
        start: u16,
        count: u16,
        reason: String,
    },

    /// A formula referenced a name with no value at evaluation time.
    #[error("undefined reference to {name}")]
    UndefinedReference { name: String },

    /// A formula parsed but could not produce a number.
    #[error("evaluating {expression}: {reason}")]
    Evaluation { expression: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn read_failed(start: u16, count: u16, reason: impl ToString) -> Self {
        Self::ReadFailed {
            start,
            count,
            reason: reason.to_string(),
        }
    }

    pub fn configuration(reason: impl ToString) -> Self {
        Self::Configuration(reason.to_string())
    }
}
