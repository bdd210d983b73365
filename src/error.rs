//! Our error types for the SunSpec decoder.

use strum_macros::IntoStaticStr;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Whether an operation may be retried as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The link hiccupped. Retrying, possibly after a backoff delay, can succeed.
    Transient,
    /// The device, firmware or wiring needs attention. Retrying will fail again.
    Fatal,
}

/// Custom error type for Fronius SunSpec communications.
#[derive(Error, Debug, IntoStaticStr)]
pub enum Error {
    #[error("I/O error: {0:?}")]
    Io(embedded_io::ErrorKind),
    #[error("Modbus protocol error: {0:?}")]
    Modbus(rmodbus::ErrorKind),
    #[error("Communication timeout")]
    Timeout,
    #[error("Connection closed")]
    Disconnected,
    #[error("Frame does not fit the transfer buffer")]
    BufferError,
    #[error("Invalid response received")]
    InvalidResponse,
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{operation} of {count} registers at {address} failed: {cause}")]
    Register {
        operation: &'static str,
        address: u16,
        count: u16,
        cause: Box<Error>,
    },
    #[error("{operation} failed, session abandoned: {cause}")]
    SessionLost {
        operation: &'static str,
        cause: Box<Error>,
    },
    #[error("Not a SunSpec map: signature {high:04X}{low:04X}, expected 53756E53 (\"SunS\")")]
    NotSunSpec { high: u16, low: u16 },
    #[error("Unexpected common model header: id {id}, length {length}")]
    CommonModelMismatch { id: u16, length: u16 },
    #[error("Unknown model id {received}, expected one of {allowed:?}")]
    UnknownModel {
        received: u16,
        allowed: &'static [u16],
    },
    #[error("Model {model_id} declares block length {received}, expected one of {expected:?}")]
    LengthMismatch {
        model_id: u16,
        received: u16,
        expected: [u16; 2],
    },
    #[error("End of block mismatch at {address}: received ({id:04X}, {length}), expected (FFFF, 0)")]
    EndOfBlockMismatch { address: u16, id: u16, length: u16 },
    #[error("Expected model {expected_id} (length {expected_length}) at {address}, received id {id}, length {length}")]
    ExtensionMismatch {
        address: u16,
        expected_id: u16,
        expected_length: u16,
        id: u16,
        length: u16,
    },
    #[error("Common block not yet read")]
    CommonNotRead,
    #[error("Device not validated")]
    NotValidated,
    #[error("Register {address} has not been fetched")]
    NotFetched { address: u16 },
    #[error("Registers {address}..+{count} are outside the register shadow")]
    OutOfWindow { address: u16, count: u16 },
    #[error("Scale factor register {address} is not implemented by the device")]
    ScaleFactorUnimplemented { address: u16 },
    #[error("Register text is not valid UTF-8")]
    InvalidText,
    #[error("Unexpected value {value} in register {address}")]
    UnexpectedValue { address: u16, value: u32 },
    #[error("{0} is not available on this device")]
    Unsupported(&'static str),
}

impl Error {
    /// Map an I/O error kind reported by the link.
    pub fn from_io_kind(kind: embedded_io::ErrorKind) -> Self {
        match kind {
            embedded_io::ErrorKind::TimedOut => Error::Timeout,
            other => Error::Io(other),
        }
    }

    /// Wrap a lower layer error with the register window and operation it occurred in.
    pub fn register(operation: &'static str, address: u16, count: u16, cause: Error) -> Self {
        Error::Register {
            operation,
            address,
            count,
            cause: Box::new(cause),
        }
    }

    pub fn severity(&self) -> Severity {
        use embedded_io::ErrorKind as IoKind;

        match self {
            Error::Io(
                IoKind::NotFound | IoKind::PermissionDenied | IoKind::InvalidInput | IoKind::Unsupported,
            ) => Severity::Fatal,
            Error::Io(_) => Severity::Transient,
            Error::Timeout | Error::Disconnected | Error::InvalidResponse => Severity::Transient,
            Error::Modbus(kind) => match kind {
                rmodbus::ErrorKind::IllegalFunction
                | rmodbus::ErrorKind::IllegalDataAddress
                | rmodbus::ErrorKind::IllegalDataValue => Severity::Fatal,
                _ => Severity::Transient,
            },
            Error::Register { cause, .. } => cause.severity(),
            _ => Severity::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.severity() == Severity::Transient
    }

    /// Whether a fresh connection may get past this error.
    ///
    /// A session lost to a flaky link is over, but the next one may succeed.
    pub fn is_reconnectable(&self) -> bool {
        match self {
            Error::SessionLost { cause, .. } => cause.is_reconnectable(),
            other => other.is_transient(),
        }
    }

    /// Stable name of this error, suitable for matching in logs.
    pub fn code(&self) -> &'static str {
        self.into()
    }
}

impl From<rmodbus::ErrorKind> for Error {
    fn from(err: rmodbus::ErrorKind) -> Self {
        Error::Modbus(err)
    }
}
