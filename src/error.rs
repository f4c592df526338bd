use std::fmt;
use std::os::raw::c_int;

use thiserror::Error;

use crate::averror;

/// Failure to bring up the native libraries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("library {library} not found (tried {tried} candidates)")]
    LibraryNotFound { library: String, tried: usize },

    #[error("required symbol {symbol} missing from {library}")]
    SymbolRequiredMissing { library: String, symbol: String },
}

/// An error code returned by a native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub code: c_int,
    pub message: String,
    pub op: String,
}

impl NativeError {
    pub fn new(code: c_int, op: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            op: op.into(),
        }
    }

    /// Builds an error using the built-in description table.
    pub fn from_code(code: c_int, op: impl Into<String>) -> Self {
        Self::new(code, op, averror::describe(code))
    }

    pub fn is_eof(&self) -> bool {
        self.code == averror::EOF
    }

    pub fn is_again(&self) -> bool {
        self.code == averror::EAGAIN
    }

    pub fn is_invalid_data(&self) -> bool {
        self.code == averror::INVALIDDATA
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ffmpeg {}: {} (code {})", self.op, self.message, self.code)
    }
}

impl std::error::Error for NativeError {}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("{feature} is unavailable with the loaded libraries")]
    Unavailable { feature: String },

    #[error(transparent)]
    Native(#[from] NativeError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn unavailable(feature: impl Into<String>) -> Self {
        BridgeError::Unavailable {
            feature: feature.into(),
        }
    }

    /// The native code carried by this error, if any.
    pub fn code(&self) -> Option<c_int> {
        match self {
            BridgeError::Native(err) => Some(err.code),
            _ => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, BridgeError::Native(err) if err.is_eof())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
