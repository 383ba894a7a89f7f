//! Error types for the fleet trader

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the fleet trader
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Pool simulator errors
    #[error("Invalid pool state: {0}")]
    InvalidPool(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Slippage exceeded: expected at least {expected}, got {actual}")]
    SlippageExceeded { expected: f64, actual: f64 },

    #[error("Insufficient holdings for {address}: {available} available, {required} required")]
    InsufficientHoldings {
        address: String,
        available: f64,
        required: f64,
    },

    // Market data errors
    #[error("Quote unavailable: {0}")]
    Quote(String),

    #[error("Balance query failed for {address}: {reason}")]
    Balance { address: String, reason: String },

    // Execution errors
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    // Fleet errors
    #[error("Wallet fleet is empty")]
    EmptyFleet,

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    // Event stream errors
    #[error("Malformed swap event: {0}")]
    MalformedEvent(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Execution(e) => e.is_transient(),
            Error::Quote(_) | Error::Balance { .. } => true,
            _ => false,
        }
    }
}

/// Classification of a failed submission, decided once by the market adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    /// Stale reference point, lagging node and similar; safe to resubmit
    Transient,
    /// Output fell below the caller's minimum
    Slippage,
    /// The venue refused the order for lack of funds
    InsufficientFunds,
    /// Anything else
    Rejected,
}

impl std::fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionErrorKind::Transient => write!(f, "transient"),
            ExecutionErrorKind::Slippage => write!(f, "slippage"),
            ExecutionErrorKind::InsufficientFunds => write!(f, "insufficient funds"),
            ExecutionErrorKind::Rejected => write!(f, "rejected"),
        }
    }
}

/// Error returned by a market adapter when an order could not be executed
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} execution error: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Transient, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ExecutionErrorKind::Transient
    }
}

impl From<Error> for ExecutionError {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::SlippageExceeded { .. } => ExecutionErrorKind::Slippage,
            Error::InsufficientHoldings { .. } => ExecutionErrorKind::InsufficientFunds,
            Error::Execution(inner) => inner.kind,
            _ if e.is_retryable() => ExecutionErrorKind::Transient,
            _ => ExecutionErrorKind::Rejected,
        };
        ExecutionError::new(kind, e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
