use std::fmt;
use thiserror::Error;

/// Raw failure reported by a database driver.
///
/// Mirrors the shape most SQL drivers expose: a message, an optional
/// five-character SQLSTATE, a vendor specific error code, an optional cause
/// and an optional linked "next" error that some drivers use instead of a
/// cause.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DriverError {
    message: String,
    sql_state: Option<String>,
    vendor_code: i32,
    #[source]
    cause: Option<Box<DriverError>>,
    next: Option<Box<DriverError>>,
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            vendor_code: 0,
            cause: None,
            next: None,
        }
    }

    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    pub fn with_vendor_code(mut self, code: i32) -> Self {
        self.vendor_code = code;
        self
    }

    pub fn with_cause(mut self, cause: DriverError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_next(mut self, next: DriverError) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// SQLSTATE of this error only, without looking at linked errors.
    pub fn own_sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }

    pub fn vendor_code(&self) -> i32 {
        self.vendor_code
    }

    pub fn cause(&self) -> Option<&DriverError> {
        self.cause.as_deref()
    }

    pub fn next(&self) -> Option<&DriverError> {
        self.next.as_deref()
    }

    /// First SQLSTATE found walking this error and its `next` chain.
    pub fn sql_state(&self) -> Option<&str> {
        self.chain().find_map(|err| err.sql_state.as_deref())
    }

    /// SQLSTATE as an integer: 0 when absent, -1 when not numeric.
    pub fn sql_state_int(&self) -> i32 {
        match self.sql_state() {
            Some(state) => state.parse().unwrap_or(-1),
            None => 0,
        }
    }

    /// This error followed by its linked next errors.
    pub fn chain(&self) -> impl Iterator<Item = &DriverError> {
        std::iter::successors(Some(self), |err| err.next.as_deref())
    }

    /// Attaches the linked next error as the cause when no cause is set.
    ///
    /// The next chain stays in place, so [`DriverError::sql_state`] still
    /// sees the states of linked errors.
    pub fn flatten(mut self) -> Self {
        if self.cause.is_none() {
            self.cause = self.next.clone();
        }
        self
    }

    /// Replaces this error by its linked next error when it has no cause.
    pub fn into_next_if_uncaused(self) -> Self {
        if self.cause.is_none() {
            if let Some(next) = self.next {
                return *next;
            }
        }
        self
    }
}

impl<T> From<std::sync::PoisonError<T>> for DriverError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::new(format!("Lock error: {}", err))
    }
}

/// Semantic classification of an [`OrmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PlainFailure,
    DuplicateKey,
    ConcurrencyViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PlainFailure => "plain_failure",
            Self::DuplicateKey => "duplicate_key",
            Self::ConcurrencyViolation => "concurrency_violation",
        };
        write!(f, "{label}")
    }
}

#[derive(Error, Debug)]
pub enum OrmError {
    #[error("{message}")]
    Failure {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("Duplicate key in {entity}")]
    DuplicateKey {
        entity: String,
        #[source]
        source: DriverError,
    },

    #[error("Concurrent modification detected during {operation} on {entity}: {detail}")]
    Concurrency {
        operation: String,
        entity: String,
        detail: String,
    },

    #[error("Exception occurred during retry of {operation} on {entity}")]
    RetryInterrupted { operation: String, entity: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No dialect known for {0}")]
    UnknownDialect(String),
}

pub type Result<T> = std::result::Result<T, OrmError>;

impl OrmError {
    /// Generic failure of `operation` on `entity`, wrapping the driver error.
    pub fn failure(operation: &str, entity: &str, source: DriverError) -> Self {
        Self::Failure {
            message: format!("{} failure on {}", operation, entity),
            source: Some(source),
        }
    }

    pub fn plain(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            Self::Concurrency { .. } => ErrorKind::ConcurrencyViolation,
            Self::Failure { .. }
            | Self::RetryInterrupted { .. }
            | Self::InvalidState(_)
            | Self::Config(_)
            | Self::UnknownDialect(_) => ErrorKind::PlainFailure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Concurrency { .. })
    }

    /// The underlying driver error, if this failure wraps one.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Failure { source, .. } => source.as_ref(),
            Self::DuplicateKey { source, .. } => Some(source),
            _ => None,
        }
    }
}
