//! Error types for the world store and the navigation engine

use rusqlite::ErrorCode;
use std::fmt;

/// Failure reported by a [`crate::store::WorldStore`]
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// The store did not answer within its bounded interval
    Timeout(String),
    /// The store cannot serve requests (poisoned lock, closed pool)
    Unavailable(String),
    /// Stored rows that cannot be decoded or violate a schema constraint
    InvalidData(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(err) => write!(f, "sqlite error: {}", err),
            StoreError::Timeout(message) => write!(f, "store timed out: {}", message),
            StoreError::Unavailable(message) => write!(f, "store unavailable: {}", message),
            StoreError::InvalidData(message) => write!(f, "invalid world data: {}", message),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == ErrorCode::DatabaseBusy
                    || code.code == ErrorCode::DatabaseLocked =>
            {
                StoreError::Timeout(err.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => {
                StoreError::InvalidData(err.to_string())
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

/// Coarse classification of a [`NavError`], used for status codes and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidTarget,
    InsufficientTurns,
    IntegrityFault,
    Conflict,
    Timeout,
    StoreUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidTarget => "invalid_target",
            ErrorKind::InsufficientTurns => "insufficient_turns",
            ErrorKind::IntegrityFault => "integrity_fault",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::StoreUnavailable => "store_unavailable",
        }
    }
}

/// Navigation failures
#[derive(Debug)]
pub enum NavError {
    /// Pilot or addressed entity does not exist
    NotFound(String),
    /// Target sector/system does not exist or is unreachable
    InvalidTarget(String),
    /// Metered turn policy refused the transition
    InsufficientTurns { required: i64, available: i64 },
    /// World data breaks an engine invariant. Never the caller's fault.
    IntegrityFault(String),
    /// The pilot record changed under every attempt
    Conflict { username: String, attempts: u32 },
    /// The request ran out of time before committing
    Timeout(String),
    StoreUnavailable(StoreError),
}

pub type NavResult<T> = Result<T, NavError>;

impl NavError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NavError::NotFound(_) => ErrorKind::NotFound,
            NavError::InvalidTarget(_) => ErrorKind::InvalidTarget,
            NavError::InsufficientTurns { .. } => ErrorKind::InsufficientTurns,
            NavError::IntegrityFault(_) => ErrorKind::IntegrityFault,
            NavError::Conflict { .. } => ErrorKind::Conflict,
            NavError::Timeout(_) => ErrorKind::Timeout,
            NavError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    /// Whether the same request may succeed if reattempted unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Conflict | ErrorKind::Timeout | ErrorKind::StoreUnavailable
        )
    }
}

impl fmt::Display for NavError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavError::NotFound(message) => write!(f, "not found: {}", message),
            NavError::InvalidTarget(message) => write!(f, "invalid target: {}", message),
            NavError::InsufficientTurns {
                required,
                available,
            } => write!(
                f,
                "insufficient turns: required {}, available {}",
                required, available
            ),
            NavError::IntegrityFault(message) => write!(f, "world integrity fault: {}", message),
            NavError::Conflict { username, attempts } => write!(
                f,
                "pilot {} was modified concurrently ({} attempts)",
                username, attempts
            ),
            NavError::Timeout(message) => write!(f, "timed out: {}", message),
            NavError::StoreUnavailable(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for NavError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NavError::StoreUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for NavError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(message) => NavError::Timeout(message),
            StoreError::InvalidData(message) => NavError::IntegrityFault(message),
            other => NavError::StoreUnavailable(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(NavError::Timeout("commit".into()).is_retryable());
        assert!(NavError::Conflict {
            username: "nova".into(),
            attempts: 4
        }
        .is_retryable());
        assert!(!NavError::InvalidTarget("sector 9".into()).is_retryable());
        assert!(!NavError::IntegrityFault("two wormholes".into()).is_retryable());
        assert!(!NavError::NotFound("pilot".into()).is_retryable());
    }

    #[test]
    fn test_busy_sqlite_maps_to_timeout() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let nav: NavError = StoreError::from(busy).into();
        assert_eq!(nav.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_undecodable_rows_are_integrity_faults() {
        let nav: NavError = StoreError::InvalidData("bad metadata".into()).into();
        assert_eq!(nav.kind(), ErrorKind::IntegrityFault);
        assert!(!nav.is_retryable());

        let out_of_range = rusqlite::Error::IntegralValueOutOfRange(5, -1);
        let nav: NavError = StoreError::from(out_of_range).into();
        assert_eq!(nav.kind(), ErrorKind::IntegrityFault);

        let nav: NavError = StoreError::Unavailable("lock poisoned".into()).into();
        assert_eq!(nav.kind(), ErrorKind::StoreUnavailable);
    }
}
