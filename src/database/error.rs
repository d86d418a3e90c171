use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database query error: {0}")]
    Query(String),

    #[error("Inconsistent row: {0}")]
    Corrupt(String),
}

impl DatabaseError {
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => DatabaseError::Connection(err.to_string()),
            other => DatabaseError::Query(other.to_string()),
        }
    }

    /// Connection-level failures are transient; the platform is invited to
    /// redeliver, so they map to the retryable acknowledgement class.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DatabaseError::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        assert!(DatabaseError::Connection("pool timed out".to_string()).is_retryable());
        assert!(!DatabaseError::Query("syntax".to_string()).is_retryable());
        assert!(!DatabaseError::Corrupt("bad status".to_string()).is_retryable());
    }
}
