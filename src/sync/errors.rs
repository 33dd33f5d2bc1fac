use thiserror::Error;

/// Errors from talking to the remote data store.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Remote request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Could not decode remote response: {0}")]
    Decode(String),

    #[error("Invalid sync configuration: {0}")]
    Config(String),
}

/// What the gateway should do after a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The row already exists; for an upsert that is as good as success.
    Accepted,
    /// Transient failure, try again after backing off.
    Retry,
    /// Retrying would not help.
    Drop,
}

impl SyncError {
    pub fn disposition(&self) -> Disposition {
        match self {
            SyncError::Status { status: 409, .. } => Disposition::Accepted,
            SyncError::Status { status, .. } if *status == 429 || *status >= 500 => {
                Disposition::Retry
            }
            SyncError::Status { .. } => Disposition::Drop,
            SyncError::Timeout | SyncError::Transport(_) => Disposition::Retry,
            SyncError::Decode(_) | SyncError::Config(_) => Disposition::Drop,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retry
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        SyncError::Status {
            status,
            body: body.into(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(409, Disposition::Accepted)]
    #[case(429, Disposition::Retry)]
    #[case(500, Disposition::Retry)]
    #[case(503, Disposition::Retry)]
    #[case(400, Disposition::Drop)]
    #[case(401, Disposition::Drop)]
    #[case(404, Disposition::Drop)]
    fn classifies_status_codes(#[case] status: u16, #[case] expected: Disposition) {
        assert_eq!(SyncError::status(status, "").disposition(), expected);
    }

    #[test]
    fn timeouts_and_transport_errors_retry() {
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Transport("connection reset".into()).is_retryable());
        assert!(!SyncError::Decode("bad json".into()).is_retryable());
    }
}
