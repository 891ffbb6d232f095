use thiserror::Error;

/// Failure of a single call to the annotation service.
///
/// Transport and domain failures are reported the same way to the store
/// (see [`ServiceError::message`]); callers that need to tell them apart can
/// use [`ServiceError::is_domain`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Transport { status: u16, message: String },
    #[error("{0}")]
    Unreachable(String),
    #[error("{0}")]
    Domain(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, ServiceError::Domain(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ServiceError::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => ServiceError::Transport {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string(),
            },
            None => ServiceError::Unreachable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Decode(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("no item is current; fetch items before submitting a judgement")]
    NoCurrentItem,
    #[error("no task loaded; start the session first")]
    NoTask,
    #[error("batch submission requires at least one judgement")]
    EmptyBatch,
}
