use psry_core::PipelineError;

/// Failure reported by a detection service adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DetectionError {
    /// The service throttled the call.
    #[error("{service} throttled the request: {message}")]
    Throttled {
        service: &'static str,
        message: String,
    },

    /// The service could not be reached or failed on its side.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    /// The service refused the input (missing object, invalid image, unsupported language).
    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
}

pub type DetectionResult<T> = Result<T, DetectionError>;

impl DetectionError {
    pub fn service(&self) -> &'static str {
        match self {
            DetectionError::Throttled { service, .. }
            | DetectionError::Unavailable { service, .. }
            | DetectionError::Rejected { service, .. } => service,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, DetectionError::Rejected { .. })
    }

    pub fn rejected(service: &'static str, message: impl Into<String>) -> Self {
        DetectionError::Rejected {
            service,
            message: message.into(),
        }
    }

    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        DetectionError::Unavailable {
            service,
            message: message.into(),
        }
    }
}

impl From<DetectionError> for PipelineError {
    fn from(err: DetectionError) -> Self {
        PipelineError::detection(err.service(), err.to_string(), err.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_errors_are_permanent() {
        let err: PipelineError = DetectionError::rejected("rekognition", "no such key").into();
        assert!(!err.is_recoverable());
        assert_eq!(err.kind(), "DetectionServiceError");
    }

    #[test]
    fn throttling_is_retryable() {
        let err = DetectionError::Throttled {
            service: "translate",
            message: "rate exceeded".into(),
        };
        assert!(err.is_retryable());
        assert!(PipelineError::from(err).is_recoverable());
    }
}
