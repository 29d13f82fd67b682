use uuid::Uuid;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input for {field}: {reason}")]
    InputValidation { field: String, reason: String },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl EngineError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InputValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True when only the unit of work that produced this error should be
    /// rejected: invalid input, or a record the store holds but cannot
    /// describe. Everything else is an upstream failure for the caller to
    /// retry.
    pub fn is_unit_scoped(&self) -> bool {
        matches!(
            self,
            Self::InputValidation { .. }
                | Self::Upstream(UpstreamError::Malformed { .. })
                | Self::Upstream(UpstreamError::StudentNotFound(_))
        )
    }
}

/// Failures raised by a [`crate::port::DataAccessPort`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    #[error("student {0} not found")]
    StudentNotFound(Uuid),

    #[error("malformed {entity} record: {reason}")]
    Malformed { entity: &'static str, reason: String },

    #[error("failed to persist {entity}: {reason}")]
    Write { entity: &'static str, reason: String },

    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl UpstreamError {
    pub fn malformed(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            entity,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_unit_scoped() {
        let err = EngineError::invalid("weights.doctoral", "sum is 0.9");
        assert!(err.is_unit_scoped());
        assert_eq!(
            err.to_string(),
            "invalid input for weights.doctoral: sum is 0.9"
        );

        let upstream: EngineError = UpstreamError::Unavailable("timeout".into()).into();
        assert!(!upstream.is_unit_scoped());
        assert_eq!(upstream.to_string(), "data source unavailable: timeout");

        let malformed: EngineError = UpstreamError::malformed("student", "stage: unknown").into();
        assert!(malformed.is_unit_scoped());
        let missing: EngineError = UpstreamError::StudentNotFound(Uuid::nil()).into();
        assert!(missing.is_unit_scoped());
        let write: EngineError = UpstreamError::Write {
            entity: "risk assessment",
            reason: "connection reset".into(),
        }
        .into();
        assert!(!write.is_unit_scoped());
    }
}
