use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] quotegate_core::ValidationError),

    #[error(transparent)]
    Config(#[from] quotegate_core::ConfigError),

    #[error(transparent)]
    Gateway(quotegate_core::GatewayError),

    #[error("strict mode failed: {notification_count} notification(s) raised")]
    StrictModeViolation { notification_count: usize },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<quotegate_core::GatewayError> for CliError {
    fn from(error: quotegate_core::GatewayError) -> Self {
        match error {
            quotegate_core::GatewayError::Validation(inner) => Self::Validation(inner),
            other => Self::Gateway(other),
        }
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::Gateway(_) => 3,
            Self::Serialization(_) => 4,
            Self::StrictModeViolation { .. } => 5,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use quotegate_core::{DataType, GatewayError, ValidationError};

    use super::*;

    #[test]
    fn gateway_validation_errors_keep_the_validation_exit_code() {
        let error = CliError::from(GatewayError::Validation(ValidationError::ZeroLimit));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn exhausted_sources_exit_with_three() {
        let error = CliError::from(GatewayError::AllSourcesFailed {
            data_type: DataType::Quote,
            failures: Vec::new(),
        });
        assert_eq!(error.exit_code(), 3);
    }
}
