//! Error types shared by every pier operation.

/// Errors raised by image, container and engine operations.
#[derive(Debug, thiserror::Error)]
pub enum PierError {
    /// The engine rejected a call (create, start, stop, remove, wait, ...)
    #[error("Engine API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// The container was stopped but the engine refused to remove it
    #[error("Container {container_id} was stopped but not removed: {source}")]
    ContainerStoppedNotRemoved {
        container_id: String,
        #[source]
        source: bollard::errors::Error,
    },

    /// A build-stream record matched no known event schema
    #[error("Malformed build event: {0}")]
    BuildEventMalformed(String),

    /// A build finished with a fatal error event
    #[error("Image build failed: {0}")]
    BuildFailed(String),

    /// Caller supplied conflicting or invalid arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection options or config file could not be used
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PierError {
    /// Whether this error reports a call the engine rejected.
    ///
    /// A removal that failed half way through counts as well, since the
    /// engine refused the second half of the operation.
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            PierError::ApiError(_) | PierError::ContainerStoppedNotRemoved { .. }
        )
    }

    /// The HTTP status the engine answered with, if it answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            PierError::ApiError(bollard::errors::Error::DockerResponseServerError {
                status_code,
                ..
            })
            | PierError::ContainerStoppedNotRemoved {
                source: bollard::errors::Error::DockerResponseServerError { status_code, .. },
                ..
            } => Some(*status_code),
            _ => None,
        }
    }
}

/// Result type for pier operations.
pub type Result<T> = std::result::Result<T, PierError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(status_code: u16) -> bollard::errors::Error {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message: "no such container".to_string(),
        }
    }

    #[test]
    fn test_api_error_kinds() {
        assert!(PierError::ApiError(rejected(404)).is_api_error());
        assert!(
            PierError::ContainerStoppedNotRemoved {
                container_id: "abc".to_string(),
                source: rejected(409),
            }
            .is_api_error()
        );
        assert!(!PierError::InvalidArgument("binds".to_string()).is_api_error());
    }

    #[test]
    fn test_status_code() {
        assert_eq!(PierError::ApiError(rejected(404)).status_code(), Some(404));
        assert_eq!(PierError::ConfigError("x".to_string()).status_code(), None);
    }

    #[test]
    fn test_partial_removal_message_names_container() {
        let err = PierError::ContainerStoppedNotRemoved {
            container_id: "abc123".to_string(),
            source: rejected(409),
        };
        assert!(err.to_string().contains("abc123"));
    }
}
