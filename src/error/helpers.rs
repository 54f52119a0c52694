use super::{ConnectorError, ErrorCode};

/// Extension trait for convenient error conversion
pub trait ErrorExt<T> {
    /// Convert to a transient collaborator error with context
    fn to_transient(self, message: impl Into<String>) -> Result<T, ConnectorError>;

    /// Convert to a fatal read error for the given split
    fn to_fatal_read(self, split_id: &str, message: impl Into<String>)
        -> Result<T, ConnectorError>;

    fn to_storage_error(self, message: impl Into<String>) -> Result<T, ConnectorError>;
    fn to_config_error(self, message: impl Into<String>) -> Result<T, ConnectorError>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_transient(self, message: impl Into<String>) -> Result<T, ConnectorError> {
        self.map_err(|e| ConnectorError::transient(message).with_source(e))
    }

    fn to_fatal_read(
        self,
        split_id: &str,
        message: impl Into<String>,
    ) -> Result<T, ConnectorError> {
        self.map_err(|e| {
            ConnectorError::fatal_read_with_code(
                ErrorCode::READ_IO_FAULT,
                message,
                Some(split_id.to_string()),
            )
            .with_source(e)
        })
    }

    fn to_storage_error(self, message: impl Into<String>) -> Result<T, ConnectorError> {
        self.map_err(|e| ConnectorError::storage(message).with_source(e))
    }

    fn to_config_error(self, message: impl Into<String>) -> Result<T, ConnectorError> {
        self.map_err(|e| ConnectorError::config(message).with_source(e))
    }
}
