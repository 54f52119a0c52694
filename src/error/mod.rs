use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

pub mod codes;
pub mod helpers;

pub use codes::{describe_error_code, ErrorCode};
pub use helpers::ErrorExt;

/// The unified error type for the connector runtime
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// A sequencing violation by the surrounding orchestration
    #[error("[E{code:04}] Protocol error: {message}")]
    Protocol {
        code: u16,
        message: String,
        subtask: Option<u32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A message arrived after the component reached its terminal state
    #[error("[E{code:04}] Closed: {message}")]
    Closed { code: u16, message: String },

    #[error("[E{code:04}] Checkpoint error: {message}")]
    Checkpoint {
        code: u16,
        message: String,
        checkpoint_id: Option<u64>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Discovery I/O failures and split-open failures that may succeed later
    #[error("[E{code:04}] Transient collaborator error: {message}")]
    Transient {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Corruption or an unrecoverable I/O fault in the middle of a split
    #[error("[E{code:04}] Fatal read error: {message}")]
    FatalRead {
        code: u16,
        message: String,
        split_id: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Storage error: {message}")]
    Storage {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    /// Create a protocol error with default code
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::protocol_with_code(ErrorCode::PROTOCOL_GENERIC, message)
    }

    /// Create a protocol error with specific code
    pub fn protocol_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            subtask: None,
            source: None,
        }
    }

    /// Create a closed error for the named component
    pub fn closed(component: impl Display) -> Self {
        Self::Closed {
            code: ErrorCode::PROTOCOL_CLOSED,
            message: format!("{} is closed", component),
        }
    }

    /// Create a checkpoint error with default code
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::checkpoint_with_code(ErrorCode::CHECKPOINT_GENERIC, message, None)
    }

    /// Create a checkpoint error with specific code and checkpoint id
    pub fn checkpoint_with_code(
        code: u16,
        message: impl Into<String>,
        checkpoint_id: Option<u64>,
    ) -> Self {
        Self::Checkpoint {
            code,
            message: message.into(),
            checkpoint_id,
            source: None,
        }
    }

    /// Create a transient collaborator error with default code
    pub fn transient(message: impl Into<String>) -> Self {
        Self::transient_with_code(ErrorCode::COLLABORATOR_GENERIC, message)
    }

    /// Create a transient collaborator error with specific code
    pub fn transient_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Transient {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a fatal read error for a split
    pub fn fatal_read(message: impl Into<String>, split_id: Option<String>) -> Self {
        Self::fatal_read_with_code(ErrorCode::READ_GENERIC, message, split_id)
    }

    /// Create a fatal read error with specific code
    pub fn fatal_read_with_code(
        code: u16,
        message: impl Into<String>,
        split_id: Option<String>,
    ) -> Self {
        Self::FatalRead {
            code,
            message: message.into(),
            split_id,
            source: None,
        }
    }

    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::config_with_code(ErrorCode::CONFIG_GENERIC, message)
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error with default code
    pub fn storage(message: impl Into<String>) -> Self {
        Self::storage_with_code(ErrorCode::STORAGE_GENERIC, message, None)
    }

    /// Create a storage error with specific code and path
    pub fn storage_with_code(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Create a generic other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error (a bug in the runtime itself)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_INTERNAL_ERROR,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the offending subtask to a protocol error
    pub fn with_subtask(mut self, subtask_id: u32) -> Self {
        if let Self::Protocol {
            subtask: ref mut s, ..
        } = self
        {
            *s = Some(subtask_id);
        }
        self
    }

    /// Attach the split a fatal read error belongs to
    pub fn with_split(mut self, id: impl Into<String>) -> Self {
        if let Self::FatalRead {
            split_id: ref mut s,
            ..
        } = self
        {
            *s = Some(id.into());
        }
        self
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Protocol { source: src, .. }
            | Self::Checkpoint { source: src, .. }
            | Self::Transient { source: src, .. }
            | Self::FatalRead { source: src, .. }
            | Self::Config { source: src, .. }
            | Self::Storage { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
            Self::Closed { .. } => {}
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Protocol { message, .. }
            | Self::Closed { message, .. }
            | Self::Checkpoint { message, .. }
            | Self::Transient { message, .. }
            | Self::FatalRead { message, .. }
            | Self::Config { message, .. }
            | Self::Storage { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Protocol { code, .. }
            | Self::Closed { code, .. }
            | Self::Checkpoint { code, .. }
            | Self::Transient { code, .. }
            | Self::FatalRead { code, .. }
            | Self::Config { code, .. }
            | Self::Storage { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// The message without its code prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Protocol { message, .. }
            | Self::Closed { message, .. }
            | Self::Checkpoint { message, .. }
            | Self::Transient { message, .. }
            | Self::FatalRead { message, .. }
            | Self::Config { message, .. }
            | Self::Storage { message, .. }
            | Self::Other { message, .. } => message,
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Protocol { .. } => 2,
            Self::Closed { .. } => 3,
            Self::Checkpoint { .. } => 4,
            Self::Transient { .. } => 5,
            Self::FatalRead { .. } => 6,
            Self::Config { .. } => 7,
            Self::Storage { .. } => 8,
            Self::Other { .. } => 1,
        }
    }

    /// Whether a retry of the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Storage { code, .. } => *code == ErrorCode::STORAGE_TEMPORARY,
            _ => false,
        }
    }

    /// Whether the failing split may be skipped without failing the run
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::Transient { code, .. } if *code == ErrorCode::COLLABORATOR_SPLIT_UNAVAILABLE
        )
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// Type alias for Results using ConnectorError
pub type Result<T> = std::result::Result<T, ConnectorError>;

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, message) = match err.kind() {
            ErrorKind::NotFound => (ErrorCode::STORAGE_NOT_FOUND, "File or directory not found"),
            ErrorKind::PermissionDenied => {
                (ErrorCode::STORAGE_PERMISSION_DENIED, "Permission denied")
            }
            ErrorKind::TimedOut | ErrorKind::Interrupted | ErrorKind::WouldBlock => {
                (ErrorCode::STORAGE_TEMPORARY, "Resource temporarily unavailable")
            }
            _ => (ErrorCode::STORAGE_IO_ERROR, "IO operation failed"),
        };

        ConnectorError::storage_with_code(code, message, None).with_source(err)
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::storage_with_code(
            ErrorCode::STORAGE_SERIALIZATION_ERROR,
            "Invalid JSON payload",
            None,
        )
        .with_source(err)
    }
}

impl From<toml::de::Error> for ConnectorError {
    fn from(err: toml::de::Error) -> Self {
        ConnectorError::config_with_code(ErrorCode::CONFIG_INVALID_TOML, "Invalid TOML syntax")
            .with_source(err)
    }
}
