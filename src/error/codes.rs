/// Error code registry for Tributary
///
/// Error codes are organized by category:
/// - 1000-1999: Protocol errors
/// - 2000-2999: Checkpoint errors
/// - 3000-3999: Collaborator errors (file system, discovery, split open)
/// - 4000-4999: Read errors
/// - 5000-5999: Configuration errors
/// - 6000-6999: Storage errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Protocol errors (1000-1999)
    pub const PROTOCOL_GENERIC: u16 = 1000;
    pub const PROTOCOL_SPLITS_AFTER_NO_MORE: u16 = 1001;
    pub const PROTOCOL_UNKNOWN_EVENT: u16 = 1002;
    pub const PROTOCOL_UNREGISTERED_READER: u16 = 1003;
    pub const PROTOCOL_INVALID_TRANSITION: u16 = 1004;
    pub const PROTOCOL_UNKNOWN_SPLIT: u16 = 1005;
    pub const PROTOCOL_CLOSED: u16 = 1006;
    pub const PROTOCOL_CHANNEL_CLOSED: u16 = 1007;

    // Checkpoint errors (2000-2999)
    pub const CHECKPOINT_GENERIC: u16 = 2000;
    pub const CHECKPOINT_NON_MONOTONIC: u16 = 2001;
    pub const CHECKPOINT_NOT_FOUND: u16 = 2002;
    pub const CHECKPOINT_PERSIST_FAILED: u16 = 2003;
    pub const CHECKPOINT_RESTORE_FAILED: u16 = 2004;

    // Collaborator errors (3000-3999)
    pub const COLLABORATOR_GENERIC: u16 = 3000;
    pub const COLLABORATOR_DISCOVERY_FAILED: u16 = 3001;
    pub const COLLABORATOR_SPLIT_UNAVAILABLE: u16 = 3002;
    pub const COLLABORATOR_RETRIES_EXHAUSTED: u16 = 3003;

    // Read errors (4000-4999)
    pub const READ_GENERIC: u16 = 4000;
    pub const READ_CORRUPTED: u16 = 4001;
    pub const READ_IO_FAULT: u16 = 4002;
    pub const READ_INVALID_ENCODING: u16 = 4003;
    pub const READ_FETCHER_LOST: u16 = 4004;

    // Configuration errors (5000-5999)
    pub const CONFIG_GENERIC: u16 = 5000;
    pub const CONFIG_NOT_FOUND: u16 = 5001;
    pub const CONFIG_INVALID_TOML: u16 = 5002;
    pub const CONFIG_INVALID_VALUE: u16 = 5003;
    pub const CONFIG_INVALID_PATTERN: u16 = 5004;
    pub const CONFIG_INVALID_PATH: u16 = 5005;

    // Storage errors (6000-6999)
    pub const STORAGE_GENERIC: u16 = 6000;
    pub const STORAGE_IO_ERROR: u16 = 6001;
    pub const STORAGE_NOT_FOUND: u16 = 6002;
    pub const STORAGE_PERMISSION_DENIED: u16 = 6003;
    pub const STORAGE_SERIALIZATION_ERROR: u16 = 6004;
    pub const STORAGE_TEMPORARY: u16 = 6005;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
    pub const OTHER_INTERNAL_ERROR: u16 = 9001;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        // Protocol errors
        1000 => "Generic protocol violation",
        1001 => "Splits assigned after no-more-splits was signalled",
        1002 => "Unknown source event type",
        1003 => "Message from an unregistered reader",
        1004 => "Invalid lifecycle transition",
        1005 => "Split is not assigned to this reader",
        1006 => "Component is closed",
        1007 => "Peer channel closed",

        // Checkpoint errors
        2000 => "Generic checkpoint error",
        2001 => "Checkpoint id is not greater than the last snapshot id",
        2002 => "Checkpoint not found",
        2003 => "Failed to persist checkpoint",
        2004 => "Failed to restore from checkpoint",

        // Collaborator errors
        3000 => "Generic collaborator error",
        3001 => "Split discovery failed",
        3002 => "Split could not be opened and may be skipped",
        3003 => "Collaborator retries exhausted",

        // Read errors
        4000 => "Generic read error",
        4001 => "Input data is corrupted",
        4002 => "Unrecoverable I/O fault while reading",
        4003 => "Input is not valid for the configured format",
        4004 => "Background fetcher terminated unexpectedly",

        // Configuration errors
        5000 => "Generic configuration error",
        5001 => "Configuration file not found",
        5002 => "Invalid TOML syntax in configuration",
        5003 => "Invalid value in configuration",
        5004 => "Invalid glob pattern in configuration",
        5005 => "Invalid path",

        // Storage errors
        6000 => "Generic storage error",
        6001 => "Storage I/O error",
        6002 => "Storage item not found",
        6003 => "Storage permission denied",
        6004 => "Storage serialization error",
        6005 => "Temporary storage error",

        // Other errors
        9000 => "Generic error",
        9001 => "Internal error",

        _ => "Unknown error code",
    }
}
