use crate::codec::CodecError;
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// RetentionError
// ---------------------------------------------------------------------------

/// Failure kinds surfaced by the retention subsystem.
///
/// Which of these stop the host daemon and which are only logged is decided by
/// [`RetentionError::policy`].
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    /// Endpoint unreachable, malformed address, or rejected credentials.
    #[error("connection: {0}")]
    Connection(#[source] StoreError),

    /// Missing or contradictory topology settings.
    #[error("configuration: {0}")]
    Configuration(String),

    /// A stored blob could not be turned back into a retention value.
    #[error("decode {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: CodecError,
    },

    /// A retention value could not be serialized.
    #[error("encode {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: CodecError,
    },

    /// The store rejected a remove or insert.
    #[error("write to {collection}: {source}")]
    StoreWrite {
        collection: &'static str,
        #[source]
        source: StoreError,
    },

    /// Reading a collection failed.
    #[error("read from {collection}: {source}")]
    StoreRead {
        collection: &'static str,
        #[source]
        source: StoreError,
    },
}

/// What the caller is expected to do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort startup.
    Fatal,
    /// Log it and abandon the current cycle or load; the next cycle retries.
    LogAndContinue,
}

impl RetentionError {
    pub fn policy(&self) -> ErrorPolicy {
        match self {
            RetentionError::Configuration(_) => ErrorPolicy::Fatal,
            RetentionError::Connection(_)
            | RetentionError::Decode { .. }
            | RetentionError::Encode { .. }
            | RetentionError::StoreWrite { .. }
            | RetentionError::StoreRead { .. } => ErrorPolicy::LogAndContinue,
        }
    }

    /// Short machine-friendly name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RetentionError::Connection(_) => "connection",
            RetentionError::Configuration(_) => "configuration",
            RetentionError::Decode { .. } => "decode",
            RetentionError::Encode { .. } => "encode",
            RetentionError::StoreWrite { .. } => "store_write",
            RetentionError::StoreRead { .. } => "store_read",
        }
    }
}

pub type Result<T> = std::result::Result<T, RetentionError>;
