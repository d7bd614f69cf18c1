use thiserror::Error;

/// Main error type for fragdex operations
#[derive(Error, Debug)]
pub enum FragdexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Corrupt index format in {location} (line {line}): {reason}")]
    CorruptIndexFormat {
        location: String,
        line: usize,
        reason: String,
    },

    #[error("Duplicate document id {doc_id}: present in both {first} and {second}")]
    DuplicateDocumentId {
        doc_id: u64,
        first: String,
        second: String,
    },

    #[error("Encoding precondition violated at index {index}: {value} does not follow {previous}")]
    EncodingPrecondition {
        index: usize,
        previous: u64,
        value: u64,
    },

    #[error("Partition {partition_id} exceeds its id block capacity of {capacity} documents")]
    PartitionCapacityExceeded { partition_id: usize, capacity: u64 },

    #[error("Partition {partition_id} failed to build: {source}")]
    PartitionBuild {
        partition_id: usize,
        #[source]
        source: Box<FragdexError>,
    },

    #[error("Fragment {fragment} failed to load: {source}")]
    FragmentLoad {
        fragment: String,
        #[source]
        source: Box<FragdexError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid index name: {0:?}")]
    InvalidName(String),

    #[error("Term cannot be persisted: {0:?}")]
    InvalidTerm(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for fragdex operations
pub type Result<T> = std::result::Result<T, FragdexError>;

impl FragdexError {
    /// Build a `CorruptIndexFormat` error. Line numbers are 1-based; 0 means
    /// the location has no line structure (binary fragments).
    pub fn corrupt(location: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        FragdexError::CorruptIndexFormat {
            location: location.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        match self {
            FragdexError::Io(_) => true,
            FragdexError::PartitionBuild { source, .. }
            | FragdexError::FragmentLoad { source, .. } => source.is_retriable(),
            _ => false,
        }
    }

    /// Name of the partition or fragment a failure belongs to, so the caller
    /// can retry just that unit.
    pub fn unit(&self) -> Option<String> {
        match self {
            FragdexError::PartitionBuild { partition_id, .. } => {
                Some(format!("partition-{}", partition_id))
            }
            FragdexError::FragmentLoad { fragment, .. } => Some(fragment.clone()),
            _ => None,
        }
    }
}
