//! Error types for VIRTA

use thiserror::Error;

/// Result type alias for VIRTA operations
pub type Result<T> = std::result::Result<T, VirtaError>;

/// Main error type for VIRTA
#[derive(Error, Debug)]
pub enum VirtaError {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Kubernetes client error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Routing error (bad matcher or receiver reference)
    #[error("routing error: {0}")]
    Routing(String),

    /// Metrics registration error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Sink bootstrap error
    #[error("sink '{name}' error: {source}")]
    Sink { name: String, source: SinkError },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for sink operations
#[derive(Error, Debug)]
pub enum SinkError {
    /// Initialization failed
    #[error("initialization failed: {0}")]
    Init(String),

    /// Layout rendering failed
    #[error("layout render failed: {0}")]
    Render(String),

    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Send failed
    #[error("send failed: {0}")]
    Send(String),

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),
}

/// Error type for involved-object metadata lookups
#[derive(Error, Debug)]
pub enum MetadataError {
    /// The referenced object no longer exists
    #[error("object not found: {0}")]
    NotFound(String),

    /// No API resource serves the referenced group/version/kind
    #[error("no API resource for {0}")]
    UnknownKind(String),

    /// The reference is missing a field required for the lookup
    #[error("incomplete object reference: missing {0}")]
    IncompleteReference(&'static str),

    /// Discovery or GET request failed
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl MetadataError {
    /// Whether the error means the object was deleted rather than the
    /// lookup having failed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MetadataError::NotFound(_))
    }
}
