use thiserror::Error;

/// Main error type for relmap
#[derive(Error, Debug)]
pub enum RelmapError {
    /// Input line does not have exactly two comma-separated fields
    #[error("Malformed input line: {0}")]
    MalformedLine(String),

    /// Entity type outside the recognized set
    #[error("Bad input vertex type: {0}")]
    UnknownEntityType(String),

    /// Vertex key from the store does not split into label and local id
    #[error("Found malformed namespaced vertex: {0}")]
    MalformedVertexKey(String),

    /// Root vertex of a job is absent from the store
    #[error("Vertex not found: {0}")]
    VertexNotFound(String),

    /// Graph store query failures (evaluation errors, bad responses)
    #[error("Graph store error: {0}")]
    Store(String),

    /// Embedded store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Transport errors talking to a remote store
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker pool did not drain within the allotted time
    #[error("Worker pool did not drain within {0:?}")]
    DrainTimeout(std::time::Duration),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using RelmapError
pub type Result<T> = std::result::Result<T, RelmapError>;
