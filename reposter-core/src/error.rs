use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Gallery API error: {0}")]
    GalleryApi(#[from] GalleryApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Bad input: {message}")]
    InvalidInput { message: String },

    #[error("Crawl task failed: {message}")]
    Internal { message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Failures reported by the gallery API, classified by HTTP status.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GalleryApiError {
    #[error("Token refresh or request rejected: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Upstream returned {status_code}")]
    ServerError { status_code: u16 },

    #[error("{resource} does not exist")]
    NotFound { resource: String },

    #[error("{resource} was removed")]
    Gone { resource: String },

    #[error("Rejected with {status_code}: {message}")]
    ClientError { status_code: u16, message: String },

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Unexpected response body: {details}")]
    InvalidResponse { details: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Could not open store: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Schema migration failed: {reason}")]
    MigrationFailed { reason: String },

    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FingerprintError {
    #[error("Image could not be decoded: {reason}")]
    Decode { reason: String },

    #[error("Album {post_id} has no images")]
    EmptyAlbum { post_id: String },

    #[error("Unknown gallery item kind '{kind}' for {post_id}")]
    UnknownItemKind { post_id: String, kind: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No config at {path}")]
    FileNotFound { path: String },

    #[error("{field} must be set")]
    MissingField { field: String },

    #[error("{field} cannot be {value}")]
    InvalidValue { field: String, value: String },

    #[error(transparent)]
    Parse(#[from] toml::de::Error),
}
